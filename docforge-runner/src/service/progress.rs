//! Progress events
//!
//! Every job publishes its progress on one broadcast channel. Observers
//! subscribe and filter by job id; a slow or vanished observer only loses
//! events, it never blocks or fails the job.

use docforge_core::domain::job::{JobFile, StepStatus};
use docforge_core::dto::event::{JobEvent, ProgressEvent};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 1024;

/// Broadcast hub for job events
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<JobEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Create a new subscriber
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.tx.subscribe()
    }

    /// Reporter bound to one job
    pub fn reporter(&self, job_id: impl Into<String>) -> ProgressReporter {
        ProgressReporter {
            job_id: job_id.into(),
            tx: self.tx.clone(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Publishes events for one job
#[derive(Clone)]
pub struct ProgressReporter {
    job_id: String,
    tx: broadcast::Sender<JobEvent>,
}

impl ProgressReporter {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Publish an event; having no subscribers is not an error
    pub fn emit(&self, event: ProgressEvent) {
        let _ = self.tx.send(JobEvent {
            job_id: self.job_id.clone(),
            event,
        });
    }

    pub fn info(&self, message: impl Into<String>, template_id: &str) {
        self.emit(ProgressEvent::Info {
            message: message.into(),
            template_id: template_id.to_string(),
        });
    }

    pub fn log(&self, message: impl Into<String>) {
        self.emit(ProgressEvent::Log {
            message: message.into(),
        });
    }

    pub fn step(&self, name: &str, status: StepStatus, progress: u8) {
        self.emit(ProgressEvent::Step {
            name: name.to_string(),
            status,
            progress: progress.min(100),
        });
    }

    pub fn done(&self, file: JobFile) {
        self.emit(ProgressEvent::Done {
            file,
            job_id: self.job_id.clone(),
        });
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(ProgressEvent::Error {
            message: message.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_are_tagged_with_job() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let reporter = bus.reporter("job-7");

        reporter.step("merge", StepStatus::Start, 150);
        reporter.error("boom");

        let first = rx.recv().await.unwrap();
        assert_eq!(first.job_id, "job-7");
        assert_eq!(
            first.event,
            ProgressEvent::Step {
                name: "merge".to_string(),
                status: StepStatus::Start,
                progress: 100,
            }
        );
        assert!(rx.recv().await.unwrap().event.is_final());
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new();
        bus.reporter("j").log("nobody listens");
    }
}
