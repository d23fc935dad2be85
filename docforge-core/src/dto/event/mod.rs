//! Progress events pushed to observers of a running job

use serde::{Deserialize, Serialize};

use crate::domain::job::{JobFile, StepStatus};

/// Event tagged with the job it belongs to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobEvent {
    pub job_id: String,
    #[serde(flatten)]
    pub event: ProgressEvent,
}

/// Discrete progress event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProgressEvent {
    Info {
        message: String,
        template_id: String,
    },
    Log {
        message: String,
    },
    Step {
        name: String,
        status: StepStatus,
        progress: u8,
    },
    Done {
        file: JobFile,
        job_id: String,
    },
    Error {
        message: String,
    },
}

impl ProgressEvent {
    /// Whether this event ends the stream for its job
    pub fn is_final(&self) -> bool {
        matches!(self, ProgressEvent::Done { .. } | ProgressEvent::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_shape() {
        let event = JobEvent {
            job_id: "j1".to_string(),
            event: ProgressEvent::Step {
                name: "merge".to_string(),
                status: StepStatus::Ok,
                progress: 80,
            },
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "job_id": "j1",
                "type": "step",
                "name": "merge",
                "status": "ok",
                "progress": 80
            })
        );
    }
}
