//! Job manager
//!
//! Owns the job collection. Every mutation happens under one async mutex,
//! is applied in memory and is then flushed through the repository before
//! the call returns. The collection is kept most-recent-first and capped;
//! the oldest jobs are evicted first.

use docforge_core::GenerationError;
use docforge_core::domain::job::{Job, JobFile, JobSpec, JobStatus};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::repository::JobRepository;

/// Default number of jobs kept
pub const DEFAULT_CAPACITY: usize = 200;

pub struct JobManager {
    repository: Arc<dyn JobRepository>,
    jobs: Mutex<Vec<Job>>,
    capacity: usize,
}

impl JobManager {
    /// Loads the stored collection and takes ownership of it
    pub async fn open(repository: Arc<dyn JobRepository>, capacity: usize) -> Result<Self, GenerationError> {
        let mut jobs = repository.load().await?;
        jobs.truncate(capacity);
        info!("Loaded {} job(s)", jobs.len());
        Ok(Self {
            repository,
            jobs: Mutex::new(jobs),
            capacity,
        })
    }

    /// Applies `f` to job `id` and persists the collection
    ///
    /// Returns `None` (and writes nothing) for an unknown id.
    async fn update<T>(&self, id: &str, f: impl FnOnce(&mut Job) -> T) -> Result<Option<T>, GenerationError> {
        let mut jobs = self.jobs.lock().await;
        let Some(job) = jobs.iter_mut().find(|j| j.id == id) else {
            debug!("Ignoring update for unknown job {}", id);
            return Ok(None);
        };
        let out = f(job);
        self.repository.save(&jobs).await?;
        Ok(Some(out))
    }

    fn insert(&self, jobs: &mut Vec<Job>, job: Job) {
        jobs.insert(0, job);
        if jobs.len() > self.capacity {
            let evicted = jobs.len() - self.capacity;
            jobs.truncate(self.capacity);
            debug!("Evicted {} old job(s)", evicted);
        }
    }

    pub async fn create(&self, spec: JobSpec) -> Result<Job, GenerationError> {
        self.create_with_id(Job::generate_id(), spec).await
    }

    /// Creates a job under a caller-chosen id
    ///
    /// An existing record is returned as it is, with empty spec fields
    /// filled in from `spec`; its status is never reset.
    pub async fn create_with_id(&self, id: impl Into<String>, spec: JobSpec) -> Result<Job, GenerationError> {
        let id = id.into();
        let mut jobs = self.jobs.lock().await;

        if let Some(job) = jobs.iter_mut().find(|j| j.id == id) {
            let mut changed = false;
            for (field, value) in [
                (&mut job.customer_id, &spec.customer_id),
                (&mut job.workspace_id, &spec.workspace_id),
                (&mut job.template_id, &spec.template_id),
            ] {
                if field.is_empty() && !value.is_empty() {
                    *field = value.clone();
                    changed = true;
                }
            }
            if job.output_name.is_none() && spec.output_name.is_some() {
                job.output_name = spec.output_name.clone();
                changed = true;
            }
            let existing = job.clone();
            if changed {
                self.repository.save(&jobs).await?;
            }
            return Ok(existing);
        }

        let job = Job::new(id, spec);
        self.insert(&mut jobs, job.clone());
        self.repository.save(&jobs).await?;
        info!("Created job {}", job.id);
        Ok(job)
    }

    pub async fn append_log(&self, id: &str, line: impl Into<String>) -> Result<(), GenerationError> {
        let line = line.into();
        self.update(id, |job| job.push_log(line)).await?;
        Ok(())
    }

    pub async fn step_start(&self, id: &str, name: &str) -> Result<(), GenerationError> {
        self.update(id, |job| job.start_step(name)).await?;
        Ok(())
    }

    pub async fn step_ok(&self, id: &str, name: &str) -> Result<(), GenerationError> {
        self.update(id, |job| job.complete_step(name)).await?;
        Ok(())
    }

    /// Records the output file; ignored once the job is terminal
    pub async fn mark_done(
        &self,
        id: &str,
        file: JobFile,
        meta: Option<serde_json::Value>,
    ) -> Result<Option<Job>, GenerationError> {
        self.update(id, |job| {
            if job.is_terminal() {
                warn!("Job {} is already {}, not marking done", job.id, job.status);
                return job.clone();
            }
            job.file = Some(file);
            job.meta = meta;
            job.finish(JobStatus::Done);
            job.clone()
        })
        .await
    }

    /// Records the failure
    ///
    /// Once the job is terminal only the message is appended to its logs.
    pub async fn mark_error(&self, id: &str, message: impl Into<String>) -> Result<Option<Job>, GenerationError> {
        let message = message.into();
        self.update(id, |job| {
            if job.is_terminal() {
                warn!("Job {} is already {}, not marking error: {}", job.id, job.status, message);
                job.push_log(message.clone());
                return job.clone();
            }
            job.push_log(message.clone());
            job.error = Some(message);
            job.finish(JobStatus::Error);
            job.clone()
        })
        .await
    }

    /// Flags the job as cancelled
    ///
    /// Work in flight is not interrupted; the pipeline observes the flag at
    /// its next checkpoint. An unknown id gets a cancelled placeholder so a
    /// cancel that arrives before the job is created still wins.
    pub async fn cancel(&self, id: &str) -> Result<Job, GenerationError> {
        let mut jobs = self.jobs.lock().await;

        if let Some(job) = jobs.iter_mut().find(|j| j.id == id) {
            if job.is_terminal() {
                return Ok(job.clone());
            }
            job.cancelled = true;
            job.push_log("cancelled");
            job.finish(JobStatus::Cancelled);
            let cancelled = job.clone();
            self.repository.save(&jobs).await?;
            info!("Cancelled job {}", id);
            return Ok(cancelled);
        }

        let mut placeholder = Job::new(id, JobSpec::default());
        placeholder.cancelled = true;
        placeholder.push_log("cancelled before start");
        placeholder.finish(JobStatus::Cancelled);
        self.insert(&mut jobs, placeholder.clone());
        self.repository.save(&jobs).await?;
        info!("Recorded cancellation for pending job {}", id);
        Ok(placeholder)
    }

    pub async fn is_cancelled(&self, id: &str) -> bool {
        self.jobs
            .lock()
            .await
            .iter()
            .any(|j| j.id == id && (j.cancelled || j.status == JobStatus::Cancelled))
    }

    pub async fn get(&self, id: &str) -> Option<Job> {
        self.jobs.lock().await.iter().find(|j| j.id == id).cloned()
    }

    /// Most-recent-first
    pub async fn list(&self, limit: usize) -> Vec<Job> {
        self.jobs.lock().await.iter().take(limit).cloned().collect()
    }

    pub async fn delete(&self, id: &str) -> Result<bool, GenerationError> {
        let mut jobs = self.jobs.lock().await;
        let before = jobs.len();
        jobs.retain(|j| j.id != id);
        if jobs.len() == before {
            return Ok(false);
        }
        self.repository.save(&jobs).await?;
        Ok(true)
    }

    /// Removes every job, returning how many were removed
    pub async fn clear(&self) -> Result<usize, GenerationError> {
        let mut jobs = self.jobs.lock().await;
        let removed = jobs.len();
        jobs.clear();
        self.repository.save(&jobs).await?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{InMemoryJobRepository, JsonFileJobRepository};

    fn spec(template: &str) -> JobSpec {
        JobSpec {
            customer_id: "acme".to_string(),
            workspace_id: "ws-1".to_string(),
            template_id: template.to_string(),
            output_name: None,
        }
    }

    async fn manager(capacity: usize) -> JobManager {
        JobManager::open(Arc::new(InMemoryJobRepository::new()), capacity)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_list_is_most_recent_first_and_capped() {
        let jobs = manager(3).await;
        for i in 0..5 {
            jobs.create_with_id(format!("j{}", i), spec("t")).await.unwrap();
        }

        let ids: Vec<String> = jobs.list(10).await.into_iter().map(|j| j.id).collect();
        assert_eq!(ids, vec!["j4", "j3", "j2"]);
        assert_eq!(jobs.list(1).await.len(), 1);
    }

    #[tokio::test]
    async fn test_create_with_id_is_idempotent() {
        let jobs = manager(DEFAULT_CAPACITY).await;
        jobs.create_with_id("j1", spec("quarterly")).await.unwrap();
        jobs.append_log("j1", "hello").await.unwrap();

        let again = jobs.create_with_id("j1", spec("other")).await.unwrap();
        assert_eq!(again.template_id, "quarterly");
        assert_eq!(again.logs, vec!["hello".to_string()]);
        assert_eq!(jobs.list(10).await.len(), 1);
    }

    #[tokio::test]
    async fn test_terminal_status_is_never_overwritten() {
        let jobs = manager(DEFAULT_CAPACITY).await;
        jobs.create_with_id("j1", spec("t")).await.unwrap();

        let cancelled = jobs.cancel("j1").await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);

        let file = JobFile {
            path: "/tmp/out.docx".to_string(),
            name: "out.docx".to_string(),
        };
        let after = jobs.mark_done("j1", file, None).await.unwrap().unwrap();
        assert_eq!(after.status, JobStatus::Cancelled);
        assert!(after.file.is_none());

        let after = jobs.mark_error("j1", "RuntimeError: late").await.unwrap().unwrap();
        assert_eq!(after.status, JobStatus::Cancelled);
        assert!(after.error.is_none());
        assert_eq!(after.logs.last().map(String::as_str), Some("RuntimeError: late"));

        // logs after cancellation are tolerated
        jobs.append_log("j1", "late line").await.unwrap();
        assert!(jobs.get("j1").await.unwrap().logs.contains(&"late line".to_string()));
    }

    #[tokio::test]
    async fn test_cancel_before_create() {
        let jobs = manager(DEFAULT_CAPACITY).await;
        jobs.cancel("early").await.unwrap();
        assert!(jobs.is_cancelled("early").await);

        let job = jobs.create_with_id("early", spec("quarterly")).await.unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert_eq!(job.template_id, "quarterly");
    }

    #[tokio::test]
    async fn test_mark_error_records_message() {
        let jobs = manager(DEFAULT_CAPACITY).await;
        jobs.create_with_id("j1", spec("t")).await.unwrap();
        jobs.step_start("j1", "execute").await.unwrap();

        let job = jobs
            .mark_error("j1", "TimeoutError: execution exceeded 1s")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.error.as_deref(), Some("TimeoutError: execution exceeded 1s"));
        assert!(job.completed_at.is_some());
        assert_eq!(job.steps.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_ids_are_ignored() {
        let jobs = manager(DEFAULT_CAPACITY).await;
        jobs.append_log("nope", "x").await.unwrap();
        assert!(jobs.mark_error("nope", "x").await.unwrap().is_none());
        assert!(!jobs.delete("nope").await.unwrap());
        assert!(jobs.get("nope").await.is_none());
    }

    #[tokio::test]
    async fn test_mutations_are_durable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        {
            let jobs = JobManager::open(Arc::new(JsonFileJobRepository::new(&path)), DEFAULT_CAPACITY)
                .await
                .unwrap();
            jobs.create_with_id("j1", spec("t")).await.unwrap();
            jobs.create_with_id("j2", spec("t")).await.unwrap();
            jobs.step_ok("j1", "merge").await.unwrap();
            jobs.delete("j2").await.unwrap();
        }

        let reopened = JobManager::open(Arc::new(JsonFileJobRepository::new(&path)), DEFAULT_CAPACITY)
            .await
            .unwrap();
        let all = reopened.list(10).await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].steps[0].name, "merge");

        assert_eq!(reopened.clear().await.unwrap(), 1);
        assert!(reopened.list(10).await.is_empty());
    }
}
