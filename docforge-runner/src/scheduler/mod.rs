//! Scheduler layer for the runner
//!
//! Runs generation requests as independent tasks. A semaphore bounds how many
//! generations execute at once; queued requests wait for a permit.

pub mod pipeline;

pub use pipeline::GenerationPipeline;

use docforge_core::GenerationError;
use docforge_core::domain::job::Job;
use docforge_core::dto::job::GenerationRequest;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::debug;

/// Bounded-parallelism front of the pipeline
#[derive(Clone)]
pub struct GenerationScheduler {
    pipeline: Arc<GenerationPipeline>,
    semaphore: Arc<Semaphore>,
}

impl GenerationScheduler {
    pub fn new(pipeline: Arc<GenerationPipeline>, max_parallel_jobs: usize) -> Self {
        Self {
            pipeline,
            semaphore: Arc::new(Semaphore::new(max_parallel_jobs.max(1))),
        }
    }

    pub fn pipeline(&self) -> &Arc<GenerationPipeline> {
        &self.pipeline
    }

    /// Spawns the generation; the handle resolves once the job is terminal
    pub fn submit(&self, request: GenerationRequest) -> JoinHandle<Result<Job, GenerationError>> {
        let pipeline = Arc::clone(&self.pipeline);
        let semaphore = Arc::clone(&self.semaphore);

        tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| GenerationError::storage(format!("scheduler closed: {}", e)))?;
            debug!("Starting generation for template {}", request.template_id);
            pipeline.run(request).await
            // Permit is released when dropped
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::repository::InMemoryJobRepository;
    use crate::service::{DEFAULT_CAPACITY, EventBus, JobManager};
    use docforge_core::domain::job::JobStatus;

    #[tokio::test]
    async fn test_submitted_jobs_all_finish() {
        let root = tempfile::tempdir().unwrap();
        let template_dir = root.path().join("templates").join("budget");
        std::fs::create_dir_all(&template_dir).unwrap();
        std::fs::write(template_dir.join("template.xlsx"), b"not a zip").unwrap();
        std::fs::write(
            template_dir.join("generate.lua"),
            "function generate(toolkit, builder, context) return { sheet_ops = {} } end",
        )
        .unwrap();

        let config = Config::new(root.path().join("data"), root.path().join("templates"));
        let jobs = Arc::new(
            JobManager::open(Arc::new(InMemoryJobRepository::new()), DEFAULT_CAPACITY)
                .await
                .unwrap(),
        );
        let pipeline = Arc::new(GenerationPipeline::from_config(&config, jobs.clone(), EventBus::new()));
        let scheduler = GenerationScheduler::new(pipeline, 2);

        let handles: Vec<_> = (0..4)
            .map(|i| {
                scheduler.submit(GenerationRequest {
                    job_id: Some(format!("job-{}", i)),
                    customer_id: "acme".to_string(),
                    workspace_id: "ws-1".to_string(),
                    template_id: "budget".to_string(),
                    ..Default::default()
                })
            })
            .collect();

        for handle in handles {
            let job = handle.await.unwrap().unwrap();
            // the template is not a valid archive
            assert_eq!(job.status, JobStatus::Error);
            assert!(job.is_terminal());
        }
        assert_eq!(jobs.list(10).await.len(), 4);
    }
}
