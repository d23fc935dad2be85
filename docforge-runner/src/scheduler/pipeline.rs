//! Generation pipeline
//!
//! Drives one request through validate, artifact, compile, execute, merge and
//! write. Each step is recorded on the job and published as a progress event.
//! Cancellation is observed at checkpoints between the steps; once observed
//! the pipeline stops and the job stays `cancelled`.

use chrono::Utc;
use docforge_client::{CompletionClient, CompletionService, DisabledCompletionService};
use docforge_core::GenerationError;
use docforge_core::domain::artifact::CodeArtifact;
use docforge_core::domain::job::{Job, JobFile, StepStatus};
use docforge_core::domain::template::{TemplateDescriptor, TemplateKind};
use docforge_core::dto::job::GenerationRequest;
use docforge_lua::{SandboxLimits, check_entry_point};
use docforge_merge::SkeletonFormat;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::context::{ArtifactContext, CapabilityBinding, TemplateSnapshot};
use crate::repository::{DirectoryTemplateStore, TemplateStore, write_atomic};
use crate::service::{
    CacheOutcome, EnhancementCache, EnhancementRequest, EventBus, ExecutionService, InMemoryLogBuffer, JobManager,
    LogBufferService, ProgressReporter, SandboxExecutionService,
};

const STEP_VALIDATE: (&str, u8) = ("validate", 5);
const STEP_ARTIFACT: (&str, u8) = ("artifact", 20);
const STEP_COMPILE: (&str, u8) = ("compile", 35);
const STEP_EXECUTE: (&str, u8) = ("execute", 70);
const STEP_MERGE: (&str, u8) = ("merge", 85);
const STEP_WRITE: (&str, u8) = ("write", 100);

/// Why a run stopped early
enum Halt {
    Cancelled(&'static str),
    Failed(GenerationError),
}

impl From<GenerationError> for Halt {
    fn from(err: GenerationError) -> Self {
        Halt::Failed(err)
    }
}

/// State shared by the steps of one run
struct Run<'a> {
    job_id: String,
    request: &'a GenerationRequest,
    template: TemplateDescriptor,
    reporter: ProgressReporter,
    log_buffer: Arc<InMemoryLogBuffer>,
}

pub struct GenerationPipeline {
    jobs: Arc<JobManager>,
    templates: Arc<dyn TemplateStore>,
    completion: Arc<dyn CompletionService>,
    executor: Arc<dyn ExecutionService>,
    cache: EnhancementCache,
    events: EventBus,
    output_dir: PathBuf,
}

impl GenerationPipeline {
    pub fn new(
        jobs: Arc<JobManager>,
        templates: Arc<dyn TemplateStore>,
        completion: Arc<dyn CompletionService>,
        executor: Arc<dyn ExecutionService>,
        events: EventBus,
        config: &Config,
    ) -> Self {
        Self {
            cache: EnhancementCache::new(completion.clone(), config.cache_ttl),
            jobs,
            templates,
            completion,
            executor,
            events,
            output_dir: config.output_dir.clone(),
        }
    }

    /// Wires the default services described by `config`
    pub fn from_config(config: &Config, jobs: Arc<JobManager>, events: EventBus) -> Self {
        let completion: Arc<dyn CompletionService> = match &config.completion_url {
            Some(url) => Arc::new(CompletionClient::new(url.clone())),
            None => Arc::new(DisabledCompletionService),
        };
        let executor = SandboxExecutionService::new(
            SandboxLimits::with_memory_limit_mb(config.memory_limit_mb),
            config.execution_timeout,
        );
        Self::new(
            jobs,
            Arc::new(DirectoryTemplateStore::new(config.template_root.clone())),
            completion,
            Arc::new(executor),
            events,
            config,
        )
    }

    pub fn jobs(&self) -> &Arc<JobManager> {
        &self.jobs
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Runs one generation to a terminal state
    ///
    /// Only a `Validation` failure is returned as an error, and no job exists
    /// for it. Every other outcome is recorded on the returned job.
    pub async fn run(&self, request: GenerationRequest) -> Result<Job, GenerationError> {
        validate_request(&request)?;
        let template = self.templates.resolve(&request.template_id).await?;

        let job_id = request.job_id.clone().unwrap_or_else(Job::generate_id);
        let job = self.jobs.create_with_id(job_id.clone(), request.spec()).await?;
        let reporter = self.events.reporter(&job_id);

        if job.is_terminal() {
            info!("Job {} was {} before it started", job_id, job.status);
            reporter.error(format!("job {} before start", job.status));
            return Ok(job);
        }

        reporter.info(format!("Generating from template {}", template.id), &template.id);

        let run = Run {
            job_id: job_id.clone(),
            request: &request,
            template,
            reporter: reporter.clone(),
            log_buffer: Arc::new(InMemoryLogBuffer::new()),
        };

        match self.drive(&run).await {
            Ok((file, meta)) => {
                info!("Job {} produced {}", job_id, file.path);
                self.jobs.mark_done(&job_id, file.clone(), Some(meta)).await?;
                reporter.done(file);
            }
            Err(Halt::Cancelled(at)) => {
                self.flush_logs(&run).await;
                info!("Job {} cancelled {}", job_id, at);
                self.jobs.append_log(&job_id, format!("cancelled {}", at)).await?;
                reporter.error("cancelled");
            }
            Err(Halt::Failed(err)) => {
                self.flush_logs(&run).await;
                error!("Job {} failed: {}", job_id, err);
                self.jobs.mark_error(&job_id, err.to_string()).await?;
                reporter.error(err.to_string());
            }
        }

        self.jobs
            .get(&job_id)
            .await
            .ok_or_else(|| GenerationError::storage(format!("job {} vanished", job_id)))
    }

    async fn drive(&self, run: &Run<'_>) -> Result<(JobFile, serde_json::Value), Halt> {
        self.begin(run, STEP_VALIDATE).await?;
        let template_bytes = tokio::fs::read(&run.template.template_path).await.map_err(|e| {
            GenerationError::storage(format!("failed to read {}: {}", run.template.template_path.display(), e))
        })?;
        self.complete(run, STEP_VALIDATE).await?;

        self.checkpoint(run, "before enhancement").await?;
        self.begin(run, STEP_ARTIFACT).await?;
        let artifact = self.artifact(run, &template_bytes).await?;
        self.complete(run, STEP_ARTIFACT).await?;

        self.checkpoint(run, "before compile").await?;
        self.begin(run, STEP_COMPILE).await?;
        if let Err(err) = check_entry_point(&artifact.source) {
            self.invalidate_on_contract_violation(run, &artifact, &err).await;
            return Err(err.into());
        }
        self.complete(run, STEP_COMPILE).await?;

        self.checkpoint(run, "before execute").await?;
        self.begin(run, STEP_EXECUTE).await?;
        let binding = CapabilityBinding {
            session_id: run.job_id.clone(),
            completion: self.completion.clone(),
            template: TemplateSnapshot::new(run.template.kind, template_bytes.clone()),
            log_buffer: run.log_buffer.clone(),
        };
        let context = ArtifactContext {
            customer_id: run.request.customer_id.clone(),
            workspace_id: run.request.workspace_id.clone(),
            template_id: run.template.id.clone(),
            job_id: run.job_id.clone(),
            now: Utc::now(),
            instructions: run.request.instructions.clone(),
        };
        let executed = self.executor.execute(&artifact, binding, &context).await;
        self.flush_logs(run).await;
        if let Err(err) = &executed {
            self.invalidate_on_contract_violation(run, &artifact, err).await;
            if self.jobs.is_cancelled(&run.job_id).await {
                self.log(run, format!("{} (ignored, job was cancelled)", err)).await?;
            }
        }
        self.checkpoint(run, "after execute").await?;
        let result = executed?;
        self.complete(run, STEP_EXECUTE).await?;

        self.checkpoint(run, "before merge").await?;
        self.begin(run, STEP_MERGE).await?;
        let kind = run.template.kind;
        let output = tokio::task::spawn_blocking(move || docforge_merge::merge(kind, &template_bytes, &result))
            .await
            .map_err(|e| GenerationError::storage(format!("merge task failed: {}", e)))??;
        if let Some(degradation) = &output.degradation {
            warn!("Job {}: {}", run.job_id, degradation);
            self.log(run, degradation.to_string()).await?;
        }
        self.complete(run, STEP_MERGE).await?;

        self.checkpoint(run, "before write").await?;
        self.begin(run, STEP_WRITE).await?;
        let name = output_name(run.request.output_name.as_deref(), &run.template.id, kind);
        let path = self.output_dir.join(&run.job_id).join(&name);
        let bytes_written = output.bytes.len();
        let target = path.clone();
        let bytes = output.bytes;
        tokio::task::spawn_blocking(move || write_atomic(&target, &bytes))
            .await
            .map_err(|e| GenerationError::storage(format!("output writer failed: {}", e)))??;
        self.complete(run, STEP_WRITE).await?;

        let meta = json!({
            "template_id": run.template.id,
            "template_kind": kind,
            "artifact": if artifact.is_enhanced() { "enhanced" } else { "base" },
            "degraded": output.degradation.is_some(),
            "bytes": bytes_written,
        });
        let file = JobFile {
            path: path.to_string_lossy().to_string(),
            name,
        };
        Ok((file, meta))
    }

    async fn artifact(&self, run: &Run<'_>, template_bytes: &[u8]) -> Result<CodeArtifact, GenerationError> {
        if !run.request.enhance {
            let source = tokio::fs::read_to_string(&run.template.artifact_path).await?;
            return Ok(CodeArtifact::base(source));
        }

        let skeleton = match docforge_merge::skeleton(run.template.kind, template_bytes, SkeletonFormat::Text) {
            Ok(skeleton) => Some(skeleton),
            Err(e) => {
                debug!("No skeleton for template {}: {}", run.template.id, e);
                None
            }
        };
        let request = EnhancementRequest {
            workspace_id: run.request.workspace_id.clone(),
            session_id: run.job_id.clone(),
            skeleton,
            document_metadata: run.request.document_metadata.clone(),
            instructions: run.request.instructions.clone(),
            refresh: run.request.refresh,
        };

        let (artifact, outcome) = self.cache.obtain(&run.template, &request).await?;
        match outcome {
            CacheOutcome::Hit => self.log(run, "ai-cache:hit").await?,
            CacheOutcome::Refreshed => self.log(run, "ai-cache:refreshed").await?,
        }
        Ok(artifact)
    }

    async fn invalidate_on_contract_violation(&self, run: &Run<'_>, artifact: &CodeArtifact, err: &GenerationError) {
        if !artifact.is_enhanced() || !matches!(err, GenerationError::ContractViolation(_)) {
            return;
        }
        match self.cache.invalidate(&run.template, &run.request.workspace_id).await {
            Ok(_) => {
                if let Err(e) = self.log(run, "ai-cache:invalidated").await {
                    warn!("Failed to record cache invalidation for job {}: {}", run.job_id, e);
                }
            }
            Err(e) => warn!("Failed to invalidate cache entry for job {}: {}", run.job_id, e),
        }
    }

    async fn checkpoint(&self, run: &Run<'_>, at: &'static str) -> Result<(), Halt> {
        if self.jobs.is_cancelled(&run.job_id).await {
            debug!("Job {} observed cancellation {}", run.job_id, at);
            return Err(Halt::Cancelled(at));
        }
        Ok(())
    }

    async fn begin(&self, run: &Run<'_>, (name, progress): (&str, u8)) -> Result<(), GenerationError> {
        self.jobs.step_start(&run.job_id, name).await?;
        run.reporter.step(name, StepStatus::Start, progress);
        Ok(())
    }

    async fn complete(&self, run: &Run<'_>, (name, progress): (&str, u8)) -> Result<(), GenerationError> {
        self.jobs.step_ok(&run.job_id, name).await?;
        run.reporter.step(name, StepStatus::Ok, progress);
        Ok(())
    }

    async fn log(&self, run: &Run<'_>, line: impl Into<String>) -> Result<(), GenerationError> {
        let line = line.into();
        self.jobs.append_log(&run.job_id, line.clone()).await?;
        run.reporter.log(line);
        Ok(())
    }

    /// Moves artifact log lines into the job record
    async fn flush_logs(&self, run: &Run<'_>) {
        for entry in run.log_buffer.drain() {
            if let Err(e) = self.log(run, entry.to_line()).await {
                warn!("Failed to record log line for job {}: {}", run.job_id, e);
            }
        }
    }
}

fn validate_request(request: &GenerationRequest) -> Result<(), GenerationError> {
    for (field, value) in [
        ("customer_id", &request.customer_id),
        ("workspace_id", &request.workspace_id),
        ("template_id", &request.template_id),
    ] {
        if value.trim().is_empty() {
            return Err(GenerationError::Validation(format!("{} is required", field)));
        }
    }
    if request.job_id.as_deref().is_some_and(|id| id.trim().is_empty()) {
        return Err(GenerationError::Validation("job_id must not be blank".to_string()));
    }
    Ok(())
}

/// File name of the generated output
///
/// A caller-supplied name is reduced to its last path component and gets the
/// template's extension if it lacks it.
fn output_name(requested: Option<&str>, template_id: &str, kind: TemplateKind) -> String {
    let extension = kind.extension();
    let requested = requested
        .and_then(|name| Path::new(name.trim()).file_name())
        .map(|name| name.to_string_lossy().to_string())
        .filter(|name| !name.is_empty());

    match requested {
        Some(name) if name.to_ascii_lowercase().ends_with(&format!(".{}", extension)) => name,
        Some(name) => format!("{}.{}", name, extension),
        None => format!("{}-{}.{}", template_id, Utc::now().format("%Y%m%d-%H%M%S"), extension),
    }
}
