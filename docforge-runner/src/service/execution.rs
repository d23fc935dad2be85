//! Execution service
//!
//! Runs one code artifact in a fresh sandbox:
//! - checks the entry-point contract on the source text
//! - loads the chunk and resolves the global `generate`
//! - builds the toolkit and builder tables for this execution only
//! - calls `generate(toolkit, builder, context)` under the wall-clock budget
//! - converts the returned value into a generation result
//!
//! The budget is enforced twice. `tokio::time::timeout` covers artifacts that
//! yield inside completion calls; an instruction hook aborts CPU-bound loops
//! that never yield.

use async_trait::async_trait;
use docforge_core::GenerationError;
use docforge_core::domain::artifact::CodeArtifact;
use docforge_core::domain::result::GenerationResult;
use docforge_lua::{BuilderHandle, ENTRY_POINT, SandboxLimits, check_entry_point, convert_result, create_sandbox};
use mlua::prelude::*;
use mlua::{HookTriggers, LuaSerdeExt, VmState};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::DEFAULT_EXECUTION_TIMEOUT;
use crate::context::{ArtifactContext, CapabilityBinding};
use crate::lua::{builder_registry, toolkit_registry};

/// Instructions between two deadline checks
const HOOK_INTERVAL: u32 = 10_000;

const DEADLINE_MESSAGE: &str = "execution deadline exceeded";

/// Service trait for running transformation artifacts
#[async_trait]
pub trait ExecutionService: Send + Sync {
    /// Executes `artifact` with the capabilities in `binding`
    ///
    /// Fails with `ContractViolation`, `TimeoutError`, `RuntimeError` or
    /// `ResultShapeError`.
    async fn execute(
        &self,
        artifact: &CodeArtifact,
        binding: CapabilityBinding,
        context: &ArtifactContext,
    ) -> Result<GenerationResult, GenerationError>;
}

/// Sandboxed Lua implementation of ExecutionService
pub struct SandboxExecutionService {
    limits: SandboxLimits,
    timeout: Duration,
}

impl SandboxExecutionService {
    pub fn new(limits: SandboxLimits, timeout: Duration) -> Self {
        Self { limits, timeout }
    }

    fn prepare(&self, artifact: &CodeArtifact, deadline: Instant) -> Result<(Lua, LuaFunction), GenerationError> {
        let lua = create_sandbox(self.limits)
            .map_err(|e| GenerationError::Runtime(format!("failed to create sandbox: {}", e)))?;

        let _ = lua.set_hook(
            HookTriggers::new().every_nth_instruction(HOOK_INTERVAL),
            move |_, _| {
                if Instant::now() >= deadline {
                    Err(LuaError::RuntimeError(DEADLINE_MESSAGE.to_string()))
                } else {
                    Ok(VmState::Continue)
                }
            },
        );

        lua.load(artifact.source.as_str())
            .set_name("artifact")
            .exec()
            .map_err(|e| self.classify(e, deadline))?;

        let entry = lua
            .globals()
            .get::<Option<LuaFunction>>(ENTRY_POINT)
            .map_err(|e| GenerationError::Runtime(e.to_string()))?
            .ok_or_else(|| {
                GenerationError::ContractViolation(format!("`{}` is not a function after loading", ENTRY_POINT))
            })?;

        Ok((lua, entry))
    }

    fn classify(&self, error: LuaError, deadline: Instant) -> GenerationError {
        if Instant::now() >= deadline || error.to_string().contains(DEADLINE_MESSAGE) {
            GenerationError::Timeout(self.timeout)
        } else {
            GenerationError::Runtime(error.to_string())
        }
    }
}

impl Default for SandboxExecutionService {
    fn default() -> Self {
        Self::new(SandboxLimits::default(), DEFAULT_EXECUTION_TIMEOUT)
    }
}

#[async_trait]
impl ExecutionService for SandboxExecutionService {
    async fn execute(
        &self,
        artifact: &CodeArtifact,
        binding: CapabilityBinding,
        context: &ArtifactContext,
    ) -> Result<GenerationResult, GenerationError> {
        check_entry_point(&artifact.source)?;

        info!(
            "Executing {} artifact for job {}",
            if artifact.is_enhanced() { "enhanced" } else { "base" },
            context.job_id
        );

        let deadline = Instant::now() + self.timeout;
        let (lua, entry) = self.prepare(artifact, deadline)?;

        let handle = BuilderHandle::new();
        let toolkit = toolkit_registry(&binding)
            .build_table(&lua)
            .map_err(|e| GenerationError::Runtime(format!("failed to build toolkit: {}", e)))?;
        let builder = builder_registry(handle.clone())
            .build_table(&lua)
            .map_err(|e| GenerationError::Runtime(format!("failed to build builder: {}", e)))?;
        let context_value = lua
            .to_value(context)
            .map_err(|e| GenerationError::Runtime(format!("failed to convert context: {}", e)))?;

        let call = entry.call_async::<LuaValue>((toolkit, builder, context_value));
        let value = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                let error = self.classify(e, deadline);
                warn!("Artifact for job {} failed: {}", context.job_id, error);
                return Err(error);
            }
            Err(_) => {
                warn!("Artifact for job {} timed out after {:?}", context.job_id, self.timeout);
                return Err(GenerationError::Timeout(self.timeout));
            }
        };

        let result = convert_result(&lua, value, &handle)?;
        debug!("Artifact for job {} returned a {} result", context.job_id, result.shape_name());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TemplateSnapshot;
    use crate::service::{InMemoryLogBuffer, LogBufferService};
    use async_trait::async_trait;
    use chrono::Utc;
    use docforge_client::{ClientError, CompletionService};
    use docforge_core::domain::result::BlockNode;
    use docforge_core::domain::template::TemplateKind;
    use docforge_core::dto::completion::{CompletionRequest, CompletionResponse};
    use std::sync::Arc;

    struct SlowCompletion(Duration);

    #[async_trait]
    impl CompletionService for SlowCompletion {
        async fn complete(&self, _request: &CompletionRequest) -> Result<CompletionResponse, ClientError> {
            tokio::time::sleep(self.0).await;
            Ok(CompletionResponse {
                text: "late".to_string(),
            })
        }
    }

    fn binding(completion: Arc<dyn CompletionService>, log_buffer: Arc<InMemoryLogBuffer>) -> CapabilityBinding {
        CapabilityBinding {
            session_id: "job-1".to_string(),
            completion,
            template: TemplateSnapshot::new(TemplateKind::Document, Vec::new()),
            log_buffer,
        }
    }

    fn context(instructions: Option<&str>) -> ArtifactContext {
        ArtifactContext {
            customer_id: "acme".to_string(),
            workspace_id: "ws-1".to_string(),
            template_id: "quarterly".to_string(),
            job_id: "job-1".to_string(),
            now: Utc::now(),
            instructions: instructions.map(str::to_string),
        }
    }

    async fn run(source: &str, timeout: Duration) -> Result<GenerationResult, GenerationError> {
        let service = SandboxExecutionService::new(SandboxLimits::default(), timeout);
        service
            .execute(
                &CodeArtifact::base(source),
                binding(Arc::new(SlowCompletion(Duration::ZERO)), Arc::new(InMemoryLogBuffer::new())),
                &context(None),
            )
            .await
    }

    #[tokio::test]
    async fn test_string_result_is_document_markup() {
        let result = run(
            r#"function generate(toolkit, builder, context)
                return "<w:p><w:r><w:t>" .. context.customer_id .. "</w:t></w:r></w:p>"
            end"#,
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert_eq!(
            result,
            GenerationResult::document("<w:p><w:r><w:t>acme</w:t></w:r></w:p>")
        );
    }

    #[tokio::test]
    async fn test_builder_result() {
        let result = run(
            r#"function generate(toolkit, builder, context)
                builder.addHeading("Title", 1)
                builder.addParagraph("Body")
                return builder.save()
            end"#,
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        let GenerationResult::BuilderDocument { nodes } = result else {
            panic!("expected a builder document");
        };
        assert_eq!(nodes.len(), 2);
        assert!(matches!(nodes[0], BlockNode::Heading { level: 1, .. }));
        assert!(matches!(nodes[1], BlockNode::Paragraph { .. }));
    }

    #[tokio::test]
    async fn test_context_and_log_reach_artifact() {
        let buffer = Arc::new(InMemoryLogBuffer::new());
        let service = SandboxExecutionService::new(SandboxLimits::default(), Duration::from_secs(5));
        service
            .execute(
                &CodeArtifact::base(
                    r#"function generate(toolkit, builder, context)
                        toolkit.log.info("instructions: " .. (context.instructions or "none"))
                        return { markup = "<w:p/>" }
                    end"#,
                ),
                binding(Arc::new(SlowCompletion(Duration::ZERO)), buffer.clone()),
                &context(Some("bullet points")),
            )
            .await
            .unwrap();

        let lines: Vec<String> = buffer.drain().iter().map(|e| e.to_line()).collect();
        assert_eq!(lines, vec!["[info] instructions: bullet points".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_entry_point_is_contract_violation() {
        let err = run("function main(a, b, c) return '' end", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "ContractViolation");
    }

    #[tokio::test]
    async fn test_cpu_bound_loop_times_out() {
        let err = run(
            "function generate(toolkit, builder, context) while true do end end",
            Duration::from_millis(300),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "TimeoutError");
    }

    #[tokio::test]
    async fn test_slow_completion_times_out() {
        let service = SandboxExecutionService::new(SandboxLimits::default(), Duration::from_millis(200));
        let err = service
            .execute(
                &CodeArtifact::base(
                    r#"function generate(toolkit, builder, context)
                        return toolkit.text("take your time")
                    end"#,
                ),
                binding(Arc::new(SlowCompletion(Duration::from_secs(5))), Arc::new(InMemoryLogBuffer::new())),
                &context(None),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "TimeoutError");
    }

    #[tokio::test]
    async fn test_raised_error_is_runtime_error() {
        let err = run(
            r#"function generate(toolkit, builder, context) error("boom") end"#,
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "RuntimeError");
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_unrecognized_value_is_result_shape_error() {
        let err = run(
            "function generate(toolkit, builder, context) return 42 end",
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "ResultShapeError");
    }

    #[tokio::test]
    async fn test_sandbox_has_no_io() {
        let err = run(
            r#"function generate(toolkit, builder, context) return io.open("/etc/passwd"):read("a") end"#,
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "RuntimeError");
    }
}
