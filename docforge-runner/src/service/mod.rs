//! Service layer
//!
//! Services contain business logic for the runner. They own the job
//! collection, publish progress, run artifacts and maintain the enhancement
//! cache, using repositories for storage.
//!
//! Seams that tests replace are trait-based.

mod enhancement;
mod execution;
mod job_manager;
mod log_buffer;
mod progress;

// Re-export traits
pub use execution::ExecutionService;
pub use log_buffer::LogBufferService;

// Re-export implementations
pub use enhancement::{CacheOutcome, EnhancementCache, EnhancementRequest};
pub use execution::SandboxExecutionService;
pub use job_manager::{DEFAULT_CAPACITY, JobManager};
pub use log_buffer::InMemoryLogBuffer;
pub use progress::{EventBus, ProgressReporter};
