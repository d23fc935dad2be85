//! Repository layer
//!
//! Repositories abstract storage: the durable job collection and the
//! template lookup. They hold no business logic.
//!
//! All repositories are trait-based to enable testing and mocking.

mod jobs;
mod templates;

// Re-export traits
pub use jobs::JobRepository;
pub use templates::TemplateStore;

// Re-export implementations
pub use jobs::{InMemoryJobRepository, JsonFileJobRepository};
pub use templates::{ARTIFACT_FILE, CACHE_DIR, DirectoryTemplateStore};

pub(crate) use jobs::write_atomic;
