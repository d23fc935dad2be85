//! Docforge Runner
//!
//! Turns generation requests into finished documents.
//!
//! Architecture:
//! - Configuration: settings from the environment or defaults
//! - Repositories: the durable job record and the template store
//! - Services: job manager, progress events, enhancement cache, sandboxed execution
//! - Scheduler: the generation pipeline and its bounded-parallelism front
//!
//! Each request runs the template's transformation artifact in a fresh Lua
//! sandbox and merges the returned value into a copy of the template.

pub mod config;
pub mod context;
pub mod lua;
pub mod repository;
pub mod scheduler;
pub mod service;

pub use config::Config;
pub use scheduler::{GenerationPipeline, GenerationScheduler};
