//! Core domain types
//!
//! Shared between the merge engine, the Lua layer and the runner. Persistence
//! lives in the runner, execution in the Lua layer, byte surgery in the merge
//! engine.

pub mod artifact;
pub mod job;
pub mod log;
pub mod result;
pub mod template;
