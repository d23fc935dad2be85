//! Capability modules shipped with the sandbox
//!
//! `log` is generic over its sink so the runner can buffer lines per job while
//! tests collect them in memory. `builder` holds the per-execution node list.
//! Completion and conversion capabilities live in the runner, next to the
//! services they call.

pub mod builder;
pub mod log;

pub use builder::{BuilderHandle, BuilderModule, BuilderState};
pub use log::{LogModule, LogSink};
