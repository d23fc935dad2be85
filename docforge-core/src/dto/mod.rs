//! Data Transfer Objects
//!
//! Lightweight types that cross a boundary: requests coming from the CLI,
//! progress events pushed to observers, and the completion service wire format.

pub mod completion;
pub mod event;
pub mod job;
