//! Docforge Lua infrastructure
//!
//! Shared pieces for running transformation artifacts:
//! - restricted sandbox creation
//! - capability module trait and registry
//! - the builder and log capabilities
//! - the entry-point contract check
//! - conversion of returned values into generation results
//! - LuaLS stub generation

pub mod contract;
pub mod module;
pub mod modules;
pub mod result;
pub mod sandbox;
pub mod stubs;

pub use contract::{ENTRY_POINT, check_entry_point};
pub use module::{CapabilityModule, ModuleMetadata, ModuleRegistry};
pub use modules::{BuilderHandle, BuilderModule, LogModule, LogSink};
pub use result::convert_result;
pub use sandbox::{SandboxLimits, create_sandbox};
pub use stubs::render_stubs;
