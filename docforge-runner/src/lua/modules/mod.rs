//! Capability modules that live in the runner
//!
//! The toolkit needs the completion service and the template bytes, which only
//! the runner has. `log` and `builder` come from `docforge-lua`.

pub mod toolkit;

pub use toolkit::{ToolkitModule, extract_json};
