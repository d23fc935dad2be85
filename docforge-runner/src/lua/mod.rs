//! Lua execution infrastructure for the docforge runner
//!
//! This module provides:
//! - The toolkit capability module
//! - The log sink bridging `toolkit.log` to the job's log buffer
//! - Assembly of the toolkit and builder registries for one execution

pub mod modules;
pub mod sinks;

use docforge_client::DisabledCompletionService;
use docforge_core::domain::template::TemplateKind;
use docforge_lua::{BuilderHandle, BuilderModule, LogModule, ModuleRegistry};
use std::sync::Arc;

use crate::context::{CapabilityBinding, TemplateSnapshot};
use crate::lua::modules::ToolkitModule;
use crate::lua::sinks::BufferedLogSink;
use crate::service::InMemoryLogBuffer;

/// Registry behind the `toolkit` argument
pub fn toolkit_registry(binding: &CapabilityBinding) -> ModuleRegistry {
    let mut registry = ModuleRegistry::new("Toolkit");
    registry.register(ToolkitModule::new(binding));
    registry.register(LogModule::new(BufferedLogSink::new(binding.log_buffer.clone())));
    registry
}

/// Registry behind the `builder` argument
pub fn builder_registry(handle: BuilderHandle) -> ModuleRegistry {
    let mut registry = ModuleRegistry::new("Builder");
    registry.register(BuilderModule::new(handle));
    registry
}

/// Registries bound to inert services, for stub generation
pub fn stub_registries() -> (ModuleRegistry, ModuleRegistry) {
    let binding = CapabilityBinding {
        session_id: String::new(),
        completion: Arc::new(DisabledCompletionService),
        template: TemplateSnapshot::new(TemplateKind::Document, Vec::new()),
        log_buffer: Arc::new(InMemoryLogBuffer::new()),
    };
    (toolkit_registry(&binding), builder_registry(BuilderHandle::new()))
}

/// LuaLS stubs for artifact authors
pub fn render_stubs() -> String {
    let (toolkit, builder) = stub_registries();
    docforge_lua::render_stubs(&toolkit, &builder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stubs_cover_toolkit_log_and_builder() {
        let stubs = render_stubs();
        assert!(stubs.contains("function Toolkit.getSkeleton(format) end"));
        assert!(stubs.contains("Toolkit.log = {}"));
        assert!(stubs.contains("function Builder.addHeading(text, level, style) end"));
        assert!(stubs.contains("function generate(toolkit, builder, context) end"));
    }
}
