//! `toolkit.log` capability
//!
//! Artifacts write to the job log through a [`LogSink`]. The runner buffers
//! entries and drains them into the job record; tests collect them in memory.

use crate::module::{CapabilityModule, ModuleMetadata};
use docforge_core::domain::log::LogLevel;
use mlua::prelude::*;
use std::sync::{Arc, Mutex};

/// Destination for artifact log lines
pub trait LogSink: Send + Sync {
    fn write(&mut self, level: LogLevel, message: &str);
}

/// Logging capability, generic over its sink
pub struct LogModule<S: LogSink> {
    sink: Arc<Mutex<S>>,
}

impl<S: LogSink> LogModule<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
        }
    }
}

impl<S: LogSink + 'static> CapabilityModule for LogModule<S> {
    fn id(&self) -> &'static str {
        "log"
    }

    fn install(&self, lua: &Lua, target: &LuaTable) -> LuaResult<()> {
        let log_table = lua.create_table()?;

        for (name, level) in [
            ("debug", LogLevel::Debug),
            ("info", LogLevel::Info),
            ("warning", LogLevel::Warning),
            ("error", LogLevel::Error),
        ] {
            let sink = self.sink.clone();
            log_table.set(
                name,
                lua.create_function(move |_, msg: LuaValue| {
                    let text = match msg {
                        LuaValue::String(s) => s.to_string_lossy().to_string(),
                        other => format!("{:?}", other),
                    };
                    sink.lock()
                        .map_err(|e| LuaError::RuntimeError(format!("Failed to lock sink: {}", e)))?
                        .write(level, &text);
                    Ok(())
                })?,
            )?;
        }

        target.set(self.id(), log_table)?;
        Ok(())
    }

    fn stubs(&self) -> String {
        r#"---Job log
---@class ToolkitLog
---@field debug fun(msg: string)
---@field info fun(msg: string)
---@field warning fun(msg: string)
---@field error fun(msg: string)

---@type ToolkitLog
Toolkit.log = {}
"#
        .to_string()
    }

    fn metadata(&self) -> ModuleMetadata {
        ModuleMetadata {
            id: self.id(),
            version: "1.0.0",
            description: "Job log access for transformation artifacts",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestLogSink {
        messages: Arc<Mutex<Vec<(LogLevel, String)>>>,
    }

    impl TestLogSink {
        fn new() -> (Self, Arc<Mutex<Vec<(LogLevel, String)>>>) {
            let messages = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    messages: messages.clone(),
                },
                messages,
            )
        }
    }

    impl LogSink for TestLogSink {
        fn write(&mut self, level: LogLevel, message: &str) {
            self.messages
                .lock()
                .unwrap()
                .push((level, message.to_string()));
        }
    }

    fn toolkit_with_log(lua: &Lua, sink: TestLogSink) {
        let toolkit = lua.create_table().unwrap();
        LogModule::new(sink).install(lua, &toolkit).unwrap();
        lua.globals().set("toolkit", toolkit).unwrap();
    }

    #[test]
    fn test_log_all_levels() {
        let (sink, messages) = TestLogSink::new();
        let lua = Lua::new();
        toolkit_with_log(&lua, sink);

        lua.load(
            r#"
            toolkit.log.debug("debug")
            toolkit.log.info("info")
            toolkit.log.warning("warning")
            toolkit.log.error("error")
        "#,
        )
        .exec()
        .unwrap();

        let logs = messages.lock().unwrap();
        assert_eq!(logs.len(), 4);
        assert_eq!(logs[0], (LogLevel::Debug, "debug".to_string()));
        assert_eq!(logs[1].0, LogLevel::Info);
        assert_eq!(logs[2].0, LogLevel::Warning);
        assert_eq!(logs[3].0, LogLevel::Error);
    }

    #[test]
    fn test_log_non_string_message() {
        let (sink, messages) = TestLogSink::new();
        let lua = Lua::new();
        toolkit_with_log(&lua, sink);

        lua.load(r#"toolkit.log.info(42)"#).exec().unwrap();

        let logs = messages.lock().unwrap();
        assert_eq!(logs.len(), 1);
        assert!(logs[0].1.contains("42"));
    }

    #[test]
    fn test_log_module_stubs() {
        let (sink, _messages) = TestLogSink::new();
        let stubs = LogModule::new(sink).stubs();

        assert!(stubs.contains("Toolkit.log = {}"));
        assert!(stubs.contains("warning fun(msg: string)"));
    }
}
