//! LogSink implementation for the runner
//!
//! Connects `toolkit.log` to the job's log buffer. The pipeline drains the
//! buffer into the job record at its checkpoints.

use docforge_core::domain::log::{LogEntry, LogLevel};
use docforge_lua::LogSink;
use std::sync::Arc;

use crate::service::LogBufferService;

/// Buffered log sink that writes to a LogBufferService
pub struct BufferedLogSink {
    buffer: Arc<dyn LogBufferService>,
}

impl BufferedLogSink {
    pub fn new(buffer: Arc<dyn LogBufferService>) -> Self {
        Self { buffer }
    }
}

impl LogSink for BufferedLogSink {
    fn write(&mut self, level: LogLevel, message: &str) {
        self.buffer.add_entry(LogEntry::new(level, message));
    }
}
