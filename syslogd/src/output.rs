//! Output handlers that write accepted messages out.

use std::io::Write;
use std::sync::{Mutex, MutexGuard};

use tracing::Level;

use crate::handler::Handler;
use crate::message::{Message, Severity};

/// Emits each message as a `tracing` event under the `syslog` target.
///
/// Emergency through error map to `ERROR`, warning to `WARN`, notice and
/// informational to `INFO`, debug to `DEBUG`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogOutput;

macro_rules! emit_message {
    ($level:expr, $msg:ident) => {
        tracing::event!(
            target: "syslog",
            $level,
            source = %$msg.source,
            hostname = $msg.hostname.as_deref().unwrap_or("-"),
            facility = $msg.facility_name(),
            severity = $msg.severity.as_str(),
            tag = %$msg.tag1,
            "{}",
            $msg.content1
        )
    };
}

impl Handler for LogOutput {
    fn handle(&self, message: Option<Message>) -> Option<Message> {
        let msg = message?;
        match msg.severity {
            Severity::Emergency | Severity::Alert | Severity::Critical | Severity::Error => {
                emit_message!(Level::ERROR, msg)
            }
            Severity::Warning => emit_message!(Level::WARN, msg),
            Severity::Notice | Severity::Informational => emit_message!(Level::INFO, msg),
            Severity::Debug => emit_message!(Level::DEBUG, msg),
        }
        Some(msg)
    }
}

/// Writes each message as one JSON line.
///
/// The writer is flushed when the termination signal arrives.
pub struct JsonOutput {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for JsonOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonOutput").finish_non_exhaustive()
    }
}

impl JsonOutput {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
        }
    }

    /// JSON lines on standard output.
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }

    fn writer(&self) -> MutexGuard<'_, Box<dyn Write + Send>> {
        self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_line(&self, msg: &Message) -> std::io::Result<()> {
        let mut line = serde_json::to_vec(msg)?;
        line.push(b'\n');
        self.writer().write_all(&line)
    }
}

impl Handler for JsonOutput {
    fn handle(&self, message: Option<Message>) -> Option<Message> {
        let Some(msg) = message else {
            if let Err(e) = self.writer().flush() {
                tracing::warn!(error = %e, "Failed to flush JSON output");
            }
            return None;
        };

        if let Err(e) = self.write_line(&msg) {
            tracing::warn!(error = %e, "Failed to write JSON message");
        }
        Some(msg)
    }
}
