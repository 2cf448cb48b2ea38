//! Sinks for errors a running listener cannot recover from.
//!
//! Receive loops never return errors to a caller; unexpected transport
//! failures are handed to a [`FatalSink`] instead. The default sink halts the
//! process, the others let the owner decide.

use chrono::Local;
use tokio::sync::mpsc;

use crate::error::ServerError;

/// Receiver of fatal listener errors. Shared by all receive tasks.
pub trait FatalSink: Send + Sync {
    fn report(&self, error: ServerError);
}

/// Writes a timestamped line to stderr and exits with status 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExitSink;

impl FatalSink for ExitSink {
    fn report(&self, error: ServerError) {
        tracing::error!(error = %error, "Fatal listener error");
        eprintln!("{} {}", Local::now().format("%Y/%m/%d %H:%M:%S"), error);
        std::process::exit(1);
    }
}

/// Logs the error and keeps the process running.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl FatalSink for LogSink {
    fn report(&self, error: ServerError) {
        tracing::error!(error = %error, "Listener error");
    }
}

/// Forwards errors to a channel so the owner can act on them.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ServerError>,
}

impl ChannelSink {
    /// Create a sink and the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerError>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl FatalSink for ChannelSink {
    fn report(&self, error: ServerError) {
        if let Err(mpsc::error::SendError(error)) = self.tx.send(error) {
            tracing::error!(error = %error, "Listener error after sink receiver was dropped");
        }
    }
}
