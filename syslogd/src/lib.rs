//! Syslog receiver.
//!
//! Listens on UDP, TCP and Unix stream sockets, decodes each packet with a
//! heuristic header sniffer (BSD `Mmm dd hh:mm:ss` or RFC 3339 timestamps)
//! and passes the resulting [`Message`] through an ordered [`HandlerChain`].
//!
//! ```ignore
//! use syslogd::{Server, Transport, LogOutput};
//!
//! let mut server = Server::new();
//! server.set_allowed_runes("-_.");
//! server.add_handler(LogOutput);
//! server.listen("0.0.0.0:514", Transport::Datagram).await?;
//! // ...
//! server.shutdown().await;
//! ```

pub mod alias;
pub mod args;
pub mod config;
pub mod decoder;
pub mod error;
pub mod fatal;
pub mod filter;
pub mod handler;
pub mod message;
pub mod output;
pub mod server;

pub use alias::HostnameAliases;
pub use args::Args;
pub use config::{DaemonConfig, ListenerConfig, OutputKind, ServerConfig, Transport};
pub use decoder::{Decoder, TagRunes, decode};
pub use error::{Result, ServerError};
pub use fatal::{ChannelSink, ExitSink, FatalSink, LogSink};
pub use filter::{FilterConfig, MessageFilter, PatternFilter, PatternType};
pub use handler::{Handler, HandlerChain};
pub use message::{DEFAULT_PRIORITY, Facility, Message, MessageSource, Severity};
pub use output::{JsonOutput, LogOutput};
pub use server::Server;
