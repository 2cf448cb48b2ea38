//! Hostname resolution handler.

use std::collections::HashMap;

use crate::handler::Handler;
use crate::message::{Message, MessageSource};

/// Rewrites `hostname` from a table of aliases.
///
/// Network peers are looked up by source IP first, then by the hostname the
/// packet reported; the IP is used when the packet carried no hostname.
/// Unix peers are looked up by reported hostname, defaulting to `localhost`.
#[derive(Debug, Clone, Default)]
pub struct HostnameAliases {
    aliases: HashMap<String, String>,
}

impl HostnameAliases {
    pub fn new(aliases: HashMap<String, String>) -> Self {
        Self { aliases }
    }

    /// Resolve the hostname a message should carry.
    pub fn resolve(&self, msg: &Message) -> String {
        match msg.source {
            MessageSource::Network(addr) => {
                let ip = addr.ip().to_string();
                if let Some(alias) = self.aliases.get(&ip) {
                    return alias.clone();
                }

                match &msg.hostname {
                    Some(hostname) => self.lookup(hostname),
                    None => ip,
                }
            }
            MessageSource::Unix => {
                let hostname = msg.hostname.as_deref().unwrap_or("localhost");
                self.lookup(hostname)
            }
        }
    }

    fn lookup(&self, hostname: &str) -> String {
        self.aliases
            .get(hostname)
            .cloned()
            .unwrap_or_else(|| hostname.to_string())
    }
}

impl Handler for HostnameAliases {
    fn handle(&self, message: Option<Message>) -> Option<Message> {
        let mut msg = message?;
        msg.hostname = Some(self.resolve(&msg));
        Some(msg)
    }
}
