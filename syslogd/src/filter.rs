//! Message filtering handler.
//!
//! Drops messages by severity, facility, tag, hostname and message content
//! using glob or regex patterns. Dropped messages stop the handler chain.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::ServerError;
use crate::handler::Handler;
use crate::message::Message;

/// Pattern type for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PatternType {
    /// Glob pattern (e.g., "systemd-*").
    #[default]
    Glob,
    /// Regular expression.
    Regex,
}

/// A filter pattern with its type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternFilter {
    /// The pattern string.
    pub pattern: String,
    /// Pattern type (glob or regex).
    #[serde(default)]
    pub pattern_type: PatternType,
}

impl PatternFilter {
    pub fn glob(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            pattern_type: PatternType::Glob,
        }
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            pattern_type: PatternType::Regex,
        }
    }
}

/// Filter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Minimum severity level (0=emergency, 7=debug).
    /// Messages with higher severity numbers (less severe) are filtered out.
    #[serde(default)]
    pub min_severity: Option<u8>,

    /// Only include messages from these facilities.
    /// If empty, all facilities are allowed.
    #[serde(default)]
    pub include_facilities: Vec<String>,

    /// Exclude messages from these facilities.
    #[serde(default)]
    pub exclude_facilities: Vec<String>,

    /// Include messages whose strict tag matches these patterns.
    #[serde(default)]
    pub include_tag_patterns: Vec<PatternFilter>,

    /// Exclude messages whose strict tag matches these patterns.
    #[serde(default)]
    pub exclude_tag_patterns: Vec<PatternFilter>,

    /// Include messages matching these hostname patterns.
    #[serde(default)]
    pub include_hostname_patterns: Vec<PatternFilter>,

    /// Exclude messages matching these hostname patterns.
    #[serde(default)]
    pub exclude_hostname_patterns: Vec<PatternFilter>,

    /// Include messages whose loose content matches these patterns.
    #[serde(default)]
    pub include_message_patterns: Vec<PatternFilter>,

    /// Exclude messages whose loose content matches these patterns.
    #[serde(default)]
    pub exclude_message_patterns: Vec<PatternFilter>,
}

impl FilterConfig {
    /// Check if this filter is empty (passes all messages).
    pub fn is_empty(&self) -> bool {
        self.min_severity.is_none()
            && self.include_facilities.is_empty()
            && self.exclude_facilities.is_empty()
            && self.include_tag_patterns.is_empty()
            && self.exclude_tag_patterns.is_empty()
            && self.include_hostname_patterns.is_empty()
            && self.exclude_hostname_patterns.is_empty()
            && self.include_message_patterns.is_empty()
            && self.exclude_message_patterns.is_empty()
    }
}

/// Glob patterns are compiled to anchored regexes.
#[derive(Debug)]
struct CompiledPattern(Regex);

impl CompiledPattern {
    fn compile(filter: &PatternFilter) -> Result<Self, ServerError> {
        let source = match filter.pattern_type {
            PatternType::Glob => glob_to_regex(&filter.pattern),
            PatternType::Regex => filter.pattern.clone(),
        };

        Regex::new(&source)
            .map(Self)
            .map_err(|source| ServerError::Pattern {
                pattern: filter.pattern.clone(),
                source,
            })
    }

    fn is_match(&self, input: &str) -> bool {
        self.0.is_match(input)
    }
}

/// Convert a glob pattern to a regex pattern.
fn glob_to_regex(glob: &str) -> String {
    let mut regex = String::with_capacity(glob.len() * 2 + 2);
    regex.push('^');

    for c in glob.chars() {
        match c {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            '.' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '|' | '\\' => {
                regex.push('\\');
                regex.push(c);
            }
            _ => regex.push(c),
        }
    }

    regex.push('$');
    regex
}

/// Check if a value passes include/exclude pattern filters.
fn check_patterns(value: &str, include: &[CompiledPattern], exclude: &[CompiledPattern]) -> bool {
    if exclude.iter().any(|p| p.is_match(value)) {
        return false;
    }

    include.is_empty() || include.iter().any(|p| p.is_match(value))
}

/// Filter statistics.
#[derive(Debug, Default)]
pub struct FilterStats {
    /// Messages that passed filters.
    pub messages_passed: AtomicU64,
    /// Messages filtered out.
    pub messages_filtered: AtomicU64,
}

impl FilterStats {
    pub fn passed(&self) -> u64 {
        self.messages_passed.load(Ordering::Relaxed)
    }

    pub fn filtered(&self) -> u64 {
        self.messages_filtered.load(Ordering::Relaxed)
    }
}

/// Compiled filter, usable as a chain handler.
pub struct MessageFilter {
    min_severity: Option<u8>,
    include_facilities: Vec<String>,
    exclude_facilities: Vec<String>,
    include_tag_patterns: Vec<CompiledPattern>,
    exclude_tag_patterns: Vec<CompiledPattern>,
    include_hostname_patterns: Vec<CompiledPattern>,
    exclude_hostname_patterns: Vec<CompiledPattern>,
    include_message_patterns: Vec<CompiledPattern>,
    exclude_message_patterns: Vec<CompiledPattern>,
    stats: FilterStats,
}

impl std::fmt::Debug for MessageFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageFilter")
            .field("min_severity", &self.min_severity)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl MessageFilter {
    /// Compile a filter configuration.
    pub fn compile(config: &FilterConfig) -> Result<Self, ServerError> {
        let compile_patterns = |patterns: &[PatternFilter]| -> Result<Vec<_>, ServerError> {
            patterns.iter().map(CompiledPattern::compile).collect()
        };
        let lowercase =
            |names: &[String]| -> Vec<String> { names.iter().map(|s| s.to_lowercase()).collect() };

        Ok(Self {
            min_severity: config.min_severity,
            include_facilities: lowercase(&config.include_facilities),
            exclude_facilities: lowercase(&config.exclude_facilities),
            include_tag_patterns: compile_patterns(&config.include_tag_patterns)?,
            exclude_tag_patterns: compile_patterns(&config.exclude_tag_patterns)?,
            include_hostname_patterns: compile_patterns(&config.include_hostname_patterns)?,
            exclude_hostname_patterns: compile_patterns(&config.exclude_hostname_patterns)?,
            include_message_patterns: compile_patterns(&config.include_message_patterns)?,
            exclude_message_patterns: compile_patterns(&config.exclude_message_patterns)?,
            stats: FilterStats::default(),
        })
    }

    /// Check if a message passes the filter.
    pub fn matches(&self, msg: &Message) -> bool {
        // Lower severity number = more severe (0=emergency, 7=debug)
        if let Some(min) = self.min_severity {
            if msg.severity as u8 > min {
                return false;
            }
        }

        let facility = msg.facility_name();
        if !self.include_facilities.is_empty()
            && !self.include_facilities.iter().any(|f| f == facility)
        {
            return false;
        }
        if self.exclude_facilities.iter().any(|f| f == facility) {
            return false;
        }

        check_patterns(
            &msg.tag,
            &self.include_tag_patterns,
            &self.exclude_tag_patterns,
        ) && check_patterns(
            msg.hostname.as_deref().unwrap_or_default(),
            &self.include_hostname_patterns,
            &self.exclude_hostname_patterns,
        ) && check_patterns(
            &msg.content1,
            &self.include_message_patterns,
            &self.exclude_message_patterns,
        )
    }

    pub fn stats(&self) -> &FilterStats {
        &self.stats
    }
}

impl Handler for MessageFilter {
    fn handle(&self, message: Option<Message>) -> Option<Message> {
        let Some(msg) = message else {
            tracing::debug!(
                passed = self.stats.passed(),
                filtered = self.stats.filtered(),
                "Filter shutting down"
            );
            return None;
        };

        if self.matches(&msg) {
            self.stats.messages_passed.fetch_add(1, Ordering::Relaxed);
            Some(msg)
        } else {
            self.stats.messages_filtered.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(tag = %msg.tag, severity = msg.severity.as_str(), "Message filtered");
            None
        }
    }
}
