//! In-memory representation of a decoded syslog message.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Serialize, Serializer};
use std::net::SocketAddr;

/// Priority assumed when a packet carries no `<PRI>` prefix (user.notice).
pub const DEFAULT_PRIORITY: u16 = 13;

/// Syslog facility codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Facility {
    Kern = 0,
    User = 1,
    Mail = 2,
    Daemon = 3,
    Auth = 4,
    Syslog = 5,
    Lpr = 6,
    News = 7,
    Uucp = 8,
    Cron = 9,
    Authpriv = 10,
    Ftp = 11,
    Ntp = 12,
    Audit = 13,
    Alert = 14,
    Clock = 15,
    Local0 = 16,
    Local1 = 17,
    Local2 = 18,
    Local3 = 19,
    Local4 = 20,
    Local5 = 21,
    Local6 = 22,
    Local7 = 23,
}

impl Facility {
    /// Parse facility from numeric code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Kern),
            1 => Some(Self::User),
            2 => Some(Self::Mail),
            3 => Some(Self::Daemon),
            4 => Some(Self::Auth),
            5 => Some(Self::Syslog),
            6 => Some(Self::Lpr),
            7 => Some(Self::News),
            8 => Some(Self::Uucp),
            9 => Some(Self::Cron),
            10 => Some(Self::Authpriv),
            11 => Some(Self::Ftp),
            12 => Some(Self::Ntp),
            13 => Some(Self::Audit),
            14 => Some(Self::Alert),
            15 => Some(Self::Clock),
            16 => Some(Self::Local0),
            17 => Some(Self::Local1),
            18 => Some(Self::Local2),
            19 => Some(Self::Local3),
            20 => Some(Self::Local4),
            21 => Some(Self::Local5),
            22 => Some(Self::Local6),
            23 => Some(Self::Local7),
            _ => None,
        }
    }

    /// Get the string name of the facility.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kern => "kern",
            Self::User => "user",
            Self::Mail => "mail",
            Self::Daemon => "daemon",
            Self::Auth => "auth",
            Self::Syslog => "syslog",
            Self::Lpr => "lpr",
            Self::News => "news",
            Self::Uucp => "uucp",
            Self::Cron => "cron",
            Self::Authpriv => "authpriv",
            Self::Ftp => "ftp",
            Self::Ntp => "ntp",
            Self::Audit => "audit",
            Self::Alert => "alert",
            Self::Clock => "clock",
            Self::Local0 => "local0",
            Self::Local1 => "local1",
            Self::Local2 => "local2",
            Self::Local3 => "local3",
            Self::Local4 => "local4",
            Self::Local5 => "local5",
            Self::Local6 => "local6",
            Self::Local7 => "local7",
        }
    }
}

/// Syslog severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Severity {
    Emergency = 0,
    Alert = 1,
    Critical = 2,
    Error = 3,
    Warning = 4,
    Notice = 5,
    Informational = 6,
    Debug = 7,
}

impl Severity {
    /// Parse severity from numeric code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Emergency),
            1 => Some(Self::Alert),
            2 => Some(Self::Critical),
            3 => Some(Self::Error),
            4 => Some(Self::Warning),
            5 => Some(Self::Notice),
            6 => Some(Self::Informational),
            7 => Some(Self::Debug),
            _ => None,
        }
    }

    /// Severity encoded in the low three bits of a priority value.
    pub fn from_priority(priority: u16) -> Self {
        match priority & 0x07 {
            0 => Self::Emergency,
            1 => Self::Alert,
            2 => Self::Critical,
            3 => Self::Error,
            4 => Self::Warning,
            5 => Self::Notice,
            6 => Self::Informational,
            _ => Self::Debug,
        }
    }

    /// Get the string name of the severity.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Emergency => "emerg",
            Self::Alert => "alert",
            Self::Critical => "crit",
            Self::Error => "err",
            Self::Warning => "warning",
            Self::Notice => "notice",
            Self::Informational => "info",
            Self::Debug => "debug",
        }
    }
}

impl Serialize for Severity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Source of a received message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSource {
    /// Network source (UDP or TCP).
    Network(SocketAddr),
    /// Unix socket source.
    Unix,
}

impl std::fmt::Display for MessageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageSource::Network(addr) => write!(f, "{}", addr),
            MessageSource::Unix => write!(f, "unix"),
        }
    }
}

impl Serialize for MessageSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A decoded syslog message.
///
/// `tag`/`content` and `tag1`/`content1` are two independent readings of
/// the same body: the first splits on the first rune that cannot be part
/// of a program tag, the second on the first whitespace.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    /// Sender of the packet or connection.
    pub source: MessageSource,
    /// Arrival time at the server.
    pub time: DateTime<Utc>,
    /// Severity (low three bits of the priority).
    pub severity: Severity,
    /// Facility code (priority shifted right by three).
    pub facility: u8,
    /// Timestamp from the packet header, if one was recognized.
    pub timestamp: Option<DateTime<FixedOffset>>,
    /// Reporting host from the packet header.
    pub hostname: Option<String>,
    /// Leading run of tag characters, empty if the body has no delimiter.
    pub tag: String,
    /// Body starting at the first non-tag character.
    pub content: String,
    /// First whitespace-delimited word of the trimmed body.
    pub tag1: String,
    /// Remainder after `tag1`, leading whitespace removed.
    pub content1: String,
}

impl Message {
    /// Named facility, if the code is one of the 24 standard facilities.
    pub fn facility_kind(&self) -> Option<Facility> {
        Facility::from_code(self.facility)
    }

    /// Facility name, or `"unknown"` for non-standard codes.
    pub fn facility_name(&self) -> &'static str {
        self.facility_kind().map(|f| f.as_str()).unwrap_or("unknown")
    }

    /// Priority value reconstructed from facility and severity.
    pub fn priority(&self) -> u16 {
        (u16::from(self.facility) << 3) | self.severity as u16
    }
}
