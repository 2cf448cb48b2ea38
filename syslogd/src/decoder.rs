//! Heuristic syslog packet decoder.
//!
//! Packets are sniffed rather than validated: an optional `<PRI>` prefix is
//! stripped, then the header dialect is guessed from fixed byte offsets.
//!
//! ```text
//! <PRI>2006-01-02T15:04:05-07:00 HOSTNAME BODY      (RFC 5424 style stamp, 25 bytes)
//! <PRI>Jan _2 15:04:05 HOSTNAME BODY                (RFC 3164 style stamp, 15 bytes)
//! ```
//!
//! Anything else is treated as a bare body. Decoding never fails; missing
//! pieces are left empty.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, TimeDelta, Utc};
use std::collections::HashSet;

use crate::message::{DEFAULT_PRIORITY, Message, MessageSource, Severity};

/// Length of an RFC 3339 timestamp with a numeric UTC offset.
const RFC5424_TIMESTAMP_LEN: usize = 25;

/// Length of a BSD `Mmm dd hh:mm:ss` timestamp.
const RFC3164_TIMESTAMP_LEN: usize = 15;

/// Year used to validate BSD stamps before the real year is chosen.
const LEAP_YEAR: i32 = 2000;

/// Maximum number of digits inside `<...>`.
const MAX_PRIORITY_DIGITS: usize = 3;

/// Extra runes, beyond letters and digits, allowed in a program tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagRunes(HashSet<char>);

impl TagRunes {
    /// Build the set from every rune in `allowed`.
    pub fn new(allowed: &str) -> Self {
        Self(allowed.chars().collect())
    }

    /// Whether `c` was explicitly allowed.
    pub fn contains(&self, c: char) -> bool {
        self.0.contains(&c)
    }

    /// Whether `c` may appear in a program tag.
    pub fn is_tag_char(&self, c: char) -> bool {
        c.is_alphabetic() || c.is_numeric() || self.contains(c)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Packet decoder carrying the tag rune configuration.
#[derive(Debug, Clone, Default)]
pub struct Decoder {
    tag_runes: TagRunes,
}

impl Decoder {
    /// Create a decoder with the given allowed tag runes.
    pub fn new(tag_runes: TagRunes) -> Self {
        Self { tag_runes }
    }

    /// Replace the allowed tag runes.
    pub fn set_allowed_runes(&mut self, allowed: &str) {
        self.tag_runes = TagRunes::new(allowed);
    }

    pub fn tag_runes(&self) -> &TagRunes {
        &self.tag_runes
    }

    /// Decode one packet. See [`decode`].
    pub fn decode(&self, raw: &[u8], time: DateTime<Utc>, source: MessageSource) -> Message {
        decode(raw, time, source, &self.tag_runes)
    }
}

/// Decode one raw packet received at `time` from `source`.
pub fn decode(
    raw: &[u8],
    time: DateTime<Utc>,
    source: MessageSource,
    tag_runes: &TagRunes,
) -> Message {
    let (priority, pkt) = match parse_priority(raw) {
        Some((priority, rest)) => (Some(priority), rest),
        None => (None, raw),
    };

    let mut timestamp = None;
    let mut hostname = None;
    let mut body = pkt;

    // No header is assumed without a priority.
    if priority.is_some() {
        match parse_header(pkt, time) {
            Some((ts, offset)) => {
                timestamp = Some(ts);
                let rest = &pkt[offset..];
                match rest.iter().position(|&b| b == b' ') {
                    Some(end) => {
                        hostname = Some(String::from_utf8_lossy(&rest[..end]).into_owned());
                        body = &rest[end + 1..];
                    }
                    None => body = rest,
                }
            }
            None => {
                tracing::debug!(
                    source = %source,
                    packet = %String::from_utf8_lossy(pkt),
                    "Packet header did not parse"
                );
            }
        }
    }

    let priority = priority.unwrap_or(DEFAULT_PRIORITY);

    let text = String::from_utf8_lossy(body);
    let text = text.trim_end_matches(['\0', '\r', '\n']);
    let (tag, content) = split_tag(text, tag_runes);
    let (tag1, content1) = split_words(text);

    Message {
        source,
        time,
        severity: Severity::from_priority(priority),
        facility: (priority >> 3) as u8,
        timestamp,
        hostname,
        tag: tag.to_string(),
        content: content.to_string(),
        tag1: tag1.to_string(),
        content1: content1.to_string(),
    }
}

/// Strip a leading `<PRI>` and return its value with the rest of the packet.
fn parse_priority(raw: &[u8]) -> Option<(u16, &[u8])> {
    if raw.first() != Some(&b'<') {
        return None;
    }

    let end = 1 + raw[1..].iter().position(|&b| b == b'>')?;
    if !(2..=MAX_PRIORITY_DIGITS + 1).contains(&end) {
        return None;
    }

    let digits = &raw[1..end];
    if !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }

    let priority = digits
        .iter()
        .fold(0u16, |acc, d| acc * 10 + u16::from(d - b'0'));

    Some((priority, &raw[end + 1..]))
}

/// Probe the header layouts and return the timestamp with the hostname offset.
fn parse_header(pkt: &[u8], arrival: DateTime<Utc>) -> Option<(DateTime<FixedOffset>, usize)> {
    if pkt.len() > RFC5424_TIMESTAMP_LEN
        && pkt[RFC5424_TIMESTAMP_LEN] == b' '
        && pkt[RFC3164_TIMESTAMP_LEN] != b' '
    {
        if let Some(ts) = parse_rfc5424_timestamp(&pkt[..RFC5424_TIMESTAMP_LEN]) {
            return Some((ts, RFC5424_TIMESTAMP_LEN + 1));
        }
    }

    if pkt.len() > RFC3164_TIMESTAMP_LEN && pkt[RFC3164_TIMESTAMP_LEN] == b' ' {
        if let Some(ts) = parse_rfc3164_timestamp(&pkt[..RFC3164_TIMESTAMP_LEN], arrival) {
            return Some((ts, RFC3164_TIMESTAMP_LEN + 1));
        }
    }

    None
}

/// Parse a fixed-width RFC 3339 stamp (e.g. `2006-01-02T15:04:05-07:00`).
///
/// Only an upper-case `T` separator and `Z` zone are accepted.
fn parse_rfc5424_timestamp(bytes: &[u8]) -> Option<DateTime<FixedOffset>> {
    if bytes.get(10) != Some(&b'T') || bytes.last() == Some(&b'z') {
        return None;
    }
    let s = std::str::from_utf8(bytes).ok()?;
    DateTime::parse_from_rfc3339(s).ok()
}

/// Parse a BSD stamp (e.g. `Jan  2 15:04:05`).
///
/// The stamp has no year or zone: it is read as UTC in the arrival year,
/// or the latest earlier year holding that date when it would be more than
/// a day ahead. `Feb 29` therefore lands in the last leap year.
fn parse_rfc3164_timestamp(bytes: &[u8], arrival: DateTime<Utc>) -> Option<DateTime<FixedOffset>> {
    let s = std::str::from_utf8(bytes).ok()?;
    let stamp =
        NaiveDateTime::parse_from_str(&format!("{} {}", LEAP_YEAR, s), "%Y %b %e %H:%M:%S").ok()?;
    let in_year = |year: i32| stamp.with_year(year).map(|ndt| ndt.and_utc());

    let year = arrival.year();
    let ts = match in_year(year) {
        Some(ts) if ts <= arrival + TimeDelta::days(1) => ts,
        _ => (1..=8).find_map(|back| in_year(year - back))?,
    };

    Some(ts.fixed_offset())
}

/// Split on the first rune that cannot belong to a program tag.
fn split_tag<'a>(text: &'a str, tag_runes: &TagRunes) -> (&'a str, &'a str) {
    match text.char_indices().find(|&(_, c)| !tag_runes.is_tag_char(c)) {
        Some((i, _)) => (&text[..i], &text[i..]),
        None => ("", text),
    }
}

/// Split the trimmed text on its first whitespace rune.
fn split_words(text: &str) -> (&str, &str) {
    let text = text.trim();
    match text.char_indices().find(|&(_, c)| c.is_whitespace()) {
        Some((i, c)) => (&text[..i], text[i + c.len_utf8()..].trim_start()),
        None => ("", text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, NaiveDate, TimeZone, Timelike};

    fn arrival() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn source() -> MessageSource {
        MessageSource::Network("192.168.1.1:514".parse().unwrap())
    }

    fn parse(raw: &str) -> Message {
        decode(raw.as_bytes(), arrival(), source(), &TagRunes::default())
    }

    #[test]
    fn test_priority_bits() {
        for p in 0u16..1000 {
            let msg = parse(&format!("<{}>rest", p));
            assert_eq!(msg.severity as u16, p & 7, "severity for <{}>", p);
            assert_eq!(u16::from(msg.facility), p >> 3, "facility for <{}>", p);
        }
    }

    #[test]
    fn test_default_priority() {
        let msg = parse("no priority here");
        assert_eq!(msg.severity, Severity::Notice);
        assert_eq!(msg.facility, 1);
        assert_eq!(msg.content, " priority here");
        assert_eq!(msg.tag, "no");
    }

    #[test]
    fn test_priority_too_long() {
        let msg = parse("<1000>message");
        assert_eq!(msg.severity, Severity::Notice);
        assert_eq!(msg.facility, 1);
        // Not consumed, so '<' terminates an empty tag.
        assert_eq!(msg.tag, "");
        assert_eq!(msg.content, "<1000>message");
    }

    #[test]
    fn test_priority_rejects_non_digits() {
        for raw in ["<>x", "<-1>x", "<+5>x", "<1a>x", "<abc>x", "<", "<12"] {
            let msg = parse(raw);
            assert_eq!(msg.priority(), DEFAULT_PRIORITY, "input {:?}", raw);
            assert_eq!(msg.content, raw, "input {:?}", raw);
        }
    }

    #[test]
    fn test_priority_leading_zeros() {
        let msg = parse("<007>x");
        assert_eq!(msg.severity, Severity::Debug);
        assert_eq!(msg.facility, 0);
        assert_eq!(msg.content1, "x");
    }

    #[test]
    fn test_rfc3164_packet() {
        let msg = parse("<13>Jan  2 15:04:05 myhost prog123: hello world\n");

        assert_eq!(msg.severity, Severity::Notice);
        assert_eq!(msg.facility, 1);
        assert_eq!(msg.hostname.as_deref(), Some("myhost"));
        assert_eq!(msg.tag, "prog123");
        assert_eq!(msg.content, ": hello world");
        assert_eq!(msg.tag1, "prog123:");
        assert_eq!(msg.content1, "hello world");

        let ts = msg.timestamp.unwrap();
        assert_eq!(ts.date_naive(), NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!((ts.hour(), ts.minute(), ts.second()), (15, 4, 5));
        assert_eq!(ts.offset().local_minus_utc(), 0);
    }

    #[test]
    fn test_rfc3164_two_digit_day() {
        let msg = parse("<34>Oct 22 10:52:12 localhost kernel: Device eth0 entered promiscuous mode");

        assert_eq!(msg.facility, 4);
        assert_eq!(msg.severity, Severity::Critical);
        assert_eq!(msg.hostname.as_deref(), Some("localhost"));
        assert_eq!(msg.tag, "kernel");
        assert_eq!(msg.content1, "Device eth0 entered promiscuous mode");
        // October is more than a day ahead of the June arrival.
        assert_eq!(msg.timestamp.unwrap().year(), 2023);
    }

    #[test]
    fn test_rfc3164_pid_in_tag() {
        let msg = parse("<34>Jan  5 14:30:00 myhost sshd[12345]: Connection from 192.168.1.1");

        assert_eq!(msg.tag, "sshd");
        assert_eq!(msg.content, "[12345]: Connection from 192.168.1.1");
        assert_eq!(msg.tag1, "sshd[12345]:");
        assert_eq!(msg.content1, "Connection from 192.168.1.1");
    }

    #[test]
    fn test_rfc3164_invalid_date() {
        let msg = parse("<13>Foo 32 25:61:99 myhost prog: text");

        assert_eq!(msg.hostname, None);
        assert_eq!(msg.timestamp, None);
        assert_eq!(msg.tag, "Foo");
        assert_eq!(msg.content1, "32 25:61:99 myhost prog: text");
    }

    #[test]
    fn test_rfc5424_style_timestamp() {
        let msg = parse("<165>2003-10-11T22:14:15-07:00 mymachine.example.com evntslog: An event");

        assert_eq!(msg.facility, 20);
        assert_eq!(msg.severity, Severity::Notice);
        assert_eq!(msg.hostname.as_deref(), Some("mymachine.example.com"));
        assert_eq!(msg.tag, "evntslog");
        assert_eq!(msg.content1, "An event");

        let ts = msg.timestamp.unwrap();
        assert_eq!(ts.offset().local_minus_utc(), -7 * 3600);
        assert_eq!(ts.with_timezone(&Utc).hour(), 5);
    }

    #[test]
    fn test_rfc5424_style_fractional_utc() {
        let msg = parse("<14>2023-08-24T12:30:45.1234Z host app: Test");

        assert_eq!(msg.hostname.as_deref(), Some("host"));
        let ts = msg.timestamp.unwrap();
        assert_eq!(ts.format("%H:%M:%S").to_string(), "12:30:45");
    }

    #[test]
    fn test_versioned_rfc5424_is_not_recognized() {
        let msg = parse("<34>1 2023-01-01T00:00:00Z host app - - - Test message");

        assert_eq!(msg.hostname, None);
        assert_eq!(msg.timestamp, None);
        assert_eq!(msg.tag, "1");
        assert_eq!(msg.content1, "2023-01-01T00:00:00Z host app - - - Test message");
    }

    #[test]
    fn test_unparsed_header_keeps_whole_body() {
        let msg = parse("<13>this is not a header at all");

        assert_eq!(msg.hostname, None);
        assert_eq!(msg.timestamp, None);
        assert_eq!(msg.tag, "this");
        assert_eq!(msg.content, " is not a header at all");
        assert_eq!(msg.tag1, "this");
        assert_eq!(msg.content1, "is not a header at all");
    }

    #[test]
    fn test_header_without_priority_is_ignored() {
        let msg = parse("Jan  2 15:04:05 myhost prog: text");

        assert_eq!(msg.hostname, None);
        assert_eq!(msg.timestamp, None);
        assert_eq!(msg.tag, "Jan");
    }

    #[test]
    fn test_header_without_hostname_delimiter() {
        let msg = parse("<13>Jan  2 15:04:05 myhost");

        assert_eq!(msg.hostname, None);
        assert!(msg.timestamp.is_some());
        assert_eq!(msg.tag, "");
        assert_eq!(msg.content, "myhost");
    }

    #[test]
    fn test_trailing_bytes_trimmed() {
        let msg = parse("<13>text\r\n\0");
        assert_eq!(msg.tag, "");
        assert_eq!(msg.content, "text");
        assert_eq!(msg.content1, "text");
    }

    #[test]
    fn test_trailing_trim_keeps_inner_newlines() {
        let msg = parse("<13>line one\nline two\n\n");
        assert_eq!(msg.content1, "one\nline two");
        assert_eq!(msg.tag1, "line");
    }

    #[test]
    fn test_allowed_tag_runes() {
        let runes = TagRunes::new("-_.");
        let msg = decode(
            b"<13>Jan  2 15:04:05 myhost my-prog_v1.2: started",
            arrival(),
            source(),
            &runes,
        );
        assert_eq!(msg.tag, "my-prog_v1.2");
        assert_eq!(msg.content, ": started");

        let strict = parse("<13>Jan  2 15:04:05 myhost my-prog_v1.2: started");
        assert_eq!(strict.tag, "my");
        assert_eq!(strict.content, "-prog_v1.2: started");
    }

    #[test]
    fn test_unicode_tag_and_whitespace() {
        let msg = parse("<13>prögram\u{3000}wide space");
        assert_eq!(msg.tag, "prögram");
        assert_eq!(msg.content, "\u{3000}wide space");
        assert_eq!(msg.tag1, "prögram");
        assert_eq!(msg.content1, "wide space");
    }

    #[test]
    fn test_loose_split_trims_whitespace() {
        let msg = parse("<13>   padded   words here   ");
        assert_eq!(msg.tag1, "padded");
        assert_eq!(msg.content1, "words here");
        assert_eq!(msg.tag, "");
        assert_eq!(msg.content, "   padded   words here   ");
    }

    #[test]
    fn test_body_without_delimiters() {
        let msg = parse("<13>single");
        assert_eq!(msg.tag, "");
        assert_eq!(msg.content, "single");
        assert_eq!(msg.tag1, "");
        assert_eq!(msg.content1, "single");
    }

    #[test]
    fn test_empty_and_truncated_input() {
        for raw in ["", "<", "<13>", "<13>Jan", "<13>Jan  2 15:04:05 "] {
            let msg = parse(raw);
            assert!(msg.severity <= Severity::Debug, "input {:?}", raw);
        }

        let msg = parse("<13>");
        assert_eq!(msg.content, "");
        assert_eq!(msg.content1, "");

        let msg = parse("<13>Jan  2 15:04:05 ");
        assert_eq!(msg.hostname, None);
        assert!(msg.timestamp.is_some());
        assert_eq!(msg.content, "");
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let raw = b"<13>prog\xff: data";
        let msg = decode(raw, arrival(), source(), &TagRunes::default());
        assert_eq!(msg.tag, "prog");
        assert!(msg.content.starts_with('\u{FFFD}'));
    }

    #[test]
    fn test_decoding_content_is_not_recursive() {
        let msg = parse("<13>Jan  2 15:04:05 myhost prog123: hello world\n");
        let again = parse(&msg.content);

        assert_eq!(again.priority(), DEFAULT_PRIORITY);
        assert_eq!(again.hostname, None);
        assert_eq!(again.timestamp, None);
        assert_eq!(again.content, msg.content);
    }

    #[test]
    fn test_arrival_and_source_are_kept() {
        let msg = parse("<13>x");
        assert_eq!(msg.time, arrival());
        assert_eq!(msg.source, source());
    }

    #[test]
    fn test_decoder_replaces_runes() {
        let mut decoder = Decoder::new(TagRunes::new("-"));
        assert!(decoder.tag_runes().contains('-'));

        decoder.set_allowed_runes("_");
        assert!(!decoder.tag_runes().contains('-'));
        assert!(decoder.tag_runes().contains('_'));

        let msg = decoder.decode(b"<13>a_b-c", arrival(), source());
        assert_eq!(msg.tag, "a_b");
        assert_eq!(msg.content, "-c");
    }

    #[test]
    fn test_rfc3164_year_rollover() {
        let new_year = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 5).unwrap();
        let msg = decode(
            b"<13>Dec 31 23:59:58 myhost prog: late",
            new_year,
            source(),
            &TagRunes::default(),
        );

        let ts = msg.timestamp.unwrap();
        assert_eq!(ts.year(), 2024);
        assert_eq!(ts.month(), 12);
    }

    #[test]
    fn test_rfc3164_leap_day_outside_leap_year() {
        let arrival = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap();
        let msg = decode(
            b"<13>Feb 29 10:00:00 myhost prog: replayed",
            arrival,
            source(),
            &TagRunes::default(),
        );

        assert_eq!(msg.hostname.as_deref(), Some("myhost"));
        assert_eq!(msg.tag, "prog");
        let ts = msg.timestamp.unwrap();
        assert_eq!(
            ts.date_naive(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        assert_eq!(ts.hour(), 10);
    }

    #[test]
    fn test_rfc3164_leap_day_ahead_in_leap_year() {
        let arrival = Utc.with_ymd_and_hms(2028, 1, 10, 0, 0, 0).unwrap();
        let msg = decode(
            b"<13>Feb 29 10:00:00 myhost prog: early",
            arrival,
            source(),
            &TagRunes::default(),
        );

        assert_eq!(msg.timestamp.unwrap().year(), 2024);
    }

    #[test]
    fn test_rfc3339_requires_upper_case_separator() {
        for raw in [
            "<13>2003-10-11 22:14:15+02:00 host app: x",
            "<13>2003-10-11t22:14:15+02:00 host app: x",
            "<13>2023-08-24T12:30:45.1234z host app: x",
        ] {
            let msg = parse(raw);
            assert_eq!(msg.hostname, None, "input {:?}", raw);
            assert_eq!(msg.timestamp, None, "input {:?}", raw);
        }
    }
}
