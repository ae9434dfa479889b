//! Tolerant parsing of single log lines.
//!
//! Three line shapes are recognized, tried in order:
//!
//! - JSON objects (`{"timestamp": ..., "level": ..., "message": ...}`)
//! - bracketed text (`[ts] [LEVEL] [log_id] [thread] [process] message`)
//! - plain text (`ts LEVEL message`)
//!
//! A line that matches none of them is a continuation of the previous
//! record (stack traces, wrapped payloads). Parsing never fails.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::{Map, Value};

use crate::types::LogLevel;

/// What the parser knows about the file position it is parsing at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseContext {
    /// Timestamp of the previous record in the same file.
    pub last_timestamp: Option<NaiveDateTime>,
    /// Partition day of the file, used when there is no previous record.
    pub nominal_day: NaiveDate,
}

impl ParseContext {
    /// Timestamp inherited by records that carry none of their own.
    #[must_use]
    pub fn inherited_timestamp(&self) -> NaiveDateTime {
        self.last_timestamp
            .unwrap_or_else(|| self.nominal_day.and_time(NaiveTime::MIN))
    }
}

/// A parsed record before provenance and sequence are attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    /// Record timestamp.
    pub timestamp: NaiveDateTime,
    /// Record level.
    pub level: LogLevel,
    /// Message text.
    pub message: String,
    /// Correlation id, if present.
    pub log_id: Option<String>,
    /// Thread name, if present.
    pub thread: Option<String>,
    /// Process name, if present.
    pub process: Option<String>,
}

impl Draft {
    fn new(timestamp: NaiveDateTime, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            level,
            message: message.into(),
            log_id: None,
            thread: None,
            process: None,
        }
    }
}

/// Outcome of parsing one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    /// The line starts a new record.
    Entry(Draft),
    /// The line continues the current record.
    Continuation(String),
}

/// Parser for log lines.
#[derive(Debug, Clone)]
pub struct LineParser {
    timestamp_formats: Vec<String>,
}

impl LineParser {
    /// Creates a parser accepting the given `chrono` timestamp formats.
    #[must_use]
    pub const fn new(timestamp_formats: Vec<String>) -> Self {
        Self { timestamp_formats }
    }

    /// Decodes raw line bytes, substituting invalid UTF-8 and dropping a
    /// trailing carriage return.
    #[must_use]
    pub fn decode(bytes: &[u8]) -> String {
        let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
        String::from_utf8_lossy(bytes).into_owned()
    }

    /// Parses one complete line.
    #[must_use]
    pub fn parse(&self, line: &str, ctx: &ParseContext) -> ParsedLine {
        let trimmed = line.trim();

        if trimmed.starts_with('{') {
            if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(trimmed) {
                return ParsedLine::Entry(self.parse_json(&obj, ctx));
            }
        }

        if trimmed.starts_with('[') {
            if let Some(draft) = self.parse_bracketed(trimmed) {
                return ParsedLine::Entry(draft);
            }
        }

        if let Some(draft) = self.parse_plain(trimmed) {
            return ParsedLine::Entry(draft);
        }

        ParsedLine::Continuation(line.trim_end().to_string())
    }

    /// Builds the `UNKNOWN` record for text that has no record to continue.
    #[must_use]
    pub fn orphan(text: &str, ctx: &ParseContext) -> Draft {
        Draft::new(ctx.inherited_timestamp(), LogLevel::Unknown, text)
    }

    fn parse_json(&self, obj: &Map<String, Value>, ctx: &ParseContext) -> Draft {
        let timestamp = ["timestamp", "time", "ts"]
            .iter()
            .filter_map(|key| obj.get(*key).and_then(Value::as_str))
            .find_map(|s| self.parse_timestamp(s.trim()))
            .unwrap_or_else(|| ctx.inherited_timestamp());

        let level = ["level", "lvl", "severity"]
            .iter()
            .find_map(|key| obj.get(*key).and_then(Value::as_str))
            .and_then(LogLevel::from_token)
            .unwrap_or(LogLevel::Unknown);

        let message = ["message", "msg", "text"]
            .iter()
            .find_map(|key| obj.get(*key).and_then(Value::as_str))
            .map_or_else(
                || serde_json::to_string(obj).unwrap_or_default(),
                ToString::to_string,
            );

        Draft {
            timestamp,
            level,
            message,
            log_id: field_text(obj, "log_id"),
            thread: field_text(obj, "thread"),
            process: field_text(obj, "process"),
        }
    }

    fn parse_bracketed(&self, line: &str) -> Option<Draft> {
        let (ts, rest) = take_group(line)?;
        let timestamp = self
            .timestamp_formats
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(ts.trim(), fmt).ok())?;

        let Some((token, mut rest)) = take_group(rest) else {
            return Some(Draft::new(timestamp, LogLevel::Unknown, rest));
        };
        let Some(level) = LogLevel::from_token(token.trim()) else {
            let message = format!("[{token}] {rest}");
            return Some(Draft::new(timestamp, LogLevel::Unknown, message.trim_end()));
        };

        let mut extras = [None, None, None];
        for slot in &mut extras {
            match take_group(rest) {
                Some((value, after)) => {
                    *slot = Some(value.trim().to_string()).filter(|v| !v.is_empty());
                    rest = after;
                }
                None => break,
            }
        }
        let [log_id, thread, process] = extras;

        Some(Draft {
            timestamp,
            level,
            message: rest.to_string(),
            log_id,
            thread,
            process,
        })
    }

    fn parse_plain(&self, line: &str) -> Option<Draft> {
        let (timestamp, rest) = self.timestamp_formats.iter().find_map(|fmt| {
            NaiveDateTime::parse_and_remainder(line, fmt)
                .ok()
                .filter(|(_, rest)| rest.is_empty() || rest.starts_with(char::is_whitespace))
        })?;
        let rest = rest.trim_start();

        let (token, after) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        let bare = token
            .trim_start_matches('[')
            .trim_end_matches([']', ':', '|']);

        match LogLevel::from_token(bare) {
            Some(level) => {
                let after = after.trim_start();
                let message = ["- ", "| ", ": "]
                    .iter()
                    .find_map(|sep| after.strip_prefix(sep))
                    .unwrap_or(after);
                Some(Draft::new(timestamp, level, message))
            }
            None => Some(Draft::new(timestamp, LogLevel::Unknown, rest)),
        }
    }

    fn parse_timestamp(&self, s: &str) -> Option<NaiveDateTime> {
        self.timestamp_formats
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
    }
}

/// Splits `[value] rest` into `value` and `rest` (leading space removed).
fn take_group(s: &str) -> Option<(&str, &str)> {
    let inner = s.strip_prefix('[')?;
    let end = inner.find(']')?;
    let rest = &inner[end + 1..];
    Some((&inner[..end], rest.strip_prefix(' ').unwrap_or(rest)))
}

/// Reads an optional attribute as text, stringifying non-string values.
fn field_text(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
