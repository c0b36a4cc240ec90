// SPDX-License-Identifier: Apache-2.0

//! Check-result events and the raw lines they are parsed from.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// A single line read from a followed file, before parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    /// Path the line was read from
    pub source: Arc<Path>,
    /// Line text without the trailing newline
    pub text: String,
    /// Arrival order within `source`, starting at zero
    pub seq: u64,
}

/// Whether a check result describes a host or one of its services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckKind {
    Host,
    Service,
}

impl CheckKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckKind::Host => "host",
            CheckKind::Service => "service",
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical check state. Host states are folded into these on parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckState {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl CheckState {
    /// Normalize a state as printed by the monitoring tool.
    ///
    /// Matching is case-insensitive. `up`, `down` and `unreachable` map to
    /// `ok`, `critical` and `unknown`; anything that is neither a host nor a
    /// service state yields `None`, and the parser records it as unknown.
    pub fn normalize(raw: &str) -> Option<Self> {
        match raw.to_lowercase().as_str() {
            "ok" | "up" => Some(CheckState::Ok),
            "warning" => Some(CheckState::Warning),
            "critical" | "down" => Some(CheckState::Critical),
            "unknown" | "unreachable" => Some(CheckState::Unknown),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckState::Ok => "ok",
            CheckState::Warning => "warning",
            CheckState::Critical => "critical",
            CheckState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for CheckState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized check result, ready for delivery to a sink.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: CheckKind,
    pub state: CheckState,
    /// Host name the check ran against
    pub entity: String,
    /// Service description, or `HOST` for host checks
    pub check: String,
    /// First line of plugin output
    pub summary: String,
    /// Long plugin output, when kept apart from the summary
    pub details: Option<String>,
    /// Epoch seconds, exactly as written in the source line
    pub time: i64,
    pub perfdata: Option<String>,
    /// Check execution time in seconds
    pub execution_time: Option<f64>,
    /// Check scheduling latency in seconds
    pub latency: Option<f64>,
    /// Seconds after which the collector should consider the event stale
    pub ttl: Option<f64>,
}

impl Event {
    /// Summary followed by the details, separated by a blank line.
    pub fn full_description(&self) -> String {
        match &self.details {
            Some(details) => format!("{}\n\n{}", self.summary, details),
            None => self.summary.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_normalize_is_case_insensitive() {
        assert_eq!(CheckState::normalize("UP"), Some(CheckState::Ok));
        assert_eq!(CheckState::normalize("Down"), Some(CheckState::Critical));
        assert_eq!(
            CheckState::normalize("UNREACHABLE"),
            Some(CheckState::Unknown)
        );
        assert_eq!(CheckState::normalize("WARNING"), Some(CheckState::Warning));
        assert_eq!(CheckState::normalize("ok"), Some(CheckState::Ok));
        assert_eq!(CheckState::normalize("critical"), Some(CheckState::Critical));
        assert_eq!(CheckState::normalize("Unknown"), Some(CheckState::Unknown));
    }

    #[test]
    fn test_state_normalize_unrecognized_values() {
        assert_eq!(CheckState::normalize("pending"), None);
        assert_eq!(CheckState::normalize(""), None);
    }

    #[test]
    fn test_full_description() {
        let mut event = Event {
            kind: CheckKind::Service,
            state: CheckState::Ok,
            entity: "web1".to_string(),
            check: "HTTP".to_string(),
            summary: "HTTP OK".to_string(),
            details: None,
            time: 1,
            perfdata: None,
            execution_time: None,
            latency: None,
            ttl: None,
        };
        assert_eq!(event.full_description(), "HTTP OK");

        event.details = Some("line one\nline two".to_string());
        assert_eq!(event.full_description(), "HTTP OK\n\nline one\nline two");
    }
}
