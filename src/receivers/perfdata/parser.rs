// SPDX-License-Identifier: Apache-2.0

//! Line parser for the perfdata format
//!
//! Columns are split on the literal tab character. Two layouts exist:
//!
//! | idx | standard                | last-check               |
//! |-----|-------------------------|--------------------------|
//! | 0   | record marker           | record marker            |
//! | 1   | timestamp               | timestamp                |
//! | 2   | host name               | last check time          |
//! | 3   | service (`HOST`)        | host name                |
//! | 4   | state                   | service (`HOST`)         |
//! | 5   | execution time          | state                    |
//! | 6   | latency                 | output                   |
//! | 7   | output                  | perfdata                 |
//! | 8   | perfdata                | (ignored)                |
//! | 9   | long output (optional)  | long output (optional)   |
//!
//! The last-check layout is used with [`TtlPolicy::FromLastCheck`], the
//! standard layout otherwise.

use crate::event::{CheckKind, CheckState, Event};
use crate::receivers::perfdata::config::{DetailMode, ParserConfig, TtlPolicy};
use crate::receivers::perfdata::error::{ParseError, Result};
use tracing::debug;

pub const HOST_RECORD_MARKER: &str = "[HOSTPERFDATA]";
pub const SERVICE_RECORD_MARKER: &str = "[SERVICEPERFDATA]";

/// Service description Nagios writes for host checks
pub const HOST_CHECK_NAME: &str = "HOST";

const MIN_FIELDS: usize = 9;
const TIMESTAMP_FIELD: usize = 1;
const LONG_OUTPUT_FIELD: usize = 9;

struct Layout {
    last_check: Option<usize>,
    entity: usize,
    check: usize,
    state: usize,
    execution_time: Option<usize>,
    latency: Option<usize>,
    summary: usize,
    perfdata: usize,
}

const STANDARD_LAYOUT: Layout = Layout {
    last_check: None,
    entity: 2,
    check: 3,
    state: 4,
    execution_time: Some(5),
    latency: Some(6),
    summary: 7,
    perfdata: 8,
};

const LAST_CHECK_LAYOUT: Layout = Layout {
    last_check: Some(2),
    entity: 3,
    check: 4,
    state: 5,
    execution_time: None,
    latency: None,
    summary: 6,
    perfdata: 7,
};

fn layout_for(ttl: &TtlPolicy) -> &'static Layout {
    match ttl {
        TtlPolicy::FromLastCheck { .. } => &LAST_CHECK_LAYOUT,
        TtlPolicy::Fixed(_) | TtlPolicy::Unset => &STANDARD_LAYOUT,
    }
}

/// Perfdata parser bound to one variant configuration
#[derive(Debug, Clone, Default)]
pub struct PerfdataParser {
    config: ParserConfig,
}

impl PerfdataParser {
    pub fn new(config: ParserConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn parse(&self, line: &str) -> Result<Event> {
        parse_perfdata_line(line, &self.config)
    }
}

/// Parse one perfdata line into an [`Event`].
pub fn parse_perfdata_line(line: &str, config: &ParserConfig) -> Result<Event> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < MIN_FIELDS {
        return Err(ParseError::TooFewFields {
            found: fields.len(),
        });
    }

    let record_kind = match fields[0] {
        HOST_RECORD_MARKER => CheckKind::Host,
        SERVICE_RECORD_MARKER => CheckKind::Service,
        other => return Err(ParseError::UnknownRecordType(other.to_string())),
    };

    let time = parse_epoch(fields[TIMESTAMP_FIELD], "timestamp")?;

    let layout = layout_for(&config.ttl);
    let last_check = layout
        .last_check
        .map(|idx| parse_epoch(fields[idx], "last check time"))
        .transpose()?;

    let entity = fields[layout.entity];
    let check = fields[layout.check];
    // A host-level check name wins over a service marker
    let kind = if record_kind == CheckKind::Host || check == HOST_CHECK_NAME {
        CheckKind::Host
    } else {
        CheckKind::Service
    };

    let raw_state = fields[layout.state];
    let state = CheckState::normalize(raw_state).unwrap_or_else(|| {
        debug!(state = raw_state, entity, check, "Unrecognized check state, using unknown");
        CheckState::Unknown
    });

    let mut summary = fields[layout.summary].to_string();
    let mut details = None;
    if let Some(long_output) = fields.get(LONG_OUTPUT_FIELD) {
        let long_output = long_output.replace("\\n", "\n");
        let long_output = long_output.trim();
        if !long_output.is_empty() {
            match config.details {
                DetailMode::Separate => details = Some(long_output.to_string()),
                DetailMode::Append => {
                    summary.push_str("\n\n");
                    summary.push_str(long_output);
                }
            }
        }
    }

    let perfdata = Some(fields[layout.perfdata].trim())
        .filter(|p| !p.is_empty())
        .map(str::to_string);

    let ttl = match (config.ttl, last_check) {
        (TtlPolicy::FromLastCheck { pad, min }, Some(last_check)) => {
            let interval = time.saturating_sub(last_check) as f64;
            Some((interval * pad).max(min))
        }
        (TtlPolicy::Fixed(ttl), _) => Some(ttl),
        _ => None,
    };

    let (execution_time, latency) = match config.ttl {
        TtlPolicy::Unset => (
            parse_seconds(&fields, layout.execution_time),
            parse_seconds(&fields, layout.latency),
        ),
        _ => (None, None),
    };

    Ok(Event {
        kind,
        state,
        entity: entity.to_string(),
        check: check.to_string(),
        summary,
        details,
        time,
        perfdata,
        execution_time,
        latency,
        ttl,
    })
}

fn parse_epoch(value: &str, field: &'static str) -> Result<i64> {
    value.parse().map_err(|_| ParseError::BadTimestamp {
        field,
        value: value.to_string(),
    })
}

// Timing columns are informational; a malformed value is simply left out.
fn parse_seconds(fields: &[&str], idx: Option<usize>) -> Option<f64> {
    idx.and_then(|i| fields.get(i))
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}
