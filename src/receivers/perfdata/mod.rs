// SPDX-License-Identifier: Apache-2.0

//! Parser for Nagios performance-data export lines
//!
//! Nagios writes one tab-separated line per check result when host and
//! service perfdata processing is enabled:
//!
//! `[SERVICEPERFDATA]\t$TIMET$\t$HOSTNAME$\t$SERVICEDESC$\t$SERVICESTATE$\t...`
//!
//! Two column layouts are understood, selected by the ttl policy of the
//! [`ParserConfig`]. See [`parser`] for the exact field positions.

pub mod config;
pub mod error;
pub mod parser;

pub use config::{DetailMode, ParserConfig, TtlPolicy};
pub use error::{ParseError, Result};
pub use parser::{PerfdataParser, parse_perfdata_line};
