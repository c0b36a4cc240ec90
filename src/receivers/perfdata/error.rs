// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("expected at least 9 tab-separated fields, found {found}")]
    TooFewFields { found: usize },

    #[error("unknown record type '{0}'")]
    UnknownRecordType(String),

    #[error("{field} '{value}' is not an integer epoch timestamp")]
    BadTimestamp { field: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, ParseError>;
