// SPDX-License-Identifier: Apache-2.0

/// Default floor for ttls computed from the last-check time
pub const DEFAULT_MIN_TTL_SECS: f64 = 60.0;

/// How the event ttl is derived.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TtlPolicy {
    /// The line carries the previous check time in its third column.
    /// `ttl = max(min, (timestamp - last_check) * pad)`
    FromLastCheck { pad: f64, min: f64 },
    /// Every event gets the same ttl.
    Fixed(f64),
    /// No ttl. Execution time and latency are carried instead.
    Unset,
}

/// What to do with the long plugin output (tenth column).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DetailMode {
    /// Keep it in the event details
    #[default]
    Separate,
    /// Append it to the summary after a blank line
    Append,
}

/// Variant configuration for the perfdata parser
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParserConfig {
    pub ttl: TtlPolicy,
    pub details: DetailMode,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            ttl: TtlPolicy::Unset,
            details: DetailMode::Separate,
        }
    }
}

impl ParserConfig {
    pub fn new(ttl: TtlPolicy, details: DetailMode) -> Self {
        Self { ttl, details }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        match self.ttl {
            TtlPolicy::FromLastCheck { pad, min } => {
                if !pad.is_finite() || pad <= 0.0 {
                    return Err(format!("ttl pad must be a positive number, got {}", pad));
                }
                if !min.is_finite() || min < 0.0 {
                    return Err(format!("min ttl must not be negative, got {}", min));
                }
            }
            TtlPolicy::Fixed(ttl) => {
                if !ttl.is_finite() || ttl <= 0.0 {
                    return Err(format!("ttl must be a positive number, got {}", ttl));
                }
            }
            TtlPolicy::Unset => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ParserConfig::default();
        assert_eq!(config.ttl, TtlPolicy::Unset);
        assert_eq!(config.details, DetailMode::Separate);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_non_positive_pad() {
        let config = ParserConfig::new(
            TtlPolicy::FromLastCheck {
                pad: 0.0,
                min: DEFAULT_MIN_TTL_SECS,
            },
            DetailMode::Append,
        );
        assert_eq!(
            config.validate(),
            Err("ttl pad must be a positive number, got 0".to_string())
        );
    }

    #[test]
    fn test_validate_rejects_negative_min() {
        let config = ParserConfig::new(
            TtlPolicy::FromLastCheck {
                pad: 3.0,
                min: -1.0,
            },
            DetailMode::Append,
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_fixed_ttl() {
        assert!(
            ParserConfig::new(TtlPolicy::Fixed(300.0), DetailMode::Append)
                .validate()
                .is_ok()
        );
        assert!(
            ParserConfig::new(TtlPolicy::Fixed(f64::NAN), DetailMode::Append)
                .validate()
                .is_err()
        );
    }
}
