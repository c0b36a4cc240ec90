// SPDX-License-Identifier: Apache-2.0

use clap::{Args, ValueEnum};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::exporters::collector::{CollectorSinkConfig, DEFAULT_COLLECTOR_PORT};
use crate::exporters::delivery::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_SEND_TIMEOUT, DeliveryConfig};
use crate::exporters::queue::{DEFAULT_QUEUE_NAME, DEFAULT_QUEUE_PORT, QueueSinkConfig};
use crate::init::file_receiver::FileReceiverArgs;
use crate::receivers::perfdata::config::DEFAULT_MIN_TTL_SECS;
use crate::receivers::perfdata::{DetailMode, ParserConfig, TtlPolicy};
use crate::telemetry::statsd::{DEFAULT_STATSD_PORT, DEFAULT_STATSD_PREFIX, StatsdConfig};

pub const DEFAULT_QUEUE_SIZE: usize = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("--ttl and --ttl-pad are only supported by the collector sink")]
    TtlNotSupported,

    #[error("invalid parser configuration: {0}")]
    Parser(String),

    #[error("sink host must not be empty")]
    MissingHost,

    #[error("queue size must be at least 1")]
    ZeroQueueSize,
}

#[derive(Copy, Clone, Debug, Default, ValueEnum, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SinkArg {
    /// JSON events pushed onto a Redis list
    #[default]
    Queue,
    /// Protobuf events sent to a Riemann-compatible collector
    Collector,
}

#[derive(Copy, Clone, Debug, ValueEnum, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DetailsArg {
    /// Keep long output in its own field
    Separate,
    /// Append long output to the summary
    Append,
}

impl From<DetailsArg> for DetailMode {
    fn from(d: DetailsArg) -> Self {
        match d {
            DetailsArg::Separate => DetailMode::Separate,
            DetailsArg::Append => DetailMode::Append,
        }
    }
}

#[derive(Debug, Args, Clone, Deserialize)]
#[serde(default)]
pub struct StatsdArgs {
    /// Statsd host for pipeline counters, disabled when unset
    #[arg(long, env = "PERFTAIL_STATSD_HOST")]
    pub statsd_host: Option<String>,

    /// Statsd port
    #[arg(long, env = "PERFTAIL_STATSD_PORT", default_value = "8125")]
    pub statsd_port: u16,

    /// Prefix for metric names
    #[arg(long, env = "PERFTAIL_STATSD_PREFIX", default_value = DEFAULT_STATSD_PREFIX)]
    pub statsd_prefix: String,
}

impl Default for StatsdArgs {
    fn default() -> Self {
        Self {
            statsd_host: None,
            statsd_port: DEFAULT_STATSD_PORT,
            statsd_prefix: DEFAULT_STATSD_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Args, Clone, Deserialize)]
#[serde(default)]
pub struct AgentRun {
    /// Sink that receives the events
    #[arg(value_enum, long, env = "PERFTAIL_SINK", default_value = "queue")]
    pub sink: SinkArg,

    /// Sink host
    #[arg(long, env = "PERFTAIL_HOST")]
    pub host: String,

    /// Sink port, defaults to 6379 for the queue and 5555 for the collector
    #[arg(long, env = "PERFTAIL_PORT")]
    pub port: Option<u16>,

    /// Queue database index
    #[arg(long, env = "PERFTAIL_DB", default_value = "0")]
    pub db: u32,

    /// Queue name
    #[arg(long, env = "PERFTAIL_QUEUE", default_value = DEFAULT_QUEUE_NAME)]
    pub queue: String,

    /// Extra tags added to collector events
    #[arg(long = "tag", env = "PERFTAIL_TAGS", value_delimiter = ',')]
    pub tags: Vec<String>,

    /// Debug logging
    #[arg(long, env = "PERFTAIL_DEBUG", default_value = "false")]
    pub debug: bool,

    /// Fixed event ttl in seconds (collector only)
    #[arg(long, env = "PERFTAIL_TTL")]
    pub ttl: Option<f64>,

    /// Multiplier applied to the time since the last check to derive the ttl (collector only)
    #[arg(long, env = "PERFTAIL_TTL_PAD")]
    pub ttl_pad: Option<f64>,

    /// Floor for ttls derived with --ttl-pad
    #[arg(long, env = "PERFTAIL_MIN_TTL", default_value = "60")]
    pub min_ttl: f64,

    /// Long output handling, defaults to separate for the queue and append for the collector
    #[arg(value_enum, long, env = "PERFTAIL_DETAILS")]
    pub details: Option<DetailsArg>,

    /// Capacity of the queue between the file followers and the sink
    #[arg(long, env = "PERFTAIL_QUEUE_SIZE", default_value = "10")]
    pub queue_size: usize,

    /// Connect timeout for the sink
    #[arg(
        long,
        env = "PERFTAIL_CONNECT_TIMEOUT",
        default_value = "5s",
        value_parser = humantime::parse_duration
    )]
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Timeout for delivering one event
    #[arg(
        long,
        env = "PERFTAIL_SEND_TIMEOUT",
        default_value = "5s",
        value_parser = humantime::parse_duration
    )]
    #[serde(with = "humantime_serde")]
    pub send_timeout: Duration,

    #[command(flatten)]
    pub statsd: StatsdArgs,

    #[command(flatten)]
    pub file_receiver: FileReceiverArgs,
}

impl Default for AgentRun {
    fn default() -> Self {
        AgentRun {
            sink: SinkArg::Queue,
            host: String::new(),
            port: None,
            db: 0,
            queue: DEFAULT_QUEUE_NAME.to_string(),
            tags: Vec::new(),
            debug: false,
            ttl: None,
            ttl_pad: None,
            min_ttl: DEFAULT_MIN_TTL_SECS,
            details: None,
            queue_size: DEFAULT_QUEUE_SIZE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            statsd: StatsdArgs::default(),
            file_receiver: FileReceiverArgs::default(),
        }
    }
}

/// Connection settings for the selected sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkConfig {
    Queue(QueueSinkConfig),
    Collector(CollectorSinkConfig),
}

impl AgentRun {
    /// Checks that hold regardless of which sink is used.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::MissingHost);
        }
        if self.queue_size == 0 {
            return Err(ConfigError::ZeroQueueSize);
        }
        Ok(())
    }

    pub fn build_parser_config(&self) -> Result<ParserConfig, ConfigError> {
        let config = match self.sink {
            SinkArg::Queue => {
                if self.ttl.is_some() || self.ttl_pad.is_some() {
                    return Err(ConfigError::TtlNotSupported);
                }
                ParserConfig::new(
                    TtlPolicy::Unset,
                    self.details.map(Into::into).unwrap_or(DetailMode::Separate),
                )
            }
            SinkArg::Collector => {
                let ttl = match (self.ttl_pad, self.ttl) {
                    (Some(pad), _) => TtlPolicy::FromLastCheck {
                        pad,
                        min: self.min_ttl,
                    },
                    (None, Some(ttl)) => TtlPolicy::Fixed(ttl),
                    (None, None) => TtlPolicy::Unset,
                };
                ParserConfig::new(
                    ttl,
                    self.details.map(Into::into).unwrap_or(DetailMode::Append),
                )
            }
        };

        config.validate().map_err(ConfigError::Parser)?;
        Ok(config)
    }

    pub fn build_sink_config(&self) -> SinkConfig {
        match self.sink {
            SinkArg::Queue => SinkConfig::Queue(QueueSinkConfig {
                host: self.host.clone(),
                port: self.port.unwrap_or(DEFAULT_QUEUE_PORT),
                db: self.db,
                queue: self.queue.clone(),
            }),
            SinkArg::Collector => SinkConfig::Collector(CollectorSinkConfig {
                host: self.host.clone(),
                port: self.port.unwrap_or(DEFAULT_COLLECTOR_PORT),
                tags: self.tags.clone(),
            }),
        }
    }

    pub fn build_delivery_config(&self) -> DeliveryConfig {
        DeliveryConfig {
            connect_timeout: self.connect_timeout,
            send_timeout: self.send_timeout,
        }
    }

    pub fn build_statsd_config(&self) -> Option<StatsdConfig> {
        self.statsd.statsd_host.as_ref().map(|host| StatsdConfig {
            host: host.clone(),
            port: self.statsd.statsd_port,
            prefix: self.statsd.statsd_prefix.clone(),
        })
    }
}
