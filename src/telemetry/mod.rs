// SPDX-License-Identifier: Apache-2.0

//! Pipeline metrics: parse failures and delivered events.
//!
//! Reporter handles are passed explicitly to the components that count.

pub mod statsd;

pub use statsd::{StatsdConfig, StatsdReporter};

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

pub trait Counter<T> {
    fn add(&self, value: T);
}

/// Sink for the two pipeline counters.
pub trait MetricsReporter: Send + Sync {
    /// A line failed to parse and was dropped.
    fn bad_line(&self);

    /// An event was accepted by the sink.
    fn delivered(&self);
}

/// Used when no metrics collector is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

impl MetricsReporter for NoopReporter {
    fn bad_line(&self) {}

    fn delivered(&self) {}
}

/// Keeps the counts in memory.
#[derive(Debug, Default)]
pub struct CountingReporter {
    bad_lines: AtomicU64,
    delivered: AtomicU64,
}

impl CountingReporter {
    pub fn bad_lines(&self) -> u64 {
        self.bad_lines.load(Ordering::Relaxed)
    }

    pub fn delivered_events(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}

impl MetricsReporter for CountingReporter {
    fn bad_line(&self) {
        self.bad_lines.fetch_add(1, Ordering::Relaxed);
    }

    fn delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }
}

/// Statsd when a host is configured, otherwise a no-op.
pub fn build_reporter(
    config: Option<StatsdConfig>,
) -> std::io::Result<Arc<dyn MetricsReporter>> {
    match config {
        Some(config) => {
            let reporter = StatsdReporter::new(&config)?;
            info!(
                host = %config.host,
                port = config.port,
                prefix = %config.prefix,
                "Reporting metrics to statsd"
            );
            Ok(Arc::new(reporter))
        }
        None => {
            info!("No statsd host configured, metrics are disabled");
            Ok(Arc::new(NoopReporter))
        }
    }
}
