// SPDX-License-Identifier: Apache-2.0

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;
use tracing::debug;

use super::{Counter, MetricsReporter};

pub const DEFAULT_STATSD_PORT: u16 = 8125;
pub const DEFAULT_STATSD_PREFIX: &str = "nagios.perfdata";

const BAD_LINES_METRIC: &str = "bad-lines";
const EVENTS_METRIC: &str = "events";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsdConfig {
    pub host: String,
    pub port: u16,
    pub prefix: String,
}

impl StatsdConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_STATSD_PORT,
            prefix: DEFAULT_STATSD_PREFIX.to_string(),
        }
    }
}

/// One statsd counter, written as `<name>:<value>|c` datagrams.
#[derive(Clone)]
pub struct StatsdCounter {
    socket: Arc<UdpSocket>,
    name: String,
}

impl Counter<u64> for StatsdCounter {
    fn add(&self, value: u64) {
        let datagram = format!("{}:{}|c", self.name, value);
        // Metrics are best effort
        if let Err(e) = self.socket.send(datagram.as_bytes()) {
            debug!(metric = %self.name, error = %e, "Failed to send statsd datagram");
        }
    }
}

pub struct StatsdReporter {
    bad_lines: StatsdCounter,
    events: StatsdCounter,
}

impl StatsdReporter {
    pub fn new(config: &StatsdConfig) -> io::Result<Self> {
        let target = (config.host.as_str(), config.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("statsd host {} did not resolve", config.host),
                )
            })?;

        let local: SocketAddr = if target.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local)?;
        socket.connect(target)?;
        socket.set_nonblocking(true)?;
        let socket = Arc::new(socket);

        let counter = |metric: &str| StatsdCounter {
            socket: socket.clone(),
            name: metric_name(&config.prefix, metric),
        };

        Ok(Self {
            bad_lines: counter(BAD_LINES_METRIC),
            events: counter(EVENTS_METRIC),
        })
    }
}

impl MetricsReporter for StatsdReporter {
    fn bad_line(&self) {
        self.bad_lines.add(1);
    }

    fn delivered(&self) {
        self.events.add(1);
    }
}

fn metric_name(prefix: &str, metric: &str) -> String {
    let prefix = prefix.trim_end_matches('.');
    if prefix.is_empty() {
        metric.to_string()
    } else {
        format!("{}.{}", prefix, metric)
    }
}
