// SPDX-License-Identifier: Apache-2.0

//! Queue-backed event bus sink.
//!
//! Events are JSON-encoded and pushed onto a Redis list with `LPUSH`, where
//! an event processor picks them up.

pub mod payload;
pub mod resp;

use tokio::net::TcpStream;
use tracing::debug;

use crate::event::Event;
use crate::exporters::Sink;
use crate::exporters::error::{Result, SinkError};
use payload::encode_event;
use resp::{Reply, RespConnection};

pub const DEFAULT_QUEUE_PORT: u16 = 6379;
pub const DEFAULT_QUEUE_NAME: &str = "events";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSinkConfig {
    pub host: String,
    pub port: u16,
    /// Database index, selected on every connect when non-zero
    pub db: u32,
    /// List the events are pushed onto
    pub queue: String,
}

impl QueueSinkConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_QUEUE_PORT,
            db: 0,
            queue: DEFAULT_QUEUE_NAME.to_string(),
        }
    }
}

pub struct QueueSink {
    config: QueueSinkConfig,
}

impl QueueSink {
    pub fn new(config: QueueSinkConfig) -> Self {
        Self { config }
    }
}

impl Sink for QueueSink {
    type Connection = RespConnection;

    fn name(&self) -> &'static str {
        "queue"
    }

    fn endpoint(&self) -> String {
        format!("{}:{}/{}", self.config.host, self.config.port, self.config.db)
    }

    async fn connect(&self) -> Result<RespConnection> {
        let stream = TcpStream::connect((self.config.host.as_str(), self.config.port))
            .await
            .map_err(|source| SinkError::Connect {
                endpoint: self.endpoint(),
                source,
            })?;
        stream.set_nodelay(true)?;

        let mut conn = RespConnection::new(stream);
        if self.config.db != 0 {
            let db = self.config.db.to_string();
            match conn.command(&[b"SELECT".as_slice(), db.as_bytes()]).await? {
                Reply::Simple(status) if status == "OK" => {
                    debug!(db = self.config.db, "Selected queue database");
                }
                Reply::Error(e) => return Err(SinkError::Rejected(e)),
                other => {
                    return Err(SinkError::Protocol(format!(
                        "unexpected reply to SELECT: {:?}",
                        other
                    )));
                }
            }
        }

        Ok(conn)
    }

    async fn send(&self, conn: &mut RespConnection, event: &Event) -> Result<()> {
        let payload = encode_event(event)?;
        let reply = conn
            .command(&[
                b"LPUSH".as_slice(),
                self.config.queue.as_bytes(),
                payload.as_bytes(),
            ])
            .await?;

        match reply {
            Reply::Integer(_) => Ok(()),
            Reply::Error(e) => Err(SinkError::Rejected(e)),
            other => Err(SinkError::Protocol(format!(
                "unexpected reply to LPUSH: {:?}",
                other
            ))),
        }
    }

    async fn close(&self, conn: RespConnection) {
        conn.shutdown().await;
    }
}
