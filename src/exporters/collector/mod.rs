// SPDX-License-Identifier: Apache-2.0

//! Monitoring collector sink.
//!
//! Each event is submitted as a protobuf `Msg` framed by a 4-byte big-endian
//! length, and the collector answers every message with a framed `Msg`
//! carrying `ok` or an error string.

pub mod convert;
pub mod proto;

use bytes::{BufMut, BytesMut};
use prost::Message;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::event::Event;
use crate::exporters::Sink;
use crate::exporters::error::{Result, SinkError};
use convert::convert_event;

pub const DEFAULT_COLLECTOR_PORT: u16 = 5555;

/// Replies larger than this are treated as a protocol error
const MAX_REPLY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorSinkConfig {
    pub host: String,
    pub port: u16,
    /// Added after the `perfdata` tag on every event
    pub tags: Vec<String>,
}

impl CollectorSinkConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_COLLECTOR_PORT,
            tags: Vec::new(),
        }
    }
}

pub struct CollectorConnection {
    stream: TcpStream,
    buf: BytesMut,
}

impl CollectorConnection {
    async fn write_msg(&mut self, msg: &proto::Msg) -> Result<()> {
        let len = msg.encoded_len();
        let frame_len = u32::try_from(len)
            .map_err(|_| SinkError::Protocol(format!("message of {} bytes is too large", len)))?;

        self.buf.clear();
        self.buf.reserve(4 + len);
        self.buf.put_u32(frame_len);
        msg.encode(&mut self.buf)
            .map_err(|e| SinkError::Protocol(e.to_string()))?;

        self.stream.write_all(&self.buf).await?;
        Ok(())
    }

    async fn read_msg(&mut self) -> Result<proto::Msg> {
        let len = self.stream.read_u32().await? as usize;
        if len > MAX_REPLY_BYTES {
            return Err(SinkError::Protocol(format!(
                "reply of {} bytes is too large",
                len
            )));
        }

        self.buf.clear();
        self.buf.resize(len, 0);
        self.stream.read_exact(&mut self.buf).await?;
        Ok(proto::Msg::decode(&self.buf[..])?)
    }
}

pub struct CollectorSink {
    config: CollectorSinkConfig,
}

impl CollectorSink {
    pub fn new(config: CollectorSinkConfig) -> Self {
        Self { config }
    }
}

impl Sink for CollectorSink {
    type Connection = CollectorConnection;

    fn name(&self) -> &'static str {
        "collector"
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    async fn connect(&self) -> Result<CollectorConnection> {
        let stream = TcpStream::connect((self.config.host.as_str(), self.config.port))
            .await
            .map_err(|source| SinkError::Connect {
                endpoint: self.endpoint(),
                source,
            })?;
        stream.set_nodelay(true)?;

        Ok(CollectorConnection {
            stream,
            buf: BytesMut::new(),
        })
    }

    async fn send(&self, conn: &mut CollectorConnection, event: &Event) -> Result<()> {
        let msg = proto::Msg {
            events: vec![convert_event(event, &self.config.tags)],
            ..Default::default()
        };
        conn.write_msg(&msg).await?;

        let reply = conn.read_msg().await?;
        if reply.ok == Some(true) {
            Ok(())
        } else {
            Err(SinkError::Rejected(
                reply
                    .error
                    .unwrap_or_else(|| "collector did not acknowledge the event".to_string()),
            ))
        }
    }

    async fn close(&self, mut conn: CollectorConnection) {
        let _ = conn.stream.shutdown().await;
    }
}
