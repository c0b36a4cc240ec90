// SPDX-License-Identifier: Apache-2.0

//! Minimal RESP (REdis Serialization Protocol) client codec.
//!
//! Commands are always sent as arrays of bulk strings. Replies are parsed
//! incrementally out of a read buffer so a reply split across TCP segments
//! is handled.

use bytes::{Buf, BufMut, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::exporters::error::{Result, SinkError};

const READ_BUFFER_BYTES: usize = 4 * 1024;

/// Largest bulk reply we are willing to buffer
const MAX_BULK_BYTES: usize = 512 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Option<Vec<u8>>),
    Array(Option<Vec<Reply>>),
}

/// Append `args` to `buf` as a RESP command.
pub fn encode_command(args: &[&[u8]], buf: &mut BytesMut) {
    buf.put_slice(format!("*{}\r\n", args.len()).as_bytes());
    for arg in args {
        buf.put_slice(format!("${}\r\n", arg.len()).as_bytes());
        buf.put_slice(arg);
        buf.put_slice(b"\r\n");
    }
}

/// Parse one reply from the front of `buf`.
///
/// Returns `Ok(None)` when `buf` does not hold a complete reply yet, and the
/// number of bytes consumed otherwise.
pub fn parse_reply(buf: &[u8]) -> std::result::Result<Option<(Reply, usize)>, String> {
    let Some(line_end) = find_crlf(buf) else {
        return Ok(None);
    };
    if line_end == 0 {
        return Err("empty reply line".to_string());
    }

    let line = std::str::from_utf8(&buf[1..line_end])
        .map_err(|_| "reply header is not valid UTF-8".to_string())?;
    let header_len = line_end + 2;

    match buf[0] {
        b'+' => Ok(Some((Reply::Simple(line.to_string()), header_len))),
        b'-' => Ok(Some((Reply::Error(line.to_string()), header_len))),
        b':' => {
            let n = parse_int(line)?;
            Ok(Some((Reply::Integer(n), header_len)))
        }
        b'$' => {
            let len = parse_int(line)?;
            if len < 0 {
                return Ok(Some((Reply::Bulk(None), header_len)));
            }
            let len = len as usize;
            if len > MAX_BULK_BYTES {
                return Err(format!("bulk reply of {} bytes is too large", len));
            }
            let total = header_len + len + 2;
            if buf.len() < total {
                return Ok(None);
            }
            if &buf[header_len + len..total] != b"\r\n" {
                return Err("bulk reply is not terminated by CRLF".to_string());
            }
            let data = buf[header_len..header_len + len].to_vec();
            Ok(Some((Reply::Bulk(Some(data)), total)))
        }
        b'*' => {
            let count = parse_int(line)?;
            if count < 0 {
                return Ok(Some((Reply::Array(None), header_len)));
            }
            let mut consumed = header_len;
            let mut items = Vec::new();
            for _ in 0..count {
                match parse_reply(&buf[consumed..])? {
                    Some((item, used)) => {
                        items.push(item);
                        consumed += used;
                    }
                    None => return Ok(None),
                }
            }
            Ok(Some((Reply::Array(Some(items)), consumed)))
        }
        other => Err(format!("unexpected reply type byte 0x{:02x}", other)),
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

fn parse_int(s: &str) -> std::result::Result<i64, String> {
    s.parse()
        .map_err(|_| format!("invalid integer '{}' in reply", s))
}

/// One connection to the queue server.
pub struct RespConnection {
    stream: TcpStream,
    read_buf: BytesMut,
    write_buf: BytesMut,
}

impl RespConnection {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(READ_BUFFER_BYTES),
            write_buf: BytesMut::new(),
        }
    }

    /// Send one command and wait for its reply.
    pub async fn command(&mut self, args: &[&[u8]]) -> Result<Reply> {
        self.write_buf.clear();
        encode_command(args, &mut self.write_buf);
        self.stream.write_all(&self.write_buf).await?;
        self.read_reply().await
    }

    async fn read_reply(&mut self) -> Result<Reply> {
        loop {
            if let Some((reply, used)) =
                parse_reply(&self.read_buf).map_err(SinkError::Protocol)?
            {
                self.read_buf.advance(used);
                return Ok(reply);
            }

            let n = self.stream.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(SinkError::Protocol(
                    "connection closed by server".to_string(),
                ));
            }
        }
    }

    pub async fn shutdown(mut self) {
        let _ = self.stream.shutdown().await;
    }
}
