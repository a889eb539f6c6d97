//! Minimal RESP2 connection for the shared store
//!
//! Implements exactly the command subset the cache needs: GET, SET with PX,
//! DEL, and PING. Commands go out as arrays of bulk strings; replies are
//! parsed by their leading type byte. Server error replies (`-ERR ...`)
//! surface as non-retryable protocol errors, transport failures as retryable
//! connection errors.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;

use super::transport::SharedConnection;
use crate::cache::error::CacheError;

/// Parsed RESP reply
#[derive(Debug)]
enum Reply {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Option<Vec<u8>>),
}

/// A buffered RESP connection over TCP
pub struct RespConnection {
    stream: BufStream<TcpStream>,
}

impl RespConnection {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream: BufStream::new(stream),
        }
    }

    /// Write one command as a RESP array of bulk strings and flush
    async fn send_command(&mut self, args: &[&[u8]]) -> Result<(), CacheError> {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(format!("*{}\r\n", args.len()).as_bytes());
        for arg in args {
            buf.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
            buf.extend_from_slice(arg);
            buf.extend_from_slice(b"\r\n");
        }
        self.stream.write_all(&buf).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn read_line(&mut self) -> Result<String, CacheError> {
        let mut line = String::new();
        let read = self.stream.read_line(&mut line).await?;
        if read == 0 {
            return Err(CacheError::connection("shared store closed the connection"));
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(line)
    }

    async fn read_reply(&mut self) -> Result<Reply, CacheError> {
        let line = self.read_line().await?;
        let (kind, rest) = match line.split_at_checked(1) {
            Some(parts) => parts,
            None => return Err(CacheError::protocol("empty reply line")),
        };
        match kind {
            "+" => Ok(Reply::Simple(rest.to_string())),
            "-" => Ok(Reply::Error(rest.to_string())),
            ":" => rest
                .parse::<i64>()
                .map(Reply::Integer)
                .map_err(|_| CacheError::protocol(format!("bad integer reply '{}'", rest))),
            "$" => {
                let len = rest
                    .parse::<i64>()
                    .map_err(|_| CacheError::protocol(format!("bad bulk length '{}'", rest)))?;
                if len < 0 {
                    return Ok(Reply::Bulk(None));
                }
                let mut payload = vec![0u8; len as usize];
                self.stream.read_exact(&mut payload).await?;
                let mut crlf = [0u8; 2];
                self.stream.read_exact(&mut crlf).await?;
                if &crlf != b"\r\n" {
                    return Err(CacheError::protocol("bulk reply missing terminator"));
                }
                Ok(Reply::Bulk(Some(payload)))
            }
            other => Err(CacheError::protocol(format!(
                "unsupported reply type '{}'",
                other
            ))),
        }
    }
}

#[async_trait]
impl SharedConnection for RespConnection {
    async fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let args: [&[u8]; 2] = [b"GET", key.as_bytes()];
        self.send_command(&args).await?;
        match self.read_reply().await? {
            Reply::Bulk(value) => Ok(value),
            Reply::Error(msg) => Err(CacheError::protocol(msg)),
            other => Err(CacheError::protocol(format!(
                "unexpected GET reply: {:?}",
                other
            ))),
        }
    }

    async fn set(&mut self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let px = ttl.as_millis().max(1).to_string();
        let args: [&[u8]; 5] = [b"SET", key.as_bytes(), value, b"PX", px.as_bytes()];
        self.send_command(&args).await?;
        match self.read_reply().await? {
            Reply::Simple(ok) if ok == "OK" => Ok(()),
            Reply::Error(msg) => Err(CacheError::protocol(msg)),
            other => Err(CacheError::protocol(format!(
                "unexpected SET reply: {:?}",
                other
            ))),
        }
    }

    async fn delete(&mut self, keys: &[String]) -> Result<u64, CacheError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut args: Vec<&[u8]> = Vec::with_capacity(keys.len() + 1);
        args.push(b"DEL");
        args.extend(keys.iter().map(|k| k.as_bytes()));
        self.send_command(&args).await?;
        match self.read_reply().await? {
            Reply::Integer(n) => Ok(n.max(0) as u64),
            Reply::Error(msg) => Err(CacheError::protocol(msg)),
            other => Err(CacheError::protocol(format!(
                "unexpected DEL reply: {:?}",
                other
            ))),
        }
    }

    async fn ping(&mut self) -> Result<(), CacheError> {
        let args: [&[u8]; 1] = [b"PING"];
        self.send_command(&args).await?;
        match self.read_reply().await? {
            Reply::Simple(pong) if pong == "PONG" => Ok(()),
            Reply::Error(msg) => Err(CacheError::protocol(msg)),
            other => Err(CacheError::protocol(format!(
                "unexpected PING reply: {:?}",
                other
            ))),
        }
    }
}
