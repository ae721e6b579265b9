//! JSON-RPC message framing over async byte streams.

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const MAX_HEADER_BYTES: usize = 8192;
pub const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Framing {
    /// One JSON document per line (MCP stdio).
    #[default]
    Newline,
    /// `Content-Length: N\r\n\r\n` headers before each body.
    ContentLength,
}

/// Read one message body. `Ok(None)` on clean EOF between messages.
pub async fn read_message<R>(reader: &mut R, framing: Framing) -> anyhow::Result<Option<Vec<u8>>>
where
    R: AsyncBufRead + Unpin,
{
    match framing {
        Framing::Newline => loop {
            let mut line = Vec::new();
            let n = reader.read_until(b'\n', &mut line).await.context("read line")?;
            if n == 0 {
                return Ok(None);
            }
            while line.last().is_some_and(|b| *b == b'\n' || *b == b'\r') {
                line.pop();
            }
            // Blank keep-alive lines carry nothing.
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return Ok(Some(line));
        },
        Framing::ContentLength => read_content_length(reader).await,
    }
}

async fn read_content_length<R>(reader: &mut R) -> anyhow::Result<Option<Vec<u8>>>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_len: Option<usize> = None;
    let mut header_bytes = 0usize;
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await.context("read header")?;
        if n == 0 {
            if header_bytes == 0 {
                return Ok(None);
            }
            return Err(anyhow!("stream closed inside message headers"));
        }
        header_bytes += n;
        if header_bytes > MAX_HEADER_BYTES {
            return Err(anyhow!("header too large"));
        }

        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            if content_len.is_none() && header_bytes <= 2 {
                // Stray separator between messages.
                header_bytes = 0;
                continue;
            }
            break;
        }
        let Some((k, v)) = line.split_once(':') else {
            continue;
        };
        if k.trim().eq_ignore_ascii_case("content-length") {
            content_len = Some(v.trim().parse::<usize>().context("bad Content-Length")?);
        }
    }

    let len = content_len.context("missing Content-Length")?;
    if len > MAX_BODY_BYTES {
        return Err(anyhow!("Content-Length {len} exceeds limit of {MAX_BODY_BYTES} bytes"));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await.context("read body")?;
    Ok(Some(body))
}

pub async fn write_message<W, T>(writer: &mut W, framing: Framing, msg: &T) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize + ?Sized,
{
    let body = serde_json::to_vec(msg).context("failed to encode JSON")?;
    match framing {
        Framing::Newline => {
            writer.write_all(&body).await.context("failed to write body")?;
            writer.write_all(b"\n").await.context("failed to write newline")?;
        }
        Framing::ContentLength => {
            let header = format!("Content-Length: {}\r\n\r\n", body.len());
            writer
                .write_all(header.as_bytes())
                .await
                .context("failed to write header")?;
            writer.write_all(&body).await.context("failed to write body")?;
        }
    }
    writer.flush().await.context("failed to flush")?;
    Ok(())
}

/// Decode a body; typed convenience for callers that know the shape.
pub fn decode<T: for<'de> Deserialize<'de>>(raw: &[u8]) -> anyhow::Result<T> {
    serde_json::from_slice(raw).context("invalid JSON-RPC message")
}
