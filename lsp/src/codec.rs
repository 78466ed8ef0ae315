//! JSON-RPC framing codec for LSP communication.
//!
//! LSP uses `Content-Length: N\r\n\r\n{json}` framing over stdin/stdout.
//! [`FrameDecoder`] turns arbitrary byte chunks into decoded messages and
//! [`FrameWriter`] writes framed messages to an async writer.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::io::{AsyncWrite, AsyncWriteExt};

const HEADER_SEPARATOR: &[u8] = b"\r\n\r\n";

/// One item extracted from the inbound byte stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A complete JSON-RPC object.
    Message(Map<String, Value>),
    /// Bytes that did not carry a `Content-Length` header, surfaced as text.
    Stray(String),
}

/// Incremental decoder over a growing byte buffer.
///
/// Bytes are appended with [`FrameDecoder::push`]; every complete frame
/// buffered so far is returned. Partial frames stay buffered until the rest
/// arrives.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes` and extract every complete frame now available.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Decoded> {
        self.buffer.extend_from_slice(bytes);

        let mut out = Vec::new();
        while let Some(decoded) = self.next_frame() {
            if let Some(item) = decoded {
                out.push(item);
            }
        }
        out
    }

    /// Number of bytes waiting for the rest of a frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Try to consume one frame from the buffer.
    ///
    /// `None` means more bytes are needed. `Some(None)` means bytes were
    /// consumed but produced nothing (a malformed or non-object payload).
    fn next_frame(&mut self) -> Option<Option<Decoded>> {
        let header_end = find_separator(&self.buffer)?;

        let Some(content_length) = parse_content_length(&self.buffer[..header_end]) else {
            // No usable header: the whole buffer is treated as stray output.
            let text = String::from_utf8_lossy(&self.buffer).into_owned();
            self.buffer.clear();
            return Some(Some(Decoded::Stray(text)));
        };

        let body_start = header_end + HEADER_SEPARATOR.len();
        let frame_end = body_start.checked_add(content_length)?;
        if self.buffer.len() < frame_end {
            tracing::trace!(
                needed = frame_end - self.buffer.len(),
                "Incomplete LSP frame, waiting for more bytes"
            );
            return None;
        }

        let body: Vec<u8> = self.buffer.drain(..frame_end).skip(body_start).collect();
        match serde_json::from_slice::<Value>(&body) {
            Ok(Value::Object(map)) => Some(Some(Decoded::Message(map))),
            Ok(_) => {
                tracing::trace!("Dropping non-object JSON-RPC payload");
                Some(None)
            }
            Err(e) => {
                tracing::trace!("Dropping malformed JSON-RPC payload: {e}");
                Some(None)
            }
        }
    }
}

fn find_separator(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(HEADER_SEPARATOR.len())
        .position(|window| window == HEADER_SEPARATOR)
}

/// Extract `Content-Length` from a header block, matching the key
/// case-insensitively. Other headers (e.g. `Content-Type`) are ignored.
fn parse_content_length(header: &[u8]) -> Option<usize> {
    let header = String::from_utf8_lossy(header);
    header.split("\r\n").find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.trim().eq_ignore_ascii_case("Content-Length") {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}

/// Serialize `msg` as one framed message: header followed by the compact
/// JSON body. The length counts UTF-8 bytes.
pub fn encode_frame<T: Serialize + ?Sized>(msg: &T) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(msg).context("serializing JSON-RPC frame")?;
    let mut frame = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Writes JSON-RPC frames to an async writer.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write one framed message in a single `write_all`, then flush.
    pub async fn write_frame<T: Serialize + ?Sized>(&mut self, msg: &T) -> Result<()> {
        let frame = encode_frame(msg)?;
        self.writer
            .write_all(&frame)
            .await
            .context("writing frame")?;
        self.writer.flush().await.context("flushing frame")?;
        Ok(())
    }
}
