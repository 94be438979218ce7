//! Content-Length message framing.
//!
//! Every message travels as `Content-Length: <n>\r\n\r\n<n bytes>`. The
//! writer emits exactly that envelope; the reader is a resynchronizing
//! state machine that tolerates unrecognized bytes between frames, as
//! debug adapters in the wild occasionally interleave stray output with
//! protocol traffic.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::DapError;

const HEADER_FIELD: &[u8] = b"Content-Length:";
const HEADER_END: &[u8] = b"\r\n\r\n";

/// Frames payloads onto a byte sink.
pub struct ContentWriter<W> {
    sink: W,
}

impl<W: AsyncWrite + Unpin> ContentWriter<W> {
    /// Wrap a byte sink.
    pub fn new(sink: W) -> Self {
        Self { sink }
    }

    /// Write one payload with its envelope and flush.
    pub async fn write(&mut self, payload: &[u8]) -> Result<(), DapError> {
        let header = format!("Content-Length: {}\r\n\r\n", payload.len());
        let io = |e: std::io::Error| DapError::Transport(e.to_string());
        self.sink.write_all(header.as_bytes()).await.map_err(io)?;
        self.sink.write_all(payload).await.map_err(io)?;
        self.sink.flush().await.map_err(io)?;
        Ok(())
    }

    /// Unwrap the underlying sink.
    pub fn into_inner(self) -> W {
        self.sink
    }
}

/// Deframes payloads from a byte source.
pub struct ContentReader<R> {
    source: R,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> ContentReader<R> {
    /// Wrap a byte source.
    pub fn new(source: R) -> Self {
        Self {
            source,
            buf: Vec::new(),
        }
    }

    /// Read one payload.
    ///
    /// Returns `Ok(None)` on a clean end of stream (no buffered partial
    /// frame). EOF in the middle of a header or body is a transport error.
    /// Bytes that precede a recognizable `Content-Length` header are
    /// discarded; header blocks without one are skipped entirely.
    pub async fn read(&mut self) -> Result<Option<Vec<u8>>, DapError> {
        let body_len = loop {
            if let Some(len) = self.take_header() {
                break len;
            }
            if self.fill().await? == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(DapError::Transport(
                    "stream closed mid-header".to_string(),
                ));
            }
        };

        while self.buf.len() < body_len {
            if self.fill().await? == 0 {
                return Err(DapError::Transport("stream closed mid-body".to_string()));
            }
        }

        let rest = self.buf.split_off(body_len);
        let payload = std::mem::replace(&mut self.buf, rest);
        Ok(Some(payload))
    }

    /// Unwrap the underlying source, discarding any buffered bytes.
    pub fn into_inner(self) -> R {
        self.source
    }

    // Consume one complete header block from the buffer, if present,
    // and return its content length. Blocks without a parsable
    // Content-Length are dropped and scanning continues.
    fn take_header(&mut self) -> Option<usize> {
        loop {
            let sep = find(&self.buf, HEADER_END)?;
            let len = parse_content_length(&self.buf[..sep]);
            self.buf.drain(..sep + HEADER_END.len());
            if let Some(len) = len {
                return Some(len);
            }
        }
    }

    async fn fill(&mut self) -> Result<usize, DapError> {
        let mut chunk = [0u8; 4096];
        let n = self
            .source
            .read(&mut chunk)
            .await
            .map_err(|e| DapError::Transport(e.to_string()))?;
        self.buf.extend_from_slice(&chunk[..n]);
        Ok(n)
    }
}

// Scan a header block for the first `Content-Length:` whose value parses.
// Recognition is ASCII and case-sensitive; anything before the match is
// resynchronization garbage.
fn parse_content_length(header: &[u8]) -> Option<usize> {
    let mut start = 0;
    while let Some(idx) = find(&header[start..], HEADER_FIELD) {
        let value_start = start + idx + HEADER_FIELD.len();
        let value_end = find(&header[value_start..], b"\r\n")
            .map(|i| value_start + i)
            .unwrap_or(header.len());
        if let Ok(text) = std::str::from_utf8(&header[value_start..value_end]) {
            if let Ok(len) = text.trim().parse::<usize>() {
                return Some(len);
            }
        }
        start = value_start;
    }
    None
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
