//! Capped output capture.

use cadre_util::text::floor_char_boundary;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncReadExt};

/// A byte buffer that stops growing at `cap` and remembers that it did.
#[derive(Debug, Default)]
pub struct CappedBuffer {
    bytes: Vec<u8>,
    cap: usize,
    truncated: bool,
}

impl CappedBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            bytes: Vec::new(),
            cap,
            truncated: false,
        }
    }

    /// Append `chunk`, discarding whatever exceeds the cap.
    pub fn push(&mut self, chunk: &[u8]) {
        let room = self.cap.saturating_sub(self.bytes.len());
        if chunk.len() > room {
            self.bytes.extend_from_slice(&chunk[..room]);
            self.truncated = true;
        } else {
            self.bytes.extend_from_slice(chunk);
        }
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Decode as UTF-8 (lossy) without exceeding the cap.
    pub fn to_text(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.bytes).into_owned();
        if text.len() > self.cap {
            let end = floor_char_boundary(&text, self.cap);
            text.truncate(end);
        }
        text
    }
}

pub(crate) type SharedBuffer = Arc<Mutex<CappedBuffer>>;

/// Drain `reader` to EOF into `buffer`.
///
/// Reading continues past the cap so the writer never blocks on a full pipe.
pub(crate) async fn drain_into<R>(mut reader: R, buffer: SharedBuffer) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        if let Ok(mut buf) = buffer.lock() {
            buf.push(&chunk[..n]);
        }
    }
}
