//! Streamed PCM chunk reader for the camera audio endpoint.

use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::error::Result;

/// HTTP body stream sliced into fixed-size PCM chunks.
///
/// Accumulated bytes live on the struct, so dropping a `read_chunk`
/// future mid-read loses nothing (the read is cancel-safe and can be
/// raced against a stop signal).
pub struct AudioChunkStream {
    source: BoxStream<'static, reqwest::Result<Bytes>>,
    buf: BytesMut,
    chunk_bytes: usize,
}

impl AudioChunkStream {
    /// Open the camera audio endpoint and stream its body.
    pub async fn open(
        client: &reqwest::Client,
        url: &str,
        auth: Option<(&str, &str)>,
        chunk_bytes: usize,
    ) -> Result<Self> {
        let mut request = client.get(url);
        if let Some((user, pass)) = auth {
            request = request.basic_auth(user, Some(pass));
        }
        let response = request.send().await?.error_for_status()?;
        tracing::debug!(url = %url, "Audio stream opened");
        Ok(Self::from_stream(response.bytes_stream().boxed(), chunk_bytes))
    }

    /// Build from any in-memory byte stream.
    pub fn from_stream(
        source: BoxStream<'static, reqwest::Result<Bytes>>,
        chunk_bytes: usize,
    ) -> Self {
        Self {
            source,
            buf: BytesMut::new(),
            chunk_bytes: chunk_bytes.max(2),
        }
    }

    /// Next fixed-size chunk, or `None` once the stream ends.
    ///
    /// A trailing partial chunk at end-of-stream is discarded.
    pub async fn read_chunk(&mut self) -> Result<Option<Bytes>> {
        while self.buf.len() < self.chunk_bytes {
            match self.source.next().await {
                Some(Ok(bytes)) => self.buf.extend_from_slice(&bytes),
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(None),
            }
        }
        Ok(Some(self.buf.split_to(self.chunk_bytes).freeze()))
    }
}

// ============================================================
// Tests
// ============================================================
