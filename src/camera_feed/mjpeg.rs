//! MJPEG frame extraction from the camera video endpoint.
//!
//! The camera emits multipart JPEG. Rather than parse part headers, this
//! scans for the JPEG SOI/EOI markers, which also survives cameras that
//! omit or mangle the multipart boundary lines.

use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::error::{Error, Result};

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Desync guard: no camera frame comes close to this.
const MAX_PENDING_BYTES: usize = 4 * 1024 * 1024;

pub struct MjpegStream {
    source: BoxStream<'static, reqwest::Result<Bytes>>,
    buf: BytesMut,
    read_timeout: Duration,
}

impl MjpegStream {
    /// Open the camera MJPEG endpoint and stream its body.
    pub async fn open(
        client: &reqwest::Client,
        url: &str,
        auth: Option<(&str, &str)>,
        read_timeout: Duration,
    ) -> Result<Self> {
        let mut request = client.get(url);
        if let Some((user, pass)) = auth {
            request = request.basic_auth(user, Some(pass));
        }
        let response = request.send().await?.error_for_status()?;
        tracing::debug!(url = %url, "Video stream opened");
        Ok(Self::from_stream(
            response.bytes_stream().boxed(),
            read_timeout,
        ))
    }

    /// Build from any in-memory byte stream.
    pub fn from_stream(
        source: BoxStream<'static, reqwest::Result<Bytes>>,
        read_timeout: Duration,
    ) -> Self {
        Self {
            source,
            buf: BytesMut::new(),
            read_timeout,
        }
    }

    /// Next complete JPEG frame (SOI through EOI), or `None` once the
    /// stream ends. Bytes between frames (multipart headers) are skipped.
    pub async fn next_frame(&mut self) -> Result<Option<Bytes>> {
        loop {
            if let Some(frame) = self.extract_frame() {
                return Ok(Some(frame));
            }
            let piece = tokio::time::timeout(self.read_timeout, self.source.next())
                .await
                .map_err(|_| Error::Stream("video read timed out".to_string()))?;
            match piece {
                Some(Ok(bytes)) => {
                    self.buf.extend_from_slice(&bytes);
                    if self.buf.len() > MAX_PENDING_BYTES {
                        return Err(Error::Stream(
                            "no frame markers in stream (desync)".to_string(),
                        ));
                    }
                }
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(None),
            }
        }
    }

    fn extract_frame(&mut self) -> Option<Bytes> {
        let start = find(&self.buf, &SOI)?;
        let end = start + 2 + find(&self.buf[start + 2..], &EOI)? + 2;
        let frame = Bytes::copy_from_slice(&self.buf[start..end]);
        self.buf.advance(end);
        Some(frame)
    }
}

fn find(haystack: &[u8], needle: &[u8; 2]) -> Option<usize> {
    haystack.windows(2).position(|w| w == needle)
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn mjpeg(pieces: Vec<Vec<u8>>) -> MjpegStream {
        let items: Vec<reqwest::Result<Bytes>> =
            pieces.into_iter().map(|p| Ok(Bytes::from(p))).collect();
        MjpegStream::from_stream(stream::iter(items).boxed(), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn extracts_frame_split_across_pieces() {
        let mut s = mjpeg(vec![
            b"--boundary\r\nContent-Type: image/jpeg\r\n\r\n\xFF\xD8\x01\x02".to_vec(),
            b"\x03\xFF\xD9--boundary".to_vec(),
        ]);
        let frame = s.next_frame().await.unwrap().unwrap();
        assert_eq!(&frame[..], b"\xFF\xD8\x01\x02\x03\xFF\xD9");
        assert!(s.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn extracts_back_to_back_frames() {
        let mut s = mjpeg(vec![b"\xFF\xD8\xAA\xFF\xD9\xFF\xD8\xBB\xFF\xD9".to_vec()]);
        let a = s.next_frame().await.unwrap().unwrap();
        assert_eq!(&a[..], b"\xFF\xD8\xAA\xFF\xD9");
        let b = s.next_frame().await.unwrap().unwrap();
        assert_eq!(&b[..], b"\xFF\xD8\xBB\xFF\xD9");
    }

    #[tokio::test]
    async fn eof_mid_frame_yields_none() {
        let mut s = mjpeg(vec![b"\xFF\xD8\x01\x02\x03".to_vec()]);
        assert!(s.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn skips_leading_garbage() {
        let mut s = mjpeg(vec![b"noise noise\xFF\xD8\x42\xFF\xD9".to_vec()]);
        let frame = s.next_frame().await.unwrap().unwrap();
        assert_eq!(&frame[..], b"\xFF\xD8\x42\xFF\xD9");
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_stream_times_out() {
        let mut s = MjpegStream::from_stream(
            stream::pending::<reqwest::Result<Bytes>>().boxed(),
            Duration::from_millis(200),
        );
        assert!(matches!(s.next_frame().await, Err(Error::Stream(_))));
    }

    #[tokio::test]
    async fn markerless_flood_is_rejected() {
        let mut s = mjpeg(vec![vec![0u8; MAX_PENDING_BYTES + 1]]);
        assert!(matches!(s.next_frame().await, Err(Error::Stream(_))));
    }
}
