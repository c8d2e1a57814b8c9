//! JPEG frame extraction from a motion-JPEG byte stream
//!
//! Upstream devices push a continuous byte stream in which each still image
//! is delimited by the JPEG start-of-image (`FF D8`) and end-of-image
//! (`FF D9`) markers. How the transport chunks that stream is irrelevant:
//! [`FrameBuffer`] accumulates bytes and hands out complete frames only.
//!
//! Resynchronization rule: a frame runs from the first start marker in the
//! buffer to the first end marker after it. Start markers in between are
//! not treated specially and end up inside the frame.

use bytes::{Bytes, BytesMut};

use crate::error::{ProxyError, ProxyResult};

pub const START_OF_IMAGE: [u8; 2] = [0xFF, 0xD8];
pub const END_OF_IMAGE: [u8; 2] = [0xFF, 0xD9];

/// Bounded accumulator for one video session
///
/// Holds only bytes received since the last emitted frame boundary. Once
/// those exceed `max_len` without forming a frame, the stream is considered
/// corrupt.
#[derive(Debug)]
pub struct FrameBuffer {
    buf: BytesMut,
    max_len: usize,
    /// Offset of the start marker of the frame being assembled
    start: Option<usize>,
    /// Everything before this offset has already been searched for the marker
    /// currently looked for
    scanned: usize,
}

impl FrameBuffer {
    #[must_use]
    pub fn new(max_len: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_len,
            start: None,
            scanned: 0,
        }
    }

    /// Append a chunk as received from the transport.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Remove and return the next complete frame, markers included.
    pub fn next_frame(&mut self) -> Option<Bytes> {
        let start = match self.start {
            Some(start) => start,
            None => {
                let Some(pos) = find_marker(&self.buf[self.scanned..], START_OF_IMAGE) else {
                    // keep a trailing 0xFF searchable, it may pair with the next chunk
                    self.scanned = self.buf.len().saturating_sub(1);
                    return None;
                };
                let start = self.scanned + pos;
                self.start = Some(start);
                self.scanned = start + START_OF_IMAGE.len();
                start
            }
        };

        let Some(pos) = find_marker(&self.buf[self.scanned..], END_OF_IMAGE) else {
            self.scanned = self
                .buf
                .len()
                .saturating_sub(1)
                .max(start + START_OF_IMAGE.len());
            return None;
        };
        let end = self.scanned + pos + END_OF_IMAGE.len();

        // Drops anything that preceded the start marker along with the frame.
        let mut consumed = self.buf.split_to(end);
        let frame = consumed.split_off(start).freeze();
        self.start = None;
        self.scanned = 0;
        Some(frame)
    }

    /// Fail once the pending bytes outgrow the cap.
    pub fn ensure_within_limit(&self) -> ProxyResult<()> {
        if self.buf.len() > self.max_len {
            return Err(ProxyError::StreamCorruption(format!(
                "{} bytes buffered without a complete frame (limit {})",
                self.buf.len(),
                self.max_len
            )));
        }
        Ok(())
    }

    /// Bytes buffered towards the next frame
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

fn find_marker(haystack: &[u8], marker: [u8; 2]) -> Option<usize> {
    haystack.windows(2).position(|window| window == marker)
}
