//! Blank-line frame codec for the answer event stream.
//!
//! The service delivers its answer as blank-line-delimited frames, each
//! holding one or more `data:` lines (Server-Sent Events framing). Frames
//! are delimited by either `\n\n` or `\r\n\r\n`; whichever occurs first in
//! the buffer wins.
//!
//! Splitting happens on raw bytes. Both delimiters are ASCII, so a
//! multi-byte UTF-8 sequence split across two reads simply stays in the
//! buffer until its frame is complete and is only decoded to text then.
//!
//! # Usage
//!
//! Use [`FrameCodec`] with [`tokio_util::codec::FramedRead`] when the
//! transport is an [`AsyncRead`](tokio::io::AsyncRead), or drive it by hand
//! through [`FrameDecoder`] when bytes arrive as discrete slices.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::warn;

use crate::{AppError, Result};

/// Maximum size of a single undelimited frame: 4 MiB.
///
/// A buffer growing past this limit without a delimiter makes
/// [`FrameCodec::decode`] return [`AppError::Transport`] with
/// `"frame too long"`.
pub const MAX_FRAME_BYTES: usize = 4 * 1_048_576;

const LF_DELIMITER: &[u8] = b"\n\n";
const CRLF_DELIMITER: &[u8] = b"\r\n\r\n";

/// One delimiter-bounded block extracted from the stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    /// Value of an `event:` line, if the frame carried one.
    pub event: Option<String>,
    /// Contents of every `data:` line, prefix stripped, in order.
    pub data: Vec<String>,
}

impl Frame {
    /// Parse the text of one frame into its fields.
    ///
    /// Lines other than `event:` and `data:` (comments, `id:`, `retry:`)
    /// carry nothing the chat protocol uses and are ignored.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut frame = Self::default();
        for line in text.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if let Some(data) = line.strip_prefix("data:") {
                frame
                    .data
                    .push(data.strip_prefix(' ').unwrap_or(data).to_owned());
            } else if let Some(event) = line.strip_prefix("event:") {
                let event = event.trim();
                if !event.is_empty() {
                    frame.event = Some(event.to_owned());
                }
            }
        }
        frame
    }

    /// Joined `data:` payload, or `None` for keep-alive frames whose data
    /// lines are all blank.
    #[must_use]
    pub fn payload(&self) -> Option<String> {
        if self.data.iter().all(|line| line.trim().is_empty()) {
            return None;
        }
        Some(self.data.join("\n"))
    }
}

/// Frame codec for the answer stream.
///
/// # Decoder
///
/// Returns `Ok(None)` while the buffer holds no complete frame. At EOF any
/// non-empty remainder is emitted as a final frame even without a trailing
/// delimiter.
#[derive(Debug)]
pub struct FrameCodec {
    max_frame_bytes: usize,
    /// Offset up to which the buffer is known to hold no delimiter.
    next_index: usize,
}

impl FrameCodec {
    /// Create a new `FrameCodec` with the default [`MAX_FRAME_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_frame_bytes(MAX_FRAME_BYTES)
    }

    /// Create a codec with a custom frame size limit.
    #[must_use]
    pub fn with_max_frame_bytes(max_frame_bytes: usize) -> Self {
        Self {
            max_frame_bytes,
            next_index: 0,
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        // A delimiter straddling the previous scan end starts at most
        // three bytes before it.
        let from = self.next_index.saturating_sub(CRLF_DELIMITER.len() - 1);
        if let Some((start, len)) = find_delimiter(src, from) {
            self.next_index = 0;
            let raw = src.split_to(start);
            src.advance(len);
            return Ok(Some(frame_from_bytes(&raw)));
        }
        self.next_index = src.len();

        if src.len() > self.max_frame_bytes {
            return Err(AppError::Transport(format!(
                "frame too long: exceeded {} bytes",
                self.max_frame_bytes
            )));
        }

        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if src.is_empty() {
            return Ok(None);
        }
        self.next_index = 0;
        let raw = src.split();
        Ok(Some(frame_from_bytes(&raw)))
    }
}

/// Incremental frame decoder fed with arbitrary byte slices.
///
/// Wraps [`FrameCodec`] and its buffer so a read loop can push whatever the
/// transport delivered and collect the frames that became complete.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    codec: FrameCodec,
    buffer: BytesMut,
}

impl FrameDecoder {
    /// Create a decoder with an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes` and return every frame completed by them.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Transport`] when the pending frame exceeds the
    /// size limit.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(bytes);
        let mut frames = Vec::new();
        while let Some(frame) = self.codec.decode(&mut self.buffer)? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Flush the remainder at end of stream.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Transport`] when the pending frame exceeds the
    /// size limit.
    pub fn finish(&mut self) -> Result<Vec<Frame>> {
        let mut frames = Vec::new();
        while let Some(frame) = self.codec.decode_eof(&mut self.buffer)? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Number of bytes waiting for a delimiter.
    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }
}

// ── Private helpers ───────────────────────────────────────────────────────────

/// Locate the earliest frame delimiter at or after `from`, returning
/// `(offset, length)`.
fn find_delimiter(buf: &[u8], from: usize) -> Option<(usize, usize)> {
    (from..buf.len()).find_map(|i| {
        let rest = &buf[i..];
        if rest.starts_with(LF_DELIMITER) {
            Some((i, LF_DELIMITER.len()))
        } else if rest.starts_with(CRLF_DELIMITER) {
            Some((i, CRLF_DELIMITER.len()))
        } else {
            None
        }
    })
}

fn frame_from_bytes(raw: &[u8]) -> Frame {
    match std::str::from_utf8(raw) {
        Ok(text) => Frame::parse(text),
        Err(err) => {
            warn!(error = %err, "frame is not valid utf-8, decoding lossily");
            Frame::parse(&String::from_utf8_lossy(raw))
        }
    }
}
