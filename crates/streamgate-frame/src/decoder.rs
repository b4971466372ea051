use std::fmt::Write as _;
use std::iter::FusedIterator;

use bytes::Bytes;
use tracing::trace;

use crate::codec::{decode_frame, Frame};
use crate::cursor::ByteCursor;
use crate::error::{FrameError, Result};

/// Splits one datagram into frames.
///
/// Yields `Ok(frame)` for every valid frame in order. The first framing or
/// CRC error is yielded once as `Err` and ends the sequence; the bytes from
/// the failed frame onward are kept as [`residue`](Self::residue) for
/// diagnostics and otherwise discarded.
#[derive(Debug)]
pub struct FrameDecoder {
    cursor: ByteCursor,
    decoded: usize,
    residue: Option<Bytes>,
    finished: bool,
}

impl FrameDecoder {
    /// Start decoding a datagram.
    pub fn new(datagram: impl Into<Bytes>) -> Self {
        Self {
            cursor: ByteCursor::new(datagram),
            decoded: 0,
            residue: None,
            finished: false,
        }
    }

    /// Frames successfully decoded so far.
    pub fn frames_decoded(&self) -> usize {
        self.decoded
    }

    /// Bytes discarded after a decode error, starting at the failed frame.
    pub fn residue(&self) -> Option<&Bytes> {
        self.residue.as_ref()
    }

    /// Decode everything, returning the frames and the terminating error if any.
    pub fn collect_all(mut self) -> (Vec<Frame>, Option<FrameError>) {
        let mut frames = Vec::new();
        for item in self.by_ref() {
            match item {
                Ok(frame) => frames.push(frame),
                Err(err) => return (frames, Some(err)),
            }
        }
        (frames, None)
    }
}

impl Iterator for FrameDecoder {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let start = self.cursor.position();
        match decode_frame(&mut self.cursor) {
            Ok(Some(frame)) => {
                self.decoded += 1;
                trace!(
                    offset = start,
                    declared = frame.declared_len(),
                    "decoded frame"
                );
                Some(Ok(frame))
            }
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(err) => {
                self.finished = true;
                self.residue = Some(self.cursor.rest_from(start));
                self.cursor.take_rest();
                Some(Err(err))
            }
        }
    }
}

impl FusedIterator for FrameDecoder {}

/// Uppercase hex with a space between bytes: `"0A FF 10"`.
pub fn hex_dump(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 3);
    for (i, byte) in data.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{byte:02X}");
    }
    out
}
