//! Locates 30-byte frames in a raw serial byte stream.
//!
//! Frames may arrive split across reads; bytes are buffered until a full
//! window is available. Junk before a header is discarded, and a window
//! whose markers do not check out is skipped one byte at a time until the
//! next header lines up.

use crate::prelude::TransportError;
use crate::telemetry::log::LogManager;
use crate::wire::detection::Ingest;
use crate::wire::frame::{decode_frame, FRAME_HEADER, FRAME_LEN};
use crate::wire::timestamp::{capture_now, Timestamp};
use std::io::{ErrorKind, Read};

const READ_CHUNK: usize = 256;

pub struct SerialFramer<R> {
    reader: R,
    buffer: Vec<u8>,
    logger: LogManager,
}

impl<R: Read> SerialFramer<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(FRAME_LEN * 4),
            logger: LogManager::new("radarcore::transport::serial"),
        }
    }

    /// One read attempt. A read timeout yields an empty vector instead of
    /// stalling; a zero-length read means the stream is gone.
    pub fn poll(&mut self) -> Result<Vec<Ingest>, TransportError> {
        self.poll_at(capture_now())
    }

    pub fn poll_at(&mut self, captured_at: Timestamp) -> Result<Vec<Ingest>, TransportError> {
        let mut chunk = [0u8; READ_CHUNK];
        match self.reader.read(&mut chunk) {
            Ok(0) => return Err(TransportError::EndOfStream),
            Ok(n) => self.buffer.extend_from_slice(&chunk[..n]),
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                return Ok(Vec::new())
            }
            Err(err) => return Err(TransportError::Io(err)),
        }
        Ok(self.extract(captured_at))
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn extract(&mut self, captured_at: Timestamp) -> Vec<Ingest> {
        let mut out = Vec::new();
        loop {
            let Some(start) = find_header(&self.buffer) else {
                let keep = FRAME_HEADER.len() - 1;
                if self.buffer.len() > keep {
                    let cut = self.buffer.len() - keep;
                    self.buffer.drain(..cut);
                }
                break;
            };
            if start > 0 {
                self.buffer.drain(..start);
            }
            if self.buffer.len() < FRAME_LEN {
                break;
            }
            match decode_frame(&self.buffer[..FRAME_LEN], captured_at) {
                Ok(batch) => {
                    self.buffer.drain(..FRAME_LEN);
                    out.push(Ingest::Batch(batch));
                }
                Err(error) => {
                    self.logger
                        .warn(&format!("dropping misaligned window: {error}; resynchronising"));
                    self.buffer.drain(..1);
                    out.push(Ingest::Rejected { captured_at, error });
                }
            }
        }
        out
    }
}

fn find_header(bytes: &[u8]) -> Option<usize> {
    bytes
        .windows(FRAME_HEADER.len())
        .position(|window| window == FRAME_HEADER)
}
