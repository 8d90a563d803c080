//! Unwraps bus messages into frames. Message boundaries are guaranteed by
//! the broker, so no resynchronisation is attempted: each payload holds one
//! frame or several concatenated frames, as raw bytes or as ASCII hex.

use crate::prelude::FrameError;
use crate::telemetry::log::LogManager;
use crate::wire::detection::Ingest;
use crate::wire::frame::{decode_frame, FRAME_LEN};
use crate::wire::timestamp::Timestamp;

pub struct BusUnwrapper {
    logger: LogManager,
}

impl BusUnwrapper {
    pub fn new() -> Self {
        Self {
            logger: LogManager::new("radarcore::transport::bus"),
        }
    }

    pub fn unwrap_message(&self, payload: &[u8], captured_at: Timestamp) -> Vec<Ingest> {
        let bytes = match payload_bytes(payload) {
            Ok(bytes) => bytes,
            Err(error) => {
                self.logger.warn(&format!("ignoring bus payload: {error}"));
                return vec![Ingest::Rejected { captured_at, error }];
            }
        };

        let mut out = Vec::with_capacity(bytes.len() / FRAME_LEN + 1);
        let chunks = bytes.chunks_exact(FRAME_LEN);
        let remainder = chunks.remainder();
        for chunk in chunks {
            match decode_frame(chunk, captured_at) {
                Ok(batch) => out.push(Ingest::Batch(batch)),
                Err(error) => {
                    self.logger.warn(&format!("skipping bus frame: {error}"));
                    out.push(Ingest::Rejected { captured_at, error });
                }
            }
        }
        if !remainder.is_empty() {
            let error = FrameError::BadLength {
                expected: FRAME_LEN,
                actual: remainder.len(),
            };
            self.logger.warn(&format!("trailing bytes in bus payload: {error}"));
            out.push(Ingest::Rejected { captured_at, error });
        }
        out
    }
}

impl Default for BusUnwrapper {
    fn default() -> Self {
        Self::new()
    }
}

fn payload_bytes(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    let trimmed = payload.trim_ascii();
    if !trimmed.is_empty() && trimmed.iter().all(u8::is_ascii_hexdigit) {
        return hex::decode(trimmed).map_err(|err| FrameError::BadHex(err.to_string()));
    }
    Ok(payload.to_vec())
}
