pub mod detection;
pub mod frame;
pub mod timestamp;

pub use detection::{DetectionBatch, Ingest, RawDetectionSlot, SmoothedSample};
pub use frame::{decode_frame, decode_hex_frame, encode_frame, FRAME_FOOTER, FRAME_HEADER, FRAME_LEN};
pub use timestamp::{capture_now, Timestamp};
