//! Fixed-layout codec for the 30-byte LD2450 report frame.
//!
//! ```text
//! offset  0..4   header  AA FF 03 00
//! offset  4..12  slot 0  x | y | speed | resolution   (u16 little-endian each)
//! offset 12..20  slot 1
//! offset 20..28  slot 2
//! offset 28..30  footer  55 CC
//! ```
//!
//! `x`, `y` and `speed` are sign-magnitude: bit 15 set means positive, bit 15
//! clear means negative, bits 0..15 carry the magnitude. An all-zero slot
//! means no target is present on that channel.

use crate::prelude::{FrameError, FrameResult};
use crate::wire::detection::{DetectionBatch, RawDetectionSlot};
use crate::wire::timestamp::Timestamp;

pub const FRAME_LEN: usize = 30;
pub const FRAME_HEADER: [u8; 4] = [0xAA, 0xFF, 0x03, 0x00];
pub const FRAME_FOOTER: [u8; 2] = [0x55, 0xCC];
pub const SLOT_COUNT: usize = 3;
pub const SLOT_LEN: usize = 8;

const SLOT_BASE: usize = FRAME_HEADER.len();
const FOOTER_AT: usize = FRAME_LEN - FRAME_FOOTER.len();
const SIGN_BIT: u16 = 0x8000;
const MAGNITUDE_MASK: u16 = 0x7FFF;

fn slot_offset(index: usize) -> usize {
    SLOT_BASE + index * SLOT_LEN
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn write_u16(bytes: &mut [u8], at: usize, value: u16) {
    bytes[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

pub fn decode_sign_magnitude(word: u16) -> i32 {
    let magnitude = (word & MAGNITUDE_MASK) as i32;
    if word & SIGN_BIT != 0 {
        magnitude
    } else {
        -magnitude
    }
}

pub fn encode_sign_magnitude(value: i32) -> FrameResult<u16> {
    let magnitude = value.unsigned_abs();
    if magnitude > MAGNITUDE_MASK as u32 {
        return Err(FrameError::ValueOutOfRange { value });
    }
    let magnitude = magnitude as u16;
    Ok(if value >= 0 {
        SIGN_BIT | magnitude
    } else {
        magnitude
    })
}

/// Decodes the first `FRAME_LEN` bytes of `bytes`. Never returns a partially
/// populated batch.
pub fn decode_frame(bytes: &[u8], captured_at: Timestamp) -> FrameResult<DetectionBatch> {
    if bytes.len() < FRAME_LEN {
        return Err(FrameError::BadLength {
            expected: FRAME_LEN,
            actual: bytes.len(),
        });
    }
    let frame = &bytes[..FRAME_LEN];
    if frame[..SLOT_BASE] != FRAME_HEADER {
        return Err(FrameError::BadHeader {
            found: hex::encode(&frame[..SLOT_BASE]),
        });
    }
    if frame[FOOTER_AT..] != FRAME_FOOTER {
        return Err(FrameError::BadFooter {
            found: hex::encode(&frame[FOOTER_AT..]),
        });
    }

    let mut slots = Vec::with_capacity(SLOT_COUNT);
    for index in 0..SLOT_COUNT {
        let at = slot_offset(index);
        let chunk = &frame[at..at + SLOT_LEN];
        if chunk.iter().all(|&b| b == 0) {
            continue;
        }
        slots.push(RawDetectionSlot {
            slot: index as u8,
            x_mm: decode_sign_magnitude(read_u16(chunk, 0)),
            y_mm: decode_sign_magnitude(read_u16(chunk, 2)),
            speed_mm_s: decode_sign_magnitude(read_u16(chunk, 4)),
            resolution_mm: read_u16(chunk, 6),
        });
    }

    let mut raw = [0u8; FRAME_LEN];
    raw.copy_from_slice(frame);
    Ok(DetectionBatch {
        captured_at,
        slots,
        raw,
    })
}

/// Builds a frame from the given slots; channels not listed are left absent.
pub fn encode_frame(slots: &[RawDetectionSlot]) -> FrameResult<[u8; FRAME_LEN]> {
    let mut frame = [0u8; FRAME_LEN];
    frame[..SLOT_BASE].copy_from_slice(&FRAME_HEADER);
    frame[FOOTER_AT..].copy_from_slice(&FRAME_FOOTER);

    for slot in slots {
        let index = slot.slot as usize;
        if index >= SLOT_COUNT {
            return Err(FrameError::BadSlot(slot.slot));
        }
        let at = slot_offset(index);
        write_u16(&mut frame, at, encode_sign_magnitude(slot.x_mm)?);
        write_u16(&mut frame, at + 2, encode_sign_magnitude(slot.y_mm)?);
        write_u16(&mut frame, at + 4, encode_sign_magnitude(slot.speed_mm_s)?);
        write_u16(&mut frame, at + 6, slot.resolution_mm);
    }
    Ok(frame)
}

/// Decodes a frame rendered as hex text, as stored in detail logs and sent
/// by hex-publishing bus bridges.
pub fn decode_hex_frame(text: &str, captured_at: Timestamp) -> FrameResult<DetectionBatch> {
    let bytes = hex::decode(text.trim()).map_err(|err| FrameError::BadHex(err.to_string()))?;
    decode_frame(&bytes, captured_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts() -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_milli_opt(8, 0, 0, 0)
            .unwrap()
    }

    #[test]
    fn sign_bit_set_means_positive() {
        assert_eq!(decode_sign_magnitude(0x8000 | 1000), 1000);
        assert_eq!(decode_sign_magnitude(1000), -1000);
        assert_eq!(decode_sign_magnitude(0x0000), 0);
        assert_eq!(decode_sign_magnitude(0x8000), 0);
    }

    #[test]
    fn decodes_vendor_sample_frame() {
        // slot 0: x = -782, y = 1713, speed = -16, resolution 360
        let bytes = hex::decode("aaff03000e03b186100068010000000000000000000000000000000055cc")
            .unwrap();
        let batch = decode_frame(&bytes, ts()).unwrap();
        assert_eq!(batch.slots.len(), 1);
        let slot = batch.slots[0];
        assert_eq!(slot.slot, 0);
        assert_eq!(slot.x_mm, -782);
        assert_eq!(slot.y_mm, 1713);
        assert_eq!(slot.speed_mm_s, -16);
        assert_eq!(slot.resolution_mm, 360);
    }

    #[test]
    fn round_trip_keeps_slot_positions() {
        let slots = vec![
            RawDetectionSlot::new(0, 1000, 500, 0, 320),
            RawDetectionSlot::new(2, -1500, 3000, -75, 320),
        ];
        let frame = encode_frame(&slots).unwrap();
        let batch = decode_frame(&frame, ts()).unwrap();
        assert_eq!(batch.slots, slots);
        assert_eq!(batch.raw, frame);
    }

    #[test]
    fn round_trip_of_empty_batch() {
        let frame = encode_frame(&[]).unwrap();
        let batch = decode_frame(&frame, ts()).unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn target_at_origin_is_not_absent() {
        let slots = vec![RawDetectionSlot::new(1, 0, 0, 0, 0)];
        let frame = encode_frame(&slots).unwrap();
        assert_eq!(decode_frame(&frame, ts()).unwrap().slots, slots);
    }

    #[test]
    fn short_window_is_bad_length() {
        let frame = encode_frame(&[]).unwrap();
        let err = decode_frame(&frame[..29], ts()).unwrap_err();
        assert_eq!(
            err,
            FrameError::BadLength {
                expected: FRAME_LEN,
                actual: 29
            }
        );
    }

    #[test]
    fn corrupted_markers_are_rejected() {
        let mut frame = encode_frame(&[RawDetectionSlot::new(0, 10, 10, 0, 0)]).unwrap();
        frame[1] = 0x00;
        assert!(matches!(
            decode_frame(&frame, ts()),
            Err(FrameError::BadHeader { .. })
        ));

        let mut frame = encode_frame(&[]).unwrap();
        frame[FRAME_LEN - 1] = 0x00;
        assert!(matches!(
            decode_frame(&frame, ts()),
            Err(FrameError::BadFooter { .. })
        ));
    }

    #[test]
    fn encode_rejects_out_of_range_values() {
        let slots = [RawDetectionSlot::new(0, 40_000, 0, 0, 0)];
        assert_eq!(
            encode_frame(&slots),
            Err(FrameError::ValueOutOfRange { value: 40_000 })
        );
        let slots = [RawDetectionSlot::new(3, 0, 0, 0, 0)];
        assert_eq!(encode_frame(&slots), Err(FrameError::BadSlot(3)));
    }

    #[test]
    fn hex_frames_decode_like_binary() {
        let frame = encode_frame(&[RawDetectionSlot::new(0, 1, 2, 3, 4)]).unwrap();
        let text = format!("  {}\n", hex::encode(frame));
        assert_eq!(
            decode_hex_frame(&text, ts()).unwrap(),
            decode_frame(&frame, ts()).unwrap()
        );
        assert!(matches!(
            decode_hex_frame("zz", ts()),
            Err(FrameError::BadHex(_))
        ));
    }
}
