//! Binary decoders for TX notification payloads.
//!
//! All public functions in this module are pure (no I/O) and are safe to call
//! from any async or sync context.
//!
//! # Frame layout
//!
//! | Bytes | Channel | Format |
//! |---|---|---|
//! | 0–2  | 670 nm  | u24 BE |
//! | 3–5  | 850 nm  | u24 BE |
//! | 6–8  | 950 nm  | u24 BE |
//! | 9–11 | 1300 nm | u24 BE |
//!
//! Conversion: `reading = raw / 8388608.0 × 4.0`.

use thiserror::Error;

use crate::protocol::{
    BYTES_PER_CHANNEL, CHANNEL_COUNT, FRAME_LEN, FULL_SCALE_COUNTS, FULL_SCALE_VOLTS,
};
use crate::types::ChannelReadings;

/// A notification that cannot be turned into [`ChannelReadings`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("frame is {actual} bytes, expected {expected}")]
    FrameLength { expected: usize, actual: usize },
}

/// Decode a 24-bit unsigned big-endian array (3 bytes per value).
///
/// Returns one `u32` per complete 3-byte group; partial trailing bytes are ignored.
pub fn decode_unsigned_24bit(data: &[u8]) -> Vec<u32> {
    data.chunks_exact(BYTES_PER_CHANNEL)
        .map(|c| ((c[0] as u32) << 16) | ((c[1] as u32) << 8) | (c[2] as u32))
        .collect()
}

/// Scale one raw 24-bit count to a reading.
#[inline]
pub fn counts_to_reading(raw: u32) -> f64 {
    raw as f64 / FULL_SCALE_COUNTS * FULL_SCALE_VOLTS
}

/// Decode one TX notification into four channel readings.
///
/// The payload must be exactly [`FRAME_LEN`] bytes. No range check is applied
/// to the values: every 24-bit pattern is a valid reading.
///
/// ```
/// # use photodiode_rs::parse::decode_frame;
/// let r = decode_frame(&[0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap();
/// assert_eq!(r.0, [4.0, 0.0, 0.0, 0.0]);
/// assert!(decode_frame(&[0; 11]).is_err());
/// ```
pub fn decode_frame(data: &[u8]) -> Result<ChannelReadings, DecodeError> {
    if data.len() != FRAME_LEN {
        return Err(DecodeError::FrameLength {
            expected: FRAME_LEN,
            actual: data.len(),
        });
    }
    let raw = decode_unsigned_24bit(data);
    Ok(ChannelReadings(std::array::from_fn(|ch| {
        counts_to_reading(raw[ch])
    })))
}

/// Pack four raw counts into a frame, the inverse of [`decode_frame`]'s
/// byte layout. Counts are masked to 24 bits.
pub fn encode_frame(raw: [u32; CHANNEL_COUNT]) -> [u8; FRAME_LEN] {
    let mut out = [0u8; FRAME_LEN];
    for (ch, value) in raw.iter().enumerate() {
        let be = (value & 0x00FF_FFFF).to_be_bytes();
        out[ch * BYTES_PER_CHANNEL..(ch + 1) * BYTES_PER_CHANNEL].copy_from_slice(&be[1..]);
    }
    out
}
