//! GATT UUIDs, frame constants, CSV schema, and BLE wire-format helpers for the
//! photodiode rig.
//!
//! The rig speaks the Nordic UART Service (NUS): one write characteristic
//! (RX, host → peripheral) and one notify characteristic (TX, peripheral →
//! host), all in the Nordic vendor namespace `6e40XXXX-b5a3-f393-e0a9-e50e24dcca9e`.

use uuid::Uuid;

// ── Service ──────────────────────────────────────────────────────────────────

/// Nordic UART Service UUID.
///
/// Used both as the scan filter and as the advertisement match when looking
/// for the rig among nearby BLE peripherals.
pub const NUS_SERVICE_UUID: Uuid = Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e);

// ── Characteristics ───────────────────────────────────────────────────────────

/// RX characteristic: the peripheral accepts writes here (host → rig).
pub const NUS_RX_CHARACTERISTIC: Uuid = Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e);

/// TX characteristic: the peripheral notifies sensor frames here (rig → host).
pub const NUS_TX_CHARACTERISTIC: Uuid = Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e);

// ── Frame layout ──────────────────────────────────────────────────────────────

/// Number of photodiode channels carried in one frame.
pub const CHANNEL_COUNT: usize = 4;

/// Bytes per channel value (24-bit big-endian unsigned).
pub const BYTES_PER_CHANNEL: usize = 3;

/// Exact length of one TX notification payload.
pub const FRAME_LEN: usize = CHANNEL_COUNT * BYTES_PER_CHANNEL; // 12

/// Full-scale reference count of the ADC (2^23).
///
/// `reading = raw / FULL_SCALE_COUNTS * FULL_SCALE_VOLTS`
pub const FULL_SCALE_COUNTS: f64 = 8_388_608.0;

/// Reading that corresponds to [`FULL_SCALE_COUNTS`].
pub const FULL_SCALE_VOLTS: f64 = 4.0;

/// Channel labels in frame order. These double as the CSV column names.
pub const CHANNEL_NAMES: [&str; CHANNEL_COUNT] = ["670nm", "850nm", "950nm", "1300nm"];

// ── CSV schema ────────────────────────────────────────────────────────────────

/// Name of the timestamp column.
pub const TIME_COLUMN: &str = "Time";

/// Full CSV header row, in file order.
pub const CSV_HEADER: [&str; CHANNEL_COUNT + 1] = ["Time", "670nm", "850nm", "950nm", "1300nm"];

/// Default log location, relative to the working directory.
pub const DEFAULT_CSV_PATH: &str = "led_data.csv";

// ── Uplink ────────────────────────────────────────────────────────────────────

/// Largest payload a single RX write may carry when nothing better is known.
///
/// ATT_MTU 23 is the floor every BLE link supports; 3 bytes go to the ATT
/// header, leaving 20 for data. btleplug does not report the negotiated MTU,
/// so this is what the uplink advertises unless overridden.
pub const DEFAULT_MAX_WRITE_SIZE: usize = 20;

/// Split `data` into consecutive chunks of at most `n` bytes.
///
/// The last chunk may be shorter. Empty input yields no chunks at all, and no
/// chunk is ever empty. `n == 0` is treated as `1`.
///
/// ```
/// # use photodiode_rs::protocol::sliced;
/// let chunks: Vec<&[u8]> = sliced(b"hello world", 4).collect();
/// assert_eq!(chunks, [&b"hell"[..], b"o wo", b"rld"]);
/// assert_eq!(sliced(b"", 4).count(), 0);
/// ```
pub fn sliced(data: &[u8], n: usize) -> std::slice::Chunks<'_, u8> {
    data.chunks(n.max(1))
}
