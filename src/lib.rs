//! # photodiode-rs
//!
//! Collector and live viewer for a four-channel photodiode rig that streams
//! over Bluetooth Low Energy using the Nordic UART Service (NUS).
//!
//! Two programs share one CSV file:
//!
//! | Binary | Role |
//! |---|---|
//! | `photodiode-rs` | connect, decode 12-byte frames, append to `led_data.csv`, relay stdin to the rig |
//! | `viewer` | re-read the CSV every second and redraw two charts (silicon sum, InGaAs) |
//!
//! ## Quick start
//!
//! ```no_run
//! use photodiode_rs::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let _log = CsvLog::create(DEFAULT_CSV_PATH)?;
//!     let (mut rx, _handle) = NusClient::new(NusClientConfig::default()).connect().await?;
//!
//!     while let Some(event) = rx.recv().await {
//!         match event {
//!             NusEvent::Notification(data) => {
//!                 if let Ok(r) = decode_frame(&data) {
//!                     println!("{:?}", r.0);
//!                 }
//!             }
//!             NusEvent::Disconnected => break,
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Using as a library dependency
//!
//! ```toml
//! [dependencies]
//! # Full build (includes the ratatui viewer):
//! photodiode-rs = "0.1"
//!
//! # Library + collector only, skips ratatui / crossterm:
//! photodiode-rs = { version = "0.1", default-features = false }
//! ```
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`prelude`] | One-line glob import of the most commonly needed types |
//! | [`nus_client`] | BLE scanning, connecting, and the [`nus_client::NusHandle`] uplink |
//! | [`session`] | The streaming phase: receive path, stdin relay, shared shutdown |
//! | [`csv_log`] | Append-only CSV writer and full-file reader |
//! | [`plot`] | Derived series and refresh policy for the viewer |
//! | [`types`] | Readings, records, and events |
//! | [`protocol`] | GATT UUIDs, frame constants, CSV schema, chunking |
//! | [`parse`] | Byte-to-reading decoding |
//! | [`simulate`] | Synthetic frame source and loopback uplink |

pub mod csv_log;
pub mod nus_client;
pub mod parse;
pub mod plot;
pub mod protocol;
pub mod session;
pub mod simulate;
pub mod types;

// ── Prelude ───────────────────────────────────────────────────────────────────

/// Convenience re-exports for downstream crates.
pub mod prelude {
    // ── Client ────────────────────────────────────────────────────────────────
    pub use crate::nus_client::{NusClient, NusClientConfig, NusHandle};
    pub use crate::session::Uplink;

    // ── Data ──────────────────────────────────────────────────────────────────
    pub use crate::csv_log::{read_history, CsvLog, History, HistoryError};
    pub use crate::parse::{decode_frame, DecodeError};
    pub use crate::types::{ChannelReadings, LogRecord, NusEvent, SessionEnd};

    // ── Protocol constants ────────────────────────────────────────────────────
    pub use crate::protocol::{
        sliced, CHANNEL_NAMES, CSV_HEADER, DEFAULT_CSV_PATH, DEFAULT_MAX_WRITE_SIZE, FRAME_LEN,
        NUS_RX_CHARACTERISTIC, NUS_SERVICE_UUID, NUS_TX_CHARACTERISTIC,
    };
}
