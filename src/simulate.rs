//! Hardware-free stand-ins for the BLE link, used by `--simulate`.

use std::f64::consts::PI;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use log::info;
use tokio::sync::mpsc;

use crate::parse::encode_frame;
use crate::protocol::{CHANNEL_COUNT, FULL_SCALE_COUNTS};
use crate::session::Uplink;
use crate::types::NusEvent;

/// Frames per second produced by [`spawn_simulator`].
pub const SIM_RATE_HZ: f64 = 10.0;

/// Raw 24-bit counts for channel `ch` at time `t` (seconds).
///
/// Each channel is a slow sine around a different DC level, with a small
/// deterministic ripple:
///
/// | Channel | DC (fraction of full scale) | Period |
/// |---------|-----------------------------|--------|
/// | 670 nm  | 0.20 | 8 s  |
/// | 850 nm  | 0.30 | 11 s |
/// | 950 nm  | 0.25 | 13 s |
/// | 1300 nm | 0.40 | 17 s |
pub fn sim_counts(t: f64, ch: usize) -> u32 {
    const DC: [f64; CHANNEL_COUNT] = [0.20, 0.30, 0.25, 0.40];
    const PERIOD: [f64; CHANNEL_COUNT] = [8.0, 11.0, 13.0, 17.0];
    let slow = 0.08 * (2.0 * PI * t / PERIOD[ch]).sin();
    let ripple = 0.005 * ((t * 997.3 + ch as f64 * 31.7).sin() * 43_758.5).fract();
    let frac = (DC[ch] + slow + ripple).clamp(0.0, 0.999);
    (frac * FULL_SCALE_COUNTS) as u32
}

/// Spawn a task that feeds synthetic frames into `tx` at [`SIM_RATE_HZ`].
///
/// Announces itself with [`NusEvent::Connected`] and runs until the receiver
/// is dropped.
pub fn spawn_simulator(tx: mpsc::Sender<NusEvent>) {
    tokio::spawn(async move {
        if tx.send(NusEvent::Connected("Simulated rig".into())).await.is_err() {
            return;
        }
        let dt = 1.0 / SIM_RATE_HZ;
        let mut ticker = tokio::time::interval(Duration::from_secs_f64(dt));
        let mut t = 0.0_f64;
        loop {
            ticker.tick().await;
            let raw: [u32; CHANNEL_COUNT] = std::array::from_fn(|ch| sim_counts(t, ch));
            if tx.send(NusEvent::Notification(encode_frame(raw).to_vec())).await.is_err() {
                break;
            }
            t += dt;
        }
    });
}

/// Uplink that accepts every write and logs it.
pub struct LoopbackUplink {
    pub max_write_size: usize,
}

#[async_trait]
impl Uplink for LoopbackUplink {
    fn max_write_size(&self) -> usize {
        self.max_write_size
    }

    async fn write_chunk(&self, chunk: &[u8]) -> Result<()> {
        info!("Loopback write ({} B): {:?}", chunk.len(), String::from_utf8_lossy(chunk));
        Ok(())
    }
}
