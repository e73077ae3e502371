use crate::protocol::CHANNEL_COUNT;

/// One decoded sensor frame: four simultaneous photodiode readings.
///
/// Channel order follows [`crate::protocol::CHANNEL_NAMES`]:
/// * 0 = 670 nm
/// * 1 = 850 nm
/// * 2 = 950 nm
/// * 3 = 1300 nm (InGaAs)
///
/// Each value is `raw / 8388608 × 4.0`, so the nominal range is `[0, 4.0)`.
/// Raw counts at or above 2^23 are passed through unclamped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelReadings(pub [f64; CHANNEL_COUNT]);

impl ChannelReadings {
    /// Sum of the three silicon channels (670, 850 and 950 nm).
    pub fn silicon(&self) -> f64 {
        self.0[0] + self.0[1] + self.0[2]
    }

    /// The InGaAs channel (1300 nm).
    pub fn inga(&self) -> f64 {
        self.0[3]
    }
}

/// One CSV row: a wall-clock timestamp plus the frame it was taken from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogRecord {
    /// Seconds since the Unix epoch, with sub-second precision.
    pub timestamp: f64,
    pub readings: ChannelReadings,
}

/// Events emitted by [`crate::nus_client::NusClient`] (and by the simulator).
///
/// Consumers receive these through the `mpsc::Receiver` returned by
/// [`crate::nus_client::NusClient::connect`].
#[derive(Debug, Clone)]
pub enum NusEvent {
    /// The BLE link is up and the TX characteristic is subscribed.
    /// The inner `String` is the advertised device name.
    Connected(String),
    /// Raw payload of one TX notification. Normally [`crate::protocol::FRAME_LEN`]
    /// bytes; anything else is rejected by [`crate::parse::decode_frame`].
    Notification(Vec<u8>),
    /// The BLE link was lost. No further events follow.
    Disconnected,
}

/// Why a streaming session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The peripheral dropped the link (or the notification stream closed).
    PeripheralDisconnected,
    /// Standard input reached end-of-stream.
    InputClosed,
    /// Ctrl-C.
    Interrupted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_series_values() {
        let r = ChannelReadings([0.5, 1.0, 1.5, 2.0]);
        assert_eq!(r.silicon(), 3.0);
        assert_eq!(r.inga(), 2.0);
    }
}
