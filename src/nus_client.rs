use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CharPropFlags, Characteristic, Manager as _, Peripheral as _,
    ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use log::{debug, info, warn};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::protocol::{
    DEFAULT_MAX_WRITE_SIZE, NUS_RX_CHARACTERISTIC, NUS_SERVICE_UUID, NUS_TX_CHARACTERISTIC,
};
use crate::session::Uplink;
use crate::types::NusEvent;

/// Scan ended without a peripheral advertising the NUS service.
///
/// Returned (inside [`anyhow::Error`]) by [`NusClient::connect`] so callers can
/// tell an empty scan apart from a failed connection.
#[derive(Debug, Error)]
#[error("No matching device found after {timeout_secs} s (looking for service {})", NUS_SERVICE_UUID)]
pub struct DeviceNotFound {
    pub timeout_secs: u64,
}

/// `true` when `err` is a [`DeviceNotFound`] scan timeout.
pub fn is_device_not_found(err: &anyhow::Error) -> bool {
    err.downcast_ref::<DeviceNotFound>().is_some()
}

// ── NusClientConfig ───────────────────────────────────────────────────────────

/// Configuration for [`NusClient`].
#[derive(Debug, Clone)]
pub struct NusClientConfig {
    /// How long to look for a peripheral advertising the NUS service before
    /// giving up. Default: `15`.
    pub scan_timeout_secs: u64,
    /// Only accept peripherals whose advertised name starts with this string.
    ///
    /// `None` (the default) accepts any device that advertises the Nordic
    /// UART Service.
    pub name_prefix: Option<String>,
    /// Largest payload for one RX write. Default: [`DEFAULT_MAX_WRITE_SIZE`].
    pub max_write_size: usize,
}

impl Default for NusClientConfig {
    fn default() -> Self {
        Self {
            scan_timeout_secs: 15,
            name_prefix: None,
            max_write_size: DEFAULT_MAX_WRITE_SIZE,
        }
    }
}

// ── NusClient ─────────────────────────────────────────────────────────────────

/// BLE client for a Nordic UART peripheral.
///
/// Handles scanning, connecting, TX subscription, and notification dispatch.
/// Notifications are forwarded untouched as [`NusEvent::Notification`];
/// decoding is left to the consumer.
pub struct NusClient {
    config: NusClientConfig,
}

impl NusClient {
    pub fn new(config: NusClientConfig) -> Self {
        Self { config }
    }

    /// Scan for the first peripheral advertising the NUS service, connect,
    /// subscribe to TX, and start forwarding notifications.
    ///
    /// Fails if no matching peripheral shows up within
    /// `config.scan_timeout_secs`.
    pub async fn connect(&self) -> Result<(mpsc::Receiver<NusEvent>, NusHandle)> {
        let manager = Manager::new().await?;
        let adapters = manager.adapters().await?;
        let adapter = adapters
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No Bluetooth adapter found"))?;

        // macOS: CBCentralManager starts in an "unknown" state and silently
        // ignores scans until it reports PoweredOn.
        #[cfg(target_os = "macos")]
        {
            use btleplug::api::CentralState;

            let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
            loop {
                match adapter.adapter_state().await {
                    Ok(CentralState::PoweredOn) => break,
                    Ok(state) if tokio::time::Instant::now() >= deadline => {
                        warn!("macOS: adapter still in state {state:?} after 3 s, proceeding anyway");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("macOS: adapter_state() error: {e}");
                        break;
                    }
                }
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            tokio::time::sleep(Duration::from_millis(300)).await;
        }

        info!(
            "Scanning for a Nordic UART device (timeout: {} s) …",
            self.config.scan_timeout_secs
        );
        adapter
            .start_scan(ScanFilter {
                services: vec![NUS_SERVICE_UUID],
            })
            .await?;
        let found = self.find_first(&adapter).await;
        adapter.stop_scan().await.ok();
        let peripheral = found?;

        let props = peripheral.properties().await?.unwrap_or_default();
        let device_name = props.local_name.unwrap_or_else(|| "Unknown".into());
        info!("Found device: {device_name}  id={}", peripheral.id());

        self.setup_peripheral(peripheral, device_name, adapter).await
    }

    // ── Private: setup_peripheral ─────────────────────────────────────────────

    async fn setup_peripheral(
        &self,
        peripheral: Peripheral,
        device_name: String,
        adapter: Adapter,
    ) -> Result<(mpsc::Receiver<NusEvent>, NusHandle)> {
        // BlueZ's Device1.Connect can block forever when the device wanders off.
        tokio::time::timeout(Duration::from_secs(10), peripheral.connect())
            .await
            .map_err(|_| anyhow!("BLE connect() timed out after 10 s"))??;

        // bluez-async reports the connection before the GATT cache is filled.
        #[cfg(target_os = "linux")]
        tokio::time::sleep(Duration::from_millis(600)).await;

        tokio::time::timeout(Duration::from_secs(15), peripheral.discover_services())
            .await
            .map_err(|_| anyhow!("discover_services() timed out after 15 s"))??;
        info!("Connected and services discovered: {device_name}");

        let chars = peripheral.characteristics();
        let find_char = |uuid: uuid::Uuid| -> Result<Characteristic> {
            chars
                .iter()
                .find(|c| c.uuid == uuid)
                .cloned()
                .ok_or_else(|| anyhow!("Characteristic {uuid} not found"))
        };

        let tx_char = find_char(NUS_TX_CHARACTERISTIC)?;
        let rx_char = find_char(NUS_RX_CHARACTERISTIC)?;
        peripheral.subscribe(&tx_char).await?;

        let write_type = rx_write_type(rx_char.properties);
        debug!("RX characteristic properties: {:?} → {write_type:?}", rx_char.properties);

        let (tx, rx) = mpsc::channel::<NusEvent>(256);
        let _ = tx.send(NusEvent::Connected(device_name.clone())).await;

        // ── Disconnect watcher ──────────────────────────────────────────────
        // The adapter's DeviceDisconnected event usually arrives before the
        // notification stream notices the link is gone.
        let disconnect_tx = tx.clone();
        let peripheral_id = peripheral.id();
        tokio::spawn(async move {
            match adapter.events().await {
                Ok(mut events) => {
                    while let Some(event) = events.next().await {
                        if let CentralEvent::DeviceDisconnected(id) = event {
                            if id == peripheral_id {
                                info!("Disconnect watcher: device {id:?} disconnected.");
                                let _ = disconnect_tx.send(NusEvent::Disconnected).await;
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!("Disconnect watcher: could not subscribe to adapter events: {e}");
                }
            }
        });

        // ── Notification dispatch ───────────────────────────────────────────
        let peripheral_clone = peripheral.clone();
        tokio::spawn(async move {
            let mut notifications = match peripheral_clone.notifications().await {
                Ok(n) => n,
                Err(e) => {
                    warn!("Could not get notifications stream: {e}");
                    let _ = tx.send(NusEvent::Disconnected).await;
                    return;
                }
            };
            let mut notif_count: u64 = 0;

            while let Some(notif) = notifications.next().await {
                if notif.uuid != NUS_TX_CHARACTERISTIC {
                    debug!("Ignoring notification from {}", notif.uuid);
                    continue;
                }
                notif_count += 1;
                if notif_count <= 3 || notif_count % 500 == 0 {
                    debug!("TX notif #{notif_count} len={}", notif.value.len());
                }
                if tx.send(NusEvent::Notification(notif.value)).await.is_err() {
                    break;
                }
            }

            info!("Notification stream ended after {notif_count} frame(s).");
            let _ = tx.send(NusEvent::Disconnected).await;
        });

        let handle = NusHandle {
            peripheral,
            rx_char,
            write_type,
            max_write_size: self.config.max_write_size.max(1),
        };

        Ok((rx, handle))
    }

    // ── Private: find_first ───────────────────────────────────────────────────

    /// Poll until the first matching peripheral appears or the timeout expires.
    async fn find_first(&self, adapter: &Adapter) -> Result<Peripheral> {
        use tokio::time::{sleep, timeout};

        let timeout_secs = self.config.scan_timeout_secs;
        let prefix = self.config.name_prefix.as_deref();

        let result = timeout(Duration::from_secs(timeout_secs), async {
            loop {
                let peripherals = adapter.peripherals().await.unwrap_or_default();
                for p in peripherals {
                    if let Ok(Some(props)) = p.properties().await {
                        if advertises_match(&props.services, props.local_name.as_deref(), prefix) {
                            return p;
                        }
                    }
                }
                sleep(Duration::from_millis(250)).await;
            }
        })
        .await;

        result.map_err(|_| DeviceNotFound { timeout_secs }.into())
    }
}

/// `true` when an advertisement carries the NUS service UUID and, if a
/// prefix is configured, a local name starting with it.
fn advertises_match(services: &[uuid::Uuid], name: Option<&str>, prefix: Option<&str>) -> bool {
    if !services.contains(&NUS_SERVICE_UUID) {
        return false;
    }
    match prefix {
        Some(p) => name.is_some_and(|n| n.starts_with(p)),
        None => true,
    }
}

/// Acknowledged writes when RX supports them, unacknowledged otherwise.
fn rx_write_type(props: CharPropFlags) -> WriteType {
    if props.contains(CharPropFlags::WRITE) {
        WriteType::WithResponse
    } else {
        WriteType::WithoutResponse
    }
}

// ── NusHandle ─────────────────────────────────────────────────────────────────

/// A handle to an active connection, used to write to the RX characteristic.
pub struct NusHandle {
    peripheral: Peripheral,
    rx_char: Characteristic,
    write_type: WriteType,
    max_write_size: usize,
}

impl NusHandle {
    /// Gracefully disconnect.
    pub async fn disconnect(&self) -> Result<()> {
        self.peripheral.disconnect().await?;
        Ok(())
    }
}

#[async_trait]
impl Uplink for NusHandle {
    fn max_write_size(&self) -> usize {
        self.max_write_size
    }

    async fn write_chunk(&self, chunk: &[u8]) -> Result<()> {
        self.peripheral
            .write(&self.rx_char, chunk, self.write_type)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_on_service_uuid() {
        let other = uuid::Uuid::from_u128(0x0000180d_0000_1000_8000_00805f9b34fb);
        assert!(advertises_match(&[NUS_SERVICE_UUID], None, None));
        assert!(advertises_match(&[other, NUS_SERVICE_UUID], Some("rig"), None));
        assert!(!advertises_match(&[other], Some("rig"), None));
        assert!(!advertises_match(&[], None, None));
    }

    #[test]
    fn optional_name_prefix() {
        let s = [NUS_SERVICE_UUID];
        assert!(advertises_match(&s, Some("PD-Rig-01"), Some("PD-Rig")));
        assert!(!advertises_match(&s, Some("Other"), Some("PD-Rig")));
        assert!(!advertises_match(&s, None, Some("PD-Rig")));
    }

    #[test]
    fn write_type_follows_rx_properties() {
        let both = CharPropFlags::WRITE | CharPropFlags::WRITE_WITHOUT_RESPONSE;
        assert!(matches!(rx_write_type(both), WriteType::WithResponse));
        assert!(matches!(rx_write_type(CharPropFlags::WRITE), WriteType::WithResponse));
        assert!(matches!(
            rx_write_type(CharPropFlags::WRITE_WITHOUT_RESPONSE),
            WriteType::WithoutResponse
        ));
        assert!(matches!(
            rx_write_type(CharPropFlags::empty()),
            WriteType::WithoutResponse
        ));
    }

    #[test]
    fn scan_timeout_is_distinguishable() {
        let timed_out: anyhow::Error = DeviceNotFound { timeout_secs: 15 }.into();
        assert!(is_device_not_found(&timed_out));
        assert!(timed_out.to_string().contains("15 s"));

        let other = anyhow!("BLE connect() timed out after 10 s");
        assert!(!is_device_not_found(&other));
        let wrapped = anyhow::Error::new(DeviceNotFound { timeout_secs: 1 }).context("connect");
        assert!(is_device_not_found(&wrapped));
    }

    #[test]
    fn default_config() {
        let c = NusClientConfig::default();
        assert_eq!(c.scan_timeout_secs, 15);
        assert_eq!(c.max_write_size, DEFAULT_MAX_WRITE_SIZE);
        assert!(c.name_prefix.is_none());
    }
}
