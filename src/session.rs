//! The streaming phase of the collector.
//!
//! Two activities share one connection:
//!
//! * the **receive path** (this task) turns each TX notification into a CSV
//!   row;
//! * the **relay path** (a spawned task) chunks stdin lines and writes them to
//!   the RX characteristic.
//!
//! Both stop on a single broadcast shutdown signal. [`run`] fires it on the
//! first terminal event and waits for the relay task before returning, so the
//! caller can release the connection knowing nothing is still writing.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, error, info, warn};
use tokio::sync::{broadcast, mpsc};

use crate::csv_log::CsvLog;
use crate::parse::decode_frame;
use crate::protocol::sliced;
use crate::types::{LogRecord, NusEvent, SessionEnd};

/// Outbound side of a connection: something that accepts bounded-size writes.
#[async_trait]
pub trait Uplink: Send + Sync {
    /// Largest payload accepted by one [`Uplink::write_chunk`] call.
    fn max_write_size(&self) -> usize;

    /// Write one chunk and wait for the transport to accept it.
    async fn write_chunk(&self, chunk: &[u8]) -> Result<()>;
}

/// Wall-clock seconds since the Unix epoch.
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Decode one notification, stamp it, and append it to `log`.
///
/// Returns the record that was written, or `None` when the frame was
/// malformed or the append failed. Neither case is fatal: both are logged and
/// the stream carries on.
pub fn record_frame(log: &CsvLog, data: &[u8], timestamp: f64) -> Option<LogRecord> {
    let readings = match decode_frame(data) {
        Ok(r) => r,
        Err(e) => {
            warn!("Skipping malformed frame: {e} ({data:02x?})");
            return None;
        }
    };
    let record = LogRecord { timestamp, readings };
    if let Err(e) = log.append(&record) {
        error!("Failed to append to {}: {e:#}", log.path().display());
        return None;
    }
    Some(record)
}

/// Send one line to the peripheral, one chunk at a time.
///
/// Chunks are written in order and each write is awaited before the next.
/// The first failing write aborts the rest of the line.
pub async fn relay_line<U: Uplink + ?Sized>(uplink: &U, line: &[u8]) -> Result<()> {
    let n = uplink.max_write_size();
    for chunk in sliced(line, n) {
        uplink.write_chunk(chunk).await?;
    }
    Ok(())
}

/// Drain `lines` into `uplink` until the input closes or shutdown is signalled.
///
/// A failed write is reported and the remainder of that line dropped; the
/// relay keeps serving later lines, since a dead link is reported separately
/// through the event channel.
async fn relay_task<U: Uplink + ?Sized>(
    uplink: Arc<U>,
    mut lines: mpsc::UnboundedReceiver<Vec<u8>>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                debug!("Relay: shutdown signalled.");
                break;
            }
            line = lines.recv() => match line {
                // Shutdown also interrupts a line that is still being written.
                Some(line) => tokio::select! {
                    _ = shutdown.recv() => {
                        debug!("Relay: shutdown signalled mid-line, {} byte(s) abandoned.", line.len());
                        break;
                    }
                    res = relay_line(uplink.as_ref(), &line) => match res {
                        Ok(()) => println!("Sent: {:?}", String::from_utf8_lossy(&line)),
                        Err(e) => error!("Write failed, line dropped: {e:#}"),
                    },
                },
                None => {
                    debug!("Relay: input closed.");
                    break;
                }
            },
        }
    }
}

/// Run the streaming state until the peripheral disconnects, the input
/// closes, or the process is interrupted.
///
/// * `events`: notifications and link events from the transport.
/// * `lines`: raw outbound lines (typically stdin, newline included).
pub async fn run<U>(
    uplink: Arc<U>,
    mut events: mpsc::Receiver<NusEvent>,
    lines: mpsc::UnboundedReceiver<Vec<u8>>,
    log: &CsvLog,
) -> SessionEnd
where
    U: Uplink + ?Sized + 'static,
{
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut relay = tokio::spawn(relay_task(uplink, lines, shutdown_tx.subscribe()));
    let mut relay_done = false;
    let mut frames: u64 = 0;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let end = loop {
        tokio::select! {
            ev = events.recv() => match ev {
                Some(NusEvent::Notification(data)) => {
                    if let Some(rec) = record_frame(log, &data, now_secs()) {
                        frames += 1;
                        let [a, b, c, d] = rec.readings.0;
                        println!(
                            "Time: {}, 670nm: {a}, 850nm: {b}, 950nm: {c}, 1300nm: {d}",
                            rec.timestamp
                        );
                    }
                }
                Some(NusEvent::Connected(name)) => info!("Connected to: {name}"),
                Some(NusEvent::Disconnected) | None => break SessionEnd::PeripheralDisconnected,
            },
            res = &mut relay, if !relay_done => {
                relay_done = true;
                if let Err(e) = res {
                    error!("Relay task failed: {e}");
                }
                break SessionEnd::InputClosed;
            }
            _ = &mut ctrl_c => break SessionEnd::Interrupted,
        }
    };

    let _ = shutdown_tx.send(());
    if !relay_done {
        if let Err(e) = relay.await {
            error!("Relay task failed: {e}");
        }
    }
    info!("Session ended ({end:?}) after {frames} frame(s).");
    end
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::encode_frame;
    use std::sync::Mutex;

    struct Recorder {
        max: usize,
        writes: Mutex<Vec<Vec<u8>>>,
        fail_on: Option<usize>,
    }

    impl Recorder {
        fn new(max: usize) -> Self {
            Self {
                max,
                writes: Mutex::new(vec![]),
                fail_on: None,
            }
        }
    }

    #[async_trait]
    impl Uplink for Recorder {
        fn max_write_size(&self) -> usize {
            self.max
        }

        async fn write_chunk(&self, chunk: &[u8]) -> Result<()> {
            let mut w = self.writes.lock().unwrap();
            if self.fail_on == Some(w.len()) {
                anyhow::bail!("rejected");
            }
            w.push(chunk.to_vec());
            Ok(())
        }
    }

    #[tokio::test]
    async fn relay_line_writes_ordered_chunks() {
        let up = Recorder::new(4);
        relay_line(&up, b"hello world\n").await.unwrap();
        let writes = up.writes.lock().unwrap();
        assert_eq!(writes.len(), 3);
        assert!(writes.iter().all(|w| w.len() <= 4));
        assert_eq!(writes.concat(), b"hello world\n");
    }

    #[tokio::test]
    async fn relay_line_stops_at_first_failure() {
        let mut up = Recorder::new(2);
        up.fail_on = Some(1);
        assert!(relay_line(&up, b"abcdef").await.is_err());
        assert_eq!(*up.writes.lock().unwrap(), vec![b"ab".to_vec()]);
    }

    #[test]
    fn record_frame_skips_malformed_frames() {
        let dir = tempfile::tempdir().unwrap();
        let log = CsvLog::create(dir.path().join("led_data.csv")).unwrap();

        assert!(record_frame(&log, &[0u8; 11], 1.0).is_none());
        let rec = record_frame(&log, &encode_frame([0x80_0000, 0, 0, 0]), 2.0).unwrap();
        assert_eq!(rec.timestamp, 2.0);
        assert_eq!(rec.readings.0, [4.0, 0.0, 0.0, 0.0]);

        let text = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[tokio::test]
    async fn disconnect_ends_session_and_stops_relay() {
        let dir = tempfile::tempdir().unwrap();
        let log = CsvLog::create(dir.path().join("led_data.csv")).unwrap();
        let up = Arc::new(Recorder::new(20));

        let (ev_tx, ev_rx) = mpsc::channel(8);
        let (_line_tx, line_rx) = mpsc::unbounded_channel();
        ev_tx.send(NusEvent::Connected("rig".into())).await.unwrap();
        ev_tx.send(NusEvent::Notification(vec![0; 12])).await.unwrap();
        ev_tx.send(NusEvent::Disconnected).await.unwrap();

        let end = run(up, ev_rx, line_rx, &log).await;
        assert_eq!(end, SessionEnd::PeripheralDisconnected);
        let text = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    /// Accepts the first chunk, then never completes another write.
    struct Stalled {
        started: tokio::sync::Notify,
    }

    #[async_trait]
    impl Uplink for Stalled {
        fn max_write_size(&self) -> usize {
            4
        }

        async fn write_chunk(&self, _chunk: &[u8]) -> Result<()> {
            self.started.notify_one();
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn disconnect_cancels_a_write_in_progress() {
        let dir = tempfile::tempdir().unwrap();
        let log = CsvLog::create(dir.path().join("led_data.csv")).unwrap();
        let up = Arc::new(Stalled {
            started: tokio::sync::Notify::new(),
        });

        let (ev_tx, ev_rx) = mpsc::channel(8);
        let (line_tx, line_rx) = mpsc::unbounded_channel();
        line_tx.send(b"a line longer than one chunk\n".to_vec()).unwrap();

        let session = tokio::spawn({
            let up = Arc::clone(&up);
            async move { run(up, ev_rx, line_rx, &log).await }
        });

        up.started.notified().await;
        ev_tx.send(NusEvent::Disconnected).await.unwrap();

        let end = tokio::time::timeout(std::time::Duration::from_secs(3), session)
            .await
            .expect("session did not end after disconnect")
            .unwrap();
        assert_eq!(end, SessionEnd::PeripheralDisconnected);
        drop(line_tx);
    }

    #[tokio::test]
    async fn input_eof_ends_session() {
        let dir = tempfile::tempdir().unwrap();
        let log = CsvLog::create(dir.path().join("led_data.csv")).unwrap();
        let up = Arc::new(Recorder::new(3));

        let (_ev_tx, ev_rx) = mpsc::channel::<NusEvent>(8);
        let (line_tx, line_rx) = mpsc::unbounded_channel();
        line_tx.send(b"ping\n".to_vec()).unwrap();
        drop(line_tx);

        let end = run(Arc::clone(&up), ev_rx, line_rx, &log).await;
        assert_eq!(end, SessionEnd::InputClosed);
        let writes = up.writes.lock().unwrap();
        assert_eq!(*writes, vec![b"pin".to_vec(), b"g\n".to_vec()]);
    }
}
