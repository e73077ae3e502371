//! Collector → CSV → viewer, end to end, without hardware.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use photodiode_rs::csv_log::{read_history, CsvLog, HistoryError};
use photodiode_rs::parse::encode_frame;
use photodiode_rs::plot::PlotState;
use photodiode_rs::session::{self, record_frame, Uplink};
use photodiode_rs::types::{NusEvent, SessionEnd};

#[derive(Default)]
struct Sink {
    writes: Mutex<Vec<Vec<u8>>>,
}

#[async_trait]
impl Uplink for Sink {
    fn max_write_size(&self) -> usize {
        20
    }

    async fn write_chunk(&self, chunk: &[u8]) -> Result<()> {
        self.writes.lock().unwrap().push(chunk.to_vec());
        Ok(())
    }
}

#[test]
fn three_frames_give_header_plus_three_rows_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let log = CsvLog::create(dir.path().join("led_data.csv")).unwrap();

    let frames = [
        encode_frame([0, 0, 0, 0]),
        encode_frame([0x40_0000, 0x20_0000, 0x10_0000, 0x08_0000]),
        encode_frame([0x80_0000, 0, 0, 0x7F_FFFF]),
    ];
    for (i, f) in frames.iter().enumerate() {
        record_frame(&log, f, 1_700_000_000.0 + i as f64 * 0.25).unwrap();
    }

    let text = std::fs::read_to_string(log.path()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "Time,670nm,850nm,950nm,1300nm");
    assert!(lines[1..].iter().all(|l| l.split(',').count() == 5));

    let history = read_history(log.path()).unwrap();
    let ts: Vec<f64> = history.records.iter().map(|r| r.timestamp).collect();
    assert_eq!(ts, vec![1_700_000_000.0, 1_700_000_000.25, 1_700_000_000.5]);
    assert_eq!(history.records[1].readings.0, [2.0, 1.0, 0.5, 0.25]);
    assert_eq!(history.records[2].readings.0[0], 4.0);
}

#[test]
fn restarting_the_collector_truncates_the_log() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("led_data.csv");
    let log = CsvLog::create(&path).unwrap();
    record_frame(&log, &[0u8; 12], 1.0).unwrap();

    let log = CsvLog::create(&path).unwrap();
    assert!(read_history(log.path()).unwrap().records.is_empty());
}

#[tokio::test]
async fn session_logs_frames_skips_garbage_and_relays_input() {
    let dir = tempfile::tempdir().unwrap();
    let log = CsvLog::create(dir.path().join("led_data.csv")).unwrap();
    let sink = Arc::new(Sink::default());

    let (ev_tx, ev_rx) = mpsc::channel(16);
    let (line_tx, line_rx) = mpsc::unbounded_channel();

    let long_line = b"set gain 4 on all four channels please\n".to_vec();
    line_tx.send(long_line.clone()).unwrap();

    ev_tx.send(NusEvent::Connected("rig".into())).await.unwrap();
    ev_tx.send(NusEvent::Notification(vec![0; 12])).await.unwrap();
    ev_tx.send(NusEvent::Notification(vec![1, 2, 3])).await.unwrap();
    ev_tx
        .send(NusEvent::Notification(encode_frame([1, 2, 3, 4]).to_vec()))
        .await
        .unwrap();

    let session = tokio::spawn({
        let sink = Arc::clone(&sink);
        let log = log.clone();
        async move { session::run(sink, ev_rx, line_rx, &log).await }
    });

    // Let the relay drain the line before the link goes away.
    for _ in 0..100 {
        if sink.writes.lock().unwrap().concat() == long_line {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    ev_tx.send(NusEvent::Disconnected).await.unwrap();

    let end = session.await.unwrap();
    assert_eq!(end, SessionEnd::PeripheralDisconnected);

    let writes = sink.writes.lock().unwrap();
    assert!(writes.len() > 1);
    assert!(writes.iter().all(|w| !w.is_empty() && w.len() <= 20));
    assert_eq!(writes.concat(), long_line);

    let history = read_history(log.path()).unwrap();
    assert_eq!(history.records.len(), 2);
    drop(line_tx);
}

#[test]
fn viewer_tick_with_missing_column_keeps_previous_charts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("led_data.csv");

    let mut state = PlotState::new(&path);
    assert!(matches!(state.refresh(), Err(HistoryError::NotFound(_))));

    std::fs::write(&path, "").unwrap();
    assert!(matches!(state.refresh(), Err(HistoryError::Empty)));

    let log = CsvLog::create(&path).unwrap();
    record_frame(&log, &encode_frame([0x20_0000; 4]), 10.0).unwrap();
    record_frame(&log, &encode_frame([0x40_0000; 4]), 11.0).unwrap();
    state.refresh().unwrap();
    assert_eq!(state.series.silicon, vec![(0.0, 3.0), (1.0, 6.0)]);
    assert_eq!(state.series.inga, vec![(0.0, 1.0), (1.0, 2.0)]);
    let good = state.series.clone();

    std::fs::write(&path, "Time,670nm,850nm,950nm\n12.0,1.0,1.0,1.0\n").unwrap();
    assert!(matches!(
        state.refresh(),
        Err(HistoryError::MissingColumn("1300nm"))
    ));
    assert_eq!(state.series, good);
    assert!(state.last_error.is_some());

    // Next tick recovers unconditionally.
    let log = CsvLog::create(&path).unwrap();
    record_frame(&log, &[0u8; 12], 20.0).unwrap();
    state.refresh().unwrap();
    assert_eq!(state.series.len(), 1);
    assert!(state.last_error.is_none());
}
