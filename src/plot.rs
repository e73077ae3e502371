//! Viewer-side model: the two derived series and the refresh policy.
//!
//! Rendering lives in the `viewer` binary; this module holds no terminal
//! state so it can be tested directly.

use std::path::{Path, PathBuf};

use log::{debug, error};

use crate::csv_log::{read_history, History, HistoryError};
use crate::types::LogRecord;

/// The two plotted series, as `(seconds since first sample, value)` points.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    /// `670nm + 850nm + 950nm`
    pub silicon: Vec<(f64, f64)>,
    /// `1300nm`
    pub inga: Vec<(f64, f64)>,
    /// Unix timestamp of the first record, `None` when there are no records.
    pub t0: Option<f64>,
}

impl Series {
    /// Recompute both series from the full record history.
    ///
    /// X values are offsets from the first record so axis labels stay short;
    /// [`Series::t0`] keeps the absolute origin.
    pub fn derive(records: &[LogRecord]) -> Self {
        let t0 = records.first().map(|r| r.timestamp);
        let origin = t0.unwrap_or(0.0);
        let x = |r: &LogRecord| r.timestamp - origin;
        Self {
            silicon: records.iter().map(|r| (x(r), r.readings.silicon())).collect(),
            inga: records.iter().map(|r| (x(r), r.readings.inga())).collect(),
            t0,
        }
    }

    pub fn len(&self) -> usize {
        self.silicon.len()
    }

    pub fn is_empty(&self) -> bool {
        self.silicon.is_empty()
    }

    /// Shared x-axis range for both charts.
    pub fn x_bounds(&self) -> [f64; 2] {
        padded_bounds(self.silicon.iter().map(|&(x, _)| x), 0.0)
    }

    pub fn silicon_bounds(&self) -> [f64; 2] {
        padded_bounds(self.silicon.iter().map(|&(_, y)| y), 0.05)
    }

    pub fn inga_bounds(&self) -> [f64; 2] {
        padded_bounds(self.inga.iter().map(|&(_, y)| y), 0.05)
    }
}

/// Min/max of `values` widened by `pad` × span on each side.
///
/// Never returns a zero-width range: an empty input gives `[0, 1]` and a flat
/// input is widened by ±0.5.
pub fn padded_bounds(values: impl Iterator<Item = f64>, pad: f64) -> [f64; 2] {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if lo > hi {
        return [0.0, 1.0];
    }
    let span = hi - lo;
    if span < 1e-12 {
        return [lo - 0.5, hi + 0.5];
    }
    [lo - span * pad, hi + span * pad]
}

/// Everything the viewer needs to draw a frame.
#[derive(Debug)]
pub struct PlotState {
    path: PathBuf,
    /// Last successfully loaded series. Left untouched by failed refreshes.
    pub series: Series,
    /// Rows skipped in the last successful read.
    pub skipped: usize,
    /// Message from the most recent failed refresh, cleared on success.
    pub last_error: Option<String>,
    /// Number of refresh attempts so far.
    pub ticks: u64,
}

impl PlotState {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            series: Series::default(),
            skipped: 0,
            last_error: None,
            ticks: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the whole log and rebuild the series.
    ///
    /// On failure the error is logged and stored in `last_error`, and the
    /// previously drawn series are kept. The caller simply tries again on
    /// the next tick.
    pub fn refresh(&mut self) -> Result<(), HistoryError> {
        self.ticks += 1;
        match read_history(&self.path) {
            Ok(History { records, skipped }) => {
                self.series = Series::derive(&records);
                self.skipped = skipped;
                self.last_error = None;
                debug!("Refresh #{}: {} record(s), {skipped} skipped", self.ticks, records.len());
                Ok(())
            }
            Err(e) => {
                error!("Error: {e}");
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }
}
