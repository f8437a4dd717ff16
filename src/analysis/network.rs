//! Network-wide flowing drainage network length (FDNL).
//!
//! FDNL at an instant is the summed length of every reach predicted to be
//! flowing. It is only defined when every reach resolves to a definite
//! state; one undecidable reach leaves the whole instant undefined.
//!
//! Series are evaluated one timestamp at a time. A failing timestamp is
//! logged and recorded as undefined without stopping the series.

use chrono::{Duration, NaiveDateTime};
use thiserror::Error;

use crate::analysis::prediction::predict;
use crate::model::{FlowState, Prediction, PredictionError, Reach, ReadingTable, ThresholdTable};

/// Invalid series range.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    #[error("series step must be positive, got {minutes} minutes")]
    NonPositiveStep { minutes: i64 },
}

/// FDNL at one instant; `None` when any reach was undecidable or the
/// instant failed.
#[derive(Debug, Clone, PartialEq)]
pub struct FdnlPoint {
    pub at: NaiveDateTime,
    pub fdnl: Option<f64>,
}

/// Per-reach predictions at one instant, in reach order. `None` when the
/// instant failed.
#[derive(Debug, Clone, PartialEq)]
pub struct ReachStateRow {
    pub at: NaiveDateTime,
    pub states: Option<Vec<Prediction>>,
}

// ---------------------------------------------------------------------------
// Single instant
// ---------------------------------------------------------------------------

/// Predicts every reach at `at`, in the order given.
pub fn reach_states_at(
    at: NaiveDateTime,
    reaches: &[Reach],
    readings: &ReadingTable,
    thresholds: &ThresholdTable,
) -> Result<Vec<Prediction>, PredictionError> {
    reaches
        .iter()
        .map(|reach| predict(&reach.reach_id, at, readings, thresholds))
        .collect()
}

/// Summed length of flowing reaches at `at`. Unknown lengths count as 0.
///
/// Returns `Ok(None)` as soon as one reach is undecidable.
pub fn fdnl_at(
    at: NaiveDateTime,
    reaches: &[Reach],
    readings: &ReadingTable,
    thresholds: &ThresholdTable,
) -> Result<Option<f64>, PredictionError> {
    let mut total = 0.0;

    for reach in reaches {
        match predict(&reach.reach_id, at, readings, thresholds)? {
            Prediction::Decided(FlowState::Flow) => total += reach.length.unwrap_or(0.0),
            Prediction::Decided(FlowState::NoFlow) => {}
            undecided @ Prediction::Undecidable(_) => {
                log::debug!("FDNL undefined at {}: reach {} is {}", at, reach.reach_id, undecided);
                return Ok(None);
            }
        }
    }

    Ok(Some(total))
}

// ---------------------------------------------------------------------------
// Series
// ---------------------------------------------------------------------------

/// Timestamps from `start` to `end` inclusive, `step` apart. Empty when
/// `start` is after `end`.
pub fn series_timestamps(
    start: NaiveDateTime,
    end: NaiveDateTime,
    step: Duration,
) -> Result<Vec<NaiveDateTime>, SeriesError> {
    if step <= Duration::zero() {
        return Err(SeriesError::NonPositiveStep {
            minutes: step.num_minutes(),
        });
    }

    let mut timestamps = Vec::new();
    let mut current = start;
    while current <= end {
        timestamps.push(current);
        current += step;
    }
    Ok(timestamps)
}

/// FDNL for every step of `[start, end]`.
pub fn fdnl_series(
    start: NaiveDateTime,
    end: NaiveDateTime,
    step: Duration,
    reaches: &[Reach],
    readings: &ReadingTable,
    thresholds: &ThresholdTable,
) -> Result<Vec<FdnlPoint>, SeriesError> {
    let points: Vec<FdnlPoint> = series_timestamps(start, end, step)?
        .into_iter()
        .map(|at| {
            let fdnl = fdnl_at(at, reaches, readings, thresholds).unwrap_or_else(|e| {
                log::warn!("FDNL failed at {}: {}", at, e);
                None
            });
            FdnlPoint { at, fdnl }
        })
        .collect();

    let defined = points.iter().filter(|p| p.fdnl.is_some()).count();
    log::info!("FDNL series: {} steps, {} defined", points.len(), defined);

    Ok(points)
}

/// Per-reach predictions for every step of `[start, end]`.
pub fn reach_state_series(
    start: NaiveDateTime,
    end: NaiveDateTime,
    step: Duration,
    reaches: &[Reach],
    readings: &ReadingTable,
    thresholds: &ThresholdTable,
) -> Result<Vec<ReachStateRow>, SeriesError> {
    Ok(series_timestamps(start, end, step)?
        .into_iter()
        .map(|at| {
            let states = reach_states_at(at, reaches, readings, thresholds)
                .map_err(|e| log::warn!("reach states failed at {}: {}", at, e))
                .ok();
            ReachStateRow { at, states }
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
