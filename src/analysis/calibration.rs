//! Threshold calibration.
//!
//! For every (reach, sensor) pair a single water level boundary is derived
//! from the surveyed labels: readings strictly above the boundary vote
//! "flow", readings at or below it vote "no flow".
//!
//! # Calibration Rules
//!
//! 1. **No labels**: no boundary, no score.
//! 2. **One class only**: the boundary is pushed to the edge of the
//!    sensor's entire reading history (its minimum when only flow was seen,
//!    its maximum when only no-flow was seen). Nothing contradicts it, so the
//!    score is 0.
//! 3. **Both classes**: every labeled level is a candidate (flow levels
//!    shifted down by `SENSOR_VALUE_RESOLUTION`). Each candidate is scored by
//!    the number of labels it misclassifies; the boundary is the mean of all
//!    candidates sharing the minimum score, and that minimum is the score.
//!
//! Pairs are independent, so `calibrate_all` spreads them over a thread pool
//! and reassembles the results in key order.

use std::collections::{BTreeMap, HashMap};
use std::sync::{mpsc, Arc};
use threadpool::ThreadPool;

use crate::analysis::groupings::group_by_pair;
use crate::model::{
    CalibrationError, FieldObservation, PairKey, Reach, ReadingTable, Threshold, ThresholdTable,
    SENSOR_VALUE_RESOLUTION,
};

// ---------------------------------------------------------------------------
// Single pair
// ---------------------------------------------------------------------------

/// Calibrates the threshold for one (reach, sensor) pair.
///
/// `observations` are the labeled observations of this pair only and
/// `history` is every non-missing reading the sensor has recorded.
///
/// # Errors
/// `CalibrationError::MissingWaterLevel` if any labeled observation lacks a
/// water level.
pub fn calibrate(
    reach_id: &str,
    sensor_id: &str,
    observations: &[FieldObservation],
    history: &[f64],
) -> Result<Threshold, CalibrationError> {
    let mut flow_levels = Vec::new();
    let mut no_flow_levels = Vec::new();

    for observation in observations {
        let level = observation
            .water_level
            .ok_or_else(|| CalibrationError::MissingWaterLevel {
                reach_id: reach_id.to_string(),
                sensor_id: sensor_id.to_string(),
                observed_at: observation.observed_at,
            })?;

        if observation.state.is_flowing() {
            flow_levels.push(level);
        } else {
            no_flow_levels.push(level);
        }
    }

    let (value, score) = match (flow_levels.is_empty(), no_flow_levels.is_empty()) {
        (true, true) => return Ok(Threshold::undefined(reach_id, sensor_id)),
        (false, true) => (history.iter().copied().reduce(f64::min), 0),
        (true, false) => (history.iter().copied().reduce(f64::max), 0),
        (false, false) => {
            let (value, score) = best_split(&flow_levels, &no_flow_levels);
            (Some(value), score)
        }
    };

    Ok(Threshold {
        reach_id: reach_id.to_string(),
        sensor_id: sensor_id.to_string(),
        value,
        score: Some(score),
    })
}

/// Number of labels `candidate` gets wrong: no-flow levels above it plus
/// flow levels at or below it.
fn misclassifications(candidate: f64, flow_levels: &[f64], no_flow_levels: &[f64]) -> u32 {
    let false_flow = no_flow_levels.iter().filter(|&&l| l > candidate).count();
    let false_dry = flow_levels.iter().filter(|&&l| l <= candidate).count();
    (false_flow + false_dry) as u32
}

/// Returns the averaged best candidate and its misclassification count.
/// Both slices must be non-empty.
fn best_split(flow_levels: &[f64], no_flow_levels: &[f64]) -> (f64, u32) {
    let candidates = flow_levels
        .iter()
        .map(|l| l - SENSOR_VALUE_RESOLUTION)
        .chain(no_flow_levels.iter().copied());

    let scored: Vec<(f64, u32)> = candidates
        .map(|c| (c, misclassifications(c, flow_levels, no_flow_levels)))
        .collect();

    let best_score = scored.iter().map(|&(_, s)| s).min().unwrap_or(0);

    // Sorted before summing so the mean does not depend on input order.
    let mut winners: Vec<f64> = scored
        .iter()
        .filter(|&&(_, s)| s == best_score)
        .map(|&(c, _)| c)
        .collect();
    winners.sort_by(f64::total_cmp);

    let mean = winners.iter().sum::<f64>() / winners.len() as f64;
    (mean, best_score)
}

// ---------------------------------------------------------------------------
// Whole network
// ---------------------------------------------------------------------------

/// Calibrates every (reach, sensor) pair of the network.
///
/// The pair universe is every reach crossed with every sensor column of the
/// reading table, plus any pair named by an observation. Unlabeled pairs get
/// an undefined threshold. Work is spread over `workers` threads; the result
/// does not depend on scheduling.
///
/// # Errors
/// The first calibration error in (reach, sensor) order aborts the run.
pub fn calibrate_all(
    reaches: &[Reach],
    observations: &[FieldObservation],
    readings: &ReadingTable,
    workers: usize,
) -> Result<ThresholdTable, CalibrationError> {
    let mut grouped = group_by_pair(observations);
    for reach in reaches {
        for sensor_id in readings.sensors() {
            grouped
                .entry(PairKey::new(reach.reach_id.clone(), sensor_id.clone()))
                .or_default();
        }
    }

    let histories: HashMap<String, Vec<f64>> = grouped
        .keys()
        .map(|key| (key.sensor_id.clone(), readings.history(&key.sensor_id)))
        .collect();
    let histories = Arc::new(histories);

    let pool = ThreadPool::new(workers.max(1));
    let (tx, rx) = mpsc::channel();
    let job_count = grouped.len();

    for (key, pair_observations) in grouped {
        let tx = tx.clone();
        let histories = Arc::clone(&histories);
        pool.execute(move || {
            let history = histories.get(&key.sensor_id).map(Vec::as_slice).unwrap_or(&[]);
            let result = calibrate(&key.reach_id, &key.sensor_id, &pair_observations, history);
            // The receiver is alive until every job has reported.
            let _ = tx.send((key, result));
        });
    }
    drop(tx);

    let results: BTreeMap<PairKey, Result<Threshold, CalibrationError>> = rx.iter().collect();
    assemble(results, job_count)
}

/// Builds the table from per-pair results. The first error in key order
/// wins; a result set smaller than `job_count` means a worker died.
fn assemble(
    results: BTreeMap<PairKey, Result<Threshold, CalibrationError>>,
    job_count: usize,
) -> Result<ThresholdTable, CalibrationError> {
    let finished = results.len();

    let mut entries = BTreeMap::new();
    for (key, result) in results {
        let threshold = result?;
        log::debug!(
            "calibrated {}: value={:?} score={:?}",
            key,
            threshold.value,
            threshold.score
        );
        entries.insert(key, threshold);
    }

    if finished != job_count {
        log::error!("calibration finished {} of {} pairs", finished, job_count);
        return Err(CalibrationError::Incomplete {
            finished,
            expected: job_count,
        });
    }

    let defined = entries.values().filter(|t| t.value.is_some()).count();
    log::info!(
        "calibrated {} (reach, sensor) pairs, {} with a usable threshold",
        entries.len(),
        defined
    );

    Ok(ThresholdTable::from_entries(entries))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
