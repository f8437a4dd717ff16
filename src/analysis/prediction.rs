//! Reach state prediction by sensor majority vote.
//!
//! # Prediction Process
//!
//! 1. **Row lookup**: the reading row nearest the query time within
//!    `±PREDICTION_WINDOW_MINUTES` is selected. No row means no prediction.
//! 2. **Voting**: every sensor with a reading in that row votes "flow" when
//!    its reading is strictly above its (reach, sensor) threshold and
//!    "no flow" otherwise. Sensors without a usable threshold abstain.
//! 3. **Tie-break**: on an even split the least trustworthy vote is
//!    discarded: highest misclassification score first, then the reading
//!    closest to its threshold. If the surviving candidates are still evenly
//!    split the tie stands.
//! 4. **Decision**: the side with more (adjusted) votes wins.

use chrono::{Duration, NaiveDateTime};

use crate::model::{
    FlowState, Prediction, PredictionError, ReadingRow, ReadingTable, ThresholdTable,
    UndecidableReason, Vote, VoteRecord, PREDICTION_WINDOW_MINUTES,
};

/// Everything that went into one prediction, for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionDetail {
    pub reach_id: String,
    pub requested_at: NaiveDateTime,
    /// Timestamp of the reading row used, if any fell in the window.
    pub row_time: Option<NaiveDateTime>,
    pub votes: Vec<VoteRecord>,
    pub flow_votes: u32,
    pub no_flow_votes: u32,
    /// Vote counts after the tie-break discarded a ballot.
    pub adjusted_flow_votes: u32,
    pub adjusted_no_flow_votes: u32,
    pub prediction: Prediction,
}

// ---------------------------------------------------------------------------
// Public entry points
// ---------------------------------------------------------------------------

/// Predicts the state of `reach_id` at `at`.
///
/// # Errors
/// `PredictionError::NonFiniteReading` if a sensor value in the selected row
/// is NaN or infinite.
pub fn predict(
    reach_id: &str,
    at: NaiveDateTime,
    readings: &ReadingTable,
    thresholds: &ThresholdTable,
) -> Result<Prediction, PredictionError> {
    explain(reach_id, at, readings, thresholds).map(|detail| detail.prediction)
}

/// Like `predict`, but returns the full ballot alongside the result.
pub fn explain(
    reach_id: &str,
    at: NaiveDateTime,
    readings: &ReadingTable,
    thresholds: &ThresholdTable,
) -> Result<PredictionDetail, PredictionError> {
    let window = Duration::minutes(PREDICTION_WINDOW_MINUTES);

    let Some(row) = readings.nearest_row(at, window) else {
        log::debug!("{} @ {}: no reading within ±{} min", reach_id, at, PREDICTION_WINDOW_MINUTES);
        return Ok(PredictionDetail {
            reach_id: reach_id.to_string(),
            requested_at: at,
            row_time: None,
            votes: Vec::new(),
            flow_votes: 0,
            no_flow_votes: 0,
            adjusted_flow_votes: 0,
            adjusted_no_flow_votes: 0,
            prediction: Prediction::Undecidable(UndecidableReason::NoReadingInWindow),
        });
    };

    let votes = cast_votes(reach_id, row, readings.sensors(), thresholds)?;
    let flow_votes = votes.iter().filter(|v| v.vote == Vote::Flow).count() as u32;
    let no_flow_votes = votes.iter().filter(|v| v.vote == Vote::NoFlow).count() as u32;

    let (adjusted_flow_votes, adjusted_no_flow_votes) = if flow_votes == no_flow_votes && flow_votes > 0 {
        match break_tie(&votes) {
            Some(Vote::Flow) => (flow_votes - 1, no_flow_votes),
            Some(Vote::NoFlow) => (flow_votes, no_flow_votes - 1),
            _ => (flow_votes, no_flow_votes),
        }
    } else {
        (flow_votes, no_flow_votes)
    };

    let prediction = if flow_votes == 0 && no_flow_votes == 0 {
        Prediction::Undecidable(UndecidableReason::NoVotes)
    } else if adjusted_flow_votes > adjusted_no_flow_votes {
        Prediction::Decided(FlowState::Flow)
    } else if adjusted_flow_votes < adjusted_no_flow_votes {
        Prediction::Decided(FlowState::NoFlow)
    } else {
        Prediction::Undecidable(UndecidableReason::Tie)
    };

    log::debug!(
        "{} @ {}: {} flow / {} no-flow (adjusted {} / {}) -> {}",
        reach_id,
        at,
        flow_votes,
        no_flow_votes,
        adjusted_flow_votes,
        adjusted_no_flow_votes,
        prediction
    );

    Ok(PredictionDetail {
        reach_id: reach_id.to_string(),
        requested_at: at,
        row_time: Some(row.observed_at),
        votes,
        flow_votes,
        no_flow_votes,
        adjusted_flow_votes,
        adjusted_no_flow_votes,
        prediction,
    })
}

// ---------------------------------------------------------------------------
// Voting
// ---------------------------------------------------------------------------

/// One record per sensor with a reading in `row`; missing readings cast no
/// ballot at all.
fn cast_votes(
    reach_id: &str,
    row: &ReadingRow,
    sensors: &[String],
    thresholds: &ThresholdTable,
) -> Result<Vec<VoteRecord>, PredictionError> {
    let mut votes = Vec::new();

    for (sensor_id, value) in sensors.iter().zip(&row.values) {
        let Some(reading) = *value else {
            continue;
        };
        if !reading.is_finite() {
            return Err(PredictionError::NonFiniteReading {
                sensor_id: sensor_id.clone(),
                observed_at: row.observed_at,
                value: reading,
            });
        }

        let threshold = thresholds.get(reach_id, sensor_id);
        let score = threshold.and_then(|t| t.score);

        let record = match threshold.and_then(|t| t.value) {
            Some(boundary) => VoteRecord {
                sensor_id: sensor_id.clone(),
                reading,
                threshold: Some(boundary),
                score,
                distance: Some((reading - boundary).abs()),
                vote: if reading > boundary { Vote::Flow } else { Vote::NoFlow },
            },
            None => VoteRecord {
                sensor_id: sensor_id.clone(),
                reading,
                threshold: None,
                score,
                distance: None,
                vote: Vote::Abstain,
            },
        };
        votes.push(record);
    }

    Ok(votes)
}

/// Higher is less reliable. A threshold without a score is trusted least.
fn unreliability(score: Option<u32>) -> u64 {
    score.map_or(u64::MAX, u64::from)
}

/// Picks the side that loses one ballot on an even split, or `None` when
/// the least trustworthy candidates are themselves evenly split.
fn break_tie(votes: &[VoteRecord]) -> Option<Vote> {
    let mut pool: Vec<&VoteRecord> = votes.iter().filter(|v| v.vote != Vote::Abstain).collect();

    let worst = pool.iter().map(|v| unreliability(v.score)).max()?;
    pool.retain(|v| unreliability(v.score) == worst);

    let closest = pool
        .iter()
        .filter_map(|v| v.distance)
        .min_by(f64::total_cmp)?;
    pool.retain(|v| v.distance == Some(closest));

    let flow = pool.iter().filter(|v| v.vote == Vote::Flow).count();
    let no_flow = pool.len() - flow;

    if flow == no_flow {
        None
    } else if flow > no_flow {
        Some(Vote::Flow)
    } else {
        Some(Vote::NoFlow)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::calibration::calibrate_all;
    use crate::ingest::{fixtures::*, tables::*};
    use crate::model::Threshold;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 7, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    /// Single reading row at 12:00 with the given sensor values.
    fn one_row(values: &[(&str, Option<f64>)]) -> ReadingTable {
        ReadingTable::new(
            values.iter().map(|(s, _)| s.to_string()).collect(),
            vec![ReadingRow {
                observed_at: at(12, 0),
                values: values.iter().map(|(_, v)| *v).collect(),
            }],
        )
    }

    fn thresholds(entries: &[(&str, Option<f64>, Option<u32>)]) -> ThresholdTable {
        ThresholdTable::from_thresholds(
            entries
                .iter()
                .map(|&(sensor, value, score)| Threshold {
                    reach_id: "R1".to_string(),
                    sensor_id: sensor.to_string(),
                    value,
                    score,
                })
                .collect(),
        )
        .unwrap()
    }

    // --- Window lookup -----------------------------------------------------

    #[test]
    fn test_no_reading_in_window_is_undecidable() {
        let readings = one_row(&[("S1", Some(1.0))]);
        let table = thresholds(&[("S1", Some(0.5), Some(0))]);

        let prediction = predict("R1", at(13, 0), &readings, &table).unwrap();
        assert_eq!(prediction, Prediction::Undecidable(UndecidableReason::NoReadingInWindow));
    }

    #[test]
    fn test_reading_at_window_edge_is_used() {
        let readings = one_row(&[("S1", Some(1.0))]);
        let table = thresholds(&[("S1", Some(0.5), Some(0))]);

        let prediction = predict("R1", at(12, 5), &readings, &table).unwrap();
        assert_eq!(prediction, Prediction::Decided(FlowState::Flow));
    }

    // --- Majority ----------------------------------------------------------

    #[test]
    fn test_two_flow_one_no_flow_predicts_flow() {
        let readings = one_row(&[("S1", Some(1.0)), ("S2", Some(2.0)), ("S3", Some(0.1))]);
        let table = thresholds(&[
            ("S1", Some(0.5), Some(0)),
            ("S2", Some(0.5), Some(3)),
            ("S3", Some(0.5), Some(0)),
        ]);

        let detail = explain("R1", at(12, 0), &readings, &table).unwrap();
        assert_eq!((detail.flow_votes, detail.no_flow_votes), (2, 1));
        assert_eq!(detail.prediction, Prediction::Decided(FlowState::Flow));
    }

    #[test]
    fn test_reading_equal_to_threshold_votes_no_flow() {
        let readings = one_row(&[("S1", Some(0.5))]);
        let table = thresholds(&[("S1", Some(0.5), Some(0))]);

        let prediction = predict("R1", at(12, 0), &readings, &table).unwrap();
        assert_eq!(prediction, Prediction::Decided(FlowState::NoFlow));
    }

    // --- Abstention --------------------------------------------------------

    #[test]
    fn test_sensor_without_threshold_abstains() {
        let readings = one_row(&[("S1", Some(1.0)), ("S2", Some(0.0)), ("S3", Some(0.0))]);
        // S2 has no row at all; S3 has a row with a null value.
        let table = thresholds(&[("S1", Some(0.5), Some(0)), ("S3", None, Some(1))]);

        let detail = explain("R1", at(12, 0), &readings, &table).unwrap();
        assert_eq!(detail.votes.len(), 3, "every non-null reading is recorded");
        assert_eq!(detail.votes[1].vote, Vote::Abstain);
        assert_eq!(detail.votes[2].vote, Vote::Abstain);
        assert_eq!(detail.votes[2].score, Some(1), "abstaining sensor keeps its known score");
        assert_eq!(detail.prediction, Prediction::Decided(FlowState::Flow));
    }

    #[test]
    fn test_null_reading_casts_no_ballot() {
        let readings = one_row(&[("S1", None), ("S2", Some(1.0))]);
        let table = thresholds(&[("S1", Some(0.5), Some(0)), ("S2", Some(0.5), Some(0))]);

        let detail = explain("R1", at(12, 0), &readings, &table).unwrap();
        assert_eq!(detail.votes.len(), 1);
        assert_eq!(detail.votes[0].sensor_id, "S2");
    }

    #[test]
    fn test_all_abstaining_is_no_votes() {
        let readings = one_row(&[("S1", Some(1.0))]);
        let table = ThresholdTable::default();

        let prediction = predict("R1", at(12, 0), &readings, &table).unwrap();
        assert_eq!(prediction, Prediction::Undecidable(UndecidableReason::NoVotes));
    }

    // --- Tie-break ---------------------------------------------------------

    #[test]
    fn test_symmetric_tie_is_undecidable() {
        // Equal scores and both readings exactly 0.25 from the boundary.
        let readings = one_row(&[("S1", Some(0.75)), ("S2", Some(0.25))]);
        let table = thresholds(&[("S1", Some(0.5), Some(1)), ("S2", Some(0.5), Some(1))]);

        let prediction = predict("R1", at(12, 0), &readings, &table).unwrap();
        assert_eq!(prediction, Prediction::Undecidable(UndecidableReason::Tie));
    }

    #[test]
    fn test_tie_drops_least_reliable_vote() {
        // S1 votes flow but misclassified 2 labels; S2 votes no-flow with a clean record.
        let readings = one_row(&[("S1", Some(0.9)), ("S2", Some(0.49))]);
        let table = thresholds(&[("S1", Some(0.5), Some(2)), ("S2", Some(0.5), Some(0))]);

        let detail = explain("R1", at(12, 0), &readings, &table).unwrap();
        assert_eq!((detail.adjusted_flow_votes, detail.adjusted_no_flow_votes), (0, 1));
        assert_eq!(detail.prediction, Prediction::Decided(FlowState::NoFlow));
    }

    #[test]
    fn test_tie_with_equal_scores_drops_vote_closest_to_threshold() {
        // Both scores 1; S1 is 0.01 above its threshold, S2 is 0.2 below.
        let readings = one_row(&[("S1", Some(0.51)), ("S2", Some(0.3))]);
        let table = thresholds(&[("S1", Some(0.5), Some(1)), ("S2", Some(0.5), Some(1))]);

        let prediction = predict("R1", at(12, 0), &readings, &table).unwrap();
        assert_eq!(prediction, Prediction::Decided(FlowState::NoFlow));
    }

    #[test]
    fn test_unknown_score_ranks_as_least_reliable() {
        let readings = one_row(&[("S1", Some(0.6)), ("S2", Some(0.4))]);
        let table = thresholds(&[("S1", Some(0.5), Some(5)), ("S2", Some(0.5), None)]);

        let prediction = predict("R1", at(12, 0), &readings, &table).unwrap();
        assert_eq!(prediction, Prediction::Decided(FlowState::Flow), "S2 should be discarded");
    }

    #[test]
    fn test_tie_pool_of_one_side_drops_from_that_side() {
        // 2-2 split; the two flow votes share the worst score and distance.
        let readings = one_row(&[
            ("S1", Some(0.6)),
            ("S2", Some(0.6)),
            ("S3", Some(0.1)),
            ("S4", Some(0.2)),
        ]);
        let table = thresholds(&[
            ("S1", Some(0.5), Some(3)),
            ("S2", Some(0.5), Some(3)),
            ("S3", Some(0.5), Some(0)),
            ("S4", Some(0.5), Some(0)),
        ]);

        let detail = explain("R1", at(12, 0), &readings, &table).unwrap();
        assert_eq!((detail.adjusted_flow_votes, detail.adjusted_no_flow_votes), (1, 2));
        assert_eq!(detail.prediction, Prediction::Decided(FlowState::NoFlow));
    }

    // --- Validation --------------------------------------------------------

    #[test]
    fn test_non_finite_reading_is_fatal() {
        let readings = one_row(&[("S1", Some(f64::NAN))]);
        let table = thresholds(&[("S1", Some(0.5), Some(0))]);

        let err = predict("R1", at(12, 0), &readings, &table).unwrap_err();
        assert!(matches!(err, PredictionError::NonFiniteReading { ref sensor_id, .. } if sensor_id == "S1"));
    }

    // --- Calibration round trip --------------------------------------------

    #[test]
    fn test_calibrated_thresholds_reproduce_training_labels() {
        let reaches = parse_reaches(fixture_reaches_csv()).unwrap();
        let observations = parse_observations(fixture_observations_csv()).unwrap();
        let readings = parse_readings(fixture_readings_csv()).unwrap();
        let table = calibrate_all(&reaches, &observations, &readings, 2).unwrap();

        for observation in &observations {
            let prediction = predict(&observation.reach_id, observation.observed_at, &readings, &table).unwrap();
            let expected = if observation.state.is_flowing() {
                FlowState::Flow
            } else {
                FlowState::NoFlow
            };
            assert_eq!(
                prediction,
                Prediction::Decided(expected),
                "{} at {} should reproduce its label",
                observation.reach_id,
                observation.observed_at
            );
        }
    }
}
