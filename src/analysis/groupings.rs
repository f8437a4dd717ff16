//! Observation grouping and survey-row organization.
//!
//! `group_by_pair` takes the flat list of `FieldObservation`s produced by the
//! ingest layer and organizes them per (reach, sensor) pair, which is the
//! unit the calibrator works on. `survey_rows` collapses the same list into
//! one labeled row per (reach, timestamp) for the evaluator.

use chrono::NaiveDateTime;
use std::collections::{BTreeMap, HashSet};

use crate::model::{FieldObservation, LabeledState, PairKey};

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

/// Groups observations into a map keyed by (reach, sensor).
///
/// Within each group the input order is preserved.
pub fn group_by_pair(observations: &[FieldObservation]) -> BTreeMap<PairKey, Vec<FieldObservation>> {
    let mut grouped: BTreeMap<PairKey, Vec<FieldObservation>> = BTreeMap::new();

    for observation in observations {
        grouped
            .entry(PairKey::new(observation.reach_id.clone(), observation.sensor_id.clone()))
            .or_default()
            .push(observation.clone());
    }

    grouped
}

// ---------------------------------------------------------------------------
// Survey rows
// ---------------------------------------------------------------------------

/// A labeled (reach, instant) used as ground truth during evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct SurveyRow {
    pub reach_id: String,
    pub observed_at: NaiveDateTime,
    pub state: LabeledState,
}

/// Deduplicates observations into survey rows. A survey visit is recorded
/// once per sensor, so several observations share a (reach, timestamp); the
/// first occurrence wins.
pub fn survey_rows(observations: &[FieldObservation]) -> Vec<SurveyRow> {
    let mut seen: HashSet<(&str, NaiveDateTime)> = HashSet::new();
    let mut rows = Vec::new();

    for observation in observations {
        if seen.insert((observation.reach_id.as_str(), observation.observed_at)) {
            rows.push(SurveyRow {
                reach_id: observation.reach_id.clone(),
                observed_at: observation.observed_at,
                state: observation.state,
            });
        }
    }

    rows
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{fixtures::*, tables::parse_observations};

    #[test]
    fn test_group_by_pair_produces_one_entry_per_pair() {
        let observations = parse_observations(fixture_observations_csv()).expect("fixture should parse");
        let grouped = group_by_pair(&observations);
        assert_eq!(grouped.len(), 2, "fixture labels R1/S1 and R2/S2 only");
        assert_eq!(grouped[&PairKey::new("R1", "S1")].len(), 4);
        assert_eq!(grouped[&PairKey::new("R2", "S2")].len(), 2);
    }

    #[test]
    fn test_group_by_pair_empty_input_returns_empty_map() {
        assert!(group_by_pair(&[]).is_empty());
    }

    #[test]
    fn test_survey_rows_first_occurrence_wins() {
        let text = "location_id,sensor,state,water_level,observed_at\n\
                    R1,S1,flow,0.3,2021-07-01 12:00:00\n\
                    R1,S2,no_flow,0.1,2021-07-01 12:00:00\n\
                    R1,S1,no_flow,0.1,2021-07-02 12:00:00\n";
        let observations = parse_observations(text).expect("should parse");
        let rows = survey_rows(&observations);

        assert_eq!(rows.len(), 2, "two distinct (reach, timestamp) visits");
        assert_eq!(rows[0].state, LabeledState::Flow, "first label for the visit should be kept");
        assert_eq!(rows[1].state, LabeledState::NoFlow);
    }

    #[test]
    fn test_survey_rows_keep_distinct_reaches_at_same_time() {
        let observations = parse_observations(fixture_observations_csv()).expect("fixture should parse");
        let rows = survey_rows(&observations);
        // R1 has 4 visits, R2 shares 12:00 timestamps with R1 but is a different reach.
        assert_eq!(rows.len(), 6);
    }
}
