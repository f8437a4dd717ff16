//! Core data types for the flowing drainage network length service.
//!
//! This module defines the shared domain model imported by all other
//! modules: field observations, reach metadata, the wide sensor reading
//! table, calibrated thresholds, and the prediction result types. It
//! contains no I/O.

use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Smallest meaningful water level step. Flow-labeled candidate thresholds
/// are shifted down by this amount so the strict `>` used at prediction time
/// still classifies the observation itself as flowing.
pub const SENSOR_VALUE_RESOLUTION: f64 = 0.001;

/// Half-width of the lookup window around a prediction timestamp.
pub const PREDICTION_WINDOW_MINUTES: i64 = 5;

/// Date-time layout used by every input and output table.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ---------------------------------------------------------------------------
// Field observations
// ---------------------------------------------------------------------------

/// State recorded by a surveyor at an anchor point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabeledState {
    Flow,
    WeakTrickle,
    NoFlow,
}

impl LabeledState {
    /// Parses the label vocabulary used in survey sheets.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "flow" => Some(LabeledState::Flow),
            "wt" | "weak_trickle" => Some(LabeledState::WeakTrickle),
            "no_flow" => Some(LabeledState::NoFlow),
            _ => None,
        }
    }

    /// Weak trickle counts as flowing for calibration and evaluation.
    pub fn is_flowing(&self) -> bool {
        !matches!(self, LabeledState::NoFlow)
    }
}

/// One labeled survey record, tied to the sensor read at survey time.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldObservation {
    pub reach_id: String,
    pub sensor_id: String,
    pub observed_at: NaiveDateTime,
    pub water_level: Option<f64>,
    pub state: LabeledState,
}

// ---------------------------------------------------------------------------
// Reaches
// ---------------------------------------------------------------------------

/// A stream segment whose flow state is predicted as a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Reach {
    pub reach_id: String,
    /// Segment length; unknown lengths contribute nothing to FDNL.
    pub length: Option<f64>,
}

// ---------------------------------------------------------------------------
// Sensor readings
// ---------------------------------------------------------------------------

/// One timestamped row of the wide reading table. `values[i]` belongs to
/// `ReadingTable::sensors[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingRow {
    pub observed_at: NaiveDateTime,
    pub values: Vec<Option<f64>>,
}

/// Time-ordered water level readings, one column per sensor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadingTable {
    sensors: Vec<String>,
    rows: Vec<ReadingRow>,
}

impl ReadingTable {
    /// Builds a table and sorts its rows by timestamp.
    ///
    /// Rows shorter than the sensor list are padded with missing values so
    /// every row can be indexed by sensor position.
    pub fn new(sensors: Vec<String>, mut rows: Vec<ReadingRow>) -> Self {
        for row in &mut rows {
            row.values.resize(sensors.len(), None);
        }
        rows.sort_by_key(|r| r.observed_at);
        Self { sensors, rows }
    }

    pub fn sensors(&self) -> &[String] {
        &self.sensors
    }

    pub fn rows(&self) -> &[ReadingRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn sensor_index(&self, sensor_id: &str) -> Option<usize> {
        self.sensors.iter().position(|s| s == sensor_id)
    }

    /// All non-missing readings ever recorded by `sensor_id`, in time order.
    /// Unknown sensors yield an empty history.
    pub fn history(&self, sensor_id: &str) -> Vec<f64> {
        match self.sensor_index(sensor_id) {
            Some(idx) => self.rows.iter().filter_map(|r| r.values[idx]).collect(),
            None => Vec::new(),
        }
    }

    /// Row closest to `at` within `±window`, bounds inclusive. On equal
    /// distance the earlier row wins.
    pub fn nearest_row(&self, at: NaiveDateTime, window: chrono::Duration) -> Option<&ReadingRow> {
        let start = self.rows.partition_point(|r| r.observed_at < at - window);
        self.rows[start..]
            .iter()
            .take_while(|r| r.observed_at <= at + window)
            .min_by_key(|r| (r.observed_at - at).abs())
    }
}

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

/// Identifies one (reach, sensor) pair. Ordered by reach, then sensor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PairKey {
    pub reach_id: String,
    pub sensor_id: String,
}

impl PairKey {
    pub fn new(reach_id: impl Into<String>, sensor_id: impl Into<String>) -> Self {
        Self {
            reach_id: reach_id.into(),
            sensor_id: sensor_id.into(),
        }
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.reach_id, self.sensor_id)
    }
}

/// Calibrated decision boundary for one (reach, sensor) pair.
///
/// `score` counts the training labels the boundary misclassifies: 0 is a
/// perfectly separating sensor, `None` means no decision was possible.
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    pub reach_id: String,
    pub sensor_id: String,
    pub value: Option<f64>,
    pub score: Option<u32>,
}

impl Threshold {
    /// Threshold for a pair that has no labels at all.
    pub fn undefined(reach_id: &str, sensor_id: &str) -> Self {
        Self {
            reach_id: reach_id.to_string(),
            sensor_id: sensor_id.to_string(),
            value: None,
            score: None,
        }
    }

    pub fn key(&self) -> PairKey {
        PairKey::new(self.reach_id.clone(), self.sensor_id.clone())
    }
}

/// Immutable lookup of thresholds keyed by (reach, sensor). At most one
/// threshold per pair; later inserts for the same pair are refused.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThresholdTable {
    entries: BTreeMap<PairKey, Threshold>,
}

impl ThresholdTable {
    /// Builds the table, returning the first duplicated pair as an error.
    pub fn from_thresholds(thresholds: Vec<Threshold>) -> Result<Self, PairKey> {
        let mut entries = BTreeMap::new();
        for threshold in thresholds {
            let key = threshold.key();
            if entries.contains_key(&key) {
                return Err(key);
            }
            entries.insert(key, threshold);
        }
        Ok(Self { entries })
    }

    /// Wraps entries that are already unique by construction.
    pub(crate) fn from_entries(entries: BTreeMap<PairKey, Threshold>) -> Self {
        Self { entries }
    }

    pub fn get(&self, reach_id: &str, sensor_id: &str) -> Option<&Threshold> {
        self.entries.get(&PairKey::new(reach_id, sensor_id))
    }

    /// Thresholds in (reach, sensor) order.
    pub fn iter(&self) -> impl Iterator<Item = &Threshold> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Prediction results
// ---------------------------------------------------------------------------

/// Definite state of a reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Flow,
    NoFlow,
}

impl FlowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowState::Flow => "flow",
            FlowState::NoFlow => "no_flow",
        }
    }
}

/// Why a prediction could not settle on a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndecidableReason {
    /// No reading row within the lookup window.
    NoReadingInWindow,
    /// A row was found but no sensor cast a flow or no-flow vote.
    NoVotes,
    /// Votes were split and the tie-break could not separate them.
    Tie,
}

/// Outcome of predicting one reach at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prediction {
    Decided(FlowState),
    Undecidable(UndecidableReason),
}

impl Prediction {
    pub fn state(&self) -> Option<FlowState> {
        match self {
            Prediction::Decided(state) => Some(*state),
            Prediction::Undecidable(_) => None,
        }
    }

    pub fn is_flow(&self) -> bool {
        matches!(self, Prediction::Decided(FlowState::Flow))
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prediction::Decided(state) => write!(f, "{}", state.as_str()),
            Prediction::Undecidable(UndecidableReason::NoReadingInWindow) => {
                write!(f, "undecidable (no reading in window)")
            }
            Prediction::Undecidable(UndecidableReason::NoVotes) => {
                write!(f, "undecidable (no votes)")
            }
            Prediction::Undecidable(UndecidableReason::Tie) => write!(f, "undecidable (tie)"),
        }
    }
}

/// A single sensor's ballot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    Flow,
    NoFlow,
    Abstain,
}

impl Vote {
    pub fn as_str(&self) -> &'static str {
        match self {
            Vote::Flow => "flow",
            Vote::NoFlow => "no_flow",
            Vote::Abstain => "abstain",
        }
    }
}

/// One sensor's contribution to a single prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct VoteRecord {
    pub sensor_id: String,
    pub reading: f64,
    pub threshold: Option<f64>,
    pub score: Option<u32>,
    /// `|reading - threshold|`, absent when the sensor abstains.
    pub distance: Option<f64>,
    pub vote: Vote,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised while deriving thresholds.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalibrationError {
    /// Labeled observations must carry a numeric water level.
    #[error("observation for {reach_id}/{sensor_id} at {observed_at} has no water level")]
    MissingWaterLevel {
        reach_id: String,
        sensor_id: String,
        observed_at: NaiveDateTime,
    },
    /// Fewer pairs reported back than were scheduled.
    #[error("calibration finished {finished} of {expected} pairs")]
    Incomplete { finished: usize, expected: usize },
}

/// Errors raised while predicting a reach state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PredictionError {
    /// Reading values must be finite numbers.
    #[error("sensor {sensor_id} reading at {observed_at} is not a finite number ({value})")]
    NonFiniteReading {
        sensor_id: String,
        observed_at: NaiveDateTime,
        value: f64,
    },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 7, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_labeled_state_parses_survey_vocabulary() {
        assert_eq!(LabeledState::parse("flow"), Some(LabeledState::Flow));
        assert_eq!(LabeledState::parse(" WT "), Some(LabeledState::WeakTrickle));
        assert_eq!(LabeledState::parse("no_flow"), Some(LabeledState::NoFlow));
        assert_eq!(LabeledState::parse("dry"), None);
    }

    #[test]
    fn test_weak_trickle_counts_as_flowing() {
        assert!(LabeledState::WeakTrickle.is_flowing());
        assert!(LabeledState::Flow.is_flowing());
        assert!(!LabeledState::NoFlow.is_flowing());
    }

    #[test]
    fn test_reading_table_sorts_rows_and_pads_values() {
        let table = ReadingTable::new(
            vec!["s1".to_string(), "s2".to_string()],
            vec![
                ReadingRow { observed_at: at(12, 10), values: vec![Some(2.0)] },
                ReadingRow { observed_at: at(12, 0), values: vec![Some(1.0), Some(5.0)] },
            ],
        );
        assert_eq!(table.rows()[0].observed_at, at(12, 0));
        assert_eq!(table.rows()[1].values, vec![Some(2.0), None]);
        assert_eq!(table.history("s1"), vec![1.0, 2.0]);
        assert_eq!(table.history("s2"), vec![5.0]);
        assert!(table.history("missing").is_empty());
    }

    #[test]
    fn test_nearest_row_respects_window_and_prefers_earlier_on_tie() {
        let table = ReadingTable::new(
            vec!["s1".to_string()],
            vec![
                ReadingRow { observed_at: at(12, 0), values: vec![Some(1.0)] },
                ReadingRow { observed_at: at(12, 10), values: vec![Some(2.0)] },
            ],
        );
        let window = Duration::minutes(PREDICTION_WINDOW_MINUTES);

        let row = table.nearest_row(at(12, 5), window).expect("both rows are in window");
        assert_eq!(row.observed_at, at(12, 0), "equal distance should pick the earlier row");

        let row = table.nearest_row(at(12, 8), window).expect("12:10 is in window");
        assert_eq!(row.observed_at, at(12, 10));

        assert!(table.nearest_row(at(13, 0), window).is_none());
    }

    #[test]
    fn test_threshold_table_rejects_duplicate_pairs() {
        let result = ThresholdTable::from_thresholds(vec![
            Threshold::undefined("r1", "s1"),
            Threshold::undefined("r1", "s1"),
        ]);
        assert_eq!(result.unwrap_err(), PairKey::new("r1", "s1"));
    }

    #[test]
    fn test_threshold_table_iterates_in_key_order() {
        let table = ThresholdTable::from_thresholds(vec![
            Threshold::undefined("r2", "s1"),
            Threshold::undefined("r1", "s2"),
            Threshold::undefined("r1", "s1"),
        ])
        .unwrap();
        let keys: Vec<String> = table.iter().map(|t| t.key().to_string()).collect();
        assert_eq!(keys, vec!["r1/s1", "r1/s2", "r2/s1"]);
    }

    #[test]
    fn test_prediction_display_keeps_undecidable_reason() {
        assert_eq!(Prediction::Decided(FlowState::Flow).to_string(), "flow");
        assert!(Prediction::Undecidable(UndecidableReason::Tie).to_string().contains("tie"));
        assert_eq!(Vote::Abstain.as_str(), "abstain");
    }
}
