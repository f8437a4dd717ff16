//! Prediction skill against field surveys.
//!
//! Every deduplicated survey row is predicted and sorted into a confusion
//! class. `wt` labels count as flowing. Predictions that found no reading
//! row are failures; predictions that found a row but could not settle on a
//! state are no-decisions. Neither enters the ratios.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Serialize, Serializer};
use std::fmt;

use crate::analysis::groupings::{survey_rows, SurveyRow};
use crate::analysis::prediction::predict;
use crate::model::{
    FieldObservation, LabeledState, Prediction, PredictionError, ReadingTable, ThresholdTable,
    UndecidableReason,
};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Confusion class of one survey row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    TruePositive,
    FalsePositive,
    TrueNegative,
    FalseNegative,
    Failure,
    NoDecision,
}

/// A skill ratio rounded to 3 decimals (ties to even, so 0.0625 becomes
/// 0.062), or the degenerate case of an empty denominator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Ratio {
    Value(f64),
    DivisionByZero,
}

impl Ratio {
    pub fn of(numerator: u32, denominator: u32) -> Self {
        if denominator == 0 {
            Ratio::DivisionByZero
        } else {
            let raw = numerator as f64 / denominator as f64;
            Ratio::Value((raw * 1000.0).round_ties_even() / 1000.0)
        }
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ratio::Value(v) => write!(f, "{:.3}", v),
            Ratio::DivisionByZero => write!(f, "division_by_zero"),
        }
    }
}

impl Serialize for Ratio {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Ratio::Value(v) => serializer.serialize_f64(*v),
            Ratio::DivisionByZero => serializer.serialize_str("division_by_zero"),
        }
    }
}

/// Running tally of outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfusionCounts {
    pub true_positive: u32,
    pub false_positive: u32,
    pub true_negative: u32,
    pub false_negative: u32,
    pub failure: u32,
    pub no_decision: u32,
}

impl ConfusionCounts {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::TruePositive => self.true_positive += 1,
            Outcome::FalsePositive => self.false_positive += 1,
            Outcome::TrueNegative => self.true_negative += 1,
            Outcome::FalseNegative => self.false_negative += 1,
            Outcome::Failure => self.failure += 1,
            Outcome::NoDecision => self.no_decision += 1,
        }
    }

    pub fn decided(&self) -> u32 {
        self.true_positive + self.false_positive + self.true_negative + self.false_negative
    }
}

/// The evaluation result record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub surveys: usize,
    pub true_positive: u32,
    pub false_positive: u32,
    pub true_negative: u32,
    pub false_negative: u32,
    pub failure: u32,
    pub no_decision: u32,
    pub sensitivity: Ratio,
    pub specificity: Ratio,
    pub accuracy: Ratio,
}

impl EvaluationReport {
    pub fn from_counts(surveys: usize, counts: &ConfusionCounts) -> Self {
        EvaluationReport {
            surveys,
            true_positive: counts.true_positive,
            false_positive: counts.false_positive,
            true_negative: counts.true_negative,
            false_negative: counts.false_negative,
            failure: counts.failure,
            no_decision: counts.no_decision,
            sensitivity: Ratio::of(counts.true_positive, counts.true_positive + counts.false_negative),
            specificity: Ratio::of(counts.true_negative, counts.true_negative + counts.false_positive),
            accuracy: Ratio::of(counts.true_positive + counts.true_negative, counts.decided()),
        }
    }
}

/// Evaluation run options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvaluationOptions {
    /// Down-sample the larger label class to the size of the smaller one.
    pub resample: bool,
    /// Seed for resampling; entropy when absent.
    pub seed: Option<u64>,
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

pub fn classify(label: LabeledState, prediction: Prediction) -> Outcome {
    match prediction {
        Prediction::Undecidable(UndecidableReason::NoReadingInWindow) => Outcome::Failure,
        Prediction::Undecidable(_) => Outcome::NoDecision,
        Prediction::Decided(_) => match (label.is_flowing(), prediction.is_flow()) {
            (true, true) => Outcome::TruePositive,
            (true, false) => Outcome::FalseNegative,
            (false, true) => Outcome::FalsePositive,
            (false, false) => Outcome::TrueNegative,
        },
    }
}

/// Keeps an equal number of flowing and non-flowing rows, chosen uniformly
/// without replacement. Surviving rows keep their original order.
pub fn balance_rows<R: Rng + ?Sized>(rows: Vec<SurveyRow>, rng: &mut R) -> Vec<SurveyRow> {
    let (flow, no_flow): (Vec<usize>, Vec<usize>) =
        (0..rows.len()).partition(|&i| rows[i].state.is_flowing());
    let target = flow.len().min(no_flow.len());

    let mut keep: Vec<usize> = flow
        .choose_multiple(rng, target)
        .chain(no_flow.choose_multiple(rng, target))
        .copied()
        .collect();
    keep.sort_unstable();

    log::debug!(
        "resampled {} flow / {} no-flow rows down to {} each",
        flow.len(),
        no_flow.len(),
        target
    );

    let mut rows: Vec<Option<SurveyRow>> = rows.into_iter().map(Some).collect();
    keep.into_iter().filter_map(|i| rows[i].take()).collect()
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Predicts every survey row and tallies the confusion matrix.
///
/// # Errors
/// Propagates the first `PredictionError`; a corrupt reading invalidates the
/// whole run rather than silently shrinking the sample.
pub fn evaluate(
    observations: &[FieldObservation],
    readings: &ReadingTable,
    thresholds: &ThresholdTable,
    options: &EvaluationOptions,
) -> Result<EvaluationReport, PredictionError> {
    let mut rows = survey_rows(observations);

    if options.resample {
        let mut rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        rows = balance_rows(rows, &mut rng);
    }

    let mut counts = ConfusionCounts::default();
    for row in &rows {
        let outcome = classify_row(row, readings, thresholds)?;
        counts.record(outcome);
    }

    let report = EvaluationReport::from_counts(rows.len(), &counts);
    log::info!(
        "evaluated {} surveys: sensitivity {}, specificity {}, accuracy {}",
        report.surveys,
        report.sensitivity,
        report.specificity,
        report.accuracy
    );
    Ok(report)
}

fn classify_row(
    row: &SurveyRow,
    readings: &ReadingTable,
    thresholds: &ThresholdTable,
) -> Result<Outcome, PredictionError> {
    let prediction = predict(&row.reach_id, row.observed_at, readings, thresholds)?;
    Ok(classify(row.state, prediction))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
