//! Flat-file writers for run outputs.
//!
//! Tables are comma-delimited with a header row. Missing values are empty
//! cells and timestamps use `TIMESTAMP_FORMAT`, so exported thresholds can
//! be loaded back through `ingest::tables::load_thresholds`.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::analysis::evaluation::EvaluationReport;
use crate::analysis::network::{FdnlPoint, ReachStateRow};
use crate::model::{Reach, ThresholdTable, TIMESTAMP_FORMAT};

fn cell<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// `location_id,sensor,value,score`, one row per pair in key order.
pub fn write_thresholds<W: Write>(mut out: W, thresholds: &ThresholdTable) -> io::Result<()> {
    writeln!(out, "location_id,sensor,value,score")?;
    for t in thresholds.iter() {
        writeln!(out, "{},{},{},{}", t.reach_id, t.sensor_id, cell(t.value), cell(t.score))?;
    }
    Ok(())
}

/// `datetime,fdnl`.
pub fn write_series<W: Write>(mut out: W, series: &[FdnlPoint]) -> io::Result<()> {
    writeln!(out, "datetime,fdnl")?;
    for point in series {
        writeln!(out, "{},{}", point.at.format(TIMESTAMP_FORMAT), cell(point.fdnl))?;
    }
    Ok(())
}

/// `datetime` plus one column per reach; cells are `flow`, `no_flow` or empty.
pub fn write_reach_states<W: Write>(mut out: W, reaches: &[Reach], rows: &[ReachStateRow]) -> io::Result<()> {
    let header: Vec<&str> = std::iter::once("datetime")
        .chain(reaches.iter().map(|r| r.reach_id.as_str()))
        .collect();
    writeln!(out, "{}", header.join(","))?;

    for row in rows {
        let mut cells = vec![row.at.format(TIMESTAMP_FORMAT).to_string()];
        match &row.states {
            Some(states) => cells.extend(
                states
                    .iter()
                    .map(|p| p.state().map(|s| s.as_str()).unwrap_or_default().to_string()),
            ),
            None => cells.extend(reaches.iter().map(|_| String::new())),
        }
        writeln!(out, "{}", cells.join(","))?;
    }
    Ok(())
}

/// Pretty JSON of the evaluation record.
pub fn write_evaluation<W: Write>(mut out: W, report: &EvaluationReport) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut out, report)?;
    writeln!(out)
}

/// Creates `path` (and its parent directories) and hands a buffered writer
/// to `write`.
pub fn write_file<P, F>(path: P, write: F) -> io::Result<()>
where
    P: AsRef<Path>,
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut out = BufWriter::new(File::create(path)?);
    write(&mut out)?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::evaluation::{ConfusionCounts, Ratio};
    use crate::ingest::tables::parse_thresholds;
    use crate::model::{FlowState, Prediction, Threshold, UndecidableReason};
    use chrono::NaiveDate;

    fn render<F: FnOnce(&mut Vec<u8>) -> io::Result<()>>(f: F) -> String {
        let mut buf = Vec::new();
        f(&mut buf).expect("write to memory should succeed");
        String::from_utf8(buf).expect("output should be utf-8")
    }

    #[test]
    fn test_thresholds_round_trip_through_loader() {
        let table = ThresholdTable::from_thresholds(vec![
            Threshold {
                reach_id: "R1".to_string(),
                sensor_id: "S1".to_string(),
                value: Some(0.0845),
                score: Some(0),
            },
            Threshold::undefined("R1", "S2"),
        ])
        .unwrap();

        let text = render(|buf| write_thresholds(buf, &table));
        assert!(text.contains("R1,S2,,\n"), "undefined threshold should export as empty cells");
        assert_eq!(parse_thresholds(&text).expect("export should reload"), table);
    }

    #[test]
    fn test_series_leaves_undefined_cells_empty() {
        let at = NaiveDate::from_ymd_opt(2021, 7, 1).unwrap().and_hms_opt(12, 0, 0).unwrap();
        let series = vec![
            FdnlPoint { at, fdnl: Some(12.5) },
            FdnlPoint { at: at + chrono::Duration::hours(1), fdnl: None },
        ];
        let text = render(|buf| write_series(buf, &series));
        assert_eq!(text, "datetime,fdnl\n2021-07-01 12:00:00,12.5\n2021-07-01 13:00:00,\n");
    }

    #[test]
    fn test_reach_states_matrix() {
        let at = NaiveDate::from_ymd_opt(2021, 7, 1).unwrap().and_hms_opt(12, 0, 0).unwrap();
        let reaches = vec![
            Reach { reach_id: "A".to_string(), length: Some(1.0) },
            Reach { reach_id: "B".to_string(), length: None },
        ];
        let rows = vec![
            ReachStateRow {
                at,
                states: Some(vec![
                    Prediction::Decided(FlowState::Flow),
                    Prediction::Undecidable(UndecidableReason::Tie),
                ]),
            },
            ReachStateRow { at, states: None },
        ];
        let text = render(|buf| write_reach_states(buf, &reaches, &rows));
        assert_eq!(
            text,
            "datetime,A,B\n2021-07-01 12:00:00,flow,\n2021-07-01 12:00:00,,\n"
        );
    }

    #[test]
    fn test_evaluation_json_names_all_metrics() {
        let counts = ConfusionCounts {
            true_positive: 1,
            true_negative: 1,
            ..Default::default()
        };
        let report = EvaluationReport::from_counts(2, &counts);
        let text = render(|buf| write_evaluation(buf, &report));
        let json: serde_json::Value = serde_json::from_str(&text).expect("should be valid JSON");

        for key in [
            "surveys", "true_positive", "false_positive", "true_negative", "false_negative",
            "failure", "no_decision", "sensitivity", "specificity", "accuracy",
        ] {
            assert!(json.get(key).is_some(), "missing metric {}", key);
        }
        assert_eq!(report.accuracy, Ratio::Value(1.0));
    }
}
