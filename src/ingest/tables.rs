//! Delimited table loaders for reaches, field observations, sensor readings,
//! and previously exported thresholds.
//!
//! Format:
//! - Lines starting with '#' and blank lines are skipped
//! - First remaining line: comma-delimited column names
//! - Remaining lines: comma-delimited data rows
//! - Fields may be double-quoted (as written by spreadsheet and R exports);
//!   a leading byte-order mark is dropped
//!
//! Columns are looked up by name, so extra columns are ignored and column
//! order does not matter. Every value is parsed into its typed field here;
//! nothing downstream sees raw strings.

use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::model::{
    FieldObservation, LabeledState, Reach, ReadingRow, ReadingTable, Threshold, ThresholdTable,
};

const DELIMITER: char = ',';

/// Column holding the timestamp in observation and reading tables.
pub const COL_OBSERVED_AT: &str = "observed_at";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Malformed input rejected at the table boundary.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{table}: no header line found")]
    MissingHeader { table: String },
    #[error("{table}: missing required column '{column}'")]
    MissingColumn { table: String, column: String },
    #[error("{table} line {line}: row has no value for column '{column}'")]
    MissingField { table: String, line: usize, column: String },
    #[error("{table} line {line}: '{value}' in column '{column}' is not a number")]
    InvalidNumber {
        table: String,
        line: usize,
        column: String,
        value: String,
    },
    #[error("{table} line {line}: '{value}' in column '{column}' is not a timestamp")]
    InvalidTimestamp {
        table: String,
        line: usize,
        column: String,
        value: String,
    },
    #[error("{table} line {line}: unknown state label '{value}'")]
    InvalidState { table: String, line: usize, value: String },
    #[error("{table} line {line}: reach length {value} is negative")]
    NegativeLength { table: String, line: usize, value: f64 },
    #[error("{table}: duplicate threshold for {reach_id}/{sensor_id}")]
    DuplicateThreshold {
        table: String,
        reach_id: String,
        sensor_id: String,
    },
}

// ---------------------------------------------------------------------------
// Raw table
// ---------------------------------------------------------------------------

/// Header plus raw data lines, with a name → index column map.
struct RawTable<'a> {
    name: &'a str,
    headers: Vec<String>,
    col_map: HashMap<String, usize>,
    /// (1-based line number, fields)
    rows: Vec<(usize, Vec<String>)>,
}

impl<'a> RawTable<'a> {
    fn parse(name: &'a str, text: &str) -> Result<Self, InputError> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut lines = text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().starts_with('#') && !line.trim().is_empty());

        let (_, header_line) = lines.next().ok_or_else(|| InputError::MissingHeader {
            table: name.to_string(),
        })?;
        let headers = split_fields(header_line);

        let mut col_map = HashMap::new();
        for (idx, header) in headers.iter().enumerate() {
            col_map.insert(header.clone(), idx);
        }

        let rows = lines
            .map(|(idx, line)| (idx + 1, split_fields(line)))
            .collect();

        Ok(Self {
            name,
            headers,
            col_map,
            rows,
        })
    }

    fn column(&self, column: &str) -> Result<usize, InputError> {
        self.col_map
            .get(column)
            .copied()
            .ok_or_else(|| InputError::MissingColumn {
                table: self.name.to_string(),
                column: column.to_string(),
            })
    }

    fn field<'f>(&self, line: usize, fields: &'f [String], idx: usize) -> Result<&'f str, InputError> {
        fields.get(idx).map(String::as_str).ok_or_else(|| InputError::MissingField {
            table: self.name.to_string(),
            line,
            column: self.headers[idx].to_string(),
        })
    }

    fn number(&self, line: usize, fields: &[String], idx: usize) -> Result<Option<f64>, InputError> {
        // Short rows mean trailing empty cells, which are missing values.
        let raw = fields.get(idx).map(String::as_str).unwrap_or("");
        parse_optional_number(raw).ok_or_else(|| InputError::InvalidNumber {
            table: self.name.to_string(),
            line,
            column: self.headers[idx].to_string(),
            value: raw.to_string(),
        })
    }

    fn timestamp(&self, line: usize, fields: &[String], idx: usize) -> Result<NaiveDateTime, InputError> {
        let raw = self.field(line, fields, idx)?;
        parse_timestamp(raw).ok_or_else(|| InputError::InvalidTimestamp {
            table: self.name.to_string(),
            line,
            column: self.headers[idx].to_string(),
            value: raw.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Cell parsing
// ---------------------------------------------------------------------------

/// Splits one line on commas. Double-quoted fields may contain commas, and
/// `""` inside them is a literal quote. Fields are trimmed outside quotes.
fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            c if c == DELIMITER && !in_quotes => {
                fields.push(current.trim().to_string());
                current.clear();
            }
            c => current.push(c),
        }
    }
    fields.push(current.trim().to_string());
    fields
}

/// Parses a numeric cell. `Some(None)` is an explicit missing value,
/// `None` means the cell is malformed.
pub fn parse_optional_number(raw: &str) -> Option<Option<f64>> {
    let raw = raw.trim();
    if raw.is_empty() || ["na", "nan", "null"].contains(&raw.to_ascii_lowercase().as_str()) {
        return Some(None);
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Some(Some(v)),
        _ => None,
    }
}

/// Parses a local date-time in `YYYY-MM-DD HH:MM[:SS]` form (a `T`
/// separator is also accepted).
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

// ---------------------------------------------------------------------------
// Typed loaders
// ---------------------------------------------------------------------------

/// Parses the reaches table (`location_id`, `length`).
pub fn parse_reaches(text: &str) -> Result<Vec<Reach>, InputError> {
    let table = RawTable::parse("reaches", text)?;
    let id_col = table.column("location_id")?;
    let length_col = table.column("length")?;

    let mut reaches = Vec::with_capacity(table.rows.len());
    for (line, fields) in &table.rows {
        let length = table.number(*line, fields, length_col)?;
        if let Some(value) = length.filter(|l| *l < 0.0) {
            return Err(InputError::NegativeLength {
                table: table.name.to_string(),
                line: *line,
                value,
            });
        }
        reaches.push(Reach {
            reach_id: table.field(*line, fields, id_col)?.to_string(),
            length,
        });
    }
    Ok(reaches)
}

/// Parses labeled field observations
/// (`location_id`, `sensor`, `state`, `water_level`, `observed_at`).
pub fn parse_observations(text: &str) -> Result<Vec<FieldObservation>, InputError> {
    let table = RawTable::parse("observations", text)?;
    let id_col = table.column("location_id")?;
    let sensor_col = table.column("sensor")?;
    let state_col = table.column("state")?;
    let level_col = table.column("water_level")?;
    let time_col = table.column(COL_OBSERVED_AT)?;

    let mut observations = Vec::with_capacity(table.rows.len());
    for (line, fields) in &table.rows {
        let raw_state = table.field(*line, fields, state_col)?;
        let state = LabeledState::parse(raw_state).ok_or_else(|| InputError::InvalidState {
            table: table.name.to_string(),
            line: *line,
            value: raw_state.to_string(),
        })?;

        observations.push(FieldObservation {
            reach_id: table.field(*line, fields, id_col)?.to_string(),
            sensor_id: table.field(*line, fields, sensor_col)?.to_string(),
            observed_at: table.timestamp(*line, fields, time_col)?,
            water_level: table.number(*line, fields, level_col)?,
            state,
        });
    }
    Ok(observations)
}

/// Parses the wide reading table: `observed_at` plus one numeric column per
/// sensor id.
pub fn parse_readings(text: &str) -> Result<ReadingTable, InputError> {
    let table = RawTable::parse("readings", text)?;
    let time_col = table.column(COL_OBSERVED_AT)?;

    let sensor_cols: Vec<usize> = (0..table.headers.len()).filter(|&i| i != time_col).collect();
    let sensors: Vec<String> = sensor_cols
        .iter()
        .map(|&i| table.headers[i].to_string())
        .collect();

    let mut rows = Vec::with_capacity(table.rows.len());
    for (line, fields) in &table.rows {
        let observed_at = table.timestamp(*line, fields, time_col)?;
        let values = sensor_cols
            .iter()
            .map(|&i| table.number(*line, fields, i))
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(ReadingRow { observed_at, values });
    }

    Ok(ReadingTable::new(sensors, rows))
}

/// Parses a thresholds table (`location_id`, `sensor`, `value`, `score`).
pub fn parse_thresholds(text: &str) -> Result<ThresholdTable, InputError> {
    let table = RawTable::parse("thresholds", text)?;
    let id_col = table.column("location_id")?;
    let sensor_col = table.column("sensor")?;
    let value_col = table.column("value")?;
    let score_col = table.column("score")?;

    let mut thresholds = Vec::with_capacity(table.rows.len());
    for (line, fields) in &table.rows {
        let score = match table.number(*line, fields, score_col)? {
            Some(s) if s >= 0.0 && s.fract() == 0.0 => Some(s as u32),
            Some(_) => {
                return Err(InputError::InvalidNumber {
                    table: table.name.to_string(),
                    line: *line,
                    column: "score".to_string(),
                    value: fields[score_col].clone(),
                });
            }
            None => None,
        };

        thresholds.push(Threshold {
            reach_id: table.field(*line, fields, id_col)?.to_string(),
            sensor_id: table.field(*line, fields, sensor_col)?.to_string(),
            value: table.number(*line, fields, value_col)?,
            score,
        });
    }

    ThresholdTable::from_thresholds(thresholds).map_err(|key| InputError::DuplicateThreshold {
        table: table.name.to_string(),
        reach_id: key.reach_id,
        sensor_id: key.sensor_id,
    })
}

fn read(path: &Path) -> Result<String, InputError> {
    fs::read_to_string(path).map_err(|source| InputError::Io {
        path: path.display().to_string(),
        source,
    })
}

pub fn load_reaches<P: AsRef<Path>>(path: P) -> Result<Vec<Reach>, InputError> {
    parse_reaches(&read(path.as_ref())?)
}

pub fn load_observations<P: AsRef<Path>>(path: P) -> Result<Vec<FieldObservation>, InputError> {
    parse_observations(&read(path.as_ref())?)
}

pub fn load_readings<P: AsRef<Path>>(path: P) -> Result<ReadingTable, InputError> {
    parse_readings(&read(path.as_ref())?)
}

pub fn load_thresholds<P: AsRef<Path>>(path: P) -> Result<ThresholdTable, InputError> {
    parse_thresholds(&read(path.as_ref())?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
