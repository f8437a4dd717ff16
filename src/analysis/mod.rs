/// Threshold calibration, reach prediction and network aggregation.
///
/// Submodules:
/// - `groupings`   - per-pair observation groups and survey rows.
/// - `calibration` - per (reach, sensor) threshold derivation.
/// - `prediction`  - multi-sensor majority vote with tie-break.
/// - `network`     - FDNL at an instant and over a series.
/// - `evaluation`  - confusion matrix against field surveys.

pub mod calibration;
pub mod evaluation;
pub mod groupings;
pub mod network;
pub mod prediction;
