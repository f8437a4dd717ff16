/// fdnl_service: reach flow-state estimation and flowing drainage network
/// length (FDNL) from water-level sensors and field surveys.
///
/// # Module structure
///
/// ```text
/// fdnl_service
/// ├── model       - shared data types (FieldObservation, ReadingTable, ThresholdTable, Prediction, ...)
/// ├── config      - run configuration loader (fdnl.toml)
/// ├── ingest
/// │   ├── tables  - header-mapped CSV loaders for reaches, observations, readings, thresholds
/// │   └── fixtures (test only) - small representative tables
/// ├── analysis
/// │   ├── groupings   - per-pair observation groups and survey rows
/// │   ├── calibration - per (reach, sensor) threshold derivation
/// │   ├── prediction  - sensor majority vote with tie-break
/// │   ├── network     - FDNL at an instant and over a series
/// │   └── evaluation  - confusion matrix against field surveys
/// └── export      - thresholds, series, reach-state and evaluation writers
/// ```

/// Public modules
pub mod analysis;
pub mod config;
pub mod export;
pub mod ingest;
pub mod model;
