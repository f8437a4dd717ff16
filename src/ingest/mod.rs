//! Input boundary: flat delimited tables parsed into typed records.
//!
//! Submodules:
//! - `tables`   - header-mapped CSV loaders and the `InputError` taxonomy.
//! - `fixtures` - (test only) representative table payloads.

pub mod tables;

#[cfg(test)]
pub(crate) mod fixtures;

use crate::config::DataConfig;
use crate::model::{FieldObservation, Reach, ReadingTable};

/// The three tables every run needs.
#[derive(Debug, Clone)]
pub struct Inputs {
    pub reaches: Vec<Reach>,
    pub observations: Vec<FieldObservation>,
    pub readings: ReadingTable,
}

/// Loads reaches, observations and readings from the configured paths.
pub fn load_inputs(data: &DataConfig) -> Result<Inputs, tables::InputError> {
    let reaches = tables::load_reaches(&data.reaches)?;
    let observations = tables::load_observations(&data.observations)?;
    let readings = tables::load_readings(&data.readings)?;
    if readings.is_empty() {
        log::warn!("{} has no reading rows; every prediction will be undecidable", data.readings.display());
    }

    log::info!(
        "loaded {} reaches, {} observations, {} reading rows x {} sensors",
        reaches.len(),
        observations.len(),
        readings.rows().len(),
        readings.sensors().len()
    );

    Ok(Inputs {
        reaches,
        observations,
        readings,
    })
}
