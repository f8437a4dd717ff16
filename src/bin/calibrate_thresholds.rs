//! Threshold Calibration
//!
//! Derives a water-level threshold for every (reach, sensor) pair from the
//! labeled field observations and writes the thresholds table.
//!
//! Usage:
//!   cargo run --bin calibrate_thresholds
//!
//! Options:
//!   --config PATH   Configuration file (default: $FDNL_CONFIG or fdnl.toml)

use fdnl_service::analysis::calibration::calibrate_all;
use fdnl_service::config::{config_path, load_config};
use fdnl_service::export::{write_file, write_thresholds};
use fdnl_service::ingest::load_inputs;
use std::env;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("📏 Threshold Calibration");
    println!("========================\n");

    let args: Vec<String> = env::args().collect();
    let config_file = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
        .unwrap_or_else(config_path);

    let config = load_config(&config_file)?;
    let inputs = load_inputs(&config.data)?;
    println!("✓ Loaded {} observations for {} reaches\n", inputs.observations.len(), inputs.reaches.len());

    let thresholds = calibrate_all(
        &inputs.reaches,
        &inputs.observations,
        &inputs.readings,
        config.calibration.workers,
    )?;

    println!("{:<12} {:<12} {:>10} {:>6}", "Reach", "Sensor", "Value", "Score");
    println!("{}", "-".repeat(43));
    for t in thresholds.iter().filter(|t| t.value.is_some()) {
        println!(
            "{:<12} {:<12} {:>10.4} {:>6}",
            t.reach_id,
            t.sensor_id,
            t.value.unwrap_or_default(),
            t.score.map(|s| s.to_string()).unwrap_or_default()
        );
    }

    let undefined = thresholds.iter().filter(|t| t.value.is_none()).count();
    println!("\n   {} pairs without a threshold (sensor will abstain)", undefined);

    write_file(&config.output.thresholds, |out| write_thresholds(out, &thresholds))?;
    println!("✓ Wrote {}", config.output.thresholds.display());

    Ok(())
}
