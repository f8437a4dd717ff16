//! FDNL Service - Full Pipeline
//!
//! Runs one complete estimation pass:
//! 1. Loads reaches, field observations and sensor readings
//! 2. Calibrates a threshold for every (reach, sensor) pair
//! 3. Computes the FDNL series (and reach-state matrix) over the configured range
//! 4. Optionally evaluates predictions against the field surveys
//!
//! Usage:
//!   cargo run --release                          # Calibrate + FDNL series
//!   cargo run --release -- --evaluate            # Also score against surveys
//!   cargo run --release -- --config other.toml   # Alternate configuration
//!
//! Environment:
//!   FDNL_CONFIG - configuration path (default: fdnl.toml)
//!   RUST_LOG    - log level (default: info)

use fdnl_service::analysis::calibration::calibrate_all;
use fdnl_service::analysis::evaluation::evaluate;
use fdnl_service::analysis::network::{fdnl_series, reach_state_series};
use fdnl_service::config::{config_path, load_config};
use fdnl_service::export::{write_evaluation, write_file, write_reach_states, write_series, write_thresholds};
use fdnl_service::ingest::load_inputs;
use std::env;
use std::path::PathBuf;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("🌊 FDNL Service");
    println!("===============\n");

    // Parse command-line arguments
    let args: Vec<String> = env::args().collect();
    let mut config_override: Option<PathBuf> = None;
    let mut run_evaluation = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                if i + 1 < args.len() {
                    config_override = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    eprintln!("Error: --config requires a path");
                    std::process::exit(1);
                }
            }
            "--evaluate" => {
                run_evaluation = true;
                i += 1;
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                eprintln!("Usage: {} [--config PATH] [--evaluate]", args[0]);
                std::process::exit(1);
            }
        }
    }

    if let Err(e) = run(config_override.unwrap_or_else(config_path), run_evaluation) {
        eprintln!("\n❌ Pipeline failed: {}\n", e);
        std::process::exit(1);
    }
}

fn run(config_file: PathBuf, run_evaluation: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("⚙️  Loading configuration from {}...", config_file.display());
    let config = load_config(&config_file)?;
    let range = config.series_range()?;
    println!("✓ Configuration loaded");
    println!("  - Series: {} → {} every {} min", range.start, range.end, range.step.num_minutes());
    println!("  - Calibration workers: {}\n", config.calibration.workers);

    println!("📥 Loading input tables...");
    let inputs = load_inputs(&config.data)?;
    println!("✓ {} reaches, {} observations", inputs.reaches.len(), inputs.observations.len());
    println!("✓ {} reading rows across {} sensors\n", inputs.readings.rows().len(), inputs.readings.sensors().len());

    println!("📏 Calibrating thresholds...");
    let thresholds = calibrate_all(
        &inputs.reaches,
        &inputs.observations,
        &inputs.readings,
        config.calibration.workers,
    )?;
    let defined = thresholds.iter().filter(|t| t.value.is_some()).count();
    write_file(&config.output.thresholds, |out| write_thresholds(out, &thresholds))?;
    println!("✓ {} pairs calibrated ({} with a threshold)", thresholds.len(), defined);
    println!("   Wrote {}\n", config.output.thresholds.display());

    println!("🔄 Computing FDNL series...");
    let series = fdnl_series(
        range.start,
        range.end,
        range.step,
        &inputs.reaches,
        &inputs.readings,
        &thresholds,
    )?;
    let undefined = series.iter().filter(|p| p.fdnl.is_none()).count();
    write_file(&config.output.series, |out| write_series(out, &series))?;
    println!("✓ {} steps ({} undefined)", series.len(), undefined);
    println!("   Wrote {}\n", config.output.series.display());

    if let Some(path) = &config.output.reach_states {
        let rows = reach_state_series(
            range.start,
            range.end,
            range.step,
            &inputs.reaches,
            &inputs.readings,
            &thresholds,
        )?;
        write_file(path, |out| write_reach_states(out, &inputs.reaches, &rows))?;
        println!("✓ Reach-state matrix written to {}\n", path.display());
    }

    if run_evaluation {
        println!("📊 Evaluating against field surveys...");
        let report = evaluate(
            &inputs.observations,
            &inputs.readings,
            &thresholds,
            &config.evaluation.options(),
        )?;
        println!("   Surveys:     {}", report.surveys);
        println!("   TP/FP/TN/FN: {}/{}/{}/{}", report.true_positive, report.false_positive, report.true_negative, report.false_negative);
        println!("   Failure:     {}", report.failure);
        println!("   No decision: {}", report.no_decision);
        println!("   Sensitivity: {}", report.sensitivity);
        println!("   Specificity: {}", report.specificity);
        println!("   Accuracy:    {}", report.accuracy);
        if let Some(path) = &config.output.evaluation {
            write_file(path, |out| write_evaluation(out, &report))?;
            println!("   Wrote {}", path.display());
        }
        println!();
    }

    println!("✅ Done");
    Ok(())
}
