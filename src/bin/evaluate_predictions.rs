//! Prediction Evaluation
//!
//! Scores reach-state predictions against the field surveys and reports the
//! confusion matrix with sensitivity, specificity and accuracy.
//!
//! Usage:
//!   cargo run --bin evaluate_predictions
//!
//! Options:
//!   --config PATH       Configuration file (default: $FDNL_CONFIG or fdnl.toml)
//!   --thresholds PATH   Use a stored thresholds table instead of calibrating
//!   --resample          Balance flow / no-flow surveys before scoring
//!   --seed N            Seed for --resample (default: [evaluation].seed)

use fdnl_service::analysis::calibration::calibrate_all;
use fdnl_service::analysis::evaluation::evaluate;
use fdnl_service::config::{config_path, load_config};
use fdnl_service::export::{write_evaluation, write_file};
use fdnl_service::ingest::load_inputs;
use fdnl_service::ingest::tables::load_thresholds;
use std::env;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("📊 Prediction Evaluation");
    println!("========================\n");

    let args: Vec<String> = env::args().collect();
    let value_of = |flag: &str| {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .cloned()
    };

    let config_file = value_of("--config").map(PathBuf::from).unwrap_or_else(config_path);
    let config = load_config(&config_file)?;
    let inputs = load_inputs(&config.data)?;

    let mut options = config.evaluation.options();
    if args.contains(&"--resample".to_string()) {
        options.resample = true;
    }
    if let Some(raw) = value_of("--seed") {
        options.seed = Some(raw.parse().map_err(|e| format!("invalid --seed {:?}: {}", raw, e))?);
    }

    // Stored thresholds take precedence over a fresh calibration
    let stored = value_of("--thresholds")
        .map(PathBuf::from)
        .or_else(|| config.data.thresholds.clone());
    let thresholds = match stored {
        Some(path) => {
            println!("📋 Loading thresholds from {}...", path.display());
            load_thresholds(&path)?
        }
        None => {
            println!("📏 Calibrating thresholds...");
            calibrate_all(
                &inputs.reaches,
                &inputs.observations,
                &inputs.readings,
                config.calibration.workers,
            )?
        }
    };
    println!("✓ {} thresholds\n", thresholds.len());

    if options.resample {
        match options.seed {
            Some(seed) => println!("🎲 Resampling to balanced classes (seed {})\n", seed),
            None => println!("🎲 Resampling to balanced classes (unseeded)\n"),
        }
    }

    let report = evaluate(&inputs.observations, &inputs.readings, &thresholds, &options)?;

    println!("{:<16} {:>8}", "Metric", "Value");
    println!("{}", "-".repeat(25));
    println!("{:<16} {:>8}", "surveys", report.surveys);
    println!("{:<16} {:>8}", "true_positive", report.true_positive);
    println!("{:<16} {:>8}", "false_positive", report.false_positive);
    println!("{:<16} {:>8}", "true_negative", report.true_negative);
    println!("{:<16} {:>8}", "false_negative", report.false_negative);
    println!("{:<16} {:>8}", "failure", report.failure);
    println!("{:<16} {:>8}", "no_decision", report.no_decision);
    println!("{:<16} {:>8}", "sensitivity", report.sensitivity.to_string());
    println!("{:<16} {:>8}", "specificity", report.specificity.to_string());
    println!("{:<16} {:>8}", "accuracy", report.accuracy.to_string());

    if let Some(path) = &config.output.evaluation {
        write_file(path, |out| write_evaluation(out, &report))?;
        println!("\n✓ Wrote {}", path.display());
    }

    Ok(())
}
