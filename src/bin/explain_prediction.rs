//! Prediction Explainer
//!
//! Shows the full ballot behind one reach-state prediction: the reading row
//! used, every sensor's vote, and how the tie-break settled it.
//!
//! Usage:
//!   cargo run --bin explain_prediction -- --reach R1 --at "2021-07-01 12:00"
//!
//! Options:
//!   --config PATH   Configuration file (default: $FDNL_CONFIG or fdnl.toml)
//!
//! Uses [data].thresholds when configured, otherwise calibrates first.

use fdnl_service::analysis::calibration::calibrate_all;
use fdnl_service::analysis::prediction::explain;
use fdnl_service::config::{config_path, load_config};
use fdnl_service::ingest::load_inputs;
use fdnl_service::ingest::tables::{load_thresholds, parse_timestamp};
use std::env;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = env::args().collect();
    let value_of = |flag: &str| {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .cloned()
    };

    let (Some(reach_id), Some(raw_at)) = (value_of("--reach"), value_of("--at")) else {
        eprintln!("Usage: {} --reach ID --at TIMESTAMP [--config PATH]", args[0]);
        std::process::exit(1);
    };
    let Some(at) = parse_timestamp(&raw_at) else {
        eprintln!("❌ Invalid timestamp: {} (expected YYYY-MM-DD HH:MM[:SS])", raw_at);
        std::process::exit(1);
    };

    let config_file = value_of("--config").map(PathBuf::from).unwrap_or_else(config_path);
    let config = load_config(&config_file)?;
    let inputs = load_inputs(&config.data)?;

    if !inputs.reaches.iter().any(|r| r.reach_id == reach_id) {
        eprintln!("⚠️  {} is not in the reaches table", reach_id);
    }

    let thresholds = match &config.data.thresholds {
        Some(path) => load_thresholds(path)?,
        None => calibrate_all(
            &inputs.reaches,
            &inputs.observations,
            &inputs.readings,
            config.calibration.workers,
        )?,
    };

    let detail = explain(&reach_id, at, &inputs.readings, &thresholds)?;

    println!("🔍 {} at {}", detail.reach_id, detail.requested_at);
    match detail.row_time {
        Some(row_time) => println!("   Reading row: {}\n", row_time),
        None => println!("   Reading row: none within window\n"),
    }

    if !detail.votes.is_empty() {
        println!(
            "{:<12} {:>10} {:>10} {:>6} {:>10} {:>8}",
            "Sensor", "Reading", "Threshold", "Score", "Distance", "Vote"
        );
        println!("{}", "-".repeat(61));
        for v in &detail.votes {
            println!(
                "{:<12} {:>10.3} {:>10} {:>6} {:>10} {:>8}",
                v.sensor_id,
                v.reading,
                v.threshold.map(|t| format!("{:.4}", t)).unwrap_or_default(),
                v.score.map(|s| s.to_string()).unwrap_or_default(),
                v.distance.map(|d| format!("{:.4}", d)).unwrap_or_default(),
                v.vote.as_str()
            );
        }
        println!();
    }

    println!("   Votes:    {} flow / {} no_flow", detail.flow_votes, detail.no_flow_votes);
    if (detail.adjusted_flow_votes, detail.adjusted_no_flow_votes) != (detail.flow_votes, detail.no_flow_votes) {
        println!(
            "   Adjusted: {} flow / {} no_flow (tie-break)",
            detail.adjusted_flow_votes, detail.adjusted_no_flow_votes
        );
    }
    println!("   Result:   {}", detail.prediction);

    Ok(())
}
