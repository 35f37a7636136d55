//! Replay a captured sensor scan through the calibration pipeline.
//!
//! ```text
//! libre-replay <scan.hex> <serial> [watermark] [--config <file.json>]
//! ```
//!
//! `scan.hex` holds the raw scan as hex text (whitespace is ignored).
//! `watermark` is an RFC 3339 timestamp; only readings newer than it are
//! printed. Without one, every reading in the scan is printed.
//!
//! The oracle endpoint and token come from the config file and/or the
//! `LIBRE_OOP_ENDPOINT` / `LIBRE_OOP_TOKEN` environment variables.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::{DateTime, Utc};
use libre_host::{HostConfig, build_pipeline};
use log::{error, info};

struct Args {
    scan_path: PathBuf,
    serial: String,
    watermark: DateTime<Utc>,
    config_path: Option<PathBuf>,
}

fn usage() -> String {
    "usage: libre-replay <scan.hex> <serial> [watermark] [--config <file.json>]".to_string()
}

fn parse_args(mut raw: impl Iterator<Item = String>) -> Result<Args, String> {
    let mut positional = Vec::new();
    let mut config_path = None;

    while let Some(arg) = raw.next() {
        if arg == "--config" {
            config_path = Some(PathBuf::from(raw.next().ok_or_else(usage)?));
        } else {
            positional.push(arg);
        }
    }

    let mut positional = positional.into_iter();
    let scan_path = PathBuf::from(positional.next().ok_or_else(usage)?);
    let serial = positional.next().ok_or_else(usage)?;
    let watermark = match positional.next() {
        Some(text) => DateTime::parse_from_rfc3339(&text)
            .map_err(|e| format!("invalid watermark {}: {}", text, e))?
            .with_timezone(&Utc),
        None => DateTime::<Utc>::MIN_UTC,
    };

    Ok(Args {
        scan_path,
        serial,
        watermark,
        config_path,
    })
}

fn read_scan(path: &Path) -> Result<Vec<u8>, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    let hex: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(&hex).map_err(|e| format!("{} is not a hex dump: {}", path.display(), e))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    env_logger::init();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(2);
        }
    };

    let config = match HostConfig::load(args.config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let scan = match read_scan(&args.scan_path) {
        Ok(scan) => scan,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    info!("Replaying {} byte scan for sensor {}", scan.len(), args.serial);

    let pipeline = match build_pipeline(&config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let outcome = match pipeline
        .run(&scan, args.watermark, &args.serial, &config.oracle)
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    println!(
        "sensor state: {}, age: {} min",
        outcome.sensor_state.label(),
        outcome.sensor_age_minutes
    );

    if let Some(e) = outcome.error {
        error!("Calibration failed: {}", e);
        return ExitCode::FAILURE;
    }

    for reading in &outcome.readings {
        println!(
            "{}  raw {:>7.1}  smoothed {:>7.1}",
            reading.timestamp.to_rfc3339(),
            reading.raw_glucose,
            reading.smoothed_glucose
        );
    }
    info!("{} readings", outcome.readings.len());

    ExitCode::SUCCESS
}
