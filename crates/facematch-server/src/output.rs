use std::error::Error;
use std::io::{self, Write};

use serde::Serialize;
use serde_json::{json, Value};

use crate::cli::OutputMode;
use crate::errors::{AppError, AppResult};
use crate::faces::{FaceComparisonOutcome, ReferenceEncodingReport, ReferenceImage};

fn write_json_line<T: Serialize + ?Sized>(payload: &T) -> AppResult<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    let payload = serde_json::to_string(payload)?;
    handle.write_all(payload.as_bytes())?;
    handle.write_all(b"\n")?;
    Ok(())
}

pub fn render_compare(outcome: &FaceComparisonOutcome, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            for line in &outcome.logs {
                println!("{line}");
            }
            println!(
                "{} (distance {:.4})",
                if outcome.comparison.matched {
                    "Faces match"
                } else {
                    "Faces do not match"
                },
                outcome.comparison.distance
            );
        }
        OutputMode::Json => write_json_line(&outcome.comparison)?,
    }
    Ok(())
}

pub fn render_references(images: &[ReferenceImage], mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            for image in images {
                println!("{}", image.file_name);
            }
            println!("{} reference image(s)", images.len());
        }
        OutputMode::Json => write_json_line(&references_payload(images))?,
    }
    Ok(())
}

fn references_payload(images: &[ReferenceImage]) -> Value {
    let names: Vec<&str> = images.iter().map(|image| image.file_name.as_str()).collect();
    json!({ "images": names })
}

pub fn render_reference_encodings(
    report: &ReferenceEncodingReport,
    mode: OutputMode,
) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            for encoding in &report.encodings {
                println!(
                    "{}: face found ({}-d encoding)",
                    encoding.file_name,
                    encoding.embedding.len()
                );
            }
            for skipped in &report.skipped {
                println!("{}: skipped ({})", skipped.file_name, skipped.reason);
            }
            println!(
                "{} of {} reference image(s) usable in {}",
                report.encodings.len(),
                report.encodings.len() + report.skipped.len(),
                report.directory.display()
            );
        }
        OutputMode::Json => write_json_line(&encodings_payload(report))?,
    }
    Ok(())
}

fn encodings_payload(report: &ReferenceEncodingReport) -> Value {
    let encoded: Vec<&str> = report
        .encodings
        .iter()
        .map(|encoding| encoding.file_name.as_str())
        .collect();
    json!({
        "directory": report.directory.display().to_string(),
        "encoded": encoded,
        "skipped": report.skipped,
    })
}

pub fn render_error(err: &AppError, mode: OutputMode) {
    match mode {
        OutputMode::Human => {
            eprintln!("error: {}", err.human_message());
            if let Some(source) = err.source() {
                eprintln!("cause: {source}");
            }
        }
        OutputMode::Json => {
            let payload = json!({ "error": err.human_message() });
            println!("{payload}");
        }
    }
}
