//! Persistence worker for measured traces
//!
//! A dedicated thread owns the data directory and writes one tab-separated
//! trace file plus one JSON run record per save request, replying with the
//! record's location. The controller hands it snapshots; it never touches
//! the live trace buffer.

use anyhow::{bail, Context, Result};
use chrono::Local;
use corrtools::cfg::{Record, Settings};
use corrtools::{ser, Trace};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use tracing::{info, warn};

pub struct SaveRequest {
    pub label: Option<String>,
    pub trace: Trace,
    pub settings: Settings,
    pub respond_to: flume::Sender<Result<PathBuf>>,
}

pub enum SaveMessage {
    Save(SaveRequest),
}

pub struct SaveHandle {
    pub sender: flume::Sender<SaveMessage>,
}

impl SaveHandle {
    /// Spawn the worker; files go into `data_dir`, created on first save.
    pub fn new(data_dir: PathBuf) -> SaveHandle {
        let (sender, receiver) = flume::unbounded();
        thread::spawn(move || {
            while let Ok(message) = receiver.recv() {
                match message {
                    SaveMessage::Save(request) => {
                        let result = write_record(&data_dir, &request);
                        if let Err(e) = &result {
                            warn!("failed to save trace: {:#}", e);
                        }
                        let _ = request.respond_to.send(result);
                    }
                }
            }
        });
        SaveHandle { sender }
    }
}

fn write_record(dir: &Path, request: &SaveRequest) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let stem = match &request.label {
        Some(label) => format!("{}_correlation", label),
        None => String::from("correlation"),
    };
    let timestamp = Local::now();
    // Second resolution, falling back to milliseconds on a name collision
    let mut base = dir.join(format!("{}_{}", stem, timestamp.format("%F_%H-%M-%S")));
    if base.with_extension("tsv").exists() || base.with_extension("json").exists() {
        base = dir.join(format!("{}_{}", stem, timestamp.format("%F_%H-%M-%S%.3f")));
        if base.with_extension("tsv").exists() || base.with_extension("json").exists() {
            bail!("run record {} already exists", base.display());
        }
    }
    let trace_path = base.with_extension("tsv");
    let record_path = base.with_extension("json");

    let f = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&trace_path)
        .with_context(|| format!("creating {}", trace_path.display()))?;
    let mut wtr = csv::WriterBuilder::new().delimiter(b'\t').from_writer(f);
    ser::tsv(&mut wtr, &request.trace)?;
    wtr.flush()?;

    let record = Record {
        label: request.label.clone().unwrap_or_default(),
        timestamp: Some(timestamp),
        count_length: request.settings.count_length,
        bin_width: request.settings.bin_width,
        refresh_interval: request.settings.refresh_interval,
        trace_file: trace_path.file_name().map(PathBuf::from),
    };
    fs::write(&record_path, serde_json::to_string_pretty(&record)?)
        .with_context(|| format!("creating {}", record_path.display()))?;

    info!("saved correlation trace to {}", record_path.display());
    Ok(record_path)
}
