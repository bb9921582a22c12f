//! Configuration tools: acquisition settings and run records
//!
//! ## Settings
//!
//! `Settings` holds the acquisition parameters of a correlation measurement
//! along with the `saving` flag. The whole struct round-trips through a JSON
//! file: an application restores it at startup and writes it back at
//! shutdown, so parameter changes survive between sessions. The refresh
//! interval is written in [humantime](https://docs.rs/humantime/) notation,
//! e.g. `1s` or `250ms`.
//!
//! ## Records
//!
//! A `Record` documents one saved trace: the parameters in effect, a
//! timestamp, and the name of the trace file written next to it. Records are
//! written as pretty-printed JSON by the save worker.

use anyhow::{Context, Result};
use chrono::{offset::Local, DateTime};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Acquisition parameters and persisted application state
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Settings {
    /// Bins each side of zero delay; the device reports `2n+1` bins in total
    pub count_length:       u32,
    /// Bin width in picoseconds
    pub bin_width:          u64,
    /// Wall-clock period between polls of the device
    #[serde(with = "humantime_serde")]
    pub refresh_interval:   Duration,
    /// Whether the trace is saved when a run completes
    pub saving:             bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            count_length:       50,
            bin_width:          500,
            refresh_interval:   Duration::from_millis(1000),
            saving:             false,
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Settings> {
        let f = File::open(path)
            .with_context(|| format!("opening settings file {}", path.display()))?;
        let rdr = BufReader::new(f);
        let settings = serde_json::from_reader(rdr)
            .with_context(|| format!("parsing settings file {}", path.display()))?;
        Ok(settings)
    }

    pub fn store(&self, path: &Path) -> Result<()> {
        let f = File::create(path)
            .with_context(|| format!("writing settings file {}", path.display()))?;
        let mut wtr = BufWriter::new(f);
        wtr.write_all(serde_json::to_string_pretty(self)?.as_bytes())?;
        Ok(())
    }
}

/// Record of one saved measurement, written next to the trace file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct Record {
    pub label:              String,
    pub timestamp:          Option<DateTime<Local>>,
    pub count_length:       u32,
    pub bin_width:          u64,
    #[serde(with = "humantime_serde")]
    pub refresh_interval:   Duration,
    pub trace_file:         Option<PathBuf>,
}
