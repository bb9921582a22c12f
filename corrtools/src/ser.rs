//! Serialization of correlation traces

use crate::Trace;
use anyhow::Result;
use std::io::Write;

/// Serialize a trace to tab-separated values (delay in ps, counts), one bin
/// per row, ordered from the most negative delay to the most positive.
pub fn tsv(wtr: &mut csv::Writer<impl Write>, trace: &Trace) -> Result<()> {
    for (delay, count) in trace.delays().iter().zip(trace.counts.iter()) {
        wtr.write_record(&[delay.to_string(), count.to_string()])?;
    }
    Ok(())
}
