//! Capability interface of a time-correlation counting device

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("device rejected configuration: {0}")]
    Configuration(String),
    #[error("device io error: {0}")]
    Io(String),
}

/// Coarse state as reported by the hardware itself
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeviceStatus {
    Unconfigured,
    Idle,
    Running,
    Paused,
}

/// Hardware limits of a correlation device
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Constraints {
    pub min_channels:       u8,
    pub max_channels:       u8,
    pub min_count_length:   u32,
    /// Smallest representable bin width in picoseconds
    pub min_bin_width:      u64,
}

/// A two-detector correlation counter.
///
/// The counter accumulates a histogram of time delays between events on its
/// two input channels. `configure` sizes the histogram; `start_measure`
/// clears it and begins accumulation, while `stop_measure` halts
/// accumulation without clearing, so a measurement resumed with
/// `continue_measure` carries on from the retained counts.
///
/// The start/stop/pause/continue calls are idempotent with respect to
/// repeated calls in the same logical state.
pub trait CorrelationDevice: Send {
    /// Set up the device for a measurement. `count_length` is the number of
    /// bins requested each side of zero delay.
    fn configure(&mut self, bin_width: u64, count_length: u32) -> Result<(), DeviceError>;

    fn status(&self) -> DeviceStatus;

    fn start_measure(&mut self) -> Result<(), DeviceError>;

    fn stop_measure(&mut self) -> Result<(), DeviceError>;

    fn pause_measure(&mut self) -> Result<(), DeviceError>;

    fn continue_measure(&mut self) -> Result<(), DeviceError>;

    /// Length of the trace the device will report. Centered correlators
    /// report `2n+1` bins for a configured count length of `n`.
    fn count_length(&self) -> u32;

    /// Configured bin width in picoseconds
    fn bin_width(&self) -> u64;

    /// The accumulated histogram. Synchronous; may block for up to one
    /// integration period.
    fn data_trace(&mut self) -> Result<Vec<u64>, DeviceError>;

    fn constraints(&self) -> Constraints;
}
