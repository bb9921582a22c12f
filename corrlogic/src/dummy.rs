//! Simulated correlation device
//!
//! Stands in for real counting hardware during development and in tests.
//! While running it accumulates a randomized histogram with the zero-delay
//! bin suppressed, the signature of an antibunched single-photon source in a
//! Hanbury Brown-Twiss setup.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::device::{Constraints, CorrelationDevice, DeviceError, DeviceStatus};

pub struct DummyCorrelator {
    bin_width: u64,
    count_length: u32,
    histogram: Vec<u64>,
    status: DeviceStatus,
    rng: StdRng,
}

impl DummyCorrelator {
    pub fn new() -> DummyCorrelator {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic instance for tests
    pub fn seeded(seed: u64) -> DummyCorrelator {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> DummyCorrelator {
        DummyCorrelator {
            bin_width: 0,
            count_length: 0,
            histogram: Vec::new(),
            status: DeviceStatus::Unconfigured,
            rng,
        }
    }

    /// One integration period's worth of counts
    fn accumulate(&mut self) {
        let half = self.count_length as i64;
        for (i, bin) in self.histogram.iter_mut().enumerate() {
            // Flat background with a dip a few bins wide around zero delay
            let ceiling = match (i as i64 - half).unsigned_abs() {
                0 => 5,
                1 => 25,
                2 => 60,
                _ => 100,
            };
            *bin += self.rng.gen_range(0..ceiling);
        }
    }
}

impl Default for DummyCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrelationDevice for DummyCorrelator {
    fn configure(&mut self, bin_width: u64, count_length: u32) -> Result<(), DeviceError> {
        let constraints = self.constraints();
        if bin_width < constraints.min_bin_width {
            return Err(DeviceError::Configuration(format!(
                "bin width {} ps below minimum {} ps",
                bin_width, constraints.min_bin_width
            )));
        }
        if count_length < constraints.min_count_length {
            return Err(DeviceError::Configuration(format!(
                "count length {} below minimum {}",
                count_length, constraints.min_count_length
            )));
        }
        self.bin_width = bin_width;
        self.count_length = count_length;
        self.histogram = vec![0; (2 * count_length + 1) as usize];
        self.status = DeviceStatus::Idle;
        Ok(())
    }

    fn status(&self) -> DeviceStatus {
        self.status
    }

    fn start_measure(&mut self) -> Result<(), DeviceError> {
        if self.status == DeviceStatus::Unconfigured {
            return Err(DeviceError::Io(String::from("device not configured")));
        }
        if self.status != DeviceStatus::Running {
            self.histogram.iter_mut().for_each(|bin| *bin = 0);
            self.status = DeviceStatus::Running;
        }
        Ok(())
    }

    fn stop_measure(&mut self) -> Result<(), DeviceError> {
        // Accumulation halts but the histogram is retained
        if self.status == DeviceStatus::Running {
            self.status = DeviceStatus::Idle;
        }
        Ok(())
    }

    fn pause_measure(&mut self) -> Result<(), DeviceError> {
        if self.status == DeviceStatus::Running {
            self.status = DeviceStatus::Paused;
        }
        Ok(())
    }

    fn continue_measure(&mut self) -> Result<(), DeviceError> {
        if self.status == DeviceStatus::Unconfigured {
            return Err(DeviceError::Io(String::from("device not configured")));
        }
        self.status = DeviceStatus::Running;
        Ok(())
    }

    fn count_length(&self) -> u32 {
        2 * self.count_length + 1
    }

    fn bin_width(&self) -> u64 {
        self.bin_width
    }

    fn data_trace(&mut self) -> Result<Vec<u64>, DeviceError> {
        if self.status == DeviceStatus::Unconfigured {
            return Err(DeviceError::Io(String::from("device not configured")));
        }
        if self.status == DeviceStatus::Running {
            self.accumulate();
        }
        Ok(self.histogram.clone())
    }

    fn constraints(&self) -> Constraints {
        Constraints {
            min_channels: 2,
            max_channels: 2,
            min_count_length: 1,
            min_bin_width: 100,
        }
    }
}
