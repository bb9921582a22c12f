use corrlogic::device::{CorrelationDevice, DeviceStatus};
use corrlogic::dummy::DummyCorrelator;

#[test]
fn configure_validates_against_constraints() {
    let mut device = DummyCorrelator::seeded(1);
    assert!(device.configure(50, 10).is_err());
    assert!(device.configure(500, 0).is_err());
    assert_eq!(device.status(), DeviceStatus::Unconfigured);

    device.configure(500, 10).unwrap();
    assert_eq!(device.status(), DeviceStatus::Idle);
}

#[test]
fn unconfigured_device_rejects_operation() {
    let mut device = DummyCorrelator::seeded(1);
    assert!(device.start_measure().is_err());
    assert!(device.continue_measure().is_err());
    assert!(device.data_trace().is_err());
}

#[test]
fn reports_centered_trace_length() {
    let mut device = DummyCorrelator::seeded(2);
    device.configure(500, 50).unwrap();
    assert_eq!(device.count_length(), 101);
    assert_eq!(device.bin_width(), 500);
    device.start_measure().unwrap();
    assert_eq!(device.data_trace().unwrap().len(), 101);
}

#[test]
fn accumulates_while_running_and_clears_on_start() {
    let mut device = DummyCorrelator::seeded(3);
    device.configure(500, 10).unwrap();
    device.start_measure().unwrap();
    let mut last = 0;
    for _ in 0..3 {
        let total: u64 = device.data_trace().unwrap().iter().sum();
        assert!(total >= last);
        last = total;
    }
    assert!(last > 0);

    // Stopped: readout returns the retained histogram unchanged
    device.stop_measure().unwrap();
    let retained: u64 = device.data_trace().unwrap().iter().sum();
    assert_eq!(retained, last);
    assert_eq!(retained, device.data_trace().unwrap().iter().sum::<u64>());

    // A fresh start clears
    device.start_measure().unwrap();
    device.stop_measure().unwrap();
    assert!(device.data_trace().unwrap().iter().all(|&c| c == 0));
}

#[test]
fn continue_resumes_accumulation() {
    let mut device = DummyCorrelator::seeded(4);
    device.configure(500, 10).unwrap();
    device.start_measure().unwrap();
    let first: u64 = device.data_trace().unwrap().iter().sum();
    device.stop_measure().unwrap();
    device.continue_measure().unwrap();
    let resumed: u64 = device.data_trace().unwrap().iter().sum();
    assert!(resumed > first);
}

#[test]
fn pause_and_continue_track_status() {
    let mut device = DummyCorrelator::seeded(5);
    device.configure(500, 10).unwrap();
    device.start_measure().unwrap();
    assert_eq!(device.status(), DeviceStatus::Running);
    device.pause_measure().unwrap();
    assert_eq!(device.status(), DeviceStatus::Paused);
    device.continue_measure().unwrap();
    assert_eq!(device.status(), DeviceStatus::Running);
}

/// The simulated source is antibunched: far fewer coincidences at zero delay
/// than in the flat background.
#[test]
fn zero_delay_bin_is_suppressed() {
    let mut device = DummyCorrelator::seeded(6);
    device.configure(500, 20).unwrap();
    device.start_measure().unwrap();
    let mut trace = Vec::new();
    for _ in 0..50 {
        trace = device.data_trace().unwrap();
    }
    let center = trace[20]; // zero-delay bin of the 41-bin trace
    assert!(center < trace[0] / 2);
    assert!(center < trace[40] / 2);
}
