//! Measurement control loop for a correlation device
//!
//! One worker thread per controller owns the device and the acquisition
//! parameters; a [`ControllerHandle`] talks to it over a channel. The worker
//! processes one command at a time, so a parameter change never interleaves
//! with a poll iteration: stop, reconfigure, and restart happen as a single
//! transaction between polls.
//!
//! The poll cycle is self-scheduling rather than a blocking loop. Each
//! iteration sleeps for the refresh interval, reads one trace from the
//! device, publishes it, and enqueues the next iteration as a message to the
//! worker itself. Stop requests are cooperative: `stop()` only raises a flag,
//! and the iteration that observes it halts the device and emits the final
//! notifications. Cancellation therefore takes effect at the iteration
//! boundary, with latency up to one refresh interval.
//!
//! The run state and latest trace live behind one mutex, locked only for a
//! state check or a trace overwrite, never across the sleep or a device call.

use anyhow::{bail, Result};
use corrtools::cfg::Settings;
use corrtools::Trace;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::device::{Constraints, CorrelationDevice, DeviceError};
use crate::save::{SaveHandle, SaveMessage, SaveRequest};
use crate::CorrelationEvent;

/// Externally visible run state of one controller instance
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RunState {
    /// No measurement; nothing to resume
    Idle,
    Running,
    /// Stopped with data retained; the run can be resumed
    Paused,
}

enum Command {
    Start,
    Stop,
    Resume,
    /// Next poll iteration of the cycle with this generation number
    Poll(u64),
    SetCountLength {
        value: i64,
        respond_to: flume::Sender<u32>,
    },
    SetBinWidth {
        value: u64,
        respond_to: flume::Sender<u64>,
    },
    SetRefreshInterval(Duration),
    SetSaving(bool),
    Save {
        label: Option<String>,
        respond_to: flume::Sender<Result<PathBuf>>,
    },
    GetSettings {
        respond_to: flume::Sender<Settings>,
    },
    GetConstraints {
        respond_to: flume::Sender<Constraints>,
    },
    Shutdown,
}

struct Shared {
    state: RunState,
    trace: Trace,
}

type Subscribers = Arc<Mutex<Vec<flume::Sender<CorrelationEvent>>>>;

/// Handle to a running measurement controller.
///
/// Dropping the handle (or calling [`shutdown`](Self::shutdown)) terminates
/// the worker, stopping the device if a measurement is in flight.
pub struct ControllerHandle {
    sender: flume::Sender<Command>,
    shared: Arc<Mutex<Shared>>,
    subscribers: Subscribers,
    join_handle: thread::JoinHandle<()>,
}

impl ControllerHandle {
    /// Spawn a controller bound to one device and one persistence worker
    pub fn new(
        device: Box<dyn CorrelationDevice>,
        settings: Settings,
        save: SaveHandle,
    ) -> ControllerHandle {
        let (sender, receiver) = flume::unbounded();
        let shared = Arc::new(Mutex::new(Shared {
            state: RunState::Idle,
            trace: Trace::zeroed(
                (2 * settings.count_length + 1) as usize,
                settings.bin_width,
            ),
        }));
        let subscribers: Subscribers = Arc::new(Mutex::new(Vec::new()));

        let mut controller = Controller {
            device,
            count_length: settings.count_length,
            bin_width: settings.bin_width,
            refresh_interval: settings.refresh_interval,
            saving: settings.saving,
            stop_requested: false,
            cycle: 0,
            shared: shared.clone(),
            subscribers: subscribers.clone(),
            tx_self: sender.clone(),
            save,
        };
        let join_handle = thread::spawn(move || controller.run(receiver));

        ControllerHandle {
            sender,
            shared,
            subscribers,
            join_handle,
        }
    }

    /// Register an observer. Events are fire-and-forget; a dropped receiver
    /// is pruned at the next broadcast.
    pub fn subscribe(&self) -> flume::Receiver<CorrelationEvent> {
        let (tx, rx) = flume::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Configure the device with the current parameters and begin polling.
    /// A no-op if a measurement is already running; a configuration failure
    /// is reported as `StatusChanged(false)`.
    pub fn start(&self) {
        let _ = self.sender.send(Command::Start);
    }

    /// Request a cooperative stop. The in-flight poll iteration completes;
    /// the next one stops the device and emits one final `DataUpdated`
    /// followed by `StatusChanged(false)`.
    pub fn stop(&self) {
        let _ = self.sender.send(Command::Stop);
    }

    /// Resume a stopped measurement without reconfiguring the device or
    /// clearing its histogram. Rejected if nothing was ever started.
    pub fn resume(&self) {
        let _ = self.sender.send(Command::Resume);
    }

    /// Set the number of bins each side of zero delay. Non-positive values
    /// are rejected and leave everything unchanged. A running measurement is
    /// stopped, reconfigured, and restarted with a zeroed trace. Returns the
    /// count length now in effect.
    pub fn set_count_length(&self, value: i64) -> u32 {
        self.request(|tx| Command::SetCountLength {
            value,
            respond_to: tx,
        })
    }

    /// Set the bin width in picoseconds. Values below the device minimum are
    /// rejected; otherwise a running measurement restarts as for
    /// [`set_count_length`](Self::set_count_length). Returns the bin width
    /// now in effect.
    pub fn set_bin_width(&self, value: u64) -> u64 {
        self.request(|tx| Command::SetBinWidth {
            value,
            respond_to: tx,
        })
    }

    /// Set the poll period. Takes effect from the next iteration; a running
    /// measurement is not restarted and its trace is kept.
    pub fn set_refresh_interval(&self, value: Duration) {
        let _ = self.sender.send(Command::SetRefreshInterval(value));
    }

    pub fn set_saving(&self, on: bool) {
        let _ = self.sender.send(Command::SetSaving(on));
    }

    /// Hand the current trace and parameters to the persistence worker;
    /// returns the location of the written run record.
    pub fn save(&self, label: Option<&str>) -> Result<PathBuf> {
        let (tx, rx) = flume::bounded(1);
        let _ = self.sender.send(Command::Save {
            label: label.map(String::from),
            respond_to: tx,
        });
        match rx.recv() {
            Ok(result) => result,
            Err(_) => bail!("controller worker terminated"),
        }
    }

    pub fn settings(&self) -> Settings {
        self.request(|tx| Command::GetSettings { respond_to: tx })
    }

    pub fn constraints(&self) -> Constraints {
        self.request(|tx| Command::GetConstraints { respond_to: tx })
    }

    pub fn count_length(&self) -> u32 {
        self.settings().count_length
    }

    pub fn bin_width(&self) -> u64 {
        self.settings().bin_width
    }

    pub fn refresh_interval(&self) -> Duration {
        self.settings().refresh_interval
    }

    pub fn run_state(&self) -> RunState {
        self.shared.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.run_state() == RunState::Running
    }

    /// Snapshot of the latest trace; never the live buffer
    pub fn trace(&self) -> Trace {
        self.shared.lock().trace.clone()
    }

    /// Terminate the worker, stopping the device if a measurement is running
    pub fn shutdown(self) {
        let _ = self.sender.send(Command::Shutdown);
        let _ = self.join_handle.join();
    }

    fn request<T>(&self, command: impl FnOnce(flume::Sender<T>) -> Command) -> T {
        let (tx, rx) = flume::bounded(1);
        let _ = self.sender.send(command(tx));
        rx.recv().expect("controller worker terminated")
    }
}

struct Controller {
    device: Box<dyn CorrelationDevice>,
    count_length: u32,
    bin_width: u64,
    refresh_interval: Duration,
    saving: bool,
    stop_requested: bool,
    /// Generation of the active poll cycle; polls from older cycles are stale
    cycle: u64,
    shared: Arc<Mutex<Shared>>,
    subscribers: Subscribers,
    tx_self: flume::Sender<Command>,
    save: SaveHandle,
}

impl Controller {
    fn run(&mut self, receiver: flume::Receiver<Command>) {
        while let Ok(command) = receiver.recv() {
            match command {
                Command::Start => self.handle_start(),
                Command::Stop => self.handle_stop(),
                Command::Resume => self.handle_resume(),
                Command::Poll(cycle) => self.handle_poll(cycle),
                Command::SetCountLength { value, respond_to } => {
                    let _ = respond_to.send(self.set_count_length(value));
                }
                Command::SetBinWidth { value, respond_to } => {
                    let _ = respond_to.send(self.set_bin_width(value));
                }
                Command::SetRefreshInterval(value) => self.set_refresh_interval(value),
                Command::SetSaving(on) => self.saving = on,
                Command::Save { label, respond_to } => self.handle_save(label, respond_to),
                Command::GetSettings { respond_to } => {
                    let _ = respond_to.send(self.settings());
                }
                Command::GetConstraints { respond_to } => {
                    let _ = respond_to.send(self.device.constraints());
                }
                Command::Shutdown => break,
            }
        }
        if self.state() == RunState::Running {
            if let Err(e) = self.device.stop_measure() {
                warn!("device failed to stop on shutdown: {}", e);
            }
        }
    }

    fn handle_start(&mut self) {
        if self.state() == RunState::Running {
            warn!("measurement already running, start ignored");
            return;
        }
        if let Err(e) = self.configure_and_start() {
            error!("failed to start measurement: {}", e);
            self.broadcast(CorrelationEvent::StatusChanged(false));
            return;
        }
        let len = self.device.count_length() as usize;
        {
            let mut shared = self.shared.lock();
            shared.state = RunState::Running;
            shared.trace = Trace::zeroed(len, self.bin_width);
        }
        self.stop_requested = false;
        self.cycle += 1;
        info!(
            "measurement started: {} bins of {} ps",
            len, self.bin_width
        );
        self.broadcast(CorrelationEvent::StatusChanged(true));
        let _ = self.tx_self.send(Command::Poll(self.cycle));
    }

    fn handle_stop(&mut self) {
        if self.state() == RunState::Running {
            self.stop_requested = true;
        } else {
            debug!("no measurement running, stop ignored");
        }
    }

    fn handle_resume(&mut self) {
        match self.state() {
            RunState::Running => warn!("measurement already running, resume ignored"),
            RunState::Idle => warn!("no stopped measurement to resume"),
            RunState::Paused => {
                if let Err(e) = self.device.continue_measure() {
                    error!("device failed to resume: {}", e);
                    self.broadcast(CorrelationEvent::StatusChanged(false));
                    return;
                }
                self.shared.lock().state = RunState::Running;
                self.stop_requested = false;
                self.cycle += 1;
                self.broadcast(CorrelationEvent::StatusChanged(true));
                let _ = self.tx_self.send(Command::Poll(self.cycle));
            }
        }
    }

    fn handle_poll(&mut self, cycle: u64) {
        // A poll from a cycle that was since stopped or restarted is stale
        if cycle != self.cycle || self.state() != RunState::Running {
            return;
        }
        if self.stop_requested {
            if let Err(e) = self.device.stop_measure() {
                warn!("device failed to stop: {}", e);
            }
            self.stop_requested = false;
            self.shared.lock().state = RunState::Paused;
            info!("measurement stopped");
            self.broadcast(CorrelationEvent::DataUpdated);
            self.broadcast(CorrelationEvent::StatusChanged(false));
            return;
        }
        thread::sleep(self.refresh_interval);
        match self.device.data_trace() {
            Ok(counts) => {
                {
                    let mut shared = self.shared.lock();
                    shared.trace = Trace {
                        bin_width: self.bin_width,
                        counts,
                    };
                }
                self.broadcast(CorrelationEvent::DataUpdated);
                let _ = self.tx_self.send(Command::Poll(self.cycle));
            }
            Err(e) => {
                error!("trace readout failed, halting measurement: {}", e);
                if let Err(e) = self.device.stop_measure() {
                    warn!("device failed to stop: {}", e);
                }
                self.shared.lock().state = RunState::Idle;
                self.broadcast(CorrelationEvent::StatusChanged(false));
            }
        }
    }

    fn set_count_length(&mut self, value: i64) -> u32 {
        if value <= 0 {
            warn!("count length must be positive, ignoring {}", value);
            return self.count_length;
        }
        self.restart_with(|controller| controller.count_length = value as u32);
        self.broadcast(CorrelationEvent::CountLengthChanged(self.count_length));
        self.count_length
    }

    fn set_bin_width(&mut self, value: u64) -> u64 {
        let min = self.device.constraints().min_bin_width;
        if value < min {
            warn!(
                "bin width {} ps below device minimum {} ps, ignoring",
                value, min
            );
            return self.bin_width;
        }
        self.restart_with(|controller| controller.bin_width = value);
        self.broadcast(CorrelationEvent::BinWidthChanged(self.bin_width));
        self.bin_width
    }

    fn set_refresh_interval(&mut self, value: Duration) {
        // Picked up at the next poll iteration; no restart, the device
        // configuration is untouched
        self.refresh_interval = value;
        self.broadcast(CorrelationEvent::RefreshIntervalChanged(value));
    }

    /// Stop a running measurement, apply the change, and start again if one
    /// was running. Runs between polls, so the sequence cannot interleave
    /// with an iteration; the stale-cycle check retires the old cycle's
    /// queued poll.
    fn restart_with(&mut self, apply: impl FnOnce(&mut Controller)) {
        let restart = self.state() == RunState::Running;
        if restart {
            if let Err(e) = self.device.stop_measure() {
                warn!("device failed to stop: {}", e);
            }
            self.shared.lock().state = RunState::Paused;
        }
        apply(self);
        if restart {
            self.handle_start();
        }
    }

    fn handle_save(&mut self, label: Option<String>, respond_to: flume::Sender<Result<PathBuf>>) {
        let request = SaveRequest {
            label,
            trace: self.shared.lock().trace.clone(),
            settings: self.settings(),
            respond_to,
        };
        if let Err(flume::SendError(SaveMessage::Save(request))) =
            self.save.sender.send(SaveMessage::Save(request))
        {
            let _ = request
                .respond_to
                .send(Err(anyhow::anyhow!("save worker terminated")));
        }
    }

    fn configure_and_start(&mut self) -> Result<(), DeviceError> {
        self.device.configure(self.bin_width, self.count_length)?;
        self.device.start_measure()?;
        Ok(())
    }

    fn settings(&self) -> Settings {
        Settings {
            count_length: self.count_length,
            bin_width: self.bin_width,
            refresh_interval: self.refresh_interval,
            saving: self.saving,
        }
    }

    fn state(&self) -> RunState {
        self.shared.lock().state
    }

    fn broadcast(&self, event: CorrelationEvent) {
        // Fire and forget; subscribers that went away are pruned
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}
