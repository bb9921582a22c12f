use anyhow::Result;
use argh::FromArgs;
use corrlogic::controller::ControllerHandle;
use corrlogic::dummy::DummyCorrelator;
use corrlogic::save::SaveHandle;
use corrlogic::CorrelationEvent;
use corrtools::cfg::Settings;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const GIT_VERSION: &str = git_version::git_version!(fallback = "unknown");

#[derive(Debug, FromArgs)]
/// Run a correlation measurement against the simulated counting device
struct CliArgs {
    /// print version information
    #[argh(switch, short = 'v')]
    version: bool,
    /// settings file, restored at startup and written back at shutdown
    #[argh(option, default = "String::from(\"correlation.json\")")]
    settings: String,
    /// directory for saved traces
    #[argh(option, default = "String::from(\"data\")")]
    data_dir: String,
    /// measurement duration in seconds
    #[argh(option, short = 'd', default = "10")]
    duration: u64,
    /// bins each side of zero delay
    #[argh(option)]
    count_length: Option<i64>,
    /// bin width in picoseconds
    #[argh(option)]
    bin_width: Option<u64>,
    /// refresh interval, e.g. 250ms
    #[argh(option)]
    refresh: Option<String>,
    /// save the trace when the run completes
    #[argh(switch, short = 's')]
    save: bool,
}

fn main() -> Result<()> {
    let args: CliArgs = argh::from_env();

    if args.version {
        println!(concat!(env!("CARGO_BIN_NAME"), " ", "{}"), GIT_VERSION);
        return Ok(());
    }

    tracing_subscriber::fmt::init();

    let settings_path = PathBuf::from(&args.settings);
    let settings = match Settings::load(&settings_path) {
        Ok(settings) => settings,
        Err(_) => {
            info!(
                "no settings at {}, starting from defaults",
                settings_path.display()
            );
            Settings::default()
        }
    };

    let save = SaveHandle::new(PathBuf::from(&args.data_dir));
    let controller = ControllerHandle::new(Box::new(DummyCorrelator::new()), settings, save);
    let events = controller.subscribe();

    if let Some(n) = args.count_length {
        controller.set_count_length(n);
    }
    if let Some(w) = args.bin_width {
        controller.set_bin_width(w);
    }
    if let Some(refresh) = &args.refresh {
        controller.set_refresh_interval(humantime::parse_duration(refresh)?);
    }
    if args.save {
        controller.set_saving(true);
    }

    controller.start();

    let deadline = Instant::now() + Duration::from_secs(args.duration);
    loop {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        match events.recv_timeout(deadline - now) {
            Ok(CorrelationEvent::DataUpdated) => {
                let trace = controller.trace();
                info!(
                    "trace updated: {} bins, {} counts at zero delay",
                    trace.len(),
                    trace.zero_delay().unwrap_or(0)
                );
            }
            Ok(CorrelationEvent::StatusChanged(running)) => {
                info!("measurement running: {}", running);
                if !running {
                    // Configuration failure or device fault; nothing to wait for
                    break;
                }
            }
            Ok(event) => info!("{:?}", event),
            Err(flume::RecvTimeoutError::Timeout) => break,
            Err(flume::RecvTimeoutError::Disconnected) => break,
        }
    }

    if controller.is_running() {
        controller.stop();
        // The cycle winds down cooperatively: wait for the final update and
        // the not-running notification, bounded by one refresh interval plus
        // slack.
        let quiesced = Instant::now() + controller.refresh_interval() + Duration::from_secs(2);
        while let Ok(event) = events.recv_deadline(quiesced) {
            if event == CorrelationEvent::StatusChanged(false) {
                break;
            }
        }
    }

    let settings = controller.settings();
    if settings.saving {
        match controller.save(None) {
            Ok(path) => info!("saved run record to {}", path.display()),
            Err(e) => warn!("save failed: {:#}", e),
        }
    }

    controller.shutdown();
    settings.store(&settings_path)?;

    Ok(())
}
