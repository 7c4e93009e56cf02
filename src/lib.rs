// Module declarations for the application's core components
pub mod aggregate; // Group sums/means and battery bank diagnostics
pub mod catalog; // Canonical sensor keys, units and aggregation rules
pub mod codec; // Register word scaling and bit unpacking
pub mod config; // Configuration management
pub mod coordinator; // Per-poll pipeline and poll driver
pub mod derived; // Metrics computed from canonical keys
pub mod error; // Error helper macros
pub mod mapper; // Register and cloud field tables
pub mod options; // Command line options parsing
pub mod overlay; // Grid controller overlay onto group aggregates
pub mod port; // Smart port modes and per-port key filtering
pub mod prelude; // Common imports and types
pub mod raw; // Raw register blocks and cloud objects
pub mod sensor; // Canonical sensor values and maps
pub mod snapshot; // Register and cloud snapshot files
pub mod state_cache; // Per-device validation state registry
pub mod validator; // Canary and monotonic checks

// Get the package version from Cargo.toml
const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

use crate::coordinator::{Coordinator, PollOutcome};
use crate::prelude::*;

use serde::Serialize;
use std::fs::OpenOptions;
use std::time::Duration;
use tokio::time::Instant;

/// One line of output.
#[derive(Serialize)]
struct PollRecord<'a> {
    timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(flatten)]
    outcome: &'a PollOutcome,
}

fn init_logging() {
    // everything passes the env filter by default; the effective level is
    // set from the config once it is loaded
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("trace"))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.module_path().unwrap_or(""),
                record.args()
            )
        })
        .write_style(env_logger::WriteStyle::Never)
        .try_init();
    log::set_max_level(log::LevelFilter::Info);
}

fn open_output(config: &ConfigWrapper) -> Result<Box<dyn Write + Send>> {
    match config.output() {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|err| crate::file_error_with_source!(err, "error opening {}", path))?;
            info!("Writing output to {}", path);
            Ok(Box::new(file))
        }
        None => Ok(Box::new(std::io::stdout())),
    }
}

pub fn write_outcome(out: &mut dyn Write, outcome: &PollOutcome) -> Result<()> {
    let record = PollRecord {
        timestamp: chrono::Utc::now(),
        outcome,
    };
    writeln!(out, "{}", serde_json::to_string(&record)?)?;
    out.flush()?;
    Ok(())
}

/// Main application entry point
///
/// Polls every enabled group on the configured interval until shutdown is
/// signalled, the runtime limit passes, or after one pass with `--once`.
pub async fn app(
    mut shutdown_rx: tokio::sync::broadcast::Receiver<()>,
    options: Options,
) -> Result<()> {
    init_logging();

    info!("eg4-normalizer {} starting", CARGO_PKG_VERSION);

    let config = ConfigWrapper::new(options.config_file.clone())?;

    match config.loglevel().parse::<log::LevelFilter>() {
        Ok(level) => log::set_max_level(level),
        Err(_) => warn!("unknown loglevel {}, staying at info", config.loglevel()),
    }

    let coordinator = Coordinator::new(config.clone());
    coordinator.sync_states();

    let mut out = open_output(&config)?;
    let interval = config.interval();
    let deadline = options
        .runtime
        .map(|secs| Instant::now() + Duration::from_secs(secs));

    loop {
        for outcome in coordinator.poll().await? {
            write_outcome(&mut out, &outcome)?;
        }

        if options.once || interval.is_zero() {
            break;
        }

        let wake = Instant::now() + interval;
        let wake = deadline.map_or(wake, |d| wake.min(d));

        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received");
                break;
            }
            _ = tokio::time::sleep_until(wake) => {}
        }

        if deadline.is_some_and(|d| Instant::now() >= d) {
            info!("Runtime limit reached");
            break;
        }
    }

    coordinator
        .stats
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .print_summary();

    info!("Application shutdown complete");
    Ok(())
}
