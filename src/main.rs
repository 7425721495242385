//! # Mechanic
//!
//! Live vehicle telemetry gauges over a wireless serial link to an onboard
//! diagnostic module.

use anyhow::{Context, Result};
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mechanic::config::{Config, LoggingConfig};
use mechanic::display::command::{pick_endpoint, HELP};
use mechanic::display::{render_endpoints, Command, ConsoleStatus, Readout, ReadoutFormat};
use mechanic::gauge::animator::AnimationScheduler;
use mechanic::gauge::Gauges;
use mechanic::link::{ConnectionSupervisor, Connector, EndpointSelection, SupervisorSettings};
use mechanic::serial::SerialConnector;
use mechanic::session::SessionController;

/// Configuration file used when none is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Main entry point for Mechanic
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (first argument, else `config/default.toml`, else defaults)
///    - Set up logging
///    - Build the gauges, the serial connector and the session
///
/// 2. **Main Loop**
///    - Print a gauge readout every `display.refresh_ms`
///    - Handle operator commands from stdin
///    - Handle Ctrl+C for graceful shutdown
///
/// 3. **Graceful Shutdown**
///    - Pause the session, waiting for the link and animator to stop
///
/// # Errors
///
/// Returns error if the configuration cannot be loaded or a session task
/// panics. Link failures are retried forever and never end the program.
///
/// # Examples
///
/// ```bash
/// cargo run --release -- config/default.toml
/// ```
///
/// Expected output:
/// ```text
/// INFO mechanic: Mechanic v0.1.0 starting...
/// INFO mechanic::link::supervisor: Connection supervisor started
/// INFO mechanic::display: Main [not connected]
/// INFO mechanic::serial: Successfully opened diagnostic module at /dev/rfcomm0
/// INFO mechanic::display: Main [/dev/rfcomm0, 500 kbps, extended ids]
/// Main [/dev/rfcomm0, 500 kbps, extended ids] | speed 60 km/h | rpm 850 rpm | ...
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;
    let _log_guard = init_logging(&config.logging);

    info!("Mechanic v{} starting...", env!("CARGO_PKG_VERSION"));

    let gauges = Arc::new(Gauges::from_config(
        &config.gauges,
        config.animation.steps_to_full_scale,
    ));
    let status = Arc::new(ConsoleStatus::new());
    let selection = EndpointSelection::new(config.link.endpoint.clone());
    let connector = SerialConnector::new(config.link.baud_rate);

    let supervisor = ConnectionSupervisor::new(
        connector.clone(),
        gauges.clone(),
        status.clone(),
        selection.clone(),
        SupervisorSettings::from(&config.link),
    );
    let animator = AnimationScheduler::new(gauges.clone(), config.animation.tick_period());

    let mut controller = SessionController::new(supervisor, animator);
    controller.resume();

    let format = ReadoutFormat::from_config(&config.display.format);
    let mut refresh = interval(config.display.refresh_period());
    let mut endpoints = list_endpoints(&connector);
    let mut console = spawn_console_reader();

    println!("{}", HELP);

    loop {
        tokio::select! {
            _ = refresh.tick() => {
                if controller.is_running() {
                    println!("{}", Readout::capture(&status, &gauges).render(format));
                }
            }

            Some(line) = console.recv() => {
                match Command::parse(&line) {
                    Some(Command::List) => {
                        endpoints = list_endpoints(&connector);
                    }
                    Some(Command::Select(index)) => match pick_endpoint(&endpoints, index) {
                        Ok(endpoint) => {
                            info!("Selected endpoint {}", endpoint);
                            selection.select(endpoint);
                        }
                        Err(e) => warn!("{}", e),
                    },
                    Some(Command::Pause) => {
                        controller.pause().await?;
                        info!("Paused");
                    }
                    Some(Command::Resume) => {
                        if controller.resume() {
                            info!("Resumed");
                        }
                    }
                    Some(Command::Quit) => break,
                    None => println!("{}", HELP),
                }
            }

            // Handle Ctrl+C for graceful shutdown
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    controller.pause().await?;
    info!("Last link status: {:?}", *controller.link_status().borrow());
    Ok(())
}

/// Load the config named on the command line, else the default file if present
fn load_config() -> Result<Config> {
    match std::env::args().nth(1) {
        Some(path) => Config::load(&path).with_context(|| format!("loading config {}", path)),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => Config::load(DEFAULT_CONFIG_PATH)
            .with_context(|| format!("loading config {}", DEFAULT_CONFIG_PATH)),
        None => Ok(Config::default()),
    }
}

/// Console logging, plus a daily-rolling file when `log_dir` is set
///
/// `RUST_LOG` overrides the configured level. The returned guard flushes
/// the file writer and must live until exit.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let (file_layer, guard) = if config.log_dir.is_empty() {
        (None, None)
    } else {
        let appender = tracing_appender::rolling::daily(&config.log_dir, "mechanic.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        (
            Some(fmt::layer().with_writer(writer).with_ansi(false)),
            Some(guard),
        )
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    guard
}

/// Read console lines on a dedicated thread
///
/// A blocking stdin read inside the runtime would hold up shutdown, so the
/// reader lives on its own thread and is simply abandoned at exit. The
/// channel closes when stdin does.
fn spawn_console_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Failed to read console input: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

/// Print the numbered endpoint listing and return it
fn list_endpoints(connector: &SerialConnector) -> Vec<String> {
    match connector.list_available_endpoints() {
        Ok(endpoints) => {
            println!("{}", render_endpoints(&endpoints));
            endpoints
        }
        Err(e) => {
            warn!("Failed to list endpoints: {}", e);
            Vec::new()
        }
    }
}
