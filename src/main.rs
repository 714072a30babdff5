//! SmartIron supervisor main entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  ThingsBoardClient   OllamaOracle   LogEventSink   Monotonic   │
//! │  (Auth+Telemetry+    (OraclePort)   (EventSink)    Clock       │
//! │   Command)                                         (TimePort)  │
//! │  EnvConfigAdapter (ConfigPort)      console thread (commands)  │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              Supervisor (control loop)                 │    │
//! │  │  Session · FSM · Safety · Dispatch gate                │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  AdvisoryWorker (background oracle refresh, optional)          │
//! └────────────────────────────────────────────────────────────────┘
//! ```

use std::io::BufRead;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};

use smartiron::adapters::env_config::EnvConfigAdapter;
use smartiron::adapters::log_sink::LogEventSink;
use smartiron::adapters::ollama::OllamaOracle;
use smartiron::adapters::thingsboard::ThingsBoardClient;
use smartiron::adapters::time::MonotonicClock;
use smartiron::advisory::AdvisoryGateway;
use smartiron::advisory::handoff::{AdvisoryHandoff, AdvisoryWorker};
use smartiron::app::commands::{AppCommand, ControlHandle, control_channel};
use smartiron::app::ports::ConfigPort;
use smartiron::app::service::Supervisor;
use smartiron::config::AdvisoryMode;

/// Supervisory control loop for the SmartIron appliance.
#[derive(Parser, Debug)]
#[command(name = "smartiron", version, about)]
struct Cli {
    /// JSON configuration file (environment variables override it)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stop after this many iterations (default: run until stopped)
    #[arg(long)]
    max_cycles: Option<u64>,

    /// Query the oracle inside each iteration instead of in the background
    #[arg(long)]
    inline_advisory: bool,

    /// Invert the fabric-presence reading
    #[arg(long)]
    invert_fabric_sensor: bool,

    /// Log telemetry records as JSON objects
    #[arg(long)]
    json_telemetry: bool,
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

/// Forward console lines (`on`, `off`, `auto`, `invert on|off`, `silence`, `stop`)
/// to the control loop.  The thread ends with stdin or with the loop.
fn spawn_console(handle: ControlHandle) {
    let spawned = std::thread::Builder::new()
        .name("console".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                match AppCommand::parse(&line) {
                    Some(cmd) => {
                        if !handle.send(cmd) {
                            break;
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => warn!(
                        "Unknown command {:?} (on|off|auto|invert on|invert off|silence|stop)",
                        line.trim()
                    ),
                }
            }
        });
    if let Err(e) = spawned {
        warn!("Console disabled: {e}");
    }
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    // ── Configuration ─────────────────────────────────────────
    let mut config = EnvConfigAdapter::new(cli.config.clone())
        .load()
        .context("invalid configuration")?;
    if cli.inline_advisory {
        config.advisory_mode = AdvisoryMode::Inline;
    }
    if cli.invert_fabric_sensor {
        config.invert_fabric_sensor = true;
    }
    info!("Configuration: {:?}", config);

    // ── Adapters ──────────────────────────────────────────────
    let mut platform = ThingsBoardClient::new(&config).context("platform client")?;
    let oracle = OllamaOracle::new(&config).context("oracle client")?;
    let clock = MonotonicClock::new();
    let mut sink = if cli.json_telemetry {
        LogEventSink::with_json_telemetry()
    } else {
        LogEventSink::new()
    };

    // ── Startup: no token, no control ─────────────────────────
    let mut supervisor = Supervisor::new(config.clone());
    supervisor
        .start(&mut platform, &clock, &mut sink)
        .context("initial login failed")?;

    let (handle, commands) = control_channel();
    spawn_console(handle.clone());

    // ── Control loop ──────────────────────────────────────────
    let cycles = match config.advisory_mode {
        AdvisoryMode::Inline => {
            let mut gateway = AdvisoryGateway::new(oracle);
            supervisor.run(
                &mut platform,
                &mut gateway,
                &clock,
                &mut sink,
                &commands,
                cli.max_cycles,
            )
        }
        AdvisoryMode::Background => {
            let mut handoff = AdvisoryHandoff::with_max_lag(u64::from(config.max_advisory_lag));
            let worker = AdvisoryWorker::spawn(
                AdvisoryGateway::new(oracle),
                handoff.clone(),
                config.advisory_refresh(),
            )
            .context("advisory worker")?;
            let cycles = supervisor.run(
                &mut platform,
                &mut handoff,
                &clock,
                &mut sink,
                &commands,
                cli.max_cycles,
            );
            worker.shutdown();
            cycles
        }
    };

    drop(handle);
    info!("SmartIron supervisor exiting after {cycles} cycles");
    Ok(())
}
