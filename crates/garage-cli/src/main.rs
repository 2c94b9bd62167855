//! # garage: garage door controller service
//!
//! Composition root that wires the controller, the pin backend and the HTTP
//! transport together.
//!
//! ## Responsibilities
//! - Parse the command line and load configuration (file, then env vars)
//! - Initialize logging
//! - Select and open the pin backend (probing the host when asked to)
//! - Start the controller and attach the HomeKit cache
//! - Bind the HTTP listener and serve
//! - On SIGINT/SIGTERM, stop the controller so every relay ends idle

mod config;

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::Config;
use garage_controller::GarageController;
use garage_hardware::backend::SimulatedChip;
use garage_hardware::probe::{DeviceTreeProbe, HostProbe, backend_for_model};
use garage_hardware::{AnyPinChip, BackendKind};
use garage_server::AppState;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "garage")]
#[command(version = garage_core::VERSION)]
#[command(about = "Garage door controller service", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./garage.toml when present)
    #[arg(short, long, global = true, env = "GARAGE_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
enum Command {
    /// Run the controller and the HTTP/WebSocket API (default)
    Serve,

    /// Print a password hash for an `[[auth.users]]` entry
    HashPassword {
        #[arg(value_name = "PASSWORD")]
        password: String,
    },

    /// Show the detected host model and the backend it selects
    Probe,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(cli.config.as_deref()).await,
        Command::HashPassword { password } => {
            println!("{}", garage_server::hash_password(&password));
            Ok(())
        }
        Command::Probe => {
            let model = DeviceTreeProbe::new().model();
            println!("model:   {}", model.as_deref().unwrap_or("(none)"));
            println!("backend: {}", backend_for_model(model.as_deref()));
            Ok(())
        }
    }
}

fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|error| {
        eprintln!("invalid log filter {filter:?} ({error}), falling back to info");
        EnvFilter::new("info")
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn open_chip(config: &Config) -> anyhow::Result<AnyPinChip> {
    let controller = &config.controller;
    let kind = controller.backend.resolve(&DeviceTreeProbe::new());

    if kind == BackendKind::Simulated {
        // Demo mode: pressing a relay moves its door.
        let (chip, world) = SimulatedChip::new();
        for door in &controller.doors {
            world.link_door(door.relay_pin, door.sensor_pin, controller.relay_active_level);
        }
        warn!("no GPIO hardware selected, running on the simulated backend");
        return Ok(chip.into());
    }

    AnyPinChip::open(kind, controller.chip_index)
        .await
        .with_context(|| format!("opening {kind} backend (chip {})", controller.chip_index))
}

async fn serve(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = Config::load(config_path).context("loading configuration")?;
    init_tracing(&config.logging.filter);

    let chip = open_chip(&config).await?;
    let controller = GarageController::start(config.controller.clone(), chip)
        .await
        .context("starting controller")?;

    let served = run_server(&config, controller.clone()).await;

    // Idempotent; normally already done by the signal handler.
    controller
        .shutdown()
        .await
        .context("releasing GPIO lines")?;
    served
}

async fn run_server(config: &Config, controller: GarageController) -> anyhow::Result<()> {
    let state =
        AppState::new(controller.clone(), config.auth.clone()).context("building API state")?;
    let app = garage_server::build(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("binding {}", config.bind_addr()))?;
    let backend = controller.backend();
    info!(
        addr = %listener.local_addr()?,
        backend = %backend.backend,
        chip = %backend.label,
        auth = config.auth.enabled,
        "garage server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(controller))
        .await
        .context("serving HTTP")
}

/// Wait for SIGINT or SIGTERM, then stop the controller.
///
/// Stopping the controller first ends open WebSocket sessions, which lets
/// the graceful shutdown of the HTTP server complete.
async fn shutdown_signal(controller: GarageController) {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(%error, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(error) => {
                warn!(%error, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    info!("shutdown signal received");
    if let Err(error) = controller.shutdown().await {
        warn!(%error, "controller shutdown reported an error");
    }
}
