use actix_web::web;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod actors;
mod config;
mod control;
mod metrics;
mod process;
mod rewards;
mod surface;

use actors::{HealthMonitorActor, Supervisor};
use config::Config;
use rewards::RewardStore;
use surface::{OutputLog, SurfaceState};

#[derive(Parser, Debug)]
#[command(name = "astra")]
#[command(about = "Run and control the Astra trainer and simulator processes")]
struct Cli {
    /// Start the trainer and then the simulator right away
    #[arg(long)]
    start_astra: bool,

    /// Serve the HTTP control surface
    #[arg(long)]
    start_ui: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=astra=trace cargo run -- --start-ui
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,astra=debug"))
        )
        .init();

    let cli = Cli::parse();
    if !cli.start_astra && !cli.start_ui {
        tracing::info!("Nothing to do, pass --start-astra and/or --start-ui");
        return Ok(());
    }

    tracing::info!("Starting Astra orchestration core");

    // === 1. Configuration ===
    let config = Config::from_env()?;
    tracing::info!(
        trainer = %config.trainer.program(),
        simulator = %config.simulator.program(),
        run_name = %config.run_name,
        rewards_path = %config.rewards_path.display(),
        "Configuration loaded"
    );

    // === 2. Initialize Prometheus metrics ===
    let metrics = Arc::new(metrics::Metrics::new()?);
    tracing::info!("Metrics registry created with {} metrics", metrics.registry().gather().len());

    // === 3. Health monitor ===
    let health = HealthMonitorActor::spawn_default();

    // === 4. Supervisor ===
    let (supervisor_end, surface_end) = control::duplex();
    let store = RewardStore::new(&config.rewards_path);
    let rewards = store.load_or_default();

    let supervisor = Supervisor::new(
        config.supervisor_config(),
        supervisor_end,
        store,
        rewards,
        metrics.clone(),
        health.clone(),
    );
    let (commands, outbound) = surface_end.into_split();
    let handle = supervisor.handle(commands);
    let supervisor_task = supervisor.spawn();

    // === 5. Outbound bridge ===
    let log = Arc::new(OutputLog::new(config.log_capacity));
    surface::spawn_bridge(outbound, log.clone());

    if cli.start_astra {
        tracing::info!("Starting trainer and simulator");
        handle.start_both()?;
    }

    // === 6. Control surface in its own actix system ===
    if cli.start_ui {
        let state = web::Data::new(SurfaceState::new(handle.clone(), log, health, metrics));
        let host = config.ui_host.clone();
        let port = config.ui_port;

        std::thread::spawn(move || {
            let system = actix_web::rt::System::new();
            if let Err(e) = system.block_on(surface::start_surface_server(state, host, port)) {
                tracing::error!("Control surface error: {}", e);
            }
        });
    }

    // === 7. Run until interrupted ===
    tracing::info!("Running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down, stopping trainer and simulator");
    handle.shutdown();
    supervisor_task.await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
