use anyhow::Result;
use chrono::Utc;
use oxpager_escalation::dispatch::LogDispatcher;
use oxpager_storage::PagerStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use oxpager_server::app;
use oxpager_server::config::ServerConfig;
use oxpager_server::scheduler::{EscalationScheduler, HousekeepingScheduler};
use oxpager_server::seed;
use oxpager_server::state::{self, AppState};

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  oxpager-server [config.toml]                          Start the server");
    eprintln!("  oxpager-server init-seed <config.toml> <seed.json>    Load rules, windows, routing and schedules from a seed file");
}

#[tokio::main]
async fn main() -> Result<()> {
    oxpager_common::id::init(1, 1);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("oxpager=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("init-seed") => {
            let config_path = args.get(2).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("init-seed requires <config.toml> and <seed.json> arguments")
            })?;
            let seed_path = args.get(3).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("init-seed requires <seed.json> argument")
            })?;
            run_init_seed(config_path, seed_path)
        }
        Some("--help" | "-h") => {
            print_usage();
            Ok(())
        }
        _ => {
            let config_path = args
                .get(1)
                .map(|s| s.as_str())
                .unwrap_or("config/server.toml");
            run_server(config_path).await
        }
    }
}

fn run_init_seed(config_path: &str, seed_path: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    let store = PagerStore::open(&config.database_path())?;
    let seed = seed::load_seed_file(seed_path)?;
    seed::apply_seed(&store, &seed, Utc::now())?;
    tracing::info!(seed = seed_path, "init-seed completed");
    Ok(())
}

async fn run_server(config_path: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    let db_path = config.database_path();

    tracing::info!(
        http_port = config.http_port,
        db = %db_path.display(),
        sweep_interval_secs = config.escalation.sweep_interval_secs,
        housekeeping_interval_secs = config.housekeeping.interval_secs,
        "oxpager-server starting"
    );

    let store = Arc::new(PagerStore::open(&db_path)?);
    let directory = state::load_directory(&config, &store)?;
    tracing::info!(teams = directory.team_count(), "Team directory loaded");

    let state = AppState::new(
        store,
        Arc::new(LogDispatcher::default()),
        Arc::new(directory),
        config.clone(),
    );

    let shutdown = CancellationToken::new();

    let escalation = EscalationScheduler::new(state.clone());
    let escalation_token = shutdown.clone();
    let escalation_handle = tokio::spawn(async move {
        escalation.run(escalation_token).await;
    });

    let housekeeping = HousekeepingScheduler::new(state.clone());
    let housekeeping_token = shutdown.clone();
    let housekeeping_handle = tokio::spawn(async move {
        housekeeping.run(housekeeping_token).await;
    });

    let http_addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let app = app::build_http_app(state);
    let http_listener = tokio::net::TcpListener::bind(http_addr).await?;
    tracing::info!(http = %http_addr, "Server started");

    let stop = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
    };
    if let Err(e) = app::serve_until(http_listener, app, shutdown.clone(), stop).await {
        tracing::error!(error = %e, "HTTP server error");
    }

    for (name, handle) in [("escalation", escalation_handle), ("housekeeping", housekeeping_handle)] {
        if let Err(e) = handle.await {
            tracing::error!(scheduler = name, error = %e, "Scheduler task ended abnormally");
        }
    }
    tracing::info!("Server stopped");

    Ok(())
}
