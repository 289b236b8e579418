use clap::Parser;
use std::process;
use std::sync::Arc;
use tail_relay::server::{self, AppState};
use tail_relay::{Broadcaster, Config, Tailer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config = Config::parse();
    info!(
        file = %config.file.display(),
        initial_lines = config.initial_lines,
        poll_interval = config.poll_interval,
        "Starting tail relay"
    );

    let broadcaster = Arc::new(Broadcaster::with_send_timeout(config.send_timeout()));
    let tailer = match Tailer::with_sink(config.tail_config(), broadcaster.clone()) {
        Ok(tailer) => Arc::new(tailer),
        Err(e) => {
            error!(error = %e, "Invalid tailer configuration");
            process::exit(1);
        }
    };

    tailer.start().await;

    let state = Arc::new(
        AppState::new(broadcaster, tailer.clone(), config.initial_lines)
            .with_static_dir(config.static_dir.clone()),
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
        }
        info!("Shutting down tail relay");
    };

    let result = server::start_server(&config.bind_address(), state, shutdown).await;

    tailer.stop().await;

    if let Err(e) = result {
        error!(error = %e, "Server error");
        process::exit(1);
    }
}
