//! # Ferrous Backend
//!
//! Unix socket backend speaking the line-based pipe protocol, answering
//! lookups from a static record set.

mod bootstrap;

use clap::Parser;
use ferrous_backend_application::use_cases::LookupQueryUseCase;
use ferrous_backend_domain::config::DispatchMode;
use ferrous_backend_domain::CliOverrides;
use ferrous_backend_infrastructure::backend::SocketServer;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "ferrous-backend")]
#[command(version)]
#[command(about = "Unix socket backend for the line-based pipe protocol")]
struct Cli {
    /// Path to configuration file
    #[arg(short = 'c', long)]
    config: Option<String>,

    /// Listening socket path
    #[arg(short = 's', long)]
    socket: Option<String>,

    /// Text sent back on a successful handshake
    #[arg(long)]
    banner: Option<String>,

    /// Worker model: task or process
    #[arg(long)]
    dispatch: Option<DispatchMode>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let overrides = CliOverrides {
        socket_path: cli.socket,
        banner: cli.banner,
        dispatch: cli.dispatch,
        log_level: cli.log_level,
    };

    let config = bootstrap::load_config(cli.config.as_deref(), overrides)?;
    bootstrap::init_logging(&config.logging);

    info!("Ferrous Backend starting");
    bootstrap::log_config(cli.config.as_deref(), &config);

    let resolver = Arc::new(bootstrap::build_resolver(&config));
    let lookup = Arc::new(LookupQueryUseCase::with_resolver(resolver));
    let server = Arc::new(SocketServer::bind(&config.server, lookup)?);

    if config.server.dispatch == DispatchMode::Process {
        warn!("Process dispatch forks a multithreaded server; prefer task dispatch unless isolation is required");
    }

    let mut serve = tokio::spawn({
        let server = Arc::clone(&server);
        async move { server.serve().await }
    });

    tokio::select! {
        _ = shutdown_signal() => {
            info!("Received shutdown signal, stopping backend");
            server.stop();
        }
        result = &mut serve => {
            // Accept loop ended without a stop request.
            result??;
            return Ok(());
        }
    }

    match serve.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Server stopped with an error"),
        Err(e) => error!(error = %e, "Server task failed"),
    }

    info!("Ferrous Backend stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Unable to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Unable to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
