//! qdap-server: Debug Adapter Protocol server for the mqtqasm quantum debugger.
//!
//! Speaks DAP over TCP (one session per connection) or over stdin/stdout, and
//! drives a simulation engine through one handle per session.

mod config;
mod dispatch;
mod engine;
mod messages;
mod server;
mod session;

use clap::Parser;
use config::{ConfigOverrides, ServerConfig};
use engine::TraceEngine;
use server::DapServer;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// qdap-server — mqtqasm debug adapter
#[derive(Parser, Debug)]
#[command(name = "qdap-server", version, about = "Debug adapter for mqtqasm quantum programs")]
struct Cli {
    /// Listen address
    #[arg(long)]
    host: Option<String>,

    /// Listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Config file path
    #[arg(long, default_value = "~/.qdap/config.toml")]
    config: String,

    /// Milliseconds a request may run before the client gets a failure
    #[arg(long)]
    handler_timeout_ms: Option<u64>,

    /// Maximum concurrent client connections
    #[arg(long)]
    max_connections: Option<usize>,

    /// Serve a single session on stdin/stdout instead of TCP
    #[arg(long)]
    stdio: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so the stdio transport stays clean.
    use tracing_subscriber::EnvFilter;
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting qdap-server");

    let config_path = PathBuf::from(&cli.config);
    let overrides = ConfigOverrides {
        host: cli.host,
        port: cli.port,
        handler_timeout_ms: cli.handler_timeout_ms,
        max_connections: cli.max_connections,
        stdio: cli.stdio,
    };
    let server_config = match ServerConfig::load(Some(&config_path), overrides) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    let stdio = server_config.stdio;
    let engine = TraceEngine::new();
    let server = Arc::new(DapServer::new(server_config, engine.clone()));

    let run = async {
        if stdio {
            server.run_stdio().await
        } else {
            server.clone().run_tcp().await
        }
    };

    tokio::select! {
        result = run => {
            if let Err(e) = result {
                error!(error = %e, "server error");
                std::process::exit(1);
            }
        }
        _ = shutdown_signal() => {
            info!("received shutdown signal");
            server.shutdown();
        }
    }

    info!(
        sessions_opened = engine.created_states(),
        sessions_still_open = engine.live_states(),
        "qdap-server stopped"
    );
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                ctrl_c.await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
