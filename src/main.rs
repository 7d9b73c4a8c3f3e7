//! CLI for pubgate
//!
//! Subcommands:
//! - `server`: run the WebSocket and HTTP servers
//! - `issue-token`: print a credential signed with the configured secret

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use pubgate::auth::TokenService;
use pubgate::broker::LocalBroker;
use pubgate::config::{Settings, load_config};
use pubgate::gateway::Gateway;
use pubgate::transport::{AppState, ConnectionLimits, start_http_server, start_websocket_server};
use pubgate::utils::logging;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;
use tracing::{error, info, warn};

/// How long in-flight HTTP requests may run after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "pubgate", version)]
enum Command {
    /// Start the WebSocket and HTTP servers
    Server,
    /// Issue a token for a user
    IssueToken {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        username: String,
        /// Lifetime in seconds (defaults to auth.token_ttl_secs)
        #[arg(long)]
        ttl_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cmd = Command::parse();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            logging::init("info");
            error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    logging::init(&config.log.level);

    let result = match cmd {
        Command::Server => run_server(config).await,
        Command::IssueToken {
            user_id,
            username,
            ttl_secs,
        } => issue_token(&config, &user_id, &username, ttl_secs),
    };

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run_server(config: Settings) -> Result<(), Box<dyn std::error::Error>> {
    if config.auth.uses_default_secret() {
        warn!("auth.secret is the built-in default; set JWT_SECRET before exposing this server");
    }

    let ws_addr = format!("{}:{}", config.server.host, config.server.port);
    let http_addr = format!("{}:{}", config.server.host, config.server.http_port);

    let broker = Arc::new(LocalBroker::new());
    let gateway = Arc::new(Gateway::from_settings(&config, broker.clone()));
    gateway.install(broker.as_ref());

    let state = AppState {
        gateway: gateway.clone(),
    };

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let ws = start_websocket_server(
        &ws_addr,
        broker.clone(),
        gateway,
        ConnectionLimits::from(&config.broker),
    );
    let http = start_http_server(&http_addr, state, async move {
        let _ = shutdown_rx.changed().await;
    });
    tokio::pin!(ws);
    tokio::pin!(http);

    let mut http_done = false;
    tokio::select! {
        res = &mut ws => {
            res?;
            error!("WebSocket server exited unexpectedly.");
        }
        res = &mut http => {
            http_done = true;
            res?;
            error!("HTTP server exited unexpectedly.");
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    let _ = shutdown_tx.send(true);
    broker.shutdown();

    if !http_done {
        match tokio::time::timeout(SHUTDOWN_GRACE, &mut http).await {
            Ok(res) => res?,
            Err(_) => warn!("HTTP requests still in flight after {SHUTDOWN_GRACE:?}; exiting"),
        }
    }
    Ok(())
}

/// Resolves on Ctrl+C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn issue_token(
    config: &Settings,
    user_id: &str,
    username: &str,
    ttl_secs: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let tokens = TokenService::new(
        config.auth.secret.as_bytes(),
        Duration::from_secs(config.auth.token_ttl_secs),
    );
    let ttl = ttl_secs
        .map(Duration::from_secs)
        .unwrap_or(tokens.default_ttl());

    let token = tokens.issue(user_id, username, ttl)?;
    println!("{token}");
    Ok(())
}
