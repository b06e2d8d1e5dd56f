//! Strata binary — thin CLI shell over the [`strata_server`] library crate.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{error, info};

use strata_core::{PromotionPolicy, VirtualFs};
use strata_server::http::router;
use strata_server::sandbox::ExprExecutor;
use strata_server::state::{AppContext, ServerConfig};
use strata_server::tools::ToolRegistry;
use strata_server::watch::{HubSink, WatchHub};

/// Multi-tenant tiered virtual filesystem served over JSON-RPC with a
/// change-notification channel.
#[derive(Parser)]
#[command(name = "strata", version, about, long_about = None)]
struct Cli {
    /// Bind address (default: 127.0.0.1)
    #[arg(long)]
    bind: Option<String>,

    /// Listen port (default: 8420)
    #[arg(long)]
    port: Option<u16>,

    /// Tenant root path served by this instance
    #[arg(long)]
    root: Option<String>,

    /// Load configuration from a strata.toml file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Largest object (bytes) placed in the hot tier
    #[arg(long)]
    hot_max_size: Option<u64>,

    /// Largest object (bytes) placed in the warm tier
    #[arg(long)]
    warm_max_size: Option<u64>,

    /// Disable the warm tier
    #[arg(long)]
    no_warm: bool,

    /// Disable the cold tier
    #[arg(long)]
    no_cold: bool,

    /// Promotion policy: none, on-access, or aggressive
    #[arg(long)]
    promotion: Option<String>,

    /// Permit unauthenticated access to read-only tools
    #[arg(long)]
    allow_anonymous_read: bool,

    /// Shared secret for HS256/384/512 token verification
    #[arg(long)]
    jwt_secret: Option<String>,
}

fn load_config(cli: &Cli) -> ServerConfig {
    let mut config = match &cli.config {
        Some(path) => ServerConfig::from_file(path).unwrap_or_else(|e| {
            error!(error = e.as_str(), "failed to load configuration");
            std::process::exit(1);
        }),
        None => {
            let default_path = PathBuf::from("strata.toml");
            if default_path.exists() {
                ServerConfig::from_file(&default_path).unwrap_or_else(|e| {
                    error!(error = e.as_str(), "failed to load configuration");
                    std::process::exit(1);
                })
            } else {
                ServerConfig::default()
            }
        }
    };

    if let Some(ref bind) = cli.bind {
        config.server.bind = bind.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(ref root) = cli.root {
        config.server.root = root.clone();
    }
    if let Some(hot) = cli.hot_max_size {
        config.tiers.hot_max_size = hot;
    }
    if let Some(warm) = cli.warm_max_size {
        config.tiers.warm_max_size = warm;
    }
    if cli.no_warm {
        config.tiers.warm_enabled = false;
    }
    if cli.no_cold {
        config.tiers.cold_enabled = false;
    }
    if let Some(ref promotion) = cli.promotion {
        config.placement.promotion = match promotion.as_str() {
            "none" => PromotionPolicy::None,
            "on-access" => PromotionPolicy::OnAccess,
            "aggressive" => PromotionPolicy::Aggressive,
            other => {
                error!(policy = other, "unknown promotion policy");
                std::process::exit(1);
            }
        };
    }
    if cli.allow_anonymous_read {
        config.auth.allow_anonymous_read = true;
    }
    if let Some(ref secret) = cli.jwt_secret {
        config.auth.jwt_secret = Some(secret.clone());
    }
    config
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received SIGINT, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for Ctrl+C");
        info!("Received Ctrl+C, shutting down...");
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("strata=info".parse().expect("valid directive")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = Arc::new(load_config(&cli));

    let hub = Arc::new(WatchHub::new(
        Duration::from_millis(config.watch.heartbeat_interval_ms),
        Duration::from_millis(config.watch.connection_timeout_ms),
    ));
    let fs = Arc::new(VirtualFs::with_sink(
        config.engine_config(),
        Arc::new(HubSink(Arc::clone(&hub))),
    ));
    let tools = Arc::new(ToolRegistry::new(
        config.auth.allow_anonymous_read,
        config.auth.strict_tools,
        Arc::new(ExprExecutor),
    ));

    let ctx = AppContext {
        fs,
        tools,
        hub,
        config: Arc::clone(&config),
        started: Instant::now(),
    };

    let app = router(ctx);

    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap_or_else(|e| {
        error!(addr = addr.as_str(), error = %e, "could not bind");
        std::process::exit(1);
    });

    info!(
        root = config.server.root.as_str(),
        hot_max = config.tiers.hot_max_size,
        warm_max = config.tiers.warm_max_size,
        "engine ready"
    );
    info!(addr = addr.as_str(), "listening (POST /rpc, GET /watch)");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server terminated abnormally");
}
