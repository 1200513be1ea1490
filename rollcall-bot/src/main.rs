use anyhow::{Context, Result};
use clap::Parser;
use rollcall_core::config::Config;
use rollcall_core::core_link::{HttpIdentityProvider, LinkService, ProviderSettings};
use rollcall_core::core_membership::lifecycle::MembershipLifecycle;
use rollcall_core::core_membership::onboarding::Onboarding;
use rollcall_core::core_membership::storage::MembershipStore;
use rollcall_core::core_sweep::TimeoutSweeper;
use rollcall_core::gateway::http::{HttpGateway, HttpGatewaySettings};
use rollcall_core::gateway::Gateway;
use rollcall_core::http::{AppState, HttpServer};
use rollcall_core::logging::{init_logging, LogLevel};
use rollcall_core::metrics::init_metrics;
use rollcall_core::shutdown::ShutdownCoordinator;
use secrecy::SecretString;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "rollcall")]
#[command(author, version, about = "Membership verification bot", long_about = None)]
struct Args {
    /// Path to a TOML configuration file (environment used otherwise)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::from_env().context("Failed to load config from environment")?,
    };

    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }

    config.validate().context("Invalid configuration")?;

    let log_level = LogLevel::parse(&config.logging.level).unwrap_or_default();
    init_logging(log_level, config.logging.json_format)?;
    init_metrics();

    info!("Starting rollcall...");

    let store = Arc::new(
        MembershipStore::open(&config.store.db_path).context("Failed to open database")?,
    );
    info!("Database ready at {}", config.store.db_path.display());

    let provider = Arc::new(
        HttpIdentityProvider::new(ProviderSettings {
            authorize_url: config.provider.authorize_url.clone(),
            token_url: config.provider.token_url.clone(),
            profile_url: config.provider.profile_url.clone(),
            client_id: config.provider.client_id.clone(),
            client_secret: SecretString::new(config.provider.client_secret.clone()),
            redirect_url: config.provider.redirect_url.clone(),
            scope: config.provider.scope.clone(),
        })
        .context("Failed to build identity provider client")?,
    );

    let gateway: Arc<dyn Gateway> = Arc::new(
        HttpGateway::new(HttpGatewaySettings {
            base_url: config.gateway.base_url.clone(),
            token: SecretString::new(config.gateway.token.clone()),
        })
        .context("Failed to build platform gateway client")?,
    );

    let lifecycle = MembershipLifecycle::new(store.clone());
    let link = Arc::new(LinkService::new(store.clone(), provider));
    let onboarding = Arc::new(Onboarding::new(
        store.clone(),
        lifecycle.clone(),
        gateway.clone(),
        config.http.public_url.clone(),
    ));

    let shutdown = Arc::new(ShutdownCoordinator::new());

    // Timeout sweeper
    let sweeper = Arc::new(TimeoutSweeper::new(store.clone(), lifecycle, gateway.clone()));
    let sweeper_task = tokio::spawn(sweeper.run(shutdown.clone()));
    info!("Timeout sweeper started");

    // Hourly cleanup of stale link states and PKCE material
    let purge_link = link.clone();
    let purge_shutdown = shutdown.clone();
    let purge_task = tokio::spawn(async move {
        let mut rx = purge_shutdown.subscribe();
        let mut ticker = tokio::time::interval(Duration::from_secs(3600));
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = purge_link.purge_expired() {
                        error!(error = %e, "Link state cleanup failed");
                    }
                }
                _ = rx.recv() => return,
            }
        }
    });

    // HTTP surface
    let state = Arc::new(AppState::new(store, link, gateway, onboarding));
    let server = HttpServer::new(state, config.http.bind_address.to_string());
    let server_shutdown = shutdown.clone();
    let server_task = tokio::spawn(async move { server.run(server_shutdown).await });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutting down");
    shutdown.trigger();

    server_task.await??;
    sweeper_task.await?;
    purge_task.await?;

    info!("Goodbye");
    Ok(())
}
