use clap::Parser;
use poe_relay::config::config_search_paths;
use poe_relay::settings_sync::spawn_settings_sync;
use poe_relay::{build_router, AppState, BotConfig, SharedLogger};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "poe-relay",
    about = "Poe server bot that relays conversations to an OpenAI-compatible provider",
    version
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Bot variant: kimi or siliconflow (overrides config)
    #[arg(long)]
    variant: Option<String>,

    /// Diagnostic log file (JSON lines); in-memory only when omitted
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Print config search paths and exit
    #[arg(long)]
    show_config_paths: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "poe_relay=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if cli.show_config_paths {
        println!("Config search paths:");
        for (i, path) in config_search_paths().iter().enumerate() {
            println!("  {}. {}", i + 1, path.display());
        }
        return Ok(());
    }

    let mut config = BotConfig::find_and_load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(variant) = cli.variant {
        config.variant = variant;
    }

    let logger = match cli.log_file {
        Some(ref path) => SharedLogger::new(path)?,
        None => SharedLogger::in_memory(),
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()?;
    let shutdown = CancellationToken::new();

    let state = AppState::from_config(&config, client.clone(), logger.clone(), shutdown.clone())?;

    info!("poe-relay v{}", env!("CARGO_PKG_VERSION"));
    info!("  Bot:       {}", state.identity.name);
    info!("  Variant:   {}", state.variant);
    info!("  Base URL:  {}", state.relay.base_url);
    info!("  Model:     {}", state.relay.model);
    info!("  Port:      {}", config.port);

    // Missing secrets are not fatal; they surface as auth failures per request.
    if state.relay.api_key.is_none() {
        warn!(env = %config.api_key_env()?, "Provider API key not set");
        logger.warn("startup", "Provider API key not set");
    }
    if state.identity.access_key.is_none() {
        if state.identity.allow_without_key {
            warn!("No Poe access key configured, accepting unauthenticated requests");
        } else {
            warn!(env = %config.bot.access_key_env, "Poe access key not set, all requests will be rejected");
        }
    }

    logger.info(
        "startup",
        format!(
            "Starting poe-relay bot={} variant={} port={}",
            state.identity.name, state.variant, config.port
        ),
    );

    if config.bot.sync_settings {
        match state.identity.access_key {
            Some(ref key) => {
                spawn_settings_sync(
                    client,
                    config.bot.settings_base_url.clone(),
                    state.identity.name.clone(),
                    key.clone(),
                    logger.clone(),
                );
            }
            None => warn!("Settings sync requested but no access key is set"),
        }
    }

    let app = build_router(Arc::new(state));
    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutting down, cancelling in-flight relays");
    shutdown.cancel();
}
