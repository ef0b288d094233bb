use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use acredge_api::SystemClock;
use acredge_connectors::{EnvSecretStore, MemoryDocumentStore};
use acredge_core::{
    AuthorityConfig, DEFAULT_CONFIG_TOML, CONFIG_FILE_NAME, apply_env_overrides,
    default_config_dir, load_config_from_file, validate_config, write_default_config,
};
use acredge_server::app;
use acredge_server::bootstrap::{build_state, spawn_cache_sweeper};
use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "acredge-server", about = "acredge session authority")]
struct Cli {
    /// Config file (default: ~/.config/acredge/acredge.toml when present).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address, overrides config and environment.
    #[arg(long)]
    bind: Option<String>,

    /// Print the default config and exit.
    #[arg(long)]
    print_default_config: bool,

    /// Write the default config to the config dir and exit.
    #[arg(long)]
    init: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();

    let cli = Cli::parse();

    if cli.print_default_config {
        print!("{DEFAULT_CONFIG_TOML}");
        return Ok(());
    }
    if cli.init {
        let path = write_default_config(&default_config_dir())?;
        println!("{}", path.display());
        return Ok(());
    }

    let mut cfg = load_config(cli.config.as_deref())?;
    apply_env_overrides(&mut cfg, |k| std::env::var(k).ok());
    if let Some(bind) = cli.bind {
        cfg.server.bind = bind;
    }
    validate_config(&cfg)?;

    tracing::warn!("using the in-process document store; sessions end with the process");
    let built = build_state(
        &cfg,
        &EnvSecretStore,
        Arc::new(MemoryDocumentStore::new()),
        Arc::new(SystemClock),
    )?;

    let sweeper = spawn_cache_sweeper(
        built.cache.clone(),
        Duration::from_secs(cfg.session.cache_sweep_interval_secs),
    );

    let router = app(built.state, &cfg.server.route_prefix);
    let addr: SocketAddr = cfg
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", cfg.server.bind))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, prefix = %cfg.server.route_prefix, "session authority listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    tracing::info!("session authority stopped");
    Ok(())
}

fn load_config(explicit: Option<&std::path::Path>) -> anyhow::Result<AuthorityConfig> {
    if let Some(path) = explicit {
        return Ok(load_config_from_file(path)?);
    }
    let default_path = default_config_dir().join(CONFIG_FILE_NAME);
    if default_path.exists() {
        return Ok(load_config_from_file(&default_path)?);
    }
    tracing::info!(path = %default_path.display(), "no config file; using defaults");
    Ok(AuthorityConfig::default())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
