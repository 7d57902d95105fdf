use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use viewproxy::{router, AppState, Config};

/// HTML-rewriting forward proxy
#[derive(Parser, Debug)]
#[command(name = "viewproxy", version, about)]
struct Args {
    /// Address to bind to (":8080" binds every interface)
    #[arg(long)]
    bind: Option<String>,

    /// Optional TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Give up on an upstream after this many seconds (default: never)
    #[arg(long)]
    upstream_timeout: Option<u64>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(bind) = &args.bind {
        config.bind = bind.clone();
    }
    if let Some(secs) = args.upstream_timeout {
        config.upstream_timeout_secs = Some(secs);
    }
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }
    Ok(config)
}

fn init_logging(level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("viewproxy={},tower_http={},warn", level, level))
    });
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutting down");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    init_logging(&config.log_level);

    let addr = config.bind_addr()?;
    if let Some(limit) = config.upstream_timeout() {
        info!("Upstream timeout: {:?}", limit);
    }

    let app = router(AppState::new(config));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;

    info!("Listening on {}...", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
