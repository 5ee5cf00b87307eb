// SPDX-License-Identifier: Apache-2.0
#![deny(unsafe_code)]
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use trac_config::PlatformConfig;
use trac_gateway::{build_app, build_state};

#[derive(Parser, Debug)]
#[command(name = "trac-gateway", version, about = "TRAC metadata gateway")]
struct Args {
    /// Path to the platform configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bind address; overrides the configuration.
    #[arg(long)]
    bind: Option<String>,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("trac=debug")
    } else {
        EnvFilter::new("trac=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match &args.config {
        Some(path) => trac_config::load_config(path)
            .with_context(|| format!("load config {}", path.display()))?,
        None => PlatformConfig::default(),
    };

    let state = build_state(&config).await.context("initialise services")?;

    let bind = args.bind.unwrap_or_else(|| config.gateway.bind.clone());
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("bind {bind}"))?;
    info!(bind = %bind, "trac-gateway listening");

    axum::serve(listener, app).await.context("serve")
}
