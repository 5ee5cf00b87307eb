// SPDX-License-Identifier: Apache-2.0
#![deny(unsafe_code)]
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use trac_config::{EnvSecretLoader, PlatformConfig, SecretLoader};

mod tasks;

/// Exit code for runtime errors.
const EXIT_RUNTIME_ERROR: i32 = 1;

#[derive(Parser, Debug)]
#[command(
    name = "trac-svc",
    version,
    about = "TRAC metadata catalog service launcher"
)]
struct Cli {
    /// Path to the platform configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Root key for the secret store. Falls back to the SECRET_KEY
    /// environment variable.
    #[arg(long)]
    secret_key: Option<String>,

    /// Run a named task instead of the service: --task NAME [ARGS]...
    #[arg(long, num_args = 1.., value_name = "NAME")]
    task: Option<Vec<String>>,

    /// List available tasks and exit.
    #[arg(long)]
    task_list: bool,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("trac=debug")
    } else {
        EnvFilter::new("trac=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if cli.task_list {
        tasks::print_task_list();
        return;
    }

    if let Err(e) = run(cli).await {
        eprintln!("trac-svc: {e:#}");
        std::process::exit(EXIT_RUNTIME_ERROR);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => trac_config::load_config(path)
            .with_context(|| format!("load config {}", path.display()))?,
        None => PlatformConfig::default(),
    };

    let secret_key = cli
        .secret_key
        .or_else(|| std::env::var("SECRET_KEY").ok().filter(|v| !v.is_empty()));
    check_secrets(&config, secret_key.as_deref())?;

    match &cli.task {
        Some(task) => {
            let (name, args) = task
                .split_first()
                .expect("clap guarantees at least one task value");
            tasks::run_task(name, args, &config).await
        }
        None => tasks::run_task("run-gateway", &[], &config).await,
    }
}

/// With a secret key, every secret alias in the resource catalog must
/// resolve before the service starts; without one, resources declaring
/// secrets are a configuration error.
fn check_secrets(config: &PlatformConfig, secret_key: Option<&str>) -> Result<()> {
    let aliases: Vec<(&String, &String)> = config
        .resources
        .iter()
        .flat_map(|(name, resource)| resource.secrets.values().map(move |alias| (name, alias)))
        .collect();

    if aliases.is_empty() {
        return Ok(());
    }

    let Some(key) = secret_key else {
        anyhow::bail!(
            "configuration references secrets but no secret key was given \
             (use --secret-key or SECRET_KEY)"
        );
    };

    let loader = EnvSecretLoader::new(key);
    for (resource, alias) in aliases {
        loader
            .load_secret(alias)
            .with_context(|| format!("resource [{resource}]"))?;
    }
    Ok(())
}
