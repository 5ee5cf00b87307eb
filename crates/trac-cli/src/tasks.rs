// SPDX-License-Identifier: Apache-2.0
//! Admin tasks runnable through `--task`.

use anyhow::{Context, Result, bail};
use trac_config::PlatformConfig;
use trac_store::MetadataStore;

/// Registered tasks: name and one-line description.
pub const TASKS: &[(&str, &str)] = &[
    (
        "run-gateway",
        "Start the metadata gateway (the default when no task is given)",
    ),
    ("init-schema", "Create the metadata database schema"),
    (
        "add-tenant",
        "Register a tenant: add-tenant CODE [DESCRIPTION]",
    ),
    ("list-tenants", "List registered tenants"),
];

/// Print the task list to stdout.
pub fn print_task_list() {
    println!("Available tasks:");
    for (name, description) in TASKS {
        println!("  {name:<14} {description}");
    }
}

/// Run one named task.
///
/// # Errors
///
/// Returns an error for unknown task names, bad task arguments, or any
/// failure in the task itself.
pub async fn run_task(name: &str, args: &[String], config: &PlatformConfig) -> Result<()> {
    match name {
        "run-gateway" => run_gateway(config).await,
        "init-schema" => init_schema(config),
        "add-tenant" => add_tenant(args, config).await,
        "list-tenants" => list_tenants(config).await,
        other => bail!("unknown task [{other}], use --task-list to see available tasks"),
    }
}

fn open_store(config: &PlatformConfig) -> Result<MetadataStore> {
    MetadataStore::open(&config.metadata.database, config.metadata.pool_size)
        .context("open the metadata store")
}

async fn run_gateway(config: &PlatformConfig) -> Result<()> {
    let state = trac_gateway::build_state(config)
        .await
        .context("initialise services")?;
    let app = trac_gateway::build_app(state);

    let bind = config.gateway.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("bind {bind}"))?;
    tracing::info!(bind = %bind, "trac metadata gateway listening");

    axum::serve(listener, app).await.context("serve")
}

fn init_schema(config: &PlatformConfig) -> Result<()> {
    // Opening the store deploys the schema.
    let store = open_store(config)?;
    println!(
        "schema deployed to [{}] ({} dialect)",
        config.metadata.database,
        store.dialect_name()
    );
    Ok(())
}

async fn add_tenant(args: &[String], config: &PlatformConfig) -> Result<()> {
    let Some(code) = args.first() else {
        bail!("add-tenant requires a tenant code");
    };
    let description = args.get(1).cloned().unwrap_or_default();

    let store = open_store(config)?;
    store.create_tenant(code.as_str(), description.as_str()).await?;
    println!("tenant [{code}] registered");
    Ok(())
}

async fn list_tenants(config: &PlatformConfig) -> Result<()> {
    let store = open_store(config)?;
    let tenants = store.list_tenants().await?;
    if tenants.is_empty() {
        println!("no tenants registered");
    }
    for tenant in tenants {
        println!("{:<12} {}", tenant.tenant_code, tenant.description);
    }
    Ok(())
}
