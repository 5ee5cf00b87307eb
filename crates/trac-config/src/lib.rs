// SPDX-License-Identifier: Apache-2.0
//! Configuration loading, validation and secret resolution for the TRAC
//! metadata catalog.
//!
//! This crate provides [`PlatformConfig`] — the platform info block, tenant
//! list, resource catalog and service settings — together with helpers for
//! loading from TOML files, applying environment overrides, and resolving
//! secret references through a [`SecretLoader`]. Secret values never appear
//! in the configuration model and are never serialised back out.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file was not found or unreadable.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },

    /// The file could not be parsed as valid TOML.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },

    /// Semantic validation failed (one or more problems).
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },

    /// A secret reference could not be resolved.
    #[error("secret [{alias}] could not be resolved: {reason}")]
    SecretError {
        /// The secret alias that failed.
        alias: String,
        /// Why resolution failed.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Top-level configuration for the metadata catalog service.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PlatformConfig {
    /// Platform identity block.
    #[serde(default)]
    pub platform_info: PlatformInfoConfig,

    /// Tenants keyed by tenant code.
    #[serde(default)]
    pub tenants: BTreeMap<String, TenantConfig>,

    /// Resources keyed by resource name.
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceConfig>,

    /// Metadata database settings.
    #[serde(default)]
    pub metadata: MetadataStoreConfig,

    /// Gateway settings.
    #[serde(default)]
    pub gateway: GatewayConfig,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            platform_info: PlatformInfoConfig::default(),
            tenants: BTreeMap::new(),
            resources: BTreeMap::new(),
            metadata: MetadataStoreConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

/// Platform identity.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct PlatformInfoConfig {
    /// Environment name, e.g. `"PRODUCTION"` or `"SANDBOX"`.
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Whether this deployment serves production traffic.
    #[serde(default)]
    pub production: bool,

    /// Free-form deployment details reported by `platformInfo`.
    #[serde(default)]
    pub deployment_info: BTreeMap<String, String>,
}

fn default_environment() -> String {
    "SANDBOX".to_string()
}

impl Default for PlatformInfoConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            production: false,
            deployment_info: BTreeMap::new(),
        }
    }
}

/// One tenant.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct TenantConfig {
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
}

/// One platform resource (model repository or storage bucket).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ResourceConfig {
    /// Resource kind, e.g. `"MODEL_REPOSITORY"` or `"INTERNAL_STORAGE"`.
    pub resource_type: String,

    /// Access protocol, e.g. `"git"` or `"s3"`.
    pub protocol: String,

    /// Backend properties; not exposed through public introspection.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,

    /// Properties safe to expose to any client.
    #[serde(default)]
    pub public_properties: BTreeMap<String, String>,

    /// Secret references: property name → secret alias. Values are resolved
    /// through a [`SecretLoader`] at the point of use and never stored.
    #[serde(default)]
    pub secrets: BTreeMap<String, String>,
}

/// Metadata database settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct MetadataStoreConfig {
    /// SQL dialect name; `"sqlite"` is the shipped implementation.
    #[serde(default = "default_dialect")]
    pub dialect: String,

    /// Database file path; `":memory:"` for an in-memory database.
    #[serde(default = "default_database")]
    pub database: String,

    /// Connection pool size.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_dialect() -> String {
    "sqlite".to_string()
}

fn default_database() -> String {
    ".trac/metadata.db".to_string()
}

fn default_pool_size() -> usize {
    4
}

impl Default for MetadataStoreConfig {
    fn default() -> Self {
        Self {
            dialect: default_dialect(),
            database: default_database(),
            pool_size: default_pool_size(),
        }
    }
}

/// Gateway settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Bind address for the HTTP listener.
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:8310".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load a [`PlatformConfig`] from a TOML file.
///
/// Environment variable overrides are applied on top, then the result is
/// validated.
///
/// # Errors
///
/// Returns [`ConfigError`] if the file is missing, unparsable, or fails
/// semantic validation.
pub fn load_config(path: &Path) -> Result<PlatformConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.display().to_string(),
    })?;
    let mut config = parse_toml(&content)?;
    apply_env_overrides(&mut config);
    validate_config(&config)?;
    Ok(config)
}

/// Parse a TOML string into a [`PlatformConfig`].
pub fn parse_toml(content: &str) -> Result<PlatformConfig, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::ParseError {
        reason: e.to_string(),
    })
}

/// Apply environment overrides: `TRAC_GATEWAY_BIND` and `TRAC_METADATA_DB`.
pub fn apply_env_overrides(config: &mut PlatformConfig) {
    if let Ok(bind) = std::env::var("TRAC_GATEWAY_BIND") {
        if !bind.is_empty() {
            config.gateway.bind = bind;
        }
    }
    if let Ok(database) = std::env::var("TRAC_METADATA_DB") {
        if !database.is_empty() {
            config.metadata.database = database;
        }
    }
}

/// Semantic validation, accumulating every problem found.
pub fn validate_config(config: &PlatformConfig) -> Result<(), ConfigError> {
    let mut reasons = Vec::new();

    for code in config.tenants.keys() {
        if code.is_empty() {
            reasons.push("tenant code must not be empty".to_string());
        } else if !code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            reasons.push(format!("tenant code [{code}] must be alphanumeric"));
        }
    }

    for (name, resource) in &config.resources {
        if resource.protocol.is_empty() {
            reasons.push(format!("resource [{name}] has no protocol"));
        }
        match resource.resource_type.as_str() {
            "MODEL_REPOSITORY" | "INTERNAL_STORAGE" => {}
            other => {
                reasons.push(format!(
                    "resource [{name}] has unknown resource type [{other}]"
                ));
            }
        }
        for (prop, alias) in &resource.secrets {
            if alias.is_empty() {
                reasons.push(format!("resource [{name}] secret [{prop}] has no alias"));
            }
        }
    }

    if config.metadata.pool_size == 0 {
        reasons.push("metadata pool size must be at least 1".to_string());
    }
    if config.metadata.dialect != "sqlite" {
        reasons.push(format!(
            "unknown metadata dialect [{}]",
            config.metadata.dialect
        ));
    }

    if reasons.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError { reasons })
    }
}

// ---------------------------------------------------------------------------
// Secrets
// ---------------------------------------------------------------------------

/// Resolves secret aliases to secret material.
///
/// The configuration only ever holds aliases; implementations fetch the
/// material from wherever it lives. The shipped implementation reads
/// environment variables, scoped by an optional root key.
pub trait SecretLoader: Send + Sync {
    /// Fetch the secret for an alias.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::SecretError`] when the alias cannot be
    /// resolved.
    fn load_secret(&self, alias: &str) -> Result<String, ConfigError>;
}

/// Environment-backed secret loader.
///
/// An alias `repo_token` with secret key `TRAC` resolves from the variable
/// `TRAC_SECRET_REPO_TOKEN`.
#[derive(Debug, Clone)]
pub struct EnvSecretLoader {
    secret_key: String,
}

impl EnvSecretLoader {
    /// Create a loader scoped by the given secret key.
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
        }
    }

    fn var_name(&self, alias: &str) -> String {
        format!(
            "{}_SECRET_{}",
            self.secret_key.to_ascii_uppercase(),
            alias.to_ascii_uppercase()
        )
    }
}

impl SecretLoader for EnvSecretLoader {
    fn load_secret(&self, alias: &str) -> Result<String, ConfigError> {
        std::env::var(self.var_name(alias)).map_err(|_| ConfigError::SecretError {
            alias: alias.to_string(),
            reason: format!("environment variable {} is not set", self.var_name(alias)),
        })
    }
}
