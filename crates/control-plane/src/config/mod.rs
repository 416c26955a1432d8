// Server configuration loaded from environment variables.
// Decision: Every setting has a default so the server boots with an empty environment
// Decision: Enrichment is optional; without it the worker has no default handler

mod enrichment;

pub use enrichment::{EnrichmentConfig, TagSink, UpsertSink};

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use noscope_durable::{PollerConfig, WorkerPoolConfig};

/// Default HTTP listen address
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8181";

/// Complete server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP listen address
    pub bind_addr: String,
    /// Optional route prefix, e.g. "/api"
    pub api_prefix: String,
    /// Allowed CORS origins; CORS disabled when empty
    pub cors_origins: Vec<String>,
    /// PostgreSQL store when set, in-memory store otherwise
    pub database_url: Option<String>,
    /// Start the worker pool at boot
    pub autostart: bool,
    pub worker: WorkerPoolConfig,
    pub enrichment: Option<EnrichmentConfig>,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let api_prefix = get("API_PREFIX").unwrap_or_default();
        let cors_origins = get("CORS_ALLOWED_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let poller = PollerConfig::new()
            .with_min_interval(Duration::from_millis(parse_or(
                &get,
                "WORKER_IDLE_INTERVAL_MS",
                1000u64,
            )?))
            .with_max_interval(Duration::from_millis(parse_or(
                &get,
                "WORKER_MAX_IDLE_INTERVAL_MS",
                10_000u64,
            )?));

        let mut worker = WorkerPoolConfig::new()
            .with_max_concurrency(parse_or(&get, "WORKER_MAX_CONCURRENCY", 4usize)?)
            .with_poller(poller)
            .with_execution_timeout(Duration::from_secs(parse_or(
                &get,
                "WORKER_EXECUTION_TIMEOUT_SECS",
                30u64,
            )?))
            .with_shutdown_timeout(Duration::from_secs(parse_or(
                &get,
                "WORKER_SHUTDOWN_TIMEOUT_SECS",
                30u64,
            )?));
        if let Some(id) = get("WORKER_ID") {
            worker = worker.with_worker_id(id);
        }
        if let Some(max) = parse_opt::<u32>(&get, "WORKER_MAX_CONSECUTIVE_FAILURES")? {
            worker = worker.with_max_consecutive_failures(max);
        }

        Ok(Self {
            bind_addr,
            api_prefix,
            cors_origins,
            database_url: get("DATABASE_URL"),
            autostart: parse_bool(&get, "WORKER_AUTOSTART", true)?,
            worker,
            enrichment: EnrichmentConfig::from_lookup(&get),
        })
    }
}

fn parse_opt<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    get(key)
        .map(|raw| {
            raw.parse::<T>()
                .with_context(|| format!("invalid value for {key}: {raw:?}"))
        })
        .transpose()
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    Ok(parse_opt(get, key)?.unwrap_or(default))
}

fn parse_bool(get: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> Result<bool> {
    match get(key).map(|v| v.to_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(v) => anyhow::bail!("invalid value for {key}: {v:?}"),
    }
}
