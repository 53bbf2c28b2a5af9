//! Runtime settings read from the environment (and `.env`).

use std::time::Duration;

use tracing::warn;

use crate::realm::client::DEFAULT_BASE_URL;
use crate::realm::lister::SUBREALM_PAGE_SIZE;
use crate::realm::{IngestOptions, Isolation};
use crate::util::env::{env_opt, env_parse};

/// Indexer access and pipeline behaviour.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub api_base_url: String,
    pub api_timeout_secs: u64,
    pub page_size: usize,
    pub isolation: Isolation,
}

impl IngestSettings {
    pub fn from_env() -> Self {
        Self {
            api_base_url: env_opt("REALM_API_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.into()),
            api_timeout_secs: env_parse("REALM_API_TIMEOUT_SECS", 15u64).max(1),
            page_size: env_parse("REALM_PAGE_SIZE", SUBREALM_PAGE_SIZE).max(1),
            isolation: isolation_or_default(env_opt("REALM_ISOLATION").as_deref()),
        }
    }

    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            page_size: self.page_size,
            isolation: self.isolation,
        }
    }
}

fn isolation_or_default(raw: Option<&str>) -> Isolation {
    match raw.map(str::parse::<Isolation>) {
        Some(Ok(isolation)) => isolation,
        Some(Err(e)) => {
            warn!(error = %e, "invalid REALM_ISOLATION; using per-entry isolation");
            Isolation::PerEntry
        }
        None => Isolation::PerEntry,
    }
}

/// Queue consumer loop.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub worker_id: String,
    pub batch_size: i64,
    pub poll_interval: Duration,
    pub error_backoff: Duration,
    pub max_connections: u32,
}

impl WorkerSettings {
    pub fn from_env() -> Self {
        Self {
            worker_id: env_opt("WORKER_ID")
                .unwrap_or_else(|| format!("pid-{}", std::process::id())),
            batch_size: env_parse("WORKER_BATCH_SIZE", 10i64).max(1),
            poll_interval: Duration::from_secs(env_parse("WORKER_POLL_INTERVAL_SECS", 2u64)),
            error_backoff: Duration::from_secs(env_parse("WORKER_ERROR_BACKOFF_SECS", 5u64)),
            max_connections: env_parse("DB_MAX_CONNECTIONS", 5u32).max(1),
        }
    }
}

/// Keys echoed (redacted) in the startup preflight snapshot.
pub const LOGGED_KEYS: &[&str] = &[
    "DATABASE_URL",
    "SUPABASE_DB_URL",
    "REALM_API_BASE_URL",
    "REALM_PAGE_SIZE",
    "REALM_ISOLATION",
    "WORKER_ID",
    "WORKER_BATCH_SIZE",
    "AUTO_MIGRATE",
];
