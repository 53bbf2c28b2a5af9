use anyhow::{Context, Result};
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions, PgSslMode},
    PgPool, Row,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

use crate::util::env::env_flag;

pub const MIGRATIONS_DIR: &str = "./migrations";

#[derive(Clone)]
pub struct Db {
    pub pool: PgPool,
}

impl Db {
    // SECURITY: never include raw DSNs in tracing spans (they may contain credentials).
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let mut connect_options = PgConnectOptions::from_str(database_url)?;

        if database_url.contains("sslmode=require") {
            connect_options = connect_options.ssl_mode(PgSslMode::Require);
        }

        // PgBouncer transaction mode cannot hold prepared statements.
        if !env_flag("USE_PREPARED", false) {
            connect_options = connect_options.statement_cache_capacity(0);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .connect_with(connect_options)
            .await
            .context("failed to connect to database")?;
        info!("connected to db");

        if env_flag("AUTO_MIGRATE", false) {
            info!("running migrations (AUTO_MIGRATE=on)");
            run_migrations(&pool, Path::new(MIGRATIONS_DIR)).await?;
        } else {
            info!("AUTO_MIGRATE disabled; skipping migrations");
        }
        Ok(Self { pool })
    }
}

/// `NNNN_description.sql` files in version order; anything else is ignored.
fn migration_files(dir: &Path) -> Result<Vec<(i64, String, PathBuf)>> {
    let mut candidates = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(fname) = path.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        if let Some(parsed) = parse_migration_name(fname) {
            candidates.push((parsed.0, parsed.1, path));
        }
    }
    candidates.sort_by_key(|(v, _, _)| *v);
    Ok(candidates)
}

fn parse_migration_name(fname: &str) -> Option<(i64, String)> {
    let stem = fname.strip_suffix(".sql")?;
    let (num, desc) = stem.split_once('_')?;
    if num.is_empty() || !num.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some((num.parse().ok()?, desc.to_string()))
}

/// Lightweight migration runner; applied versions are tracked in `_realm_migrations`.
pub async fn run_migrations(pool: &PgPool, dir: &Path) -> Result<usize> {
    if !dir.exists() {
        anyhow::bail!("migrations directory not found: {:?}", dir);
    }

    // raw_sql avoids prepared statements under PgBouncer
    sqlx::raw_sql(
        "CREATE TABLE IF NOT EXISTS _realm_migrations (
            version BIGINT PRIMARY KEY,
            description TEXT,
            installed_at TIMESTAMPTZ DEFAULT now()
         )",
    )
    .execute(pool)
    .await?;

    let applied_rows = sqlx::raw_sql("SELECT version FROM _realm_migrations")
        .fetch_all(pool)
        .await?;
    let mut applied: HashSet<i64> = HashSet::new();
    for r in applied_rows {
        applied.insert(r.try_get::<i64, _>(0)?);
    }

    let mut count = 0;
    for (version, desc, path) in migration_files(dir)? {
        if applied.contains(&version) {
            continue;
        }
        let sql = std::fs::read_to_string(&path)?;
        info!(version, file = ?path, "applying migration");

        let mut tx = pool.begin().await?;
        sqlx::raw_sql(&sql)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("migration {version} ({desc}) failed"))?;
        sqlx::query("INSERT INTO _realm_migrations (version, description) VALUES ($1, $2)")
            .bind(version)
            .bind(&desc)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        count += 1;
    }
    info!(applied = count, "migrations up to date");
    Ok(count)
}
