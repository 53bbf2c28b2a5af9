use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use realm_indexer::config::{IngestSettings, LOGGED_KEYS};
use realm_indexer::realm::enrich::fetch_record;
use realm_indexer::realm::{
    AddressResolver, MemoryRealmStore, PgRealmStore, ProxyClient, RealmIngestor,
};
use realm_indexer::util::db::{run_migrations, Db, MIGRATIONS_DIR};
use realm_indexer::util::env as env_util;
use realm_indexer::RealmQueue;

#[derive(Parser, Debug)]
#[command(name = "realm-indexer", version, about = "Realm indexer admin CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Queue a parent realm for subrealm ingestion
    Enqueue {
        /// Atomical id of the parent realm
        #[arg(long)]
        id: String,
        /// Dotted name of the parent realm (omit for a root-level trigger)
        #[arg(long)]
        realm: Option<String>,
    },
    /// Run the ingestion pipeline for one parent inline, bypassing the queue
    Sync {
        #[arg(long)]
        id: String,
        #[arg(long)]
        realm: Option<String>,
        /// Keep results in memory and print them instead of writing to Postgres
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Fetch and normalize a single atomical, printing the record as JSON
    Lookup {
        #[arg(long)]
        id: String,
    },
    /// Decode a hex output script into a mainnet address
    Resolve { script_hex: String },
    /// Apply pending SQL migrations
    Migrate {
        #[arg(long, default_value = MIGRATIONS_DIR)]
        dir: PathBuf,
    },
    /// Print per-status message counts
    QueueStats,
    /// Re-queue messages stuck in `running` longer than the given minutes
    RequeueStale {
        #[arg(long, default_value_t = 30)]
        minutes: i64,
    },
}

fn client(settings: &IngestSettings) -> Result<ProxyClient> {
    ProxyClient::new(Some(&settings.api_base_url), Some(settings.api_timeout_secs))
        .context("failed to build indexer client")
}

async fn connect() -> Result<Db> {
    let max = env_util::env_parse("DB_MAX_CONNECTIONS", 5u32).max(1);
    Db::connect(&env_util::db_url()?, max).await
}

#[tokio::main]
async fn main() -> Result<()> {
    env_util::init_env();
    realm_indexer::tracing::init_tracing(realm_indexer::tracing::DEFAULT_FILTER)?;
    let cli = Cli::parse();
    let settings = IngestSettings::from_env();

    match cli.command {
        Commands::Enqueue { id, realm } => {
            let db = connect().await?;
            let queue_id = RealmQueue::new(db.pool)
                .enqueue(realm.as_deref(), &id)
                .await?;
            println!("Enqueued: {queue_id}");
        }
        Commands::Sync { id, realm, dry_run } => {
            env_util::preflight_check("realm-sync", &[], LOGGED_KEYS).ok();
            let api = Arc::new(client(&settings)?);
            if dry_run {
                let store = Arc::new(MemoryRealmStore::new());
                let ingestor =
                    RealmIngestor::new(api, store.clone(), settings.ingest_options());
                let summary = ingestor.ingest(realm.as_deref(), &id).await;
                for row in store.snapshot() {
                    println!("{}", serde_json::to_string(&row)?);
                }
                info!(?summary, "dry run finished");
            } else {
                let db = connect().await?;
                let store = PgRealmStore::new(db.pool.clone());
                let before = store.count().await?;
                let ingestor =
                    RealmIngestor::new(api, Arc::new(store.clone()), settings.ingest_options());
                let summary = ingestor.ingest(realm.as_deref(), &id).await;
                let after = store.count().await?;
                println!(
                    "pages={} listed={} persisted={} dropped={} failed={} aborted={} new_rows={}",
                    summary.pages,
                    summary.listed,
                    summary.persisted,
                    summary.dropped,
                    summary.failed,
                    summary.aborted,
                    after - before
                );
            }
        }
        Commands::Lookup { id } => {
            let api = client(&settings)?;
            match fetch_record(&api, &AddressResolver::mainnet(), &id).await {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => {
                    println!("no realm record for {id}");
                }
            }
        }
        Commands::Resolve { script_hex } => {
            match AddressResolver::mainnet().resolve(Some(&script_hex))? {
                Some(address) => println!("{address}"),
                None => println!("(empty script)"),
            }
        }
        Commands::Migrate { dir } => {
            let url = env_util::db_url()?;
            let db = Db::connect(&url, 1).await?;
            let applied = run_migrations(&db.pool, &dir).await?;
            println!("applied {applied} migration(s)");
        }
        Commands::QueueStats => {
            let db = connect().await?;
            let stats = RealmQueue::new(db.pool).stats().await?;
            println!(
                "queued={} running={} done={}",
                stats.queued, stats.running, stats.done
            );
        }
        Commands::RequeueStale { minutes } => {
            let db = connect().await?;
            let n = RealmQueue::new(db.pool).requeue_stale(minutes).await?;
            println!("requeued {n} message(s)");
        }
    }
    Ok(())
}
