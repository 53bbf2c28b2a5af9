use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use realm_indexer::config::{IngestSettings, WorkerSettings, LOGGED_KEYS};
use realm_indexer::realm::{PgRealmStore, ProxyClient, RealmIngestor};
use realm_indexer::util::db::Db;
use realm_indexer::util::env as env_util;
use realm_indexer::{consume_batch, RealmQueue};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    env_util::init_env();
    realm_indexer::tracing::init_tracing(realm_indexer::tracing::DEFAULT_FILTER)?;
    env_util::preflight_check("realm-worker", &[], LOGGED_KEYS).ok();

    let worker = WorkerSettings::from_env();
    let ingest = IngestSettings::from_env();

    let db = Db::connect(&env_util::db_url()?, worker.max_connections).await?;
    let api = ProxyClient::new(Some(&ingest.api_base_url), Some(ingest.api_timeout_secs))
        .context("failed to build indexer client")?;
    let ingestor = RealmIngestor::new(
        Arc::new(api),
        Arc::new(PgRealmStore::new(db.pool.clone())),
        ingest.ingest_options(),
    );
    let queue = RealmQueue::new(db.pool.clone());

    info!(
        worker_id = %worker.worker_id,
        batch = worker.batch_size,
        poll_secs = worker.poll_interval.as_secs(),
        isolation = %ingest.isolation,
        "realm worker started"
    );

    let mut ticker = interval(worker.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        // Drain until the queue is empty, then idle on the ticker.
        loop {
            let batch = match queue.claim_batch(&worker.worker_id, worker.batch_size).await {
                Ok(batch) => batch,
                Err(e) => {
                    error!(error = %e, "error claiming messages; backing off");
                    tokio::time::sleep(worker.error_backoff).await;
                    break;
                }
            };
            if batch.is_empty() {
                break;
            }

            for queue_id in consume_batch(&ingestor, &batch).await {
                if let Err(e) = queue.ack(queue_id).await {
                    error!(queue_id, error = %e, "failed to ack message");
                }
            }
            info!(count = batch.len(), "batch done");
        }

        tokio::select! {
            _ = &mut shutdown => {
                info!(worker_id = %worker.worker_id, "shutdown requested");
                return Ok(());
            }
            _ = ticker.tick() => {
                debug!(worker_id = %worker.worker_id, "idle tick");
            }
        }
    }
}
