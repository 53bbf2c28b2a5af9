//! Realm indexer: pulls realm/subrealm records from an Atomicals ElectrumX
//! proxy and keeps a Postgres `realms` table in sync, driven by queue messages.

pub mod config;
pub mod error;
pub mod queue;
pub mod realm;
pub mod tracing;

pub mod util {
    pub mod db;
    pub mod env;
}

pub use config::{IngestSettings, WorkerSettings};
pub use queue::{consume_batch, QueuedMessage, RealmQueue};
pub use realm::{RealmIngestor, RealmMessage};
