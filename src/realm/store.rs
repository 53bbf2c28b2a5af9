use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::{PgPool, Row};
use tracing::{debug, error};

use crate::error::StorageResult;
use crate::realm::model::RealmRecord;

/// Which branch of the upsert a write took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// A persisted realm row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredRealm {
    pub name: String,
    #[serde(flatten)]
    pub record: RealmRecord,
}

/// Persistence for realm records keyed by their fully-qualified dotted name.
///
/// `upsert` must insert every column when `name` is new and otherwise touch
/// only `owner_address` and `profile_id`, as a single conflict-safe write.
#[async_trait]
pub trait RealmStore: Send + Sync {
    async fn upsert(&self, name: &str, record: &RealmRecord) -> StorageResult<UpsertOutcome>;

    async fn get(&self, name: &str) -> StorageResult<Option<StoredRealm>>;

    async fn exists(&self, name: &str) -> StorageResult<bool> {
        Ok(self.get(name).await?.is_some())
    }
}

/// Upsert and report success as a flag; storage errors are logged, never raised.
pub async fn persist(store: &dyn RealmStore, name: &str, record: &RealmRecord) -> bool {
    match store.upsert(name, record).await {
        Ok(outcome) => {
            debug!(realm = name, ?outcome, "realm persisted");
            true
        }
        Err(e) => {
            error!(realm = name, error = %e, "error saving realm");
            false
        }
    }
}

// -----------------------------------------------------------------------------
// Postgres
// -----------------------------------------------------------------------------

const UPSERT_SQL: &str = "INSERT INTO realms \
        (realm_name, realm_id, realm_number, realm_minter, realm_owner, profile_id) \
     VALUES ($1, $2, $3, $4, $5, $6) \
     ON CONFLICT (realm_name) DO UPDATE SET \
        realm_owner = EXCLUDED.realm_owner, \
        profile_id = EXCLUDED.profile_id, \
        updated_at = now() \
     RETURNING (xmax = 0) AS inserted";

const SELECT_SQL: &str = "SELECT realm_name, realm_id, realm_number, realm_minter, realm_owner, profile_id \
     FROM realms WHERE realm_name = $1 LIMIT 1";

/// `realms` table store. The primary key on `realm_name` arbitrates
/// concurrent writers; `xmax = 0` distinguishes a fresh insert from a
/// conflict update.
#[derive(Clone)]
pub struct PgRealmStore {
    pool: PgPool,
}

impl PgRealmStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn count(&self) -> StorageResult<i64> {
        let n: i64 = sqlx::query_scalar("SELECT count(*) FROM realms")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

#[async_trait]
impl RealmStore for PgRealmStore {
    async fn upsert(&self, name: &str, record: &RealmRecord) -> StorageResult<UpsertOutcome> {
        let inserted: bool = sqlx::query_scalar(UPSERT_SQL)
            .bind(name)
            .bind(&record.record_id)
            .bind(record.ordinal_number)
            .bind(record.minter_address.as_deref())
            .bind(record.owner_address.as_deref())
            .bind(record.profile_id.as_deref())
            .fetch_one(&self.pool)
            .await?;
        Ok(if inserted {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Updated
        })
    }

    async fn get(&self, name: &str) -> StorageResult<Option<StoredRealm>> {
        let row = sqlx::query(SELECT_SQL)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(StoredRealm {
            name: row.try_get("realm_name")?,
            record: RealmRecord {
                record_id: row.try_get("realm_id")?,
                ordinal_number: row.try_get("realm_number")?,
                minter_address: row.try_get("realm_minter")?,
                owner_address: row.try_get("realm_owner")?,
                profile_id: row.try_get("profile_id")?,
            },
        }))
    }
}

// -----------------------------------------------------------------------------
// In-memory
// -----------------------------------------------------------------------------

/// Process-local store with the same write-once/refreshable column rules as
/// the `realms` table. Backs `sync --dry-run`.
#[derive(Debug, Default)]
pub struct MemoryRealmStore {
    rows: Mutex<BTreeMap<String, RealmRecord>>,
}

impl MemoryRealmStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<StoredRealm> {
        let rows = self.rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        rows.iter()
            .map(|(name, record)| StoredRealm {
                name: name.clone(),
                record: record.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl RealmStore for MemoryRealmStore {
    async fn upsert(&self, name: &str, record: &RealmRecord) -> StorageResult<UpsertOutcome> {
        let mut rows = self.rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match rows.get_mut(name) {
            Some(existing) => {
                existing.owner_address = record.owner_address.clone();
                existing.profile_id = record.profile_id.clone();
                Ok(UpsertOutcome::Updated)
            }
            None => {
                rows.insert(name.to_string(), record.clone());
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    async fn get(&self, name: &str) -> StorageResult<Option<StoredRealm>> {
        let rows = self.rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(rows.get(name).map(|record| StoredRealm {
            name: name.to_string(),
            record: record.clone(),
        }))
    }
}
