use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;

use futures::FutureExt;
use tracing::{error, warn};

use crate::realm::address::AddressResolver;
use crate::realm::client::IndexerApi;
use crate::realm::enrich::fetch_record;
use crate::realm::model::{combined_name, SubrealmListing};
use crate::realm::store::{persist, RealmStore};

/// How far an unexpected failure (a panic while enriching or saving one
/// listing) reaches.
///
/// Expected failures (no data, undecodable script, storage error) only ever
/// drop the one listing, whatever the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Isolation {
    /// Drop the failing listing and carry on with the rest of the page.
    #[default]
    PerEntry,
    /// Drop the failing listing and the remainder of its page.
    PerPage,
}

impl FromStr for Isolation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "entry" | "per-entry" | "record" => Ok(Self::PerEntry),
            "page" | "per-page" => Ok(Self::PerPage),
            other => Err(anyhow::anyhow!("unknown isolation policy: {other}")),
        }
    }
}

impl fmt::Display for Isolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PerEntry => "entry",
            Self::PerPage => "page",
        })
    }
}

/// Tally for one processed page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageOutcome {
    pub attempted: usize,
    pub persisted: usize,
    /// No record (filtered, fetch failed, or bad listing) or the save failed.
    pub dropped: usize,
    /// Entries that panicked.
    pub failed: usize,
    /// Entries never attempted because a page-level abort cut them off.
    pub skipped: usize,
}

enum EntryOutcome {
    Persisted,
    Dropped,
}

/// Enriches and saves every listing of a page, in order.
pub struct BatchProcessor<'a> {
    api: &'a dyn IndexerApi,
    store: &'a dyn RealmStore,
    resolver: &'a AddressResolver,
    isolation: Isolation,
}

impl<'a> BatchProcessor<'a> {
    pub fn new(
        api: &'a dyn IndexerApi,
        store: &'a dyn RealmStore,
        resolver: &'a AddressResolver,
        isolation: Isolation,
    ) -> Self {
        Self {
            api,
            store,
            resolver,
            isolation,
        }
    }

    pub async fn process_page(
        &self,
        parent_name: Option<&str>,
        listings: &[SubrealmListing],
    ) -> PageOutcome {
        let mut outcome = PageOutcome::default();

        for (idx, listing) in listings.iter().enumerate() {
            outcome.attempted += 1;
            let entry = AssertUnwindSafe(self.process_entry(parent_name, listing))
                .catch_unwind()
                .await;

            match entry {
                Ok(EntryOutcome::Persisted) => outcome.persisted += 1,
                Ok(EntryOutcome::Dropped) => outcome.dropped += 1,
                Err(panic) => {
                    outcome.failed += 1;
                    error!(
                        parent = parent_name.unwrap_or_default(),
                        subrealm = %listing.subrealm,
                        record_id = %listing.record_id,
                        panic = panic_message(panic.as_ref()),
                        isolation = %self.isolation,
                        "error processing realms"
                    );
                    if self.isolation == Isolation::PerPage {
                        outcome.skipped = listings.len() - idx - 1;
                        break;
                    }
                }
            }
        }

        outcome
    }

    async fn process_entry(
        &self,
        parent_name: Option<&str>,
        listing: &SubrealmListing,
    ) -> EntryOutcome {
        if listing.subrealm.is_empty() || listing.record_id.is_empty() {
            warn!(?listing, "listing without subrealm name or atomical id");
            return EntryOutcome::Dropped;
        }

        let name = combined_name(parent_name, &listing.subrealm);
        let Some(record) = fetch_record(self.api, self.resolver, &listing.record_id).await else {
            return EntryOutcome::Dropped;
        };

        if persist(self.store, &name, &record).await {
            EntryOutcome::Persisted
        } else {
            EntryOutcome::Dropped
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    use crate::error::{StorageError, StorageResult};
    use crate::realm::model::RealmRecord;
    use crate::realm::store::{MemoryRealmStore, StoredRealm, UpsertOutcome};
    use crate::realm::testing::{listing, realm_state, ScriptedIndexer};

    /// Memory store whose writes to one name always fail.
    struct RejectingStore {
        reject: &'static str,
        inner: MemoryRealmStore,
    }

    #[async_trait]
    impl RealmStore for RejectingStore {
        async fn upsert(&self, name: &str, record: &RealmRecord) -> StorageResult<UpsertOutcome> {
            if name == self.reject {
                return Err(StorageError::Database(sqlx::Error::PoolTimedOut));
            }
            self.inner.upsert(name, record).await
        }

        async fn get(&self, name: &str) -> StorageResult<Option<StoredRealm>> {
            self.inner.get(name).await
        }
    }

    fn three_listings() -> Vec<SubrealmListing> {
        vec![listing("one", "id-1"), listing("two", "id-2"), listing("three", "id-3")]
    }

    fn indexer_with_failing_second() -> ScriptedIndexer {
        ScriptedIndexer::default()
            .with_state("id-1", realm_state(1))
            .with_state_panic("id-2")
            .with_state("id-3", realm_state(3))
    }

    #[tokio::test]
    async fn persists_under_dotted_names() {
        let api = ScriptedIndexer::default()
            .with_state("id-1", realm_state(1))
            .with_state("id-2", realm_state(2));
        let store = MemoryRealmStore::new();
        let resolver = AddressResolver::mainnet();
        let processor = BatchProcessor::new(&api, &store, &resolver, Isolation::PerEntry);

        let outcome = processor
            .process_page(Some("parent"), &[listing("one", "id-1"), listing("two", "id-2")])
            .await;

        assert_eq!(outcome.persisted, 2);
        let names: Vec<_> = store.snapshot().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["parent.one", "parent.two"]);
    }

    #[tokio::test]
    async fn missing_records_are_dropped_individually() {
        let api = ScriptedIndexer::default()
            .with_state_error("id-1", "success flag missing or false")
            .with_state("id-3", realm_state(3));
        let store = MemoryRealmStore::new();
        let resolver = AddressResolver::mainnet();
        let processor = BatchProcessor::new(&api, &store, &resolver, Isolation::PerPage);

        let outcome = processor.process_page(Some("p"), &three_listings()).await;

        // Expected failures never trigger the page-level abort.
        assert_eq!(outcome.attempted, 3);
        assert_eq!(outcome.dropped, 2);
        assert_eq!(outcome.persisted, 1);
        assert_eq!(outcome.skipped, 0);
        assert!(store.exists("p.three").await.unwrap());
    }

    #[tokio::test]
    async fn per_entry_isolation_still_attempts_the_third_listing() {
        let api = indexer_with_failing_second();
        let store = MemoryRealmStore::new();
        let resolver = AddressResolver::mainnet();
        let processor = BatchProcessor::new(&api, &store, &resolver, Isolation::PerEntry);

        let outcome = processor.process_page(Some("p"), &three_listings()).await;

        assert_eq!(api.state_lookups(), vec!["id-1", "id-2", "id-3"]);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.persisted, 2);
        assert!(store.exists("p.one").await.unwrap());
        assert!(store.exists("p.three").await.unwrap());
    }

    #[tokio::test]
    async fn per_page_isolation_skips_the_rest_of_the_page() {
        let api = indexer_with_failing_second();
        let store = MemoryRealmStore::new();
        let resolver = AddressResolver::mainnet();
        let processor = BatchProcessor::new(&api, &store, &resolver, Isolation::PerPage);

        let outcome = processor.process_page(Some("p"), &three_listings()).await;

        assert_eq!(api.state_lookups(), vec!["id-1", "id-2"]);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.persisted, 1);
        assert_eq!(outcome.skipped, 1);
        assert!(!store.exists("p.three").await.unwrap());
    }

    #[tokio::test]
    async fn listings_without_ids_make_no_calls() {
        let api = ScriptedIndexer::default();
        let store = MemoryRealmStore::new();
        let resolver = AddressResolver::mainnet();
        let processor = BatchProcessor::new(&api, &store, &resolver, Isolation::PerEntry);

        let outcome = processor
            .process_page(Some("p"), &[listing("", "id-1"), listing("x", "")])
            .await;

        assert_eq!(outcome.dropped, 2);
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn failed_upsert_does_not_stop_the_page() {
        let api = ScriptedIndexer::default()
            .with_state("id-1", realm_state(1))
            .with_state("id-2", realm_state(2));
        let store = RejectingStore {
            reject: "p.one",
            inner: MemoryRealmStore::new(),
        };
        let resolver = AddressResolver::mainnet();
        let processor = BatchProcessor::new(&api, &store, &resolver, Isolation::PerPage);

        let outcome = processor
            .process_page(Some("p"), &[listing("one", "id-1"), listing("two", "id-2")])
            .await;

        assert_eq!(
            outcome,
            PageOutcome {
                attempted: 2,
                persisted: 1,
                dropped: 1,
                failed: 0,
                skipped: 0,
            }
        );
        assert!(!store.exists("p.one").await.unwrap());
        assert!(store.exists("p.two").await.unwrap());
    }

    #[tokio::test]
    async fn null_name_in_the_middle_only_drops_that_entry() {
        let page: Vec<SubrealmListing> = serde_json::from_value(json!([
            { "atomical_id": "id-1", "subrealm": "one" },
            { "atomical_id": "id-2", "subrealm": null },
            { "atomical_id": "id-3", "subrealm": "three" },
        ]))
        .unwrap();
        let api = ScriptedIndexer::default()
            .with_state("id-1", realm_state(1))
            .with_state("id-3", realm_state(3));
        let store = MemoryRealmStore::new();
        let resolver = AddressResolver::mainnet();
        let processor = BatchProcessor::new(&api, &store, &resolver, Isolation::PerEntry);

        let outcome = processor.process_page(Some("p"), &page).await;

        assert_eq!(outcome.dropped, 1);
        assert_eq!(outcome.persisted, 2);
        assert_eq!(api.state_lookups(), vec!["id-1", "id-3"]);
    }

    #[test]
    fn isolation_parses_from_config_strings() {
        assert_eq!("entry".parse::<Isolation>().unwrap(), Isolation::PerEntry);
        assert_eq!("Per-Page".parse::<Isolation>().unwrap(), Isolation::PerPage);
        assert!("sometimes".parse::<Isolation>().is_err());
        assert_eq!(Isolation::default().to_string(), "entry");
    }
}
