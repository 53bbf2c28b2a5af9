use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::realm::address::AddressResolver;
use crate::realm::client::IndexerApi;
use crate::realm::lister::{SubrealmPages, SUBREALM_PAGE_SIZE};
use crate::realm::processor::{BatchProcessor, Isolation};
use crate::realm::store::RealmStore;

/// Inbound queue payload: `{ "realm"?: string, "id"?: string }`.
///
/// `realm` is absent for root-level triggers; a message without `id` is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealmMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl RealmMessage {
    pub fn new(realm: Option<String>, id: impl Into<String>) -> Self {
        Self {
            realm,
            id: Some(id.into()),
        }
    }

    fn parent_id(&self) -> Option<&str> {
        self.id.as_deref().map(str::trim).filter(|id| !id.is_empty())
    }
}

/// Totals for one parent's listing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListingSummary {
    pub pages: usize,
    pub listed: usize,
    pub persisted: usize,
    pub dropped: usize,
    pub failed: usize,
    pub skipped: usize,
    /// A page request failed and the remaining pages were never fetched.
    pub aborted: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    pub page_size: usize,
    pub isolation: Isolation,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            page_size: SUBREALM_PAGE_SIZE,
            isolation: Isolation::default(),
        }
    }
}

/// Entry point of the pipeline: one message in, nothing out.
///
/// Pages are fetched and processed strictly in order; page `n` is fully
/// persisted before page `n + 1` is requested. Progress is not checkpointed,
/// so a retry means re-sending the whole message.
#[derive(Clone)]
pub struct RealmIngestor {
    api: Arc<dyn IndexerApi>,
    store: Arc<dyn RealmStore>,
    resolver: AddressResolver,
    options: IngestOptions,
}

impl RealmIngestor {
    pub fn new(api: Arc<dyn IndexerApi>, store: Arc<dyn RealmStore>, options: IngestOptions) -> Self {
        Self {
            api,
            store,
            resolver: AddressResolver::mainnet(),
            options,
        }
    }

    /// Handle one queue message. Never reports failure to the transport.
    pub async fn handle(&self, message: &RealmMessage) {
        let _ = self.dispatch(message).await;
    }

    /// Like [`handle`](Self::handle) but returns the run's totals; `None` for a no-op message.
    pub async fn dispatch(&self, message: &RealmMessage) -> Option<ListingSummary> {
        let parent_id = message.parent_id()?;
        Some(self.ingest(message.realm.as_deref(), parent_id).await)
    }

    /// List every child of `parent_id` and persist each one as `parent_name.child`.
    #[instrument(skip(self), fields(page_size = self.options.page_size))]
    pub async fn ingest(&self, parent_name: Option<&str>, parent_id: &str) -> ListingSummary {
        let processor = BatchProcessor::new(
            self.api.as_ref(),
            self.store.as_ref(),
            &self.resolver,
            self.options.isolation,
        );
        let mut pages = SubrealmPages::new(self.api.as_ref(), parent_id, self.options.page_size);
        let mut summary = ListingSummary::default();

        loop {
            let offset = pages.offset();
            let page = match pages.next_page().await {
                Ok(Some(page)) => page,
                Ok(None) => break,
                Err(e) => {
                    error!(offset, error = %e, "failed to fetch subrealms");
                    summary.aborted = true;
                    break;
                }
            };

            let outcome = processor.process_page(parent_name, &page).await;
            summary.pages += 1;
            summary.listed += page.len();
            summary.persisted += outcome.persisted;
            summary.dropped += outcome.dropped;
            summary.failed += outcome.failed;
            summary.skipped += outcome.skipped;
        }

        info!(
            pages = summary.pages,
            listed = summary.listed,
            persisted = summary.persisted,
            dropped = summary.dropped,
            failed = summary.failed,
            aborted = summary.aborted,
            "subrealm ingestion finished"
        );
        summary
    }
}
