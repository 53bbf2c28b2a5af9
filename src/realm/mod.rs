//! Realm ingestion pipeline.
//!
//! `dispatch` (one queue message) -> `lister` (pages of children) ->
//! `processor` (entries of a page) -> `enrich` (+ `address`, twice per record)
//! -> `store` (upsert by dotted name).

pub mod address;
pub mod client;
pub mod dispatch;
pub mod enrich;
pub mod lister;
pub mod model;
pub mod processor;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use address::AddressResolver;
pub use client::{IndexerApi, ProxyClient};
pub use dispatch::{IngestOptions, ListingSummary, RealmIngestor, RealmMessage};
pub use model::{RealmRecord, SubrealmListing};
pub use processor::Isolation;
pub use store::{MemoryRealmStore, PgRealmStore, RealmStore, UpsertOutcome};
