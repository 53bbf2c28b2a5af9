//! Error types for the realm ingestion pipeline.
//!
//! None of these reach the queue transport. Each one is swallowed and logged at
//! the isolation boundary that owns it:
//!
//! - [`IndexerError`]: the listing loop aborts, or enrichment yields no record.
//! - [`ScriptDecodeError`]: the single address field becomes `None`.
//! - [`StorageError`]: the record is not persisted this round.

use thiserror::Error;

/// Failures talking to the indexer proxy (transport or response shape).
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("transport error calling {method}: {source}")]
    Transport {
        method: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} returned HTTP {status}: {body}")]
    Status {
        method: &'static str,
        status: u16,
        body: String,
    },

    #[error("malformed {method} response: {reason}")]
    Malformed {
        method: &'static str,
        reason: String,
    },

    #[error("failed to decode {method} response: {source}")]
    Decode {
        method: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl IndexerError {
    pub fn malformed(method: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            method,
            reason: reason.into(),
        }
    }
}

/// A locking script that could not be turned into an address.
#[derive(Debug, Error)]
pub enum ScriptDecodeError {
    #[error("script is not valid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("script matches no known output pattern: {0}")]
    Unrecognized(#[from] bitcoin::address::FromScriptError),

    #[error("witness version {0} has no address form")]
    FutureWitnessVersion(u8),
}

/// Storage-layer failures from the realm table or the message queue.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type IndexerResult<T> = Result<T, IndexerError>;
pub type StorageResult<T> = Result<T, StorageError>;
