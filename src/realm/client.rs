use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{IndexerError, IndexerResult};
use crate::realm::model::{AtomicalState, ProxyEnvelope, SubrealmListing};

pub const FIND_SUBREALMS: &str = "blockchain.atomicals.find_subrealms";
pub const GET_STATE: &str = "blockchain.atomicals.get_state";

pub const DEFAULT_BASE_URL: &str = "https://ep.atomicals.xyz/proxy";

fn truncate_for_log(mut s: String, max_len: usize) -> String {
    if s.len() > max_len {
        let mut cut = max_len;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
        s.push('…');
    }
    s
}

/// `[parent_id, name_filter, verbose, limit, offset]`; the filter is always empty.
fn find_subrealms_params(parent_id: &str, limit: usize, offset: usize) -> Value {
    json!([parent_id, "", false, limit, offset])
}

/// Unwrap a proxy body into its `response.result`.
fn decode_envelope<T: DeserializeOwned>(method: &'static str, body: &[u8]) -> IndexerResult<T> {
    let envelope: ProxyEnvelope<T> =
        serde_json::from_slice(body).map_err(|source| IndexerError::Decode { method, source })?;

    if !envelope.success {
        return Err(IndexerError::malformed(method, "success flag missing or false"));
    }
    envelope
        .into_result()
        .ok_or_else(|| IndexerError::malformed(method, "response.result missing"))
}

/// Read-only queries against the indexer.
///
/// Implementations surface a missing `success` flag or a missing `result` as
/// [`IndexerError::Malformed`]; callers decide how much work that aborts.
#[async_trait]
pub trait IndexerApi: Send + Sync {
    /// One page of direct children of `parent_id`.
    async fn find_subrealms(
        &self,
        parent_id: &str,
        limit: usize,
        offset: usize,
    ) -> IndexerResult<Vec<SubrealmListing>>;

    /// Current state of a single atomical.
    async fn get_state(&self, record_id: &str) -> IndexerResult<AtomicalState>;
}

/// ElectrumX JSON proxy client.
///
/// Methods are called as `GET {base}/{method}?params=[...]` and answer with
/// `{ "success": bool, "response": { "result": ... } }`.
#[derive(Debug, Clone)]
pub struct ProxyClient {
    base_url: String,
    http: Client,
}

impl ProxyClient {
    pub fn new(base_url: Option<&str>, timeout_secs: Option<u64>) -> anyhow::Result<Self> {
        let base_url = base_url
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        let timeout_secs = timeout_secs.unwrap_or(15);
        let http = Client::builder()
            .user_agent(concat!("realm-indexer/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call<T: DeserializeOwned>(&self, method: &'static str, params: Value) -> IndexerResult<T> {
        let url = format!("{}/{}", self.base_url, method);
        debug!(%url, %params, "indexer request");

        let resp = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .query(&[("params", params.to_string())])
            .send()
            .await
            .map_err(|source| IndexerError::Transport { method, source })?;

        let status = resp.status();
        if !status.is_success() {
            let body = truncate_for_log(resp.text().await.unwrap_or_default(), 2000);
            return Err(IndexerError::Status {
                method,
                status: status.as_u16(),
                body,
            });
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|source| IndexerError::Transport { method, source })?;
        decode_envelope(method, &bytes)
    }
}

#[async_trait]
impl IndexerApi for ProxyClient {
    async fn find_subrealms(
        &self,
        parent_id: &str,
        limit: usize,
        offset: usize,
    ) -> IndexerResult<Vec<SubrealmListing>> {
        self.call(FIND_SUBREALMS, find_subrealms_params(parent_id, limit, offset))
            .await
    }

    async fn get_state(&self, record_id: &str) -> IndexerResult<AtomicalState> {
        self.call(GET_STATE, json!([record_id])).await
    }
}
