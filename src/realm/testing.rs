//! Scripted [`IndexerApi`] double that records every call.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use crate::error::{IndexerError, IndexerResult};
use crate::realm::client::{IndexerApi, FIND_SUBREALMS, GET_STATE};
use crate::realm::model::{AtomicalState, SubrealmListing};

pub const OWNER_SCRIPT: &str = "0014751e76e8199196d454941c45d1b3a323f1433bd6";
pub const MINTER_SCRIPT: &str = "76a91462e907b15cbf27d5425399ebf6f0fb50ebb88f1888ac";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    FindSubrealms {
        parent_id: String,
        limit: usize,
        offset: usize,
    },
    GetState(String),
}

enum StateReply {
    Ok(AtomicalState),
    Err(String),
    Panic,
}

#[derive(Default)]
pub struct ScriptedIndexer {
    pages: Mutex<VecDeque<Result<Vec<SubrealmListing>, String>>>,
    states: HashMap<String, StateReply>,
    calls: Mutex<Vec<Call>>,
}

pub fn listing(subrealm: &str, record_id: &str) -> SubrealmListing {
    SubrealmListing {
        subrealm: subrealm.into(),
        record_id: record_id.into(),
        status: Some("verified".into()),
        subrealm_hex: Some(hex::encode(subrealm)),
        tx_num: None,
    }
}

pub fn realm_state(number: i64) -> AtomicalState {
    serde_json::from_value(json!({
        "type": "NFT",
        "subtype": "subrealm",
        "atomical_number": number,
        "mint_info": { "reveal_location_script": MINTER_SCRIPT },
        "location_info": [{ "script": OWNER_SCRIPT }],
        "state": { "latest": { "d": format!("pid-{number}") } },
    }))
    .expect("valid state fixture")
}

impl ScriptedIndexer {
    /// Queue one page per size; listings are named `c<page>-<n>` with id `id-<page>-<n>`.
    pub fn with_page_sizes(self, sizes: &[usize]) -> Self {
        {
            let mut pages = self.pages.lock().unwrap();
            for &size in sizes {
                let page_no = pages.len();
                let page = (0..size)
                    .map(|n| listing(&format!("c{page_no}-{n}"), &format!("id-{page_no}-{n}")))
                    .collect();
                pages.push_back(Ok(page));
            }
        }
        self
    }

    pub fn with_page(self, page: Vec<SubrealmListing>) -> Self {
        self.pages.lock().unwrap().push_back(Ok(page));
        self
    }

    pub fn with_page_error(self, reason: &str) -> Self {
        self.pages.lock().unwrap().push_back(Err(reason.to_string()));
        self
    }

    pub fn with_state(mut self, record_id: &str, state: AtomicalState) -> Self {
        self.states.insert(record_id.into(), StateReply::Ok(state));
        self
    }

    pub fn with_state_error(mut self, record_id: &str, reason: &str) -> Self {
        self.states
            .insert(record_id.into(), StateReply::Err(reason.into()));
        self
    }

    pub fn with_state_panic(mut self, record_id: &str) -> Self {
        self.states.insert(record_id.into(), StateReply::Panic);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn listing_offsets(&self) -> Vec<usize> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::FindSubrealms { offset, .. } => Some(offset),
                Call::GetState(_) => None,
            })
            .collect()
    }

    pub fn state_lookups(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::GetState(id) => Some(id),
                Call::FindSubrealms { .. } => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(call);
    }
}

#[async_trait]
impl IndexerApi for ScriptedIndexer {
    async fn find_subrealms(
        &self,
        parent_id: &str,
        limit: usize,
        offset: usize,
    ) -> IndexerResult<Vec<SubrealmListing>> {
        self.record(Call::FindSubrealms {
            parent_id: parent_id.into(),
            limit,
            offset,
        });
        let next = self
            .pages
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front();
        match next {
            Some(Ok(page)) => Ok(page),
            Some(Err(reason)) => Err(IndexerError::malformed(FIND_SUBREALMS, reason)),
            None => Ok(Vec::new()),
        }
    }

    async fn get_state(&self, record_id: &str) -> IndexerResult<AtomicalState> {
        self.record(Call::GetState(record_id.into()));
        match self.states.get(record_id) {
            Some(StateReply::Ok(state)) => Ok(state.clone()),
            Some(StateReply::Err(reason)) => Err(IndexerError::malformed(GET_STATE, reason.clone())),
            Some(StateReply::Panic) => panic!("scripted failure for {record_id}"),
            None => Err(IndexerError::malformed(GET_STATE, "unknown atomical")),
        }
    }
}
