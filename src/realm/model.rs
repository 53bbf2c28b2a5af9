use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Subtypes of an `NFT` atomical that belong to the realm namespace.
pub const REALM_SUBTYPES: &[&str] = &["realm", "subrealm"];

/// One named entity in the realm hierarchy, ready to persist.
///
/// `record_id`, `ordinal_number` and `minter_address` are write-once in storage;
/// `owner_address` and `profile_id` are refreshed on every re-ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealmRecord {
    pub record_id: String,
    pub ordinal_number: i64,
    pub minter_address: Option<String>,
    pub owner_address: Option<String>,
    pub profile_id: Option<String>,
}

/// Explicit `null` decodes like a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// One entry of a `find_subrealms` page.
///
/// Blank names and ids survive decoding so one bad entry cannot reject the
/// whole page; the processor drops them individually.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubrealmListing {
    #[serde(default, deserialize_with = "null_as_default")]
    pub subrealm: String,
    #[serde(rename = "atomical_id", default, deserialize_with = "null_as_default")]
    pub record_id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub subrealm_hex: Option<String>,
    /// Indexer-side ordering only; passed through untouched.
    #[serde(default)]
    pub tx_num: Option<i64>,
}

/// Fully-qualified dotted name of a child under `parent`.
///
/// A root-level trigger carries no parent name, in which case the child's
/// short name is used as-is.
pub fn combined_name(parent: Option<&str>, child: &str) -> String {
    match parent.map(str::trim).filter(|p| !p.is_empty()) {
        Some(parent) => format!("{parent}.{child}"),
        None => child.to_string(),
    }
}

// -----------------------------------------------------------------------------
// Proxy wire shapes
// -----------------------------------------------------------------------------

/// `{ success, response: { result } }` wrapper shared by every proxy method.
#[derive(Debug, Deserialize)]
pub struct ProxyEnvelope<T> {
    #[serde(default, deserialize_with = "null_as_default")]
    pub success: bool,
    #[serde(default = "Option::default")]
    pub response: Option<ProxyResponse<T>>,
}

#[derive(Debug, Deserialize)]
pub struct ProxyResponse<T> {
    #[serde(default = "Option::default")]
    pub result: Option<T>,
}

impl<T> ProxyEnvelope<T> {
    pub fn into_result(self) -> Option<T> {
        self.response.and_then(|r| r.result)
    }
}

/// `result` object of `get_state`. Every field is optional; absent values
/// default to `None` / empty.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AtomicalState {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub atomical_number: Option<i64>,
    #[serde(default)]
    pub mint_info: Option<MintInfo>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub location_info: Vec<LocationInfo>,
    #[serde(default)]
    pub state: Option<StateHistory>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MintInfo {
    #[serde(default)]
    pub reveal_location_script: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocationInfo {
    #[serde(default)]
    pub script: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StateHistory {
    #[serde(default)]
    pub latest: Option<LatestState>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LatestState {
    /// Profile pointer; usually a string id, kept raw because the indexer does
    /// not enforce a type here.
    #[serde(default)]
    pub d: Option<Value>,
}

impl AtomicalState {
    pub fn is_realm(&self) -> bool {
        self.kind.as_deref() == Some("NFT")
            && self
                .subtype
                .as_deref()
                .is_some_and(|s| REALM_SUBTYPES.contains(&s))
    }

    pub fn reveal_script(&self) -> Option<&str> {
        self.mint_info
            .as_ref()
            .and_then(|m| m.reveal_location_script.as_deref())
    }

    pub fn current_script(&self) -> Option<&str> {
        self.location_info.first().and_then(|l| l.script.as_deref())
    }

    /// `state.latest.d`; empty strings, `false`, `0` and `null` count as absent.
    pub fn profile_id(&self) -> Option<String> {
        let d = self.state.as_ref()?.latest.as_ref()?.d.as_ref()?;
        match d {
            Value::Null | Value::Bool(false) => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            Value::Number(n) if n.as_f64() == Some(0.0) => None,
            other => Some(other.to_string()),
        }
    }
}
