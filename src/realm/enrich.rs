use tracing::{debug, warn};

use crate::realm::address::AddressResolver;
use crate::realm::client::IndexerApi;
use crate::realm::model::{AtomicalState, RealmRecord};

/// Look up one atomical and normalize it into a [`RealmRecord`].
///
/// Returns `None` for anything that is not a realm-family NFT and for every
/// indexer failure; the failure is logged here and never propagated.
pub async fn fetch_record(
    api: &dyn IndexerApi,
    resolver: &AddressResolver,
    record_id: &str,
) -> Option<RealmRecord> {
    let state = match api.get_state(record_id).await {
        Ok(state) => state,
        Err(e) => {
            warn!(record_id, error = %e, "failed to fetch realm state");
            return None;
        }
    };
    normalize(resolver, record_id, &state)
}

/// Build a record from an already-fetched state payload.
pub fn normalize(
    resolver: &AddressResolver,
    record_id: &str,
    state: &AtomicalState,
) -> Option<RealmRecord> {
    if !state.is_realm() {
        debug!(
            record_id,
            kind = state.kind.as_deref().unwrap_or_default(),
            subtype = state.subtype.as_deref().unwrap_or_default(),
            "skipping non-realm atomical"
        );
        return None;
    }

    let Some(ordinal_number) = state.atomical_number else {
        warn!(record_id, "realm state has no atomical_number; skipping");
        return None;
    };

    Some(RealmRecord {
        record_id: record_id.to_string(),
        ordinal_number,
        minter_address: resolver.resolve_lossy("minter", state.reveal_script()),
        owner_address: resolver.resolve_lossy("owner", state.current_script()),
        profile_id: state.profile_id(),
    })
}
