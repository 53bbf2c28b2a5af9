use bitcoin::{Address, Network, Script};

use crate::error::ScriptDecodeError;

/// Turns hex-encoded output scripts into human-readable addresses.
///
/// Realm data lives on Bitcoin mainnet only, so the resolver is pinned to
/// `Network::Bitcoin` by default: bech32 hrp `bc`, P2PKH version `0x00`,
/// P2SH version `0x05` (WIF `0x80`).
#[derive(Debug, Clone, Copy)]
pub struct AddressResolver {
    network: Network,
}

impl Default for AddressResolver {
    fn default() -> Self {
        Self::mainnet()
    }
}

impl AddressResolver {
    pub fn mainnet() -> Self {
        Self {
            network: Network::Bitcoin,
        }
    }

    /// Resolve a script to its canonical address.
    ///
    /// Missing or blank input is `Ok(None)`. Scripts without an address form
    /// (bare pubkey, multisig, OP_RETURN, garbage) are a [`ScriptDecodeError`],
    /// and so are witness programs newer than taproot (v2 to v16).
    pub fn resolve(&self, script_hex: Option<&str>) -> Result<Option<String>, ScriptDecodeError> {
        let Some(raw) = script_hex.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(None);
        };
        let bytes = hex::decode(raw)?;
        let script = Script::from_bytes(&bytes);
        if let Some(version) = script.witness_version().map(|v| v.to_num()) {
            if version > 1 {
                return Err(ScriptDecodeError::FutureWitnessVersion(version));
            }
        }
        let address = Address::from_script(script, self.network)?;
        Ok(Some(address.to_string()))
    }

    /// Like [`resolve`](Self::resolve), but an undecodable script only loses this one field.
    pub fn resolve_lossy(&self, field: &'static str, script_hex: Option<&str>) -> Option<String> {
        match self.resolve(script_hex) {
            Ok(addr) => addr,
            Err(e) => {
                tracing::warn!(field, script = script_hex.unwrap_or_default(), error = %e, "could not resolve script address");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GENESIS_P2PKH: &str = "76a91462e907b15cbf27d5425399ebf6f0fb50ebb88f1888ac";

    #[test]
    fn empty_or_missing_script_is_none() {
        let r = AddressResolver::mainnet();
        assert_eq!(r.resolve(None).unwrap(), None);
        assert_eq!(r.resolve(Some("")).unwrap(), None);
        assert_eq!(r.resolve(Some("   ")).unwrap(), None);
    }

    #[test]
    fn p2pkh_resolves_to_legacy_address() {
        let r = AddressResolver::mainnet();
        assert_eq!(
            r.resolve(Some(GENESIS_P2PKH)).unwrap().as_deref(),
            Some("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa")
        );
    }

    #[test]
    fn segwit_v0_and_taproot_use_bc_prefix() {
        let r = AddressResolver::mainnet();
        assert_eq!(
            r.resolve(Some("0014751e76e8199196d454941c45d1b3a323f1433bd6"))
                .unwrap()
                .as_deref(),
            Some("bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4")
        );
        assert_eq!(
            r.resolve(Some(
                "512079be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798"
            ))
            .unwrap()
            .as_deref(),
            Some("bc1p0xlxvlhemja6c4dqv22uapctqupfhlxm9h8z3k2e72q4k9hcz7vqzk5jj0")
        );
    }

    #[test]
    fn p2sh_uses_script_hash_version() {
        let r = AddressResolver::mainnet();
        let addr = r
            .resolve(Some("a91462e907b15cbf27d5425399ebf6f0fb50ebb88f1887"))
            .unwrap()
            .unwrap();
        assert!(addr.starts_with('3'), "got {addr}");
    }

    #[test]
    fn resolution_is_deterministic() {
        let r = AddressResolver::mainnet();
        let first = r.resolve(Some(GENESIS_P2PKH)).unwrap();
        for _ in 0..3 {
            assert_eq!(r.resolve(Some(GENESIS_P2PKH)).unwrap(), first);
        }
    }

    #[test]
    fn unrecognized_scripts_are_errors() {
        let r = AddressResolver::mainnet();
        assert!(matches!(
            r.resolve(Some("6a04deadbeef")),
            Err(ScriptDecodeError::Unrecognized(_))
        ));
        assert!(matches!(
            r.resolve(Some("not-hex")),
            Err(ScriptDecodeError::InvalidHex(_))
        ));
    }

    #[test]
    fn future_witness_versions_are_rejected() {
        let r = AddressResolver::mainnet();
        // OP_2 followed by a 32-byte push.
        let v2 = format!("5220{}", "11".repeat(32));
        assert!(matches!(
            r.resolve(Some(&v2)),
            Err(ScriptDecodeError::FutureWitnessVersion(2))
        ));
        // OP_16 followed by a 2-byte push.
        assert!(matches!(
            r.resolve(Some("60020001")),
            Err(ScriptDecodeError::FutureWitnessVersion(16))
        ));
    }

    #[test]
    fn lossy_resolution_drops_only_the_field() {
        let r = AddressResolver::mainnet();
        assert_eq!(r.resolve_lossy("owner", Some("6a04deadbeef")), None);
        assert!(r.resolve_lossy("owner", Some(GENESIS_P2PKH)).is_some());
    }
}
