//! BIP340-style tagged hashes and the outcome and anchor commitments built
//! from them.

use hashperp_types::{Contract, Position, VtxoId};
use sha2::{Digest, Sha256};

/// `SHA256(SHA256(tag) || SHA256(tag) || msg)`.
#[must_use]
pub fn tagged_hash(tag: &str, msg: &[u8]) -> [u8; 32] {
    tagged_hash_parts(tag, &[msg])
}

/// Tagged hash over the concatenation of `parts`.
#[must_use]
pub fn tagged_hash_parts(tag: &str, parts: &[&[u8]]) -> [u8; 32] {
    let tag_hash = Sha256::digest(tag.as_bytes());
    let mut hasher = Sha256::new();
    hasher.update(tag_hash);
    hasher.update(tag_hash);
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

#[must_use]
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Preimage committing to one side winning a contract.
#[must_use]
pub fn outcome_preimage(contract: &Contract, position: Position) -> [u8; 32] {
    let strike = contract.strike_rate.normalize().to_string();
    tagged_hash_parts(
        "HashPerp/outcome",
        &[
            contract.id.as_bytes(),
            &contract.expiry_height.to_le_bytes(),
            position.as_str().as_bytes(),
            strike.as_bytes(),
        ],
    )
}

/// The hash locked into a role path's `SHA256 <hash> EQUALVERIFY`.
#[must_use]
pub fn outcome_hash(contract: &Contract, position: Position) -> [u8; 32] {
    sha256(&outcome_preimage(contract, position))
}

/// Deterministic anchor txid standing in for a VTXO's virtual outpoint.
#[must_use]
pub fn vtxo_anchor_txid(vtxo_id: VtxoId) -> [u8; 32] {
    tagged_hash("HashPerp/vtxo", vtxo_id.as_bytes())
}
