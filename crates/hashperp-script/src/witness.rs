//! Witness stacks for key-path and script-path spends.

use bitcoin::taproot::ControlBlock;
use bitcoin::{Script, Witness};
use hashperp_types::XOnlyKey;

/// Stand-in for a signature not yet produced.
pub const PLACEHOLDER_SIGNATURE: [u8; 64] = [0u8; 64];

/// `[signature]`
#[must_use]
pub fn key_path(signature: &[u8]) -> Witness {
    Witness::from_slice(&[signature])
}

/// `[signature, public key, script, control block]`
#[must_use]
pub fn script_path(
    signature: &[u8],
    key: &XOnlyKey,
    script: &Script,
    control_block: &ControlBlock,
) -> Witness {
    let mut witness = Witness::new();
    witness.push(signature);
    witness.push(key.as_bytes());
    witness.push(script.as_bytes());
    witness.push(control_block.serialize());
    witness
}

/// Does the first item still hold the placeholder?
#[must_use]
pub fn is_unsigned(witness: &Witness) -> bool {
    witness
        .nth(0)
        .is_some_and(|sig| sig == PLACEHOLDER_SIGNATURE.as_slice())
}
