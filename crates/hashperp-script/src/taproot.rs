//! Taproot commitments: balanced script trees, control blocks and P2TR
//! script pubkeys, built on `bitcoin`'s [`TaprootBuilder`].
//!
//! Trees are balanced in leaf order with the extra leaf of an odd split on
//! the left. Branch hashes sort their children, so the root depends only on
//! the tree shape and the leaf set at each level.

use bitcoin::ScriptBuf;
use bitcoin::secp256k1::{Secp256k1, Verification, XOnlyPublicKey};
use bitcoin::taproot::{ControlBlock, LeafVersion, TapNodeHash, TaprootBuilder, TaprootSpendInfo};
use hashperp_types::{HashPerpError, Result, XOnlyKey};

/// BIP341 "nothing up my sleeve" point: disables the key path.
pub const NUMS_INTERNAL_KEY: XOnlyKey = XOnlyKey([
    0x50, 0x92, 0x9b, 0x74, 0xc1, 0xa0, 0x49, 0x54, 0xb7, 0x8b, 0x4b, 0x60, 0x35, 0xe9, 0x7a,
    0x5e, 0x07, 0x8a, 0x5a, 0x0f, 0x28, 0xec, 0x96, 0xd5, 0x47, 0xbf, 0xee, 0x9a, 0xce, 0x80,
    0x3a, 0xc0,
]);

/// Parse and curve-check an x-only key.
pub fn parse_key(key: &XOnlyKey) -> Result<XOnlyPublicKey> {
    XOnlyPublicKey::from_slice(key.as_bytes())
        .map_err(|e| HashPerpError::Script(format!("invalid x-only key {}: {e}", key.short())))
}

/// Depth of each leaf of a balanced tree over `leaves` leaves, in leaf
/// (depth-first) order.
#[must_use]
pub fn balanced_depths(leaves: usize) -> Vec<u8> {
    fn split(n: usize, depth: u8, out: &mut Vec<u8>) {
        if n <= 1 {
            out.push(depth);
            return;
        }
        let mid = n.div_ceil(2);
        split(mid, depth + 1, out);
        split(n - mid, depth + 1, out);
    }
    let mut depths = Vec::with_capacity(leaves);
    if leaves > 0 {
        split(leaves, 0, &mut depths);
    }
    depths
}

/// A script-path P2TR output: its leaf scripts and the finalized commitment.
#[derive(Debug, Clone)]
pub struct TaprootOutput {
    scripts: Vec<ScriptBuf>,
    spend_info: TaprootSpendInfo,
}

impl TaprootOutput {
    pub fn new<C: Verification>(
        secp: &Secp256k1<C>,
        internal_key: XOnlyKey,
        scripts: Vec<ScriptBuf>,
    ) -> Result<Self> {
        if scripts.is_empty() {
            return Err(HashPerpError::Script("tap tree needs at least one leaf".to_string()));
        }
        let internal = parse_key(&internal_key)?;
        let mut builder = TaprootBuilder::new();
        for (script, depth) in scripts.iter().zip(balanced_depths(scripts.len())) {
            builder = builder
                .add_leaf(depth, script.clone())
                .map_err(|e| HashPerpError::Script(format!("tap tree: {e}")))?;
        }
        let spend_info = builder
            .finalize(secp, internal)
            .map_err(|_| HashPerpError::Script("tap tree is incomplete".to_string()))?;
        Ok(Self {
            scripts,
            spend_info,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    pub fn script(&self, index: usize) -> Result<&ScriptBuf> {
        self.scripts
            .get(index)
            .ok_or_else(|| HashPerpError::Script(format!("leaf index {index} out of range")))
    }

    #[must_use]
    pub fn merkle_root(&self) -> Option<TapNodeHash> {
        self.spend_info.merkle_root()
    }

    /// The tweaked key the output commits to.
    #[must_use]
    pub fn output_key(&self) -> XOnlyPublicKey {
        self.spend_info.output_key().to_inner()
    }

    #[must_use]
    pub fn script_pubkey(&self) -> ScriptBuf {
        ScriptBuf::new_p2tr_tweaked(self.spend_info.output_key())
    }

    pub fn control_block(&self, index: usize) -> Result<ControlBlock> {
        let script = self.script(index)?;
        self.spend_info
            .control_block(&(script.clone(), LeafVersion::TapScript))
            .ok_or_else(|| HashPerpError::Script(format!("no control block for leaf {index}")))
    }
}

/// Key-path-only P2TR script pubkey for `key`.
pub fn key_path_script_pubkey<C: Verification>(
    secp: &Secp256k1<C>,
    key: &XOnlyKey,
) -> Result<ScriptBuf> {
    Ok(ScriptBuf::new_p2tr(secp, parse_key(key)?, None))
}
