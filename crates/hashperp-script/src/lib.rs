//! # hashperp-script
//!
//! **Script Engine**: stateless generation of the tapscripts, Taproot
//! commitments and transactions that back every HashPerp VTXO.
//!
//! Scripts are generated, never executed. Script assembly, Taproot trees and
//! transaction encoding come from the `bitcoin` crate; the protocol's own
//! tagged commitments are plain `sha2`.
//!
//! ## Modules
//!
//! - [`tagged`]: tagged hashes, outcome commitments, VTXO anchors
//! - [`taproot`]: balanced trees, control blocks, P2TR script pubkeys
//! - [`witness`]: key-path and script-path witness stacks
//! - [`transaction`]: ledger txids, consensus encoding, satoshi amounts
//! - [`signer`]: Schnorr verification (and deterministic test signers)
//! - [`engine`]: contract-level scripts and the settlement chain

pub mod engine;
pub mod signer;
pub mod tagged;
pub mod taproot;
pub mod transaction;
pub mod witness;

pub use bitcoin::{Transaction, Witness};
pub use engine::{Participants, ScriptEngine, SettlementChain, SettlementStage};
pub use signer::SchnorrVerifier;
#[cfg(any(test, feature = "test-helpers"))]
pub use signer::TestSigner;
pub use taproot::TaprootOutput;
