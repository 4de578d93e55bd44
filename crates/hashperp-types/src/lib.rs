//! # hashperp-types
//!
//! Shared types, errors, and configuration for **HashPerp**, a settlement
//! engine for Bitcoin hash-rate derivatives on layer-2 VTXOs.
//!
//! This crate is the leaf dependency of the workspace. It defines:
//!
//! - **Identifiers**: [`ContractId`], [`VtxoId`], [`OrderId`], [`UserId`], [`SwapOfferId`], [`PreSignedExitId`], [`LedgerEntryId`], [`Txid`], [`XOnlyKey`]
//! - **Contract model**: [`Contract`], [`ContractKind`], [`ContractStatus`], [`Position`], [`ExitPath`]
//! - **VTXO model**: [`Vtxo`], [`ScriptPathKind`], authorization message builders
//! - **Order model**: [`Order`], [`OrderSide`], [`OrderStatus`], [`OrderBucket`]
//! - **Swap offers**: [`SwapOffer`], [`SwapOfferStatus`], [`SwapKind`], [`PositionSwapTerms`], [`SwapOfferMarketData`]
//! - **Exits**: [`PreSignedExit`]
//! - **Ledger**: [`LedgerEntry`], [`LedgerKind`], [`LedgerStatus`]
//! - **Hash-rate math**: [`block_subsidy`], [`btc_per_ph_day`], [`difficulty_to_ph`], [`HashRateSample`]
//! - **Configuration**: [`EngineConfig`], [`ContractLimits`], [`ExitPolicy`]
//! - **Errors**: [`HashPerpError`] with `HP_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults

pub mod config;
pub mod constants;
pub mod contract;
pub mod error;
pub mod exit_path;
pub mod hashrate;
pub mod ids;
pub mod ledger;
pub mod order;
pub mod presigned_exit;
pub mod swap_offer;
pub mod vtxo;

// Re-export all primary types at crate root for ergonomic imports:
//   use hashperp_types::{Contract, Vtxo, SwapOffer, ...};

pub use config::*;
pub use contract::*;
pub use error::*;
pub use exit_path::*;
pub use hashrate::*;
pub use ids::*;
pub use ledger::*;
pub use order::*;
pub use presigned_exit::*;
pub use swap_offer::*;
pub use vtxo::*;

// Constants are accessed via `hashperp_types::constants::FOO`
// (not re-exported to avoid name collisions).
