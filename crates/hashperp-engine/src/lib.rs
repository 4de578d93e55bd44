//! # hashperp-engine
//!
//! Stateful engines for **HashPerp** hash-rate derivatives, behind one
//! service facade.
//!
//! ## Architecture
//!
//! ```text
//!                    HashPerpService
//!        ┌──────────┬──────┴─────┬────────────┐
//!   ContractEngine  VtxoEngine  SwapEngine  OrderEngine
//!        └──────────┴──────┬─────┴────────────┘
//!                    EngineContext
//!     (config, Store, ChainOracle, ScriptEngine, locks, Broadcaster)
//! ```
//!
//! - Every mutation runs under per-contract locks (taken in id order) and
//!   lands as one [`ChangeSet`]; the [`Store`] rejects stale versions.
//! - Chain effects go through the [`Broadcaster`], whose journal makes
//!   retries skip what already reached the network.
//! - Position swaps are a two-step saga with compensation.
//!
//! [`SimulatedChain`] and [`InMemoryStore`] implement the two boundaries for
//! tests and local runs.

pub mod context;
pub mod contracts;
pub mod idempotency;
pub mod locks;
pub mod memory;
pub mod oracle;
pub mod orders;
pub mod protocol;
pub mod service;
pub mod store;
pub mod swaps;
pub mod validation;
pub mod vtxos;

pub use context::EngineContext;
pub use contracts::{ContractEngine, ContractTerms, EarlyExitQuote, ExitReceipt};
pub use idempotency::IdempotencyJournal;
pub use locks::ContractLocks;
pub use memory::InMemoryStore;
pub use oracle::{ChainOracle, SimulatedChain};
pub use orders::{MatchReport, OrderBookSnapshot, OrderEngine};
pub use protocol::{BroadcastKey, Broadcaster, SettlementReceipt};
pub use service::{HashPerpService, HealthReport};
pub use store::{ChangeSet, Record, Store};
pub use swaps::SwapEngine;
pub use vtxos::VtxoEngine;
