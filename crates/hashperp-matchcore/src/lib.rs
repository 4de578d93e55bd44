//! # hashperp-matchcore
//!
//! **Pure matching for HashPerp contract orders.**
//!
//! MatchCore only decides which orders cross. It has:
//!
//! - **Zero side effects**: no persistence, no contract creation, no locks
//! - **Price-time priority**: best strike first, FIFO by arrival sequence
//! - **Self-match prevention**: a user never trades against themself
//! - **Bucket sharding**: each `(kind, expiry)` bucket has its own book
//!
//! The stateful engine drives [`next_fill`] and applies or excludes fills
//! depending on whether contract creation succeeded.

pub mod matcher;
pub mod orderbook;
pub mod price_level;

pub use matcher::{Fill, match_book, next_fill};
pub use orderbook::OrderBook;
pub use price_level::PriceLevel;
