//! Pure price-time-priority matcher.
//!
//! ```text
//! next_fill(&OrderBook, &excluded, min_size) -> Option<Fill>
//! ```
//!
//! Bids are walked best first (strike descending, then arrival sequence);
//! for each bid, asks are walked best first while `bid >= ask`. The first
//! admissible pair is the fill. The caller decides whether the fill
//! succeeds: on success it calls [`OrderBook::apply_fill`]; on failure it
//! adds the pair to `excluded` and asks again.
//!
//! ## Self-Match Prevention
//!
//! A bid and ask from the same user never fill. The bid keeps walking to the
//! next ask.
//!
//! ## Partial Fills
//!
//! Fill size is `min(buy, sell)`. The larger order is consumed and its
//! remainder re-enters the book as a new OPEN residual order with the
//! parent's sequence, so it keeps its place in the queue. A remainder below
//! `min_size` (the dust limit) is dropped instead: it could never open a
//! contract, so the larger order closes fully matched.

use std::collections::HashSet;

use hashperp_types::{Order, OrderId, Result};
use rust_decimal::Decimal;
use tracing::trace;

use crate::OrderBook;

/// One crossing between a bid and an ask.
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub buy: Order,
    pub sell: Order,
    /// Contract size: `min(buy.size, sell.size)`.
    pub size: Decimal,
    /// Contracts strike at the buyer's rate.
    pub strike_rate: Decimal,
    pub residual: Option<Order>,
}

impl Fill {
    #[must_use]
    pub fn pair(&self) -> (OrderId, OrderId) {
        (self.buy.id, self.sell.id)
    }
}

/// The highest-priority admissible crossing, if any.
#[must_use]
pub fn next_fill(
    book: &OrderBook,
    excluded: &HashSet<(OrderId, OrderId)>,
    min_size: Decimal,
) -> Option<Fill> {
    for bid in book.bids_in_priority() {
        for ask in book.asks_in_priority() {
            if ask.strike_rate > bid.strike_rate {
                break;
            }
            if bid.user_id == ask.user_id {
                trace!(buy = %bid.id, sell = %ask.id, user = %bid.user_id, "self-match skipped");
                continue;
            }
            if excluded.contains(&(bid.id, ask.id)) {
                continue;
            }
            return Some(build_fill(bid, ask, min_size));
        }
    }
    None
}

fn build_fill(bid: &Order, ask: &Order, min_size: Decimal) -> Fill {
    let size = bid.size.min(ask.size);
    let residual = if bid.size > ask.size {
        bid.residual(size, min_size)
    } else if ask.size > bid.size {
        ask.residual(size, min_size)
    } else {
        None
    };
    Fill {
        buy: bid.clone(),
        sell: ask.clone(),
        size,
        strike_rate: bid.strike_rate,
        residual,
    }
}

impl OrderBook {
    /// Take both filled orders out of the book and insert the residual.
    pub fn apply_fill(&mut self, fill: &Fill) -> Result<()> {
        self.remove_order(&fill.buy.id)?;
        self.remove_order(&fill.sell.id)?;
        if let Some(residual) = &fill.residual {
            self.insert_order(residual.clone())?;
        }
        Ok(())
    }
}

/// Fill everything that crosses, assuming every fill succeeds.
pub fn match_book(book: &mut OrderBook, min_size: Decimal) -> Result<Vec<Fill>> {
    let excluded = HashSet::new();
    let mut fills = Vec::new();
    while let Some(fill) = next_fill(book, &excluded, min_size) {
        book.apply_fill(&fill)?;
        fills.push(fill);
    }
    Ok(fills)
}
