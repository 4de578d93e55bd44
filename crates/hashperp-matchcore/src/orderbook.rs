//! The order book for a single `(kind, expiry)` bucket.
//!
//! Uses `BTreeMap` for price-level ordering:
//! - **Bids** (buys): `BTreeMap<Reverse<Decimal>, PriceLevel>`, highest strike first
//! - **Asks** (sells): `BTreeMap<Decimal, PriceLevel>`, lowest strike first
//!
//! An auxiliary `HashMap<OrderId, (Side, Price)>` enables O(log N) removal.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use hashperp_types::{HashPerpError, Order, OrderBucket, OrderId, OrderSide, Result};
use rust_decimal::Decimal;

use crate::price_level::PriceLevel;

/// The order book for one contract kind and expiry.
#[derive(Debug)]
pub struct OrderBook {
    /// The `(kind, expiry)` bucket this book serves.
    pub bucket: OrderBucket,
    /// Buy side: highest strike first (`Reverse` key).
    bids: BTreeMap<Reverse<Decimal>, PriceLevel>,
    /// Sell side: lowest strike first.
    asks: BTreeMap<Decimal, PriceLevel>,
    /// Fast lookup: `OrderId -> (side, strike)` for O(log N) removal.
    index: HashMap<OrderId, (OrderSide, Decimal)>,
}

impl OrderBook {
    /// Create an empty book for `bucket`.
    #[must_use]
    pub fn new(bucket: OrderBucket) -> Self {
        Self {
            bucket,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            index: HashMap::new(),
        }
    }

    /// Build a book from OPEN orders; orders from other buckets or not OPEN are ignored.
    pub fn from_orders(bucket: OrderBucket, orders: impl IntoIterator<Item = Order>) -> Result<Self> {
        let mut book = Self::new(bucket);
        for order in orders {
            if order.is_open() && order.bucket() == bucket {
                book.insert_order(order)?;
            }
        }
        Ok(book)
    }

    // =================================================================
    // Insertion
    // =================================================================

    /// Rest an order at its strike, behind older orders at that strike.
    pub fn insert_order(&mut self, order: Order) -> Result<()> {
        if self.index.contains_key(&order.id) {
            return Err(HashPerpError::Duplicate {
                entity: "order",
                id: order.id.to_string(),
            });
        }
        if order.bucket() != self.bucket {
            return Err(HashPerpError::invalid(
                "order",
                format!("order {} belongs to bucket {}, not {}", order.id, order.bucket(), self.bucket),
            ));
        }

        let price = order.strike_rate;
        self.index.insert(order.id, (order.side, price));

        match order.side {
            OrderSide::Buy => self
                .bids
                .entry(Reverse(price))
                .or_insert_with(|| PriceLevel::new(price))
                .insert(order),
            OrderSide::Sell => self
                .asks
                .entry(price)
                .or_insert_with(|| PriceLevel::new(price))
                .insert(order),
        }
        Ok(())
    }

    // =================================================================
    // Removal
    // =================================================================

    /// Remove an order by ID. Returns the removed order.
    pub fn remove_order(&mut self, order_id: &OrderId) -> Result<Order> {
        let (side, price) = self
            .index
            .remove(order_id)
            .ok_or(HashPerpError::OrderNotFound(*order_id))?;

        let order = match side {
            OrderSide::Buy => {
                let level = self
                    .bids
                    .get_mut(&Reverse(price))
                    .ok_or(HashPerpError::OrderNotFound(*order_id))?;
                let order = level
                    .remove_order(order_id)
                    .ok_or(HashPerpError::OrderNotFound(*order_id))?;
                if level.is_empty() {
                    self.bids.remove(&Reverse(price));
                }
                order
            }
            OrderSide::Sell => {
                let level = self
                    .asks
                    .get_mut(&price)
                    .ok_or(HashPerpError::OrderNotFound(*order_id))?;
                let order = level
                    .remove_order(order_id)
                    .ok_or(HashPerpError::OrderNotFound(*order_id))?;
                if level.is_empty() {
                    self.asks.remove(&price);
                }
                order
            }
        };

        Ok(order)
    }

    // =================================================================
    // Queries
    // =================================================================

    /// Best (highest) bid strike, or `None` if no bids.
    #[must_use]
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.keys().next().map(|r| r.0)
    }

    /// Best (lowest) ask strike, or `None` if no asks.
    #[must_use]
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.keys().next().copied()
    }

    /// `best_ask - best_bid`. Negative when the book is crossed.
    #[must_use]
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    /// Total number of orders currently in the book.
    #[must_use]
    pub fn order_count(&self) -> usize {
        self.index.len()
    }

    /// Number of distinct bid strike levels.
    #[must_use]
    pub fn bid_depth(&self) -> usize {
        self.bids.len()
    }

    /// Number of distinct ask strike levels.
    #[must_use]
    pub fn ask_depth(&self) -> usize {
        self.asks.len()
    }

    /// Returns `true` if the book has no orders on either side.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Check if an order is resting in the book.
    #[must_use]
    pub fn contains_order(&self, order_id: &OrderId) -> bool {
        self.index.contains_key(order_id)
    }

    // =================================================================
    // Iteration (for the matcher)
    // =================================================================

    /// Bid levels from best (highest) to worst.
    pub fn bid_levels(&self) -> impl Iterator<Item = &PriceLevel> {
        self.bids.values()
    }

    /// Ask levels from best (lowest) to worst.
    pub fn ask_levels(&self) -> impl Iterator<Item = &PriceLevel> {
        self.asks.values()
    }

    /// Bids in full price-time priority.
    pub fn bids_in_priority(&self) -> impl Iterator<Item = &Order> {
        self.bid_levels().flat_map(|level| level.orders.iter())
    }

    /// Asks in full price-time priority.
    pub fn asks_in_priority(&self) -> impl Iterator<Item = &Order> {
        self.ask_levels().flat_map(|level| level.orders.iter())
    }
}

#[cfg(test)]
mod tests {
    use hashperp_types::*;
    use rust_decimal::Decimal;

    use super::*;

    fn bucket() -> OrderBucket {
        OrderBucket {
            kind: ContractKind::Call,
            expiry_height: 1_000,
        }
    }

    fn make_order(side: OrderSide, rate: i64, seq: u64) -> Order {
        Order::dummy(side, Decimal::new(rate, 5), Decimal::ONE, seq)
    }

    #[test]
    fn insert_and_query_best_bid_ask() {
        let mut book = OrderBook::new(bucket());

        book.insert_order(make_order(OrderSide::Buy, 10, 0)).unwrap();
        book.insert_order(make_order(OrderSide::Buy, 9, 1)).unwrap();
        book.insert_order(make_order(OrderSide::Sell, 11, 2)).unwrap();
        book.insert_order(make_order(OrderSide::Sell, 12, 3)).unwrap();

        assert_eq!(book.best_bid(), Some(Decimal::new(10, 5)));
        assert_eq!(book.best_ask(), Some(Decimal::new(11, 5)));
        assert_eq!(book.spread(), Some(Decimal::new(1, 5)));
        assert_eq!(book.order_count(), 4);
    }

    #[test]
    fn remove_order_drops_empty_level() {
        let mut book = OrderBook::new(bucket());
        let order = make_order(OrderSide::Buy, 10, 0);
        let id = order.id;

        book.insert_order(order).unwrap();
        assert_eq!(book.bid_depth(), 1);

        let removed = book.remove_order(&id).unwrap();
        assert_eq!(removed.id, id);
        assert_eq!(book.bid_depth(), 0);
        assert!(book.is_empty());
    }

    #[test]
    fn remove_nonexistent_order() {
        let mut book = OrderBook::new(bucket());
        let result = book.remove_order(&OrderId::new());
        assert!(matches!(result, Err(HashPerpError::OrderNotFound(_))));
    }

    #[test]
    fn duplicate_order_rejected() {
        let mut book = OrderBook::new(bucket());
        let order = make_order(OrderSide::Buy, 10, 0);
        let dup = order.clone();

        book.insert_order(order).unwrap();
        let result = book.insert_order(dup);
        assert!(matches!(result, Err(HashPerpError::Duplicate { entity: "order", .. })));
    }

    #[test]
    fn foreign_bucket_rejected() {
        let mut book = OrderBook::new(bucket());
        let mut order = make_order(OrderSide::Sell, 10, 0);
        order.expiry_height = 2_000;
        assert!(matches!(
            book.insert_order(order),
            Err(HashPerpError::InvalidParameters { .. })
        ));
    }

    #[test]
    fn from_orders_skips_closed() {
        let open = make_order(OrderSide::Buy, 10, 0);
        let mut canceled = make_order(OrderSide::Buy, 10, 1);
        canceled.status = OrderStatus::Canceled;
        let book = OrderBook::from_orders(bucket(), vec![open, canceled]).unwrap();
        assert_eq!(book.order_count(), 1);
    }

    #[test]
    fn priority_iteration() {
        let mut book = OrderBook::new(bucket());
        let late_high = make_order(OrderSide::Buy, 12, 5);
        let early_mid = make_order(OrderSide::Buy, 10, 1);
        let late_mid = make_order(OrderSide::Buy, 10, 3);
        let expected = vec![late_high.id, early_mid.id, late_mid.id];
        book.insert_order(late_mid).unwrap();
        book.insert_order(late_high).unwrap();
        book.insert_order(early_mid).unwrap();

        let ids: Vec<OrderId> = book.bids_in_priority().map(|o| o.id).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn ask_levels_iterate_lowest_first() {
        let mut book = OrderBook::new(bucket());
        book.insert_order(make_order(OrderSide::Sell, 20, 0)).unwrap();
        book.insert_order(make_order(OrderSide::Sell, 11, 1)).unwrap();
        book.insert_order(make_order(OrderSide::Sell, 15, 2)).unwrap();

        let prices: Vec<Decimal> = book.ask_levels().map(|l| l.price).collect();
        assert_eq!(
            prices,
            vec![Decimal::new(11, 5), Decimal::new(15, 5), Decimal::new(20, 5)]
        );
    }

    #[test]
    fn empty_book() {
        let book = OrderBook::new(bucket());
        assert!(book.is_empty());
        assert_eq!(book.best_bid(), None);
        assert_eq!(book.best_ask(), None);
        assert_eq!(book.spread(), None);
    }
}
