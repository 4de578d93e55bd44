//! A single price level in the order book.
//!
//! Orders at the same strike are kept in arrival-sequence order (time
//! priority) in a [`VecDeque`]. Residual orders carry their parent's
//! sequence, so insertion places them where the parent stood.

use std::collections::VecDeque;

use hashperp_types::{Order, OrderId};
use rust_decimal::Decimal;

/// All orders at one strike rate.
///
/// The front of the deque has the highest time priority.
#[derive(Debug, Clone)]
pub struct PriceLevel {
    pub price: Decimal,
    pub orders: VecDeque<Order>,
}

impl PriceLevel {
    #[must_use]
    pub fn new(price: Decimal) -> Self {
        Self {
            price,
            orders: VecDeque::new(),
        }
    }

    /// Insert keeping ascending sequence order; equal sequences go last.
    pub fn insert(&mut self, order: Order) {
        let pos = self
            .orders
            .iter()
            .position(|o| o.sequence > order.sequence)
            .unwrap_or(self.orders.len());
        self.orders.insert(pos, order);
    }

    #[must_use]
    pub fn front(&self) -> Option<&Order> {
        self.orders.front()
    }

    /// Total open size at this level.
    #[must_use]
    pub fn total_size(&self) -> Decimal {
        self.orders.iter().map(|o| o.size).sum()
    }

    pub fn remove_order(&mut self, order_id: &OrderId) -> Option<Order> {
        let pos = self.orders.iter().position(|o| o.id == *order_id)?;
        self.orders.remove(pos)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.len()
    }
}

#[cfg(test)]
mod tests {
    use hashperp_types::constants::dust_size;
    use hashperp_types::*;
    use rust_decimal::Decimal;

    use super::*;

    fn make_order(size: Decimal, seq: u64) -> Order {
        Order::dummy(OrderSide::Buy, Decimal::new(10, 5), size, seq)
    }

    #[test]
    fn insert_fifo() {
        let mut level = PriceLevel::new(Decimal::new(10, 5));
        let o1 = make_order(Decimal::ONE, 0);
        let o2 = make_order(Decimal::ONE, 1);
        let id1 = o1.id;

        level.insert(o1);
        level.insert(o2);

        assert_eq!(level.len(), 2);
        assert_eq!(level.front().unwrap().id, id1, "FIFO: first in should be first out");
    }

    #[test]
    fn residual_reenters_at_parent_position() {
        let mut level = PriceLevel::new(Decimal::new(10, 5));
        let parent = make_order(Decimal::new(3, 0), 1);
        level.insert(make_order(Decimal::ONE, 2));
        level.insert(make_order(Decimal::ONE, 5));
        let residual = parent.residual(Decimal::ONE, dust_size()).unwrap();
        let rid = residual.id;
        level.insert(residual);
        assert_eq!(level.front().unwrap().id, rid);
    }

    #[test]
    fn total_size() {
        let mut level = PriceLevel::new(Decimal::new(10, 5));
        level.insert(make_order(Decimal::new(5, 0), 0));
        level.insert(make_order(Decimal::new(3, 0), 1));
        assert_eq!(level.total_size(), Decimal::new(8, 0));
    }

    #[test]
    fn remove_order_by_id() {
        let mut level = PriceLevel::new(Decimal::new(10, 5));
        let o1 = make_order(Decimal::ONE, 0);
        let o2 = make_order(Decimal::ONE, 1);
        let target_id = o2.id;

        level.insert(o1);
        level.insert(o2);

        let removed = level.remove_order(&target_id);
        assert_eq!(removed.unwrap().id, target_id);
        assert_eq!(level.len(), 1);
        assert!(level.remove_order(&OrderId::new()).is_none());
    }

    #[test]
    fn empty_level() {
        let level = PriceLevel::new(Decimal::new(10, 5));
        assert!(level.is_empty());
        assert_eq!(level.total_size(), Decimal::ZERO);
        assert!(level.front().is_none());
    }
}
