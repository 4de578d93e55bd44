//! Order Matching Engine.
//!
//! Orders rest in books partitioned by (kind, expiry). The crossing logic
//! lives in `hashperp-matchcore`; this module loads books from the store,
//! turns each fill into a contract, and persists the outcome.
//!
//! A fill commits as one unit: the new contract with its VTXOs and ledger
//! entry, both orders MATCHED, and the residual order if sizes differed.
//! A fill whose contract cannot be created leaves both orders OPEN and the
//! pair is skipped for the rest of the pass.
//!
//! All passes, placements and cancellations are serialized by one matching
//! lock.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use hashperp_matchcore::{OrderBook, next_fill};
use hashperp_types::{
    ContractId, ContractKind, HashPerpError, Order, OrderBucket, OrderId, OrderSide, OrderStatus,
    Result, UserId,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::contracts::{ContractEngine, ContractTerms};
use crate::context::EngineContext;
use crate::store::ChangeSet;
use crate::validation::{validate_expiry, validate_size, validate_strike};

/// OPEN orders of one bucket in priority order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderBookSnapshot {
    pub bucket: OrderBucket,
    pub bids: Vec<Order>,
    pub asks: Vec<Order>,
}

/// What a matching pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchReport {
    pub contracts: Vec<ContractId>,
    pub expired: Vec<OrderId>,
    /// Crossing pairs whose contract could not be created.
    pub skipped: usize,
}

pub struct OrderEngine {
    ctx: Arc<EngineContext>,
    contracts: Arc<ContractEngine>,
    matching: Mutex<()>,
}

impl OrderEngine {
    #[must_use]
    pub fn new(ctx: Arc<EngineContext>, contracts: Arc<ContractEngine>) -> Self {
        Self {
            ctx,
            contracts,
            matching: Mutex::new(()),
        }
    }

    /// Rest an order and immediately match its bucket. Returns the order as
    /// it stands after matching.
    pub fn place_order(
        &self,
        user: UserId,
        side: OrderSide,
        kind: ContractKind,
        strike_rate: Decimal,
        expiry_height: u64,
        size: Decimal,
    ) -> Result<Order> {
        let ctx = &self.ctx;
        let limits = &ctx.config.limits;
        validate_strike(limits, strike_rate)?;
        validate_size(limits, size)?;
        validate_expiry(limits, ctx.current_height()?, expiry_height)?;
        ctx.public_key(user)?;

        let _pass = self.matching.lock();
        let order = Order::open(
            user,
            side,
            kind,
            strike_rate,
            expiry_height,
            size,
            ctx.store.next_order_sequence()?,
        );
        let mut changes = ChangeSet::new();
        changes.insert(order.clone());
        ctx.commit(changes)?;
        info!(
            order_id = %order.id,
            %user,
            %side,
            bucket = %order.bucket(),
            strike = %strike_rate,
            %size,
            "order placed"
        );

        let report = self.match_bucket(order.bucket())?;
        if !report.contracts.is_empty() {
            debug!(order_id = %order.id, contracts = report.contracts.len(), "placement matched");
        }
        ctx.order(order.id)
    }

    /// Expire orders too close to expiry to open a contract, then match every bucket.
    pub fn match_orders(&self) -> Result<MatchReport> {
        let _pass = self.matching.lock();
        let mut report = MatchReport {
            expired: self.expire_stale_orders()?,
            ..MatchReport::default()
        };
        let buckets: BTreeSet<OrderBucket> = self
            .ctx
            .store
            .open_orders()?
            .iter()
            .map(Order::bucket)
            .collect();
        for bucket in buckets {
            let pass = self.match_bucket(bucket)?;
            report.contracts.extend(pass.contracts);
            report.skipped += pass.skipped;
        }
        info!(
            contracts = report.contracts.len(),
            expired = report.expired.len(),
            skipped = report.skipped,
            "matching pass finished"
        );
        Ok(report)
    }

    fn expire_stale_orders(&self) -> Result<Vec<OrderId>> {
        let ctx = &self.ctx;
        let cutoff = ctx
            .current_height()?
            .saturating_add(ctx.config.limits.min_expiry_blocks);
        let mut changes = ChangeSet::new();
        let mut expired = Vec::new();
        for mut order in ctx.store.open_orders()? {
            if order.expiry_height <= cutoff {
                order.transition_to(OrderStatus::Expired)?;
                expired.push(order.id);
                changes.update(order);
            }
        }
        if !changes.is_empty() {
            ctx.commit(changes)?;
            info!(count = expired.len(), cutoff, "stale orders expired");
        }
        Ok(expired)
    }

    /// Match one bucket until nothing admissible crosses. Caller holds the
    /// matching lock.
    fn match_bucket(&self, bucket: OrderBucket) -> Result<MatchReport> {
        let ctx = &self.ctx;
        let open = ctx
            .store
            .open_orders()?
            .into_iter()
            .filter(|o| o.bucket() == bucket);
        let mut book = OrderBook::from_orders(bucket, open)?;
        let mut excluded = HashSet::new();
        let mut report = MatchReport::default();

        while let Some(fill) = next_fill(&book, &excluded, ctx.config.limits.dust_size) {
            let terms = ContractTerms {
                kind: bucket.kind,
                strike_rate: fill.strike_rate,
                expiry_height: bucket.expiry_height,
                size: fill.size,
            };
            let staged = self
                .contracts
                .stage_contract(fill.buy.user_id, fill.sell.user_id, terms)
                .and_then(|(contract, mut changes)| {
                    let mut buy = fill.buy.clone();
                    let mut sell = fill.sell.clone();
                    buy.mark_matched(sell.id, contract.id)?;
                    sell.mark_matched(buy.id, contract.id)?;
                    changes.update(buy).update(sell);
                    if let Some(residual) = &fill.residual {
                        changes.insert(residual.clone());
                    }
                    ctx.commit(changes)?;
                    Ok(contract)
                });
            match staged {
                Ok(contract) => {
                    book.apply_fill(&fill)?;
                    info!(
                        %bucket,
                        buy = %fill.buy.id,
                        sell = %fill.sell.id,
                        contract_id = %contract.id,
                        size = %fill.size,
                        strike = %fill.strike_rate,
                        residual = ?fill.residual.as_ref().map(|r| r.id),
                        "orders matched"
                    );
                    report.contracts.push(contract.id);
                }
                Err(err) => {
                    warn!(
                        %bucket,
                        buy = %fill.buy.id,
                        sell = %fill.sell.id,
                        %err,
                        "contract creation failed, orders stay open"
                    );
                    excluded.insert(fill.pair());
                    report.skipped += 1;
                }
            }
        }
        Ok(report)
    }

    /// Cancel an OPEN order. Only its owner may.
    pub fn cancel_order(&self, order_id: OrderId, user: UserId) -> Result<Order> {
        let ctx = &self.ctx;
        let _pass = self.matching.lock();
        let mut order = ctx.order(order_id)?;
        if order.user_id != user {
            return Err(HashPerpError::NotOrderOwner {
                order_id,
                user_id: user,
            });
        }
        order.transition_to(OrderStatus::Canceled)?;
        let mut changes = ChangeSet::new();
        changes.update(order.clone());
        ctx.commit(changes)?;
        info!(%order_id, %user, "order canceled");
        Ok(order)
    }

    pub fn get_order(&self, order_id: OrderId) -> Result<Order> {
        self.ctx.order(order_id)
    }

    pub fn orders_by_user(&self, user: UserId, status: Option<OrderStatus>) -> Result<Vec<Order>> {
        let mut orders = self.ctx.store.orders_by_user(&user)?;
        if let Some(status) = status {
            orders.retain(|o| o.status == status);
        }
        Ok(orders)
    }

    pub fn get_order_book(&self, kind: ContractKind, expiry_height: u64) -> Result<OrderBookSnapshot> {
        let bucket = OrderBucket {
            kind,
            expiry_height,
        };
        let open = self
            .ctx
            .store
            .open_orders()?
            .into_iter()
            .filter(|o| o.bucket() == bucket);
        let book = OrderBook::from_orders(bucket, open)?;
        Ok(OrderBookSnapshot {
            bucket,
            bids: book.bids_in_priority().cloned().collect(),
            asks: book.asks_in_priority().cloned().collect(),
        })
    }
}
