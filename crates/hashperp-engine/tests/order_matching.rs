//! Order placement and matching: crossing orders become contracts,
//! partial fills leave a residual, and the book keeps price-time priority.

mod common;

use common::{Harness, Party, START_HEIGHT};
use hashperp_types::{ContractKind, ContractStatus, ErrorKind, Order, OrderSide, OrderStatus};
use rust_decimal::Decimal;

const EXPIRY: u64 = START_HEIGHT + 1_000;

fn place(h: &Harness, party: &Party, side: OrderSide, rate_units: i64, size: Decimal) -> Order {
    h.service
        .place_order(
            party.id,
            side,
            ContractKind::Call,
            Decimal::new(rate_units, 5),
            EXPIRY,
            size,
        )
        .expect("place order")
}

#[test]
fn crossing_orders_open_a_contract() {
    let h = Harness::new();
    let (alice, bob) = (h.party(), h.party());

    let buy = place(&h, &alice, OrderSide::Buy, 10, Decimal::ONE);
    assert_eq!(buy.status, OrderStatus::Open);
    let sell = place(&h, &bob, OrderSide::Sell, 9, Decimal::ONE);
    assert_eq!(sell.status, OrderStatus::Matched);

    let buy = h.service.get_order(buy.id).expect("buy");
    assert_eq!(buy.status, OrderStatus::Matched);
    assert_eq!(buy.matched_order, Some(sell.id));
    assert_eq!(sell.matched_order, Some(buy.id));
    assert_eq!(buy.contract_id, sell.contract_id);

    let contract = h
        .service
        .get_contract(buy.contract_id.expect("contract"))
        .expect("contract");
    assert_eq!(contract.status, ContractStatus::Active);
    assert_eq!(contract.size, Decimal::ONE);
    assert_eq!(contract.strike_rate, Decimal::new(10, 5));
    assert_eq!(contract.expiry_height, EXPIRY);
    assert_eq!((contract.buyer_id, contract.seller_id), (alice.id, bob.id));
    assert_eq!(h.service.active_vtxo_count(contract.id).expect("count"), 2);

    let book = h
        .service
        .get_order_book(ContractKind::Call, EXPIRY)
        .expect("book");
    assert!(book.bids.is_empty() && book.asks.is_empty());
}

#[test]
fn remainder_below_dust_is_not_rested() {
    let h = Harness::new();
    let (alice, bob) = (h.party(), h.party());

    let buy = place(&h, &alice, OrderSide::Buy, 10, Decimal::new(10_005, 4));
    let sell = place(&h, &bob, OrderSide::Sell, 10, Decimal::ONE);
    assert_eq!(sell.status, OrderStatus::Matched);

    let buy = h.service.get_order(buy.id).expect("buy");
    assert_eq!(buy.status, OrderStatus::Matched);
    let contract = h
        .service
        .get_contract(buy.contract_id.expect("contract"))
        .expect("contract");
    assert_eq!(contract.size, Decimal::ONE);

    assert!(h
        .service
        .orders_by_user(alice.id, Some(OrderStatus::Open))
        .expect("open orders")
        .is_empty());
    let book = h
        .service
        .get_order_book(ContractKind::Call, EXPIRY)
        .expect("book");
    assert!(book.bids.is_empty() && book.asks.is_empty());
}

#[test]
fn sizes_must_split_into_whole_satoshis() {
    let h = Harness::new();
    let alice = h.party();
    let err = h
        .service
        .place_order(
            alice.id,
            OrderSide::Buy,
            ContractKind::Call,
            Decimal::new(10, 5),
            EXPIRY,
            Decimal::new(123_456_789, 9),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameters);
    assert!(h
        .service
        .orders_by_user(alice.id, None)
        .expect("orders")
        .is_empty());

    // 0.50000002 per side
    let order = place(&h, &alice, OrderSide::Buy, 10, Decimal::new(100_000_004, 8));
    assert_eq!(order.status, OrderStatus::Open);
}

#[test]
fn partial_fill_leaves_a_residual_in_the_book() {
    let h = Harness::new();
    let (alice, bob, carol) = (h.party(), h.party(), h.party());

    let buy = place(&h, &alice, OrderSide::Buy, 10, Decimal::ONE);
    let sell = place(&h, &bob, OrderSide::Sell, 9, Decimal::new(4, 1));
    assert_eq!(sell.status, OrderStatus::Matched);

    let contract = h
        .service
        .get_contract(sell.contract_id.expect("contract"))
        .expect("contract");
    assert_eq!(contract.size, Decimal::new(4, 1));

    let open = h
        .service
        .orders_by_user(alice.id, Some(OrderStatus::Open))
        .expect("open orders");
    assert_eq!(open.len(), 1);
    let residual = &open[0];
    assert_eq!(residual.size, Decimal::new(6, 1));
    assert_eq!(residual.residual_of, Some(buy.id));
    assert_eq!(residual.sequence, buy.sequence);
    assert_eq!(
        h.service.get_order(buy.id).expect("buy").status,
        OrderStatus::Matched
    );

    let rest = place(&h, &carol, OrderSide::Sell, 10, Decimal::new(6, 1));
    assert_eq!(rest.status, OrderStatus::Matched);
    assert_eq!(
        h.service.get_order(residual.id).expect("residual").status,
        OrderStatus::Matched
    );
    assert_eq!(h.service.contracts_by_user(alice.id, None).expect("contracts").len(), 2);
}

#[test]
fn equal_prices_fill_in_arrival_order() {
    let h = Harness::new();
    let (alice, carol, dave) = (h.party(), h.party(), h.party());

    let first = place(&h, &carol, OrderSide::Sell, 9, Decimal::ONE);
    let second = place(&h, &dave, OrderSide::Sell, 9, Decimal::ONE);
    let buy = place(&h, &alice, OrderSide::Buy, 10, Decimal::ONE);

    assert_eq!(buy.matched_order, Some(first.id));
    assert_eq!(
        h.service.get_order(second.id).expect("second").status,
        OrderStatus::Open
    );
}

#[test]
fn own_orders_never_cross() {
    let h = Harness::new();
    let (alice, bob) = (h.party(), h.party());

    let buy = place(&h, &alice, OrderSide::Buy, 10, Decimal::ONE);
    let own_sell = place(&h, &alice, OrderSide::Sell, 9, Decimal::ONE);
    assert_eq!(own_sell.status, OrderStatus::Open);
    assert!(h.service.contracts_by_user(alice.id, None).expect("contracts").is_empty());

    let sell = place(&h, &bob, OrderSide::Sell, 9, Decimal::ONE);
    assert_eq!(sell.matched_order, Some(buy.id));
    assert_eq!(
        h.service.get_order(own_sell.id).expect("own sell").status,
        OrderStatus::Open
    );
}

#[test]
fn book_lists_open_orders_by_priority() {
    let h = Harness::new();
    let (alice, bob) = (h.party(), h.party());

    let low = place(&h, &alice, OrderSide::Buy, 9, Decimal::ONE);
    let high = place(&h, &alice, OrderSide::Buy, 10, Decimal::ONE);
    let ask = place(&h, &bob, OrderSide::Sell, 12, Decimal::ONE);

    let book = h
        .service
        .get_order_book(ContractKind::Call, EXPIRY)
        .expect("book");
    let bids: Vec<_> = book.bids.iter().map(|o| o.id).collect();
    assert_eq!(bids, vec![high.id, low.id]);
    assert_eq!(book.asks.len(), 1);
    assert_eq!(book.asks[0].id, ask.id);

    let other = h
        .service
        .get_order_book(ContractKind::Put, EXPIRY)
        .expect("book");
    assert!(other.bids.is_empty() && other.asks.is_empty());
}

#[test]
fn only_the_owner_cancels_an_open_order() {
    let h = Harness::new();
    let (alice, bob) = (h.party(), h.party());
    let buy = place(&h, &alice, OrderSide::Buy, 10, Decimal::ONE);

    let err = h.service.cancel_order(buy.id, bob.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);

    let canceled = h.service.cancel_order(buy.id, alice.id).expect("cancel");
    assert_eq!(canceled.status, OrderStatus::Canceled);

    let err = h.service.cancel_order(buy.id, alice.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    // a canceled bid no longer crosses
    let sell = place(&h, &bob, OrderSide::Sell, 9, Decimal::ONE);
    assert_eq!(sell.status, OrderStatus::Open);
}

#[test]
fn placement_validates_parameters() {
    let h = Harness::new();
    let alice = h.party();

    let err = h
        .service
        .place_order(
            alice.id,
            OrderSide::Buy,
            ContractKind::Call,
            Decimal::ZERO,
            EXPIRY,
            Decimal::ONE,
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameters);

    let err = h
        .service
        .place_order(
            alice.id,
            OrderSide::Buy,
            ContractKind::Call,
            Decimal::new(10, 5),
            START_HEIGHT + 5,
            Decimal::ONE,
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameters);
    assert!(h.service.orders_by_user(alice.id, None).expect("orders").is_empty());
}

#[test]
fn matching_pass_expires_orders_near_expiry() {
    let h = Harness::new();
    let alice = h.party();
    let near = h
        .service
        .place_order(
            alice.id,
            OrderSide::Buy,
            ContractKind::Call,
            Decimal::new(10, 5),
            START_HEIGHT + 100,
            Decimal::ONE,
        )
        .expect("place");
    let far = place(&h, &alice, OrderSide::Buy, 10, Decimal::ONE);

    h.chain.advance(1);
    let report = h.service.match_orders().expect("match");
    assert_eq!(report.expired, vec![near.id]);
    assert!(report.contracts.is_empty());
    assert_eq!(
        h.service.get_order(near.id).expect("near").status,
        OrderStatus::Expired
    );
    assert_eq!(
        h.service.get_order(far.id).expect("far").status,
        OrderStatus::Open
    );
}

#[test]
fn failed_contract_creation_keeps_orders_open_for_the_next_pass() {
    let h = Harness::new();
    let (alice, bob) = (h.party(), h.party());
    let buy = place(&h, &alice, OrderSide::Buy, 10, Decimal::ONE);

    // the sell order lands, the fill's commit does not
    h.store.fail_commits(1, 1);
    let sell = place(&h, &bob, OrderSide::Sell, 9, Decimal::ONE);
    assert_eq!(sell.status, OrderStatus::Open);
    assert_eq!(
        h.service.get_order(buy.id).expect("buy").status,
        OrderStatus::Open
    );
    assert!(h.service.contracts_by_user(alice.id, None).expect("contracts").is_empty());

    let report = h.service.match_orders().expect("match");
    assert_eq!(report.contracts.len(), 1);
    assert_eq!(report.skipped, 0);
    let json = serde_json::to_value(&report).expect("report json");
    assert_eq!(json["contracts"].as_array().map(Vec::len), Some(1));
    assert_eq!(
        h.service.get_order(sell.id).expect("sell").status,
        OrderStatus::Matched
    );
}
