//! Swap-offer protocol: simple offers, direct offers, expiry, market data
//! and the two-step position swap with its compensation path.

mod common;

use std::thread;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use common::{Harness, Party};
use hashperp_types::{
    Contract, ErrorKind, HashPerpError, LedgerKind, Position, SwapKind, SwapOffer,
    SwapOfferStatus,
};
use rust_decimal::Decimal;

fn rate(units: i64) -> Decimal {
    Decimal::new(units, 3)
}

/// Alice requests to swap sides with Bob; returns the offer and Bob's
/// acceptance signature over the current buyer VTXO.
fn request_position_swap(
    h: &Harness,
    contract: &Contract,
    alice: &Party,
    bob: &Party,
) -> (SwapOffer, Vec<u8>) {
    let seller_vtxo = contract.seller_vtxo.expect("seller vtxo");
    let offer = h
        .service
        .request_contract_position_swap(
            contract.id,
            alice.id,
            rate(2),
            None,
            &alice.sign_swap(seller_vtxo, contract.id),
        )
        .expect("request position swap");
    let buyer_vtxo = h
        .service
        .get_contract(contract.id)
        .expect("contract")
        .buyer_vtxo
        .expect("buyer vtxo");
    (offer, bob.sign_swap(buyer_vtxo, contract.id))
}

#[test]
fn new_offer_supersedes_the_open_one_on_the_same_vtxo() {
    let h = Harness::new();
    let (alice, bob) = (h.party(), h.party());
    let contract = h.call_contract(&alice, &bob, 1_000);
    let v1 = contract.buyer_vtxo.expect("buyer vtxo");

    let first = h.service.create_swap_offer(alice.id, v1, rate(10), None).expect("first");
    assert_eq!(first.status, SwapOfferStatus::Open);
    let second = h.service.create_swap_offer(alice.id, v1, rate(12), None).expect("second");

    assert_eq!(
        h.service.get_swap_offer(first.id).expect("first").status,
        SwapOfferStatus::Canceled
    );
    assert_eq!(
        h.service.get_swap_offer(second.id).expect("second").status,
        SwapOfferStatus::Open
    );
    assert_eq!(h.service.open_offers_count(contract.id).expect("count"), 1);
    assert_eq!(h.service.swap_offers_by_contract(contract.id).expect("all").len(), 2);
}

#[test]
fn only_the_owner_may_offer_a_vtxo() {
    let h = Harness::new();
    let (alice, bob) = (h.party(), h.party());
    let contract = h.call_contract(&alice, &bob, 1_000);
    let v1 = contract.buyer_vtxo.expect("buyer vtxo");

    let err = h.service.create_swap_offer(bob.id, v1, rate(10), None).unwrap_err();
    assert!(matches!(err, HashPerpError::NotVtxoOwner { .. }));

    let err = h.service.create_swap_offer(alice.id, v1, Decimal::ZERO, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameters);

    let past = Utc::now() - Duration::seconds(5);
    let err = h.service.create_swap_offer(alice.id, v1, rate(10), Some(past)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameters);
}

#[test]
fn accepting_an_offer_moves_the_vtxo() {
    let h = Harness::new();
    let (alice, bob, carol, dave) = (h.party(), h.party(), h.party(), h.party());
    let contract = h.call_contract(&alice, &bob, 1_000);
    let v1 = contract.buyer_vtxo.expect("buyer vtxo");
    let offer = h.service.create_swap_offer(alice.id, v1, rate(10), None).expect("offer");

    let err = h
        .service
        .accept_swap_offer(offer.id, alice.id, &alice.sign_swap(v1, contract.id))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameters);

    let successor = h
        .service
        .accept_swap_offer(offer.id, carol.id, &carol.sign_swap(v1, contract.id))
        .expect("accept");
    assert_eq!(successor.owner_id, carol.id);
    assert_eq!(successor.swapped_from, Some(v1));

    let accepted = h.service.get_swap_offer(offer.id).expect("offer");
    assert_eq!(accepted.status, SwapOfferStatus::Accepted);
    assert_eq!(accepted.acceptor_id, Some(carol.id));
    assert!(accepted.accepted_at.is_some());

    let swap = &h.ledger_of_kind(contract.id, LedgerKind::VtxoSwap)[0];
    assert_eq!(swap.related["swap_offer_id"], offer.id.to_string());
    assert_eq!(swap.related["offered_rate"], rate(10).to_string());

    let err = h
        .service
        .accept_swap_offer(offer.id, dave.id, &dave.sign_swap(v1, contract.id))
        .unwrap_err();
    assert!(matches!(err, HashPerpError::InvalidOfferStatus { .. }));

    assert_eq!(h.service.swap_offers_by_user(alice.id, true).expect("offeror").len(), 1);
    assert_eq!(h.service.swap_offers_by_user(carol.id, false).expect("acceptor").len(), 1);
}

#[test]
fn bad_acceptance_signature_leaves_the_offer_open() {
    let h = Harness::new();
    let (alice, bob, carol) = (h.party(), h.party(), h.party());
    let contract = h.call_contract(&alice, &bob, 1_000);
    let v1 = contract.buyer_vtxo.expect("buyer vtxo");
    let offer = h.service.create_swap_offer(alice.id, v1, rate(10), None).expect("offer");

    let err = h
        .service
        .accept_swap_offer(offer.id, carol.id, &alice.sign_swap(v1, contract.id))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidSignature);
    assert_eq!(
        h.service.get_swap_offer(offer.id).expect("offer").status,
        SwapOfferStatus::Open
    );
    assert!(h.service.get_vtxo(v1).expect("vtxo").active);
}

#[test]
fn offer_on_a_moved_vtxo_is_canceled_on_access() {
    let h = Harness::new();
    let (alice, bob, carol, dave) = (h.party(), h.party(), h.party(), h.party());
    let contract = h.call_contract(&alice, &bob, 1_000);
    let v1 = contract.buyer_vtxo.expect("buyer vtxo");
    let offer = h.service.create_swap_offer(alice.id, v1, rate(10), None).expect("offer");

    h.service
        .swap_vtxo(v1, carol.id, &carol.sign_swap(v1, contract.id))
        .expect("direct swap");

    let err = h
        .service
        .accept_swap_offer(offer.id, dave.id, &dave.sign_swap(v1, contract.id))
        .unwrap_err();
    assert!(matches!(err, HashPerpError::VtxoNotActive(id) if id == v1));
    assert_eq!(
        h.service.get_swap_offer(offer.id).expect("offer").status,
        SwapOfferStatus::Canceled
    );
}

#[test]
fn expired_offers_cannot_be_accepted() {
    let h = Harness::new();
    let (alice, bob, carol) = (h.party(), h.party(), h.party());
    let contract = h.call_contract(&alice, &bob, 1_000);
    let (v1, v2) = (
        contract.buyer_vtxo.expect("buyer vtxo"),
        contract.seller_vtxo.expect("seller vtxo"),
    );
    let soon = Utc::now() + Duration::milliseconds(150);
    let accessed = h.service.create_swap_offer(alice.id, v1, rate(10), Some(soon)).expect("offer");
    let swept = h.service.create_swap_offer(bob.id, v2, rate(11), Some(soon)).expect("offer");

    thread::sleep(StdDuration::from_millis(250));

    let err = h
        .service
        .accept_swap_offer(accessed.id, carol.id, &carol.sign_swap(v1, contract.id))
        .unwrap_err();
    assert!(matches!(err, HashPerpError::SwapOfferExpired(id) if id == accessed.id));
    assert_eq!(
        h.service.get_swap_offer(accessed.id).expect("offer").status,
        SwapOfferStatus::Expired
    );

    assert_eq!(h.service.cleanup_expired_offers().expect("cleanup"), 1);
    assert_eq!(
        h.service.get_swap_offer(swept.id).expect("offer").status,
        SwapOfferStatus::Expired
    );
    assert_eq!(h.service.cleanup_expired_offers().expect("cleanup"), 0);
}

#[test]
fn direct_offer_admits_only_its_target() {
    let h = Harness::new();
    let (alice, bob, carol, dave) = (h.party(), h.party(), h.party(), h.party());
    let contract = h.call_contract(&alice, &bob, 1_000);
    let v1 = contract.buyer_vtxo.expect("buyer vtxo");

    let err = h
        .service
        .create_direct_swap_offer(alice.id, v1, rate(10), None, alice.id)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameters);

    let offer = h
        .service
        .create_direct_swap_offer(alice.id, v1, rate(10), None, carol.id)
        .expect("direct offer");
    assert_eq!(offer.target_user, Some(carol.id));

    let err = h
        .service
        .accept_swap_offer(offer.id, dave.id, &dave.sign_swap(v1, contract.id))
        .unwrap_err();
    assert!(matches!(err, HashPerpError::NotOfferParty { .. }));

    let err = h.service.reject_swap_offer(offer.id, dave.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);

    let rejected = h.service.reject_swap_offer(offer.id, carol.id).expect("reject");
    assert_eq!(rejected.status, SwapOfferStatus::Rejected);
    assert!(h.service.get_vtxo(v1).expect("vtxo").active);
}

#[test]
fn only_the_offeror_cancels() {
    let h = Harness::new();
    let (alice, bob) = (h.party(), h.party());
    let contract = h.call_contract(&alice, &bob, 1_000);
    let v1 = contract.buyer_vtxo.expect("buyer vtxo");
    let offer = h.service.create_swap_offer(alice.id, v1, rate(10), None).expect("offer");

    let err = h.service.cancel_swap_offer(offer.id, bob.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);

    let canceled = h.service.cancel_swap_offer(offer.id, alice.id).expect("cancel");
    assert_eq!(canceled.status, SwapOfferStatus::Canceled);

    let err = h.service.cancel_swap_offer(offer.id, alice.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[test]
fn market_data_summarises_open_offers() {
    let h = Harness::new();
    let (alice, bob, carol) = (h.party(), h.party(), h.party());
    let contract = h.call_contract(&alice, &bob, 1_000);
    let (v1, v2) = (
        contract.buyer_vtxo.expect("buyer vtxo"),
        contract.seller_vtxo.expect("seller vtxo"),
    );

    let sold = h.service.create_swap_offer(alice.id, v1, rate(8), None).expect("offer");
    h.service
        .accept_swap_offer(sold.id, carol.id, &carol.sign_swap(v1, contract.id))
        .expect("accept");
    let v1_now = h
        .service
        .get_contract(contract.id)
        .expect("contract")
        .buyer_vtxo
        .expect("buyer vtxo");
    h.service.create_swap_offer(carol.id, v1_now, rate(10), None).expect("offer");
    h.service.create_swap_offer(bob.id, v2, rate(14), None).expect("offer");

    let data = h.service.swap_offer_market_data(contract.id).expect("market data");
    assert_eq!(data.open_offers, 2);
    assert_eq!(data.highest_rate, Some(rate(14)));
    assert_eq!(data.lowest_rate, Some(rate(10)));
    assert_eq!(data.average_rate, Some(rate(12)));
    assert_eq!(data.median_rate, Some(rate(12)));
    assert_eq!(data.accepted_volume_24h, rate(8));
    assert_eq!((data.buyer_side_offers, data.seller_side_offers), (1, 1));
}

#[test]
fn position_swap_exchanges_sides() {
    let h = Harness::new();
    let (alice, bob) = (h.party(), h.party());
    let contract = h.call_contract(&alice, &bob, 1_000);
    let (offer, bob_signature) = request_position_swap(&h, &contract, &alice, &bob);
    assert_eq!(offer.kind, SwapKind::PositionSwap);
    assert_eq!(offer.target_user, Some(bob.id));

    let accepted = h
        .service
        .accept_position_swap(offer.id, bob.id, &bob_signature)
        .expect("accept");
    assert_eq!(accepted.status, SwapOfferStatus::Accepted);
    assert_eq!(accepted.acceptor_id, Some(bob.id));

    let swapped = h.service.get_contract(contract.id).expect("contract");
    assert_eq!((swapped.buyer_id, swapped.seller_id), (bob.id, alice.id));
    for position in [Position::Buyer, Position::Seller] {
        let vtxo = h
            .service
            .get_vtxo(swapped.vtxo(position).expect("bound"))
            .expect("vtxo");
        assert!(vtxo.active);
        assert_eq!(vtxo.owner_id, swapped.party(position));
    }
    assert_eq!(h.service.active_vtxo_count(contract.id).expect("count"), 2);

    let entry = &h.ledger_of_kind(contract.id, LedgerKind::PositionSwap)[0];
    assert_eq!(entry.related["requester"], alice.id.to_string());
    assert_eq!(entry.related["acceptor"], bob.id.to_string());
    assert_eq!(
        entry.related["requester_old_vtxo"],
        contract.buyer_vtxo.expect("buyer vtxo").to_string()
    );
    assert_eq!(h.ledger_of_kind(contract.id, LedgerKind::VtxoSwap).len(), 2);
}

#[test]
fn a_vtxo_carries_at_most_one_open_offer() {
    let h = Harness::new();
    let (alice, bob) = (h.party(), h.party());
    let contract = h.call_contract(&alice, &bob, 1_000);
    let alice_vtxo = contract.buyer_vtxo.expect("buyer vtxo");

    let simple = h
        .service
        .create_swap_offer(alice.id, alice_vtxo, rate(10), None)
        .expect("simple offer");
    let (request, _) = request_position_swap(&h, &contract, &alice, &bob);
    assert_eq!(
        h.service.get_swap_offer(simple.id).expect("simple").status,
        SwapOfferStatus::Canceled
    );

    let seller_vtxo = contract.seller_vtxo.expect("seller vtxo");
    let err = h
        .service
        .request_contract_position_swap(
            contract.id,
            alice.id,
            rate(3),
            None,
            &alice.sign_swap(seller_vtxo, contract.id),
        )
        .unwrap_err();
    assert!(matches!(err, HashPerpError::Duplicate { .. }));
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(h.service.open_offers_count(contract.id).expect("count"), 1);

    let replacement = h
        .service
        .create_swap_offer(alice.id, alice_vtxo, rate(11), None)
        .expect("replacement");
    assert_eq!(
        h.service.get_swap_offer(request.id).expect("request").status,
        SwapOfferStatus::Canceled
    );
    assert_eq!(replacement.status, SwapOfferStatus::Open);
    assert_eq!(h.service.open_offers_count(contract.id).expect("count"), 1);
}

#[test]
fn position_swap_is_only_for_the_counterparty() {
    let h = Harness::new();
    let (alice, bob, carol) = (h.party(), h.party(), h.party());
    let contract = h.call_contract(&alice, &bob, 1_000);

    let err = h
        .service
        .request_contract_position_swap(
            contract.id,
            carol.id,
            rate(1),
            None,
            &carol.sign_swap(contract.seller_vtxo.expect("seller vtxo"), contract.id),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);

    let (offer, _) = request_position_swap(&h, &contract, &alice, &bob);
    let buyer_vtxo = contract.buyer_vtxo.expect("buyer vtxo");
    let err = h
        .service
        .accept_position_swap(offer.id, carol.id, &carol.sign_swap(buyer_vtxo, contract.id))
        .unwrap_err();
    assert!(matches!(err, HashPerpError::NotOfferParty { .. }));

    let err = h
        .service
        .accept_swap_offer(offer.id, bob.id, &bob.sign_swap(buyer_vtxo, contract.id))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameters);
}

#[test]
fn failed_second_step_is_compensated_and_can_be_retried() {
    let h = Harness::new();
    let (alice, bob) = (h.party(), h.party());
    let contract = h.call_contract(&alice, &bob, 1_000);
    let (offer, bob_signature) = request_position_swap(&h, &contract, &alice, &bob);

    // step 1 commits, step 2 fails, the compensation commits
    h.store.fail_commits(1, 1);
    let err = h
        .service
        .accept_position_swap(offer.id, bob.id, &bob_signature)
        .unwrap_err();
    assert!(matches!(err, HashPerpError::Persistence(_)));

    let restored = h.service.get_contract(contract.id).expect("contract");
    assert_eq!((restored.buyer_id, restored.seller_id), (alice.id, bob.id));
    assert_eq!(restored.seller_vtxo, contract.seller_vtxo);
    let buyer_vtxo = h
        .service
        .get_vtxo(restored.buyer_vtxo.expect("buyer vtxo"))
        .expect("vtxo");
    assert!(buyer_vtxo.active);
    assert_eq!(buyer_vtxo.owner_id, alice.id);
    assert_eq!(
        h.service.get_swap_offer(offer.id).expect("offer").status,
        SwapOfferStatus::Open
    );
    assert!(h.ledger_of_kind(contract.id, LedgerKind::PositionSwap).is_empty());

    // the retry needs Bob's signature over the compensated VTXO
    let retry_signature = bob.sign_swap(buyer_vtxo.id, contract.id);
    h.service
        .accept_position_swap(offer.id, bob.id, &retry_signature)
        .expect("retry");
    let swapped = h.service.get_contract(contract.id).expect("contract");
    assert_eq!((swapped.buyer_id, swapped.seller_id), (bob.id, alice.id));
    assert_eq!(
        h.service.get_swap_offer(offer.id).expect("offer").status,
        SwapOfferStatus::Accepted
    );
}

#[test]
fn failed_compensation_reports_inconsistency() {
    let h = Harness::new();
    let (alice, bob) = (h.party(), h.party());
    let contract = h.call_contract(&alice, &bob, 1_000);
    let (offer, bob_signature) = request_position_swap(&h, &contract, &alice, &bob);

    h.store.fail_commits(1, 2);
    let err = h
        .service
        .accept_position_swap(offer.id, bob.id, &bob_signature)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Inconsistent);
    let HashPerpError::Inconsistent {
        operation,
        entities,
        ..
    } = err
    else {
        panic!("expected an inconsistency");
    };
    assert_eq!(operation, "position_swap");
    assert!(entities.contains(&offer.id.to_string()));
    assert!(entities.contains(&contract.id.to_string()));
}
