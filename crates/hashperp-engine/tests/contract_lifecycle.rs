//! Contract lifecycle through the service: creation, settlement at expiry,
//! exit paths and rollover, against the simulated chain.

mod common;

use common::{Harness, START_HEIGHT, hash_rate_for_0_00012, strike};
use hashperp_engine::ContractTerms;
use hashperp_types::{
    ContractKind, ContractStatus, ErrorKind, ExitPath, HashPerpError, LedgerKind, LedgerStatus,
    Position, UserId,
};
use rust_decimal::Decimal;

#[test]
fn created_contract_is_active_with_both_vtxos() {
    let h = Harness::new();
    let (alice, bob) = (h.party(), h.party());

    let contract = h.call_contract(&alice, &bob, 1_000);

    assert_eq!(contract.status, ContractStatus::Active);
    let vtxos = h.service.vtxos_for_settlement(contract.id).expect("vtxos");
    assert_eq!(vtxos.len(), 2);
    for vtxo in &vtxos {
        assert!(vtxo.active);
        assert_eq!(vtxo.amount, Decimal::new(5, 1));
    }
    assert_eq!(h.service.active_vtxo_count(contract.id).expect("count"), 2);

    let creation = h.ledger_of_kind(contract.id, LedgerKind::ContractCreation);
    assert_eq!(creation.len(), 1);
    assert_eq!(creation[0].user_ids, vec![alice.id, bob.id]);

    let by_alice = h
        .service
        .contracts_by_user(alice.id, Some(ContractStatus::Active))
        .expect("by user");
    assert_eq!(by_alice.len(), 1);
    assert!(
        h.service
            .contracts_by_user(alice.id, Some(ContractStatus::Settled))
            .expect("by user")
            .is_empty()
    );
}

#[test]
fn creation_rejects_bad_parameters() {
    let h = Harness::new();
    let (alice, bob) = (h.party(), h.party());

    let err = h
        .service
        .create_contract(alice.id, alice.id, Harness::terms(ContractKind::Call, 1_000))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameters);

    let dust = ContractTerms {
        size: Decimal::new(1, 4),
        ..Harness::terms(ContractKind::Call, 1_000)
    };
    let err = h.service.create_contract(alice.id, bob.id, dust).unwrap_err();
    assert!(matches!(err, HashPerpError::InvalidParameters { field: "size", .. }));

    // 0.500000005 BTC per side
    let sub_satoshi = ContractTerms {
        size: Decimal::new(100_000_001, 8),
        ..Harness::terms(ContractKind::Call, 1_000)
    };
    let err = h.service.create_contract(alice.id, bob.id, sub_satoshi).unwrap_err();
    assert!(matches!(err, HashPerpError::InvalidParameters { field: "size", .. }));

    let too_soon = Harness::terms(ContractKind::Call, 10);
    let err = h.service.create_contract(alice.id, bob.id, too_soon).unwrap_err();
    assert!(matches!(err, HashPerpError::InvalidParameters { field: "expiry_height", .. }));

    let stranger = UserId::new();
    let err = h
        .service
        .create_contract(alice.id, stranger, Harness::terms(ContractKind::Call, 1_000))
        .unwrap_err();
    assert!(matches!(err, HashPerpError::PublicKeyNotFound(id) if id == stranger));
    assert_eq!(h.store.ledger_len(), 0);
}

#[test]
fn call_buyer_wins_when_metric_above_strike() {
    let h = Harness::new();
    let (alice, bob) = (h.party(), h.party());
    let contract = h.call_contract(&alice, &bob, 1_000);

    h.chain.set_hash_rate(START_HEIGHT, hash_rate_for_0_00012());
    h.chain.set_height(contract.expiry_height);
    let settled = h.service.settle_contract(contract.id).expect("settle");

    assert_eq!(settled.status, ContractStatus::Settled);
    assert_eq!(settled.settlement_rate, Some(Decimal::new(12, 5)));
    assert!(settled.completed_at.is_some());

    let txid = settled.settlement_txid.expect("settlement txid");
    let tx = h.chain.transaction(&txid).expect("settlement on chain");
    assert_eq!(tx.output.len(), 1);
    assert_eq!(tx.output[0].value.to_sat(), 100_000_000);
    assert_eq!(h.chain.broadcasts().len(), 3);

    let entry = &h.ledger_of_kind(contract.id, LedgerKind::ContractSettlement)[0];
    assert_eq!(entry.related["winner_id"], alice.id.to_string());
    assert_eq!(entry.related["loser_id"], bob.id.to_string());
    assert_eq!(entry.txid, Some(txid));

    for vtxo in h.service.vtxos_by_contract(contract.id).expect("vtxos") {
        assert!(!vtxo.active);
    }

    let err = h.service.settle_contract(contract.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[test]
fn put_at_strike_goes_to_seller() {
    let h = Harness::new();
    let (alice, bob) = (h.party(), h.party());
    let terms = ContractTerms {
        strike_rate: Decimal::new(12, 5),
        ..Harness::terms(ContractKind::Put, 500)
    };
    let contract = h.service.create_contract(alice.id, bob.id, terms).expect("create");

    h.chain.set_hash_rate(START_HEIGHT, hash_rate_for_0_00012());
    h.chain.set_height(contract.expiry_height + 3);
    h.service.settle_contract(contract.id).expect("settle");

    let entry = &h.ledger_of_kind(contract.id, LedgerKind::ContractSettlement)[0];
    assert_eq!(entry.related["winner_id"], bob.id.to_string());
}

#[test]
fn settlement_waits_for_expiry() {
    let h = Harness::new();
    let (alice, bob) = (h.party(), h.party());
    let contract = h.call_contract(&alice, &bob, 1_000);

    let err = h.service.settle_contract(contract.id).unwrap_err();
    assert!(matches!(err, HashPerpError::SettlementNotDue { .. }));
    assert!(h.chain.broadcasts().is_empty());
}

#[test]
fn settlement_oracle_outage_leaves_contract_untouched() {
    let h = Harness::new();
    let (alice, bob) = (h.party(), h.party());
    let contract = h.call_contract(&alice, &bob, 1_000);
    h.chain.set_height(contract.expiry_height);

    h.chain.fail_reads(1);
    let err = h.service.settle_contract(contract.id).unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(err.kind(), ErrorKind::OracleUnavailable);
    assert_eq!(
        h.service.get_contract(contract.id).expect("get").status,
        ContractStatus::Active
    );

    h.service.settle_contract(contract.id).expect("retry settles");
}

#[test]
fn rejected_broadcast_is_retried_without_duplicates() {
    let h = Harness::new();
    let (alice, bob) = (h.party(), h.party());
    let contract = h.call_contract(&alice, &bob, 1_000);
    h.chain.set_height(contract.expiry_height);

    h.chain.reject_broadcasts(1);
    let err = h.service.settle_contract(contract.id).unwrap_err();
    assert!(matches!(err, HashPerpError::BroadcastFailed { .. }));
    assert!(h.chain.broadcasts().is_empty());
    assert_eq!(
        h.service.get_contract(contract.id).expect("get").status,
        ContractStatus::Active
    );

    let settled = h.service.settle_contract(contract.id).expect("retry settles");
    assert_eq!(settled.status, ContractStatus::Settled);
    assert_eq!(h.chain.broadcasts().len(), 3);
}

#[test]
fn timed_out_broadcast_is_confirmed_through_the_chain() {
    let h = Harness::new();
    let (alice, bob) = (h.party(), h.party());
    let contract = h.call_contract(&alice, &bob, 1_000);
    h.chain.set_height(contract.expiry_height);

    h.chain.time_out_broadcasts(1);
    let settled = h.service.settle_contract(contract.id).expect("settle");
    assert_eq!(settled.status, ContractStatus::Settled);
    assert_eq!(h.chain.broadcasts().len(), 3);
}

#[test]
fn early_exit_pays_in_the_money_buyer() {
    let h = Harness::at_metric_0_00012();
    let (alice, bob) = (h.party(), h.party());
    let contract = h.call_contract(&alice, &bob, 1_000);

    let receipt = h.service.exit_contract(contract.id, alice.id).expect("exit");

    assert_eq!(receipt.path, ExitPath::EarlyExit);
    assert_eq!(receipt.initiator, alice.id);
    assert_eq!(receipt.settlement_amount, Some(Decimal::new(65, 2)));
    assert_eq!(receipt.exit_fee, Some(Decimal::new(5, 2)));
    assert_eq!(receipt.contract.status, ContractStatus::Exited);
    assert!(receipt.contract.buyer_exited && receipt.contract.seller_exited);

    let tx = h.chain.transaction(&receipt.exit_txid).expect("exit on chain");
    let values: Vec<u64> = tx.output.iter().map(|o| o.value.to_sat()).collect();
    assert_eq!(values, vec![65_000_000, 35_000_000]);

    let entry = &h.ledger_of_kind(contract.id, LedgerKind::ExitPathExecution)[0];
    assert_eq!(entry.status, Some(LedgerStatus::Completed));
    assert_eq!(entry.related["path_type"], "early_exit");
    assert_eq!(entry.related["reason"], "voluntary_early_exit");
    assert_eq!(entry.related["exit_initiator"], alice.id.to_string());
    assert_eq!(entry.rate, Some(Decimal::new(12, 5)));
}

#[test]
fn early_exit_out_of_the_money_seller_pays_fee() {
    let h = Harness::at_metric_0_00012();
    let (alice, bob) = (h.party(), h.party());
    let contract = h.call_contract(&alice, &bob, 1_000);

    let receipt = h.service.exit_contract(contract.id, bob.id).expect("exit");
    assert_eq!(receipt.settlement_amount, Some(Decimal::new(45, 2)));

    let tx = h.chain.transaction(&receipt.exit_txid).expect("exit on chain");
    let values: Vec<u64> = tx.output.iter().map(|o| o.value.to_sat()).collect();
    assert_eq!(values, vec![45_000_000, 55_000_000]);
}

#[test]
fn exit_requires_a_participant() {
    let h = Harness::new();
    let (alice, bob, carol) = (h.party(), h.party(), h.party());
    let contract = h.call_contract(&alice, &bob, 1_000);

    let err = h.service.exit_contract(contract.id, carol.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
}

#[test]
fn timelocked_exit_paths_open_on_schedule() {
    let h = Harness::new();
    let (alice, bob) = (h.party(), h.party());
    let contract = h.call_contract(&alice, &bob, 1_000);

    let err = h
        .service
        .execute_exit_path(contract.id, bob.id, ExitPath::ForcedSettlement)
        .unwrap_err();
    assert!(matches!(err, HashPerpError::ExitPathUnavailable { .. }));

    h.chain.set_height(contract.expiry_height + 100);
    let err = h
        .service
        .execute_exit_path(contract.id, bob.id, ExitPath::Timeout)
        .unwrap_err();
    assert!(matches!(err, HashPerpError::ExitPathUnavailable { ref path, .. } if path == "timeout"));

    h.chain.set_height(contract.expiry_height + 150);
    let receipt = h
        .service
        .execute_exit_path(contract.id, bob.id, ExitPath::Timeout)
        .expect("timeout exit");
    assert_eq!(receipt.settlement_amount, None);

    let tx = h.chain.transaction(&receipt.exit_txid).expect("exit on chain");
    let values: Vec<u64> = tx.output.iter().map(|o| o.value.to_sat()).collect();
    assert_eq!(values, vec![50_000_000, 50_000_000]);

    let entry = &h.ledger_of_kind(contract.id, LedgerKind::ExitPathExecution)[0];
    assert_eq!(entry.related["blocks_since_expiry"], "150");
    assert_eq!(entry.related["reason"], "settlement_timeout");
}

#[test]
fn cooperative_exit_paths_are_always_open() {
    let h = Harness::new();
    let (alice, bob) = (h.party(), h.party());

    for path in [
        ExitPath::MutualAgreement,
        ExitPath::DisputeResolution,
        ExitPath::EmergencyExit,
    ] {
        let contract = h.call_contract(&alice, &bob, 1_000);
        let receipt = h
            .service
            .execute_exit_path(contract.id, alice.id, path)
            .expect("exit");
        assert_eq!(receipt.contract.status, ContractStatus::Exited);

        let err = h
            .service
            .execute_exit_path(contract.id, alice.id, path)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }
}

#[test]
fn rollover_moves_collateral_to_a_new_contract() {
    let h = Harness::new();
    let (alice, bob) = (h.party(), h.party());
    let old = h.call_contract(&alice, &bob, 1_000);
    let new_expiry = old.expiry_height + 2_016;

    let next = h.service.rollover_contract(old.id, new_expiry).expect("rollover");

    assert_eq!(next.status, ContractStatus::Active);
    assert_eq!(next.expiry_height, new_expiry);
    assert_eq!(next.rolled_over_from, Some(old.id));
    assert_eq!(next.strike_rate, strike());
    assert_eq!((next.buyer_id, next.seller_id), (alice.id, bob.id));

    let old = h.service.get_contract(old.id).expect("old");
    assert_eq!(old.status, ContractStatus::RolledOver);
    assert_eq!(old.rolled_over_to, Some(next.id));

    for position in [Position::Buyer, Position::Seller] {
        let successor = h
            .service
            .get_vtxo(next.vtxo(position).expect("bound"))
            .expect("successor");
        let predecessor = successor.rolled_from.expect("rolled from");
        let predecessor = h.service.get_vtxo(predecessor).expect("predecessor");
        assert!(successor.active);
        assert!(!predecessor.active);
        assert_eq!(predecessor.rolled_to, Some(successor.id));
        assert_eq!(Some(predecessor.id), old.vtxo(position));
    }

    let err = h
        .service
        .rollover_contract(next.id, next.expiry_height)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParameters);
}

#[test]
fn contracts_inside_the_window_are_marked_expiring() {
    let h = Harness::new();
    let (alice, bob) = (h.party(), h.party());
    let near = h.call_contract(&alice, &bob, 144);
    let far = h.call_contract(&alice, &bob, 1_000);

    let marked = h.service.mark_expiring_contracts().expect("mark");
    assert_eq!(marked, vec![near.id]);
    assert_eq!(
        h.service.get_contract(near.id).expect("near").status,
        ContractStatus::CloseToExpiry
    );
    assert_eq!(
        h.service.get_contract(far.id).expect("far").status,
        ContractStatus::Active
    );

    assert!(h.service.mark_expiring_contracts().expect("again").is_empty());

    h.chain.set_height(near.expiry_height);
    h.service.settle_contract(near.id).expect("settles from CLOSE_TO_EXPIRY");
}

#[test]
fn healthcheck_reports_chain_and_store() {
    let h = Harness::new();
    let report = h.service.healthcheck();
    assert!(report.healthy);
    assert_eq!(report.chain_height, Some(START_HEIGHT));

    h.chain.fail_reads(1);
    let report = h.service.healthcheck();
    assert!(!report.healthy);
    assert!(report.oracle_error.is_some());
}
