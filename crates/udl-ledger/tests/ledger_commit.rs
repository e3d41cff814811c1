mod common;

use std::sync::Arc;

use common::*;
use udl_crypto::Ed25519Verifier;
use udl_ledger::{Ledger, LedgerError, UnitState};
use udl_store::InMemoryKvStore;
use udl_types::{ConfigPayload, Message, TextPayload, Transaction, Unit};

#[test]
fn genesis_then_child_end_to_end() {
    let net = Net::new();
    let ledger = net.ledger();
    let (alice, bob) = (address_of(&net.alice), address_of(&net.bob));

    let genesis = net.genesis(1000);
    let outcome = ledger.commit(genesis.clone()).unwrap();
    assert_eq!(outcome.state, UnitState::Validated);
    assert_eq!(outcome.head.map(|h| h.hash), Some(genesis.hash()));
    assert_eq!(ledger.primary_asset().unwrap(), Some(ptn()));
    assert_eq!(ledger.wallet_balance(&alice, &ptn()).unwrap(), 1000);

    let pay = spend(&net.alice, first_output(&genesis), vec![(600, bob), (400, alice)]);
    let a1 = net.pending(&genesis, vec![pay.clone()], 1);
    let outcome = ledger.commit(a1.clone()).unwrap();
    assert_eq!(outcome.state, UnitState::AuthorSignaturePassed);
    assert_eq!(outcome.head.map(|h| h.hash), Some(a1.hash()));
    assert_eq!(ledger.current_unit().unwrap(), Some(a1.clone()));
    assert!(ledger.is_pending(&a1.hash()).unwrap());

    // Stable queries still see the genesis state.
    assert_eq!(ledger.wallet_balance(&bob, &ptn()).unwrap(), 0);
    assert_eq!(ledger.wallet_balance(&alice, &ptn()).unwrap(), 1000);
    assert_eq!(ledger.wallet_balance_with_pending(&bob, &ptn()).unwrap(), 600);
    assert_eq!(ledger.wallet_balance_with_pending(&alice, &ptn()).unwrap(), 400);
    assert!(ledger.get_utxo_entry(&first_output(&genesis)).unwrap().is_some());
    assert!(ledger
        .get_utxo_entry_with_pending(&first_output(&genesis))
        .unwrap()
        .is_none());

    let (tx, lookup) = ledger.get_transaction(&pay.hash().unwrap()).unwrap().unwrap();
    assert_eq!(tx, pay);
    assert_eq!(lookup.unit_hash, a1.hash());
    assert_eq!(lookup.index, 0);

    assert!(matches!(
        ledger.commit(a1.clone()),
        Err(LedgerError::Duplicate(h)) if h == a1.hash()
    ));
    assert!(matches!(
        ledger.commit(genesis.clone()),
        Err(LedgerError::Duplicate(_))
    ));
}

#[test]
fn double_spend_is_rejected_without_effect() {
    let net = Net::new();
    let ledger = net.ledger();
    let (alice, bob) = (address_of(&net.alice), address_of(&net.bob));
    let genesis = net.genesis(1000);
    ledger.commit(genesis.clone()).unwrap();

    let op = first_output(&genesis);
    let a1 = net.pending(&genesis, vec![spend(&net.alice, op, vec![(1000, bob)])], 1);
    ledger.commit(a1.clone()).unwrap();
    let before = ledger.get_addr_outputs_with_pending(&bob).unwrap();

    let again = net.pending(&a1, vec![spend(&net.alice, op, vec![(1000, alice)])], 2);
    let err = ledger.commit(again.clone()).unwrap_err();
    assert!(matches!(err, LedgerError::Transaction { .. }), "{err}");
    assert!(err.is_validation());

    assert!(!ledger.has_unit(&again.hash()).unwrap());
    assert_eq!(ledger.current_unit().unwrap(), Some(a1));
    assert_eq!(ledger.get_addr_outputs_with_pending(&bob).unwrap(), before);
    assert_eq!(ledger.wallet_balance_with_pending(&alice, &ptn()).unwrap(), 0);
}

#[test]
fn spend_within_one_unit_twice_is_rejected() {
    let net = Net::new();
    let ledger = net.ledger();
    let genesis = net.genesis(10);
    ledger.commit(genesis.clone()).unwrap();

    let op = first_output(&genesis);
    let bob = address_of(&net.bob);
    let unit = net.pending(
        &genesis,
        vec![
            spend(&net.alice, op, vec![(5, bob)]),
            spend(&net.alice, op, vec![(10, bob)]),
        ],
        1,
    );
    assert!(matches!(
        ledger.commit(unit),
        Err(LedgerError::Transaction { .. })
    ));
    assert_eq!(ledger.pending_count().unwrap(), 0);
}

#[test]
fn orphans_and_bad_heights_are_rejected() {
    let net = Net::new();
    let ledger = net.ledger();
    let genesis = net.genesis(10);
    ledger.commit(genesis.clone()).unwrap();

    let a1 = net.pending(&genesis, vec![], 1);
    let a2 = net.pending(&a1, vec![], 1);
    let err = ledger.commit(a2.clone()).unwrap_err();
    assert!(
        matches!(err, LedgerError::Orphan { unit, parent } if unit == a2.hash() && parent == a1.hash())
    );

    let mut header = a1.header().clone();
    header.number.index = 5;
    let skipped = child_with_header(&net, header);
    assert!(matches!(
        ledger.commit(skipped),
        Err(LedgerError::Structural { .. })
    ));
}

fn child_with_header(net: &Net, mut header: udl_types::Header) -> udl_types::Unit {
    header.sign_author(&net.mediators[0]).unwrap();
    udl_types::Unit::new(header, vec![]).unwrap()
}

#[test]
fn unknown_author_is_rejected() {
    let net = Net::new();
    let ledger = net.ledger();
    let genesis = net.genesis(10);
    ledger.commit(genesis.clone()).unwrap();

    let stranger = child(&genesis, vec![], &key(99), &[], 1);
    let err = ledger.commit(stranger).unwrap_err();
    assert!(matches!(err, LedgerError::Signature { .. }), "{err}");
}

#[test]
fn queries_walk_and_index_the_chain() {
    let net = Net::new();
    let ledger = net.ledger();
    let alice = address_of(&net.alice);
    let genesis = net.genesis(50);
    ledger.commit(genesis.clone()).unwrap();
    let units = net.branch(&genesis, 3, 1);
    for unit in &units {
        ledger.commit(unit.clone()).unwrap();
    }

    let tip = units[2].hash();
    assert_eq!(
        ledger.get_unit_hashes_from_hash(&tip, 2).unwrap(),
        vec![units[1].hash(), units[0].hash()]
    );
    assert_eq!(
        ledger.get_unit_hashes_from_hash(&tip, 10).unwrap(),
        vec![units[1].hash(), units[0].hash(), genesis.hash()]
    );

    assert_eq!(ledger.get_unit_number(&tip).unwrap(), Some(units[2].number()));
    assert_eq!(
        ledger.get_unit_by_number(&units[1].number()).unwrap(),
        Some(units[1].clone())
    );
    assert_eq!(
        ledger.get_header_by_number(&genesis.number()).unwrap().as_ref(),
        Some(genesis.header())
    );
    assert_eq!(
        ledger.get_header_by_hash(&tip).unwrap().as_ref(),
        Some(units[2].header())
    );
    assert_eq!(ledger.get_canonical_hash(&ptn(), 3).unwrap(), Some(tip));
    assert_eq!(
        ledger.get_transactions_by_hash(&genesis.hash()).unwrap(),
        Some(genesis.transactions().to_vec())
    );
    assert_eq!(ledger.get_addr_transactions(&alice).unwrap().len(), 1);
    assert_eq!(ledger.wallet_tokens(&alice).unwrap().get(&ptn()), Some(&50));

    let heads = ledger.head_hashes(&ptn()).unwrap();
    assert_eq!(heads.unit, Some(tip));
    assert_eq!(heads.header, Some(tip));
    assert_eq!(heads.fast, Some(tip));
    assert_eq!(heads.stable, Some(genesis.hash()));

    let dgp = ledger.dynamic_global_property().unwrap().unwrap();
    assert_eq!(dgp.head_unit_hash, tip);
    assert_eq!(dgp.head_unit_number.index, 3);
    assert_eq!(dgp.last_stable_unit_number, 0);
}

#[test]
fn quorum_config_update_replaces_mediators() {
    let net = Net::new();
    let ledger = net.ledger();
    let genesis = net.genesis(10);
    ledger.commit(genesis.clone()).unwrap();

    let successor = key(40);
    let update = Transaction::new(
        vec![Message::ConfigUpdate(ConfigPayload {
            global_property: Some(mediator_set(&[&successor], 1)),
            entries: vec![],
        })],
        0,
    );
    let a1 = net.quorum(&genesis, vec![update], 1);
    let outcome = ledger.commit(a1.clone()).unwrap();
    assert_eq!(outcome.state, UnitState::Validated);
    assert_eq!(ledger.head_hashes(&ptn()).unwrap().stable, Some(a1.hash()));

    assert_eq!(ledger.active_mediators().unwrap(), vec![address_of(&successor)]);
    assert_eq!(ledger.cur_threshold().unwrap(), 1);

    let old_author = net.pending(&a1, vec![], 2);
    assert!(matches!(
        ledger.commit(old_author),
        Err(LedgerError::Signature { .. })
    ));
    let new_author = child(&a1, vec![], &successor, &[], 2);
    assert_eq!(
        ledger.commit(new_author).unwrap().state,
        UnitState::AuthorSignaturePassed
    );
}

#[test]
fn second_asset_root_needs_quorum() {
    let net = Net::new();
    let ledger = net.ledger();
    ledger.commit(net.genesis(10)).unwrap();

    let usd = udl_types::AssetId::from_symbol("USD");
    let unsigned = root(usd, vec![], Some(&net.mediators[0]), &[]);
    assert!(matches!(
        ledger.commit(unsigned),
        Err(LedgerError::Signature { .. })
    ));

    let signed = root(
        usd,
        vec![],
        Some(&net.mediators[0]),
        &[&net.mediators[1], &net.mediators[2]],
    );
    assert_eq!(ledger.commit(signed.clone()).unwrap().state, UnitState::Validated);
    assert_eq!(ledger.current_unit_of(&usd).unwrap(), Some(signed.clone()));
    assert_eq!(ledger.primary_asset().unwrap(), Some(ptn()));

    let rival = root(
        usd,
        vec![],
        Some(&net.mediators[1]),
        &[&net.mediators[0], &net.mediators[2]],
    );
    assert!(matches!(ledger.commit(rival), Err(LedgerError::StaleFork(_))));
}

#[test]
fn pending_canonical_units_survive_restart() {
    let net = Net::new();
    let store = Arc::new(InMemoryKvStore::new());
    let genesis = net.genesis(10);
    let units = net.branch(&genesis, 2, 1);
    {
        let ledger = Ledger::new(store.clone(), Arc::new(Ed25519Verifier), net.config(15)).unwrap();
        ledger.commit(genesis.clone()).unwrap();
        for unit in &units {
            ledger.commit(unit.clone()).unwrap();
        }
    }

    let ledger = Ledger::new(store, Arc::new(Ed25519Verifier), net.config(15)).unwrap();
    assert_eq!(ledger.pending_count().unwrap(), 2);
    assert_eq!(ledger.current_unit().unwrap(), Some(units[1].clone()));

    let next = net.pending(&units[1], vec![], 1);
    let outcome = ledger.commit(next.clone()).unwrap();
    assert_eq!(outcome.head.map(|h| h.hash), Some(next.hash()));

    // A rival branch can still reorganize over the reloaded units.
    let rival = net.branch(&genesis, 4, 2);
    for unit in &rival {
        ledger.commit(unit.clone()).unwrap();
    }
    assert_eq!(ledger.current_unit().unwrap(), Some(rival[3].clone()));
}

fn note(text: &str) -> Transaction {
    Transaction::new(vec![Message::Text(TextPayload { text: text.into() })], 0)
}

#[test]
fn padded_body_cannot_take_the_unit_hash() {
    let net = Net::new();
    let ledger = net.ledger();
    let genesis = net.genesis(10);
    ledger.commit(genesis.clone()).unwrap();

    let honest = net.pending(&genesis, vec![note("a"), note("b"), note("c")], 1);
    let mut padded_txs = honest.transactions().to_vec();
    padded_txs.push(note("c"));
    let padded = Unit::new(honest.header().clone(), padded_txs).unwrap();
    assert_eq!(padded.hash(), honest.hash());

    let err = ledger.commit(padded).unwrap_err();
    assert!(matches!(err, LedgerError::Structural { .. }), "{err}");
    assert!(!ledger.has_unit(&honest.hash()).unwrap());

    ledger.commit(honest.clone()).unwrap();
    assert_eq!(
        ledger.get_transactions_by_hash(&honest.hash()).unwrap().map(|t| t.len()),
        Some(3)
    );
}
