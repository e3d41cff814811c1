mod common;

use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use common::*;
use udl_ledger::{Ledger, LedgerConfig};

#[test]
fn subscriber_may_query_before_draining() {
    let net = Net::new();
    let config = LedgerConfig {
        event_capacity: 1,
        ..net.config(15)
    };
    let ledger = Arc::new(Ledger::in_memory(config).unwrap());
    let mut feed = ledger.subscribe().unwrap();
    let genesis = net.genesis(10);
    let units = net.branch(&genesis, 4, 1);

    let consumer = {
        let ledger = ledger.clone();
        thread::spawn(move || {
            let mut seen = Vec::new();
            while let Some(change) = feed.blocking_recv() {
                thread::sleep(Duration::from_millis(20));
                let unit = ledger.get_unit_by_hash(&change.new.hash).unwrap();
                seen.push(unit.map(|u| u.index()));
                if seen.len() == 5 {
                    break;
                }
            }
            seen
        })
    };

    let (done_tx, done_rx) = mpsc::channel();
    let writer = {
        let ledger = ledger.clone();
        thread::spawn(move || {
            ledger.commit(genesis).unwrap();
            for unit in units {
                ledger.commit(unit).unwrap();
            }
            done_tx.send(()).unwrap();
        })
    };

    assert!(done_rx.recv_timeout(Duration::from_secs(10)).is_ok());
    writer.join().unwrap();
    let seen = consumer.join().unwrap();
    assert_eq!(seen, vec![Some(0), Some(1), Some(2), Some(3), Some(4)]);
}

#[test]
fn concurrent_writers_keep_delivery_in_commit_order() {
    let net = Net::new();
    let config = LedgerConfig {
        event_capacity: 1,
        ..net.config(15)
    };
    let ledger = Arc::new(Ledger::in_memory(config).unwrap());
    let mut feed = ledger.subscribe().unwrap();
    let genesis = net.genesis(10);
    ledger.commit(genesis.clone()).unwrap();

    let usd = udl_types::AssetId::from_symbol("USD");
    let usd_root = root(
        usd,
        vec![],
        Some(&net.mediators[0]),
        &[&net.mediators[1], &net.mediators[2]],
    );
    let ptn_units = net.branch(&genesis, 3, 1);
    let mut usd_units = Vec::new();
    let mut tip = usd_root.clone();
    for _ in 0..3 {
        let next = net.pending(&tip, vec![], 1);
        usd_units.push(next.clone());
        tip = next;
    }

    let writers: Vec<_> = [
        [vec![usd_root], usd_units].concat(),
        ptn_units,
    ]
    .into_iter()
    .map(|units| {
        let ledger = ledger.clone();
        thread::spawn(move || {
            for unit in units {
                ledger.commit(unit).unwrap();
            }
        })
    })
    .collect();

    let mut changes = Vec::new();
    // Genesis, the USD root, three USD units and three PTN units.
    while changes.len() < 8 {
        match feed.blocking_recv() {
            Some(change) => changes.push(change),
            None => break,
        }
    }
    for writer in writers {
        writer.join().unwrap();
    }

    for asset in [ptn(), usd] {
        let heights: Vec<u64> = changes
            .iter()
            .filter(|c| c.asset_id == asset)
            .map(|c| c.new.index)
            .collect();
        assert_eq!(heights, vec![0, 1, 2, 3], "{asset}");
    }
}
