//! Scenario: Identifier Chain Integrity Under Concurrent Readers
//!
//! # Invariants under test
//!
//! 1. After N accepted replaces, exactly one identifier in the chain is
//!    reachable and it is the last one.
//! 2. While a writer thread re-keys the order N times, concurrent readers
//!    never observe the order missing from the index or present twice.
//! 3. `live_ids()` never holds more than one identifier for the lineage.
//! 4. `first_id` survives every re-key unchanged.
//! 5. Independent orders re-keyed from different threads do not disturb
//!    each other.
//!
//! All tests are pure in-process; no network required.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use ordtrack_execution::{ClOrdId, NewOrder, OrderRecord, OrderState, OrderTracker, Side};

fn chain_id(order: usize, step: usize) -> ClOrdId {
    if step == 0 {
        ClOrdId::new(format!("o{order}-new"))
    } else {
        ClOrdId::new(format!("o{order}-re{step}"))
    }
}

fn live_order(tracker: &OrderTracker, order: usize) {
    let first = chain_id(order, 0);
    tracker.register(OrderRecord::registered(
        first.clone(),
        NewOrder::limit("CBBTC_123125_132500", Side::Buy, 1, 520_000),
    ));
    tracker.apply_new_ack(&first, Some(&format!("V-{order}")));
}

// ---------------------------------------------------------------------------
// 1 + 4. Sequential chain ends on the last identifier
// ---------------------------------------------------------------------------

#[test]
fn sequential_replaces_leave_only_last_identifier() {
    let tracker = OrderTracker::default();
    live_order(&tracker, 0);

    let n = 25;
    for step in 1..=n {
        let prev = chain_id(0, step - 1);
        let next = chain_id(0, step);
        tracker.begin_replace(&prev).expect("order must be live before replace");
        tracker.apply_replace_ack(&prev, &next, Some(520_000 + step as i64 * 10_000));
    }

    for step in 0..n {
        assert!(
            tracker.lookup(&chain_id(0, step)).is_none(),
            "stale identifier {step} must not be reachable"
        );
    }
    let rec = tracker.lookup(&chain_id(0, n)).expect("last identifier reachable");
    assert_eq!(rec.first_id(), &chain_id(0, 0));
    assert_eq!(rec.current_id(), &chain_id(0, n));
    assert_eq!(rec.state(), OrderState::Live);
    assert_eq!(rec.price, Some(520_000 + n as i64 * 10_000));
    assert_eq!(tracker.len(), 1);
    assert_eq!(tracker.live_ids().into_iter().collect::<Vec<_>>(), vec![chain_id(0, n)]);
}

// ---------------------------------------------------------------------------
// 2 + 3. Concurrent readers never see a half-migrated index
// ---------------------------------------------------------------------------

#[test]
fn readers_never_observe_half_migrated_chain() {
    let tracker = Arc::new(OrderTracker::default());
    live_order(&tracker, 0);
    let done = Arc::new(AtomicBool::new(false));
    let n = 2_000;

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let tracker = tracker.clone();
            let done = done.clone();
            thread::spawn(move || {
                let mut observations = 0usize;
                while !done.load(Ordering::Acquire) {
                    assert_eq!(tracker.len(), 1, "index must hold exactly one record");
                    let live = tracker.live_ids();
                    assert_eq!(live.len(), 1, "lineage must have exactly one live id");
                    observations += 1;
                }
                observations
            })
        })
        .collect();

    let writer = {
        let tracker = tracker.clone();
        thread::spawn(move || {
            for step in 1..=n {
                let applied =
                    tracker.apply_replace_ack(&chain_id(0, step - 1), &chain_id(0, step), None);
                assert_eq!(applied, ordtrack_execution::AckOutcome::Applied);
            }
        })
    };

    writer.join().unwrap();
    done.store(true, Ordering::Release);
    for r in readers {
        assert!(r.join().unwrap() > 0);
    }
    assert!(tracker.lookup(&chain_id(0, n)).is_some());
}

// ---------------------------------------------------------------------------
// 3. Pending amendments drop out of the live set and come back on ack
// ---------------------------------------------------------------------------

#[test]
fn live_set_excludes_in_flight_amendment() {
    let tracker = OrderTracker::default();
    live_order(&tracker, 0);

    tracker.begin_replace(&chain_id(0, 0)).unwrap();
    assert!(tracker.live_ids().is_empty());
    assert_eq!(
        tracker.lookup(&chain_id(0, 0)).unwrap().state(),
        OrderState::PendingReplace
    );

    tracker.apply_replace_ack(&chain_id(0, 0), &chain_id(0, 1), None);
    assert_eq!(tracker.live_ids().len(), 1);
}

// ---------------------------------------------------------------------------
// 5. Independent lineages from several threads
// ---------------------------------------------------------------------------

#[test]
fn parallel_lineages_stay_independent() {
    let tracker = Arc::new(OrderTracker::default());
    let orders = 8;
    let steps = 200;
    for o in 0..orders {
        live_order(&tracker, o);
    }

    let handles: Vec<_> = (0..orders)
        .map(|o| {
            let tracker = tracker.clone();
            thread::spawn(move || {
                for step in 1..=steps {
                    tracker.apply_replace_ack(&chain_id(o, step - 1), &chain_id(o, step), None);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(tracker.len(), orders);
    let live = tracker.live_ids();
    assert_eq!(live.len(), orders);
    for o in 0..orders {
        let rec = tracker.lookup(&chain_id(o, steps)).unwrap();
        assert_eq!(rec.first_id(), &chain_id(o, 0));
        assert_eq!(rec.venue_order_id.as_deref(), Some(format!("V-{o}").as_str()));
    }
}
