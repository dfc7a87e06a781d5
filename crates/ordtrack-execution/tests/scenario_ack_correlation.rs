//! Scenario: Acknowledgments Reach Their Waiters
//!
//! # Invariants under test
//!
//! 1. Register → notify(New) → wait_for(New) returns the event, not a
//!    timeout, even though the ack arrived before anyone waited.
//! 2. A waiter for a replace identifier is woken by an ack delivered from a
//!    different thread, and the tracker reflects the re-key by then.
//! 3. Acks for one identifier are never delivered to a waiter on another.
//! 4. A timed-out wait does not roll back tracker state.
//! 5. Not-live refusal: replace against an unknown or canceled order leaves
//!    the tracker unchanged.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ordtrack_execution::{
    AckCorrelator, AckEvent, AckKind, AckKindSet, ClOrdId, NewOrder, OrdStatus, OrderRecord,
    OrderState, OrderTracker, Refusal, Side, WaitOutcome,
};

fn new_ack(id: &ClOrdId) -> AckEvent {
    AckEvent {
        kind: AckKind::New,
        ord_status: Some(OrdStatus::New),
        cl_ord_id: id.clone(),
    }
}

fn register(tracker: &OrderTracker, id: &ClOrdId) {
    tracker.register(OrderRecord::registered(
        id.clone(),
        NewOrder::limit("MNYCG_110425", Side::Buy, 1, 520_000),
    ));
}

// ---------------------------------------------------------------------------
// 1. Register-before-notify safety
// ---------------------------------------------------------------------------

#[test]
fn ack_before_wait_is_returned_not_timed_out() {
    let tracker = OrderTracker::default();
    let correlator = AckCorrelator::new();
    let id = ClOrdId::new("c-fast");

    register(&tracker, &id);
    tracker.apply_new_ack(&id, Some("V-1"));
    correlator.notify(&id, new_ack(&id));

    let out = correlator.wait_for(&id, AckKind::New.into(), Duration::from_millis(50));
    assert_eq!(out, WaitOutcome::Matched(new_ack(&id)));
    assert!(tracker.lookup(&id).unwrap().is_live());
}

// ---------------------------------------------------------------------------
// 2. Cross-thread replace ack wakes the waiter after the re-key
// ---------------------------------------------------------------------------

#[test]
fn replace_waiter_sees_rekeyed_tracker() {
    let tracker = Arc::new(OrderTracker::default());
    let correlator = Arc::new(AckCorrelator::new());
    let first = ClOrdId::new("c1");
    let replace = ClOrdId::new("r1");

    register(&tracker, &first);
    tracker.apply_new_ack(&first, None);
    tracker.begin_replace(&first).unwrap();

    // Simulated inbound callback thread: tracker first, then correlator.
    let inbound = {
        let tracker = tracker.clone();
        let correlator = correlator.clone();
        let (first, replace) = (first.clone(), replace.clone());
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            tracker.apply_replace_ack(&first, &replace, Some(530_000));
            correlator.notify(
                &replace,
                AckEvent {
                    kind: AckKind::Replaced,
                    ord_status: Some(OrdStatus::Replaced),
                    cl_ord_id: replace.clone(),
                },
            );
        })
    };

    let out = correlator.wait_for(
        &replace,
        AckKindSet::of(&[AckKind::Replaced]),
        Duration::from_secs(5),
    );
    inbound.join().unwrap();

    assert!(out.is_matched());
    let rec = tracker.lookup(&replace).expect("re-keyed before notify");
    assert_eq!(rec.price, Some(530_000));
    assert!(tracker.lookup(&first).is_none());
}

// ---------------------------------------------------------------------------
// 3. No cross-talk between identifiers
// ---------------------------------------------------------------------------

#[test]
fn ack_for_other_identifier_does_not_wake_waiter() {
    let correlator = AckCorrelator::new();
    let a = ClOrdId::new("a");
    let b = ClOrdId::new("b");
    correlator.notify(&b, new_ack(&b));

    let out = correlator.wait_for(&a, AckKind::New.into(), Duration::from_millis(20));
    assert_eq!(out, WaitOutcome::TimedOut);
    let out = correlator.wait_for(&b, AckKind::New.into(), Duration::from_millis(20));
    assert!(out.is_matched());
}

// ---------------------------------------------------------------------------
// 4. Timeout is non-fatal and rolls nothing back
// ---------------------------------------------------------------------------

#[test]
fn timeout_leaves_pending_state_in_place() {
    let tracker = OrderTracker::default();
    let correlator = AckCorrelator::new();
    let id = ClOrdId::new("c1");
    register(&tracker, &id);
    tracker.apply_new_ack(&id, None);
    tracker.begin_cancel(&id).unwrap();

    let out = correlator.wait_for(
        &ClOrdId::new("x1"),
        AckKind::Canceled.into(),
        Duration::from_millis(10),
    );
    assert_eq!(out, WaitOutcome::TimedOut);
    assert_eq!(tracker.lookup(&id).unwrap().state(), OrderState::PendingCancel);
}

// ---------------------------------------------------------------------------
// 5. Not-live refusal
// ---------------------------------------------------------------------------

#[test]
fn replace_refused_for_unknown_and_canceled_orders() {
    let tracker = OrderTracker::default();
    let id = ClOrdId::new("c1");
    register(&tracker, &id);
    tracker.apply_new_ack(&id, None);
    tracker.begin_cancel(&id).unwrap();
    tracker.apply_cancel_ack(&id, &ClOrdId::new("x1"));

    let before = tracker.lookup(&ClOrdId::new("x1")).unwrap();

    assert_eq!(
        tracker.begin_replace(&ClOrdId::new("never")),
        Err(Refusal::NotFound {
            id: ClOrdId::new("never")
        })
    );
    assert!(matches!(
        tracker.begin_replace(&ClOrdId::new("x1")),
        Err(Refusal::NotLive {
            state: OrderState::Canceled,
            ..
        })
    ));

    assert_eq!(tracker.lookup(&ClOrdId::new("x1")).unwrap(), before);
    assert_eq!(tracker.len(), 1);
}
