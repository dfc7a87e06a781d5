//! Acknowledgment Correlator: block until a given kind of ack arrives for
//! a given identifier.
//!
//! Each identifier gets its own unbounded FIFO, created lazily by whichever
//! of [`AckCorrelator::notify`] or [`AckCorrelator::wait_for`] touches it
//! first. An ack that lands before the caller starts waiting is therefore
//! queued, not lost; a single-slot signal would drop it.
//!
//! The map lock is only held to find or create a queue. The blocking receive
//! happens outside it, so the inbound callback thread is never stalled by a
//! waiter.
//!
//! A queue is dropped once it has no waiter and nothing buffered. A queue that
//! still buffers events nobody waits for (duplicate acks, fills, acks that
//! land after their waiter gave up) is dropped once it has sat idle for the
//! retention window; the sweep runs from `notify`/`wait_for` and can be
//! forced with [`AckCorrelator::evict_idle`]. Dropping a queue with
//! [`AckCorrelator::cancel`] disconnects it; any waiter blocked on it returns
//! [`WaitOutcome::Cancelled`].

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use crossbeam::channel::{unbounded, Receiver, RecvError, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::ids::ClOrdId;

// ---------------------------------------------------------------------------
// AckKind / OrdStatus
// ---------------------------------------------------------------------------

/// What an inbound acknowledgment says happened.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AckKind {
    PendingNew,
    New,
    PendingReplace,
    Replaced,
    PendingCancel,
    Canceled,
    /// The order itself was rejected (ExecType 8).
    Rejected,
    /// A cancel or cancel/replace request was rejected (MsgType 9).
    CancelRejected,
    PartialFill,
    Fill,
    Other,
}

impl AckKind {
    const ALL: [AckKind; 11] = [
        AckKind::PendingNew,
        AckKind::New,
        AckKind::PendingReplace,
        AckKind::Replaced,
        AckKind::PendingCancel,
        AckKind::Canceled,
        AckKind::Rejected,
        AckKind::CancelRejected,
        AckKind::PartialFill,
        AckKind::Fill,
        AckKind::Other,
    ];

    /// Classify an execution report from its `ExecType` (150) and, for
    /// FIX 5.0 `Trade` reports, its `OrdStatus` (39).
    pub fn from_exec_type(exec_type: &str, ord_status: Option<OrdStatus>) -> Self {
        match exec_type {
            "A" => AckKind::PendingNew,
            "0" => AckKind::New,
            "E" => AckKind::PendingReplace,
            "5" => AckKind::Replaced,
            "6" => AckKind::PendingCancel,
            "4" => AckKind::Canceled,
            "8" => AckKind::Rejected,
            "1" => AckKind::PartialFill,
            "2" => AckKind::Fill,
            "F" => match ord_status {
                Some(OrdStatus::Filled) => AckKind::Fill,
                _ => AckKind::PartialFill,
            },
            _ => AckKind::Other,
        }
    }

    /// `ExecType` (150) code, where one exists.
    pub fn exec_type_code(&self) -> Option<&'static str> {
        match self {
            AckKind::PendingNew => Some("A"),
            AckKind::New => Some("0"),
            AckKind::PendingReplace => Some("E"),
            AckKind::Replaced => Some("5"),
            AckKind::PendingCancel => Some("6"),
            AckKind::Canceled => Some("4"),
            AckKind::Rejected => Some("8"),
            AckKind::PartialFill | AckKind::Fill => Some("F"),
            AckKind::CancelRejected | AckKind::Other => None,
        }
    }

    fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

impl fmt::Display for AckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AckKind::PendingNew => "PENDING_NEW",
            AckKind::New => "NEW",
            AckKind::PendingReplace => "PENDING_REPLACE",
            AckKind::Replaced => "REPLACED",
            AckKind::PendingCancel => "PENDING_CANCEL",
            AckKind::Canceled => "CANCELED",
            AckKind::Rejected => "REJECTED",
            AckKind::CancelRejected => "CANCEL_REJECTED",
            AckKind::PartialFill => "PARTIAL_FILL",
            AckKind::Fill => "FILL",
            AckKind::Other => "OTHER",
        };
        f.write_str(s)
    }
}

/// FIX `OrdStatus` (39).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum OrdStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Replaced,
    PendingCancel,
    Rejected,
    PendingNew,
    PendingReplace,
    Other(char),
}

impl OrdStatus {
    pub fn from_code(code: &str) -> Option<Self> {
        let c = code.chars().next()?;
        Some(match c {
            '0' => OrdStatus::New,
            '1' => OrdStatus::PartiallyFilled,
            '2' => OrdStatus::Filled,
            '4' => OrdStatus::Canceled,
            '5' => OrdStatus::Replaced,
            '6' => OrdStatus::PendingCancel,
            '8' => OrdStatus::Rejected,
            'A' => OrdStatus::PendingNew,
            'E' => OrdStatus::PendingReplace,
            other => OrdStatus::Other(other),
        })
    }

    pub fn code(&self) -> char {
        match self {
            OrdStatus::New => '0',
            OrdStatus::PartiallyFilled => '1',
            OrdStatus::Filled => '2',
            OrdStatus::Canceled => '4',
            OrdStatus::Replaced => '5',
            OrdStatus::PendingCancel => '6',
            OrdStatus::Rejected => '8',
            OrdStatus::PendingNew => 'A',
            OrdStatus::PendingReplace => 'E',
            OrdStatus::Other(c) => *c,
        }
    }
}

// ---------------------------------------------------------------------------
// AckKindSet
// ---------------------------------------------------------------------------

/// Set of acknowledgment kinds a waiter will accept.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct AckKindSet(u16);

impl AckKindSet {
    pub const EMPTY: AckKindSet = AckKindSet(0);

    pub fn of(kinds: &[AckKind]) -> Self {
        kinds.iter().copied().collect()
    }

    pub fn any() -> Self {
        AckKind::ALL.iter().copied().collect()
    }

    pub fn with(self, kind: AckKind) -> Self {
        AckKindSet(self.0 | kind.bit())
    }

    pub fn contains(&self, kind: AckKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl From<AckKind> for AckKindSet {
    fn from(kind: AckKind) -> Self {
        AckKindSet(kind.bit())
    }
}

impl FromIterator<AckKind> for AckKindSet {
    fn from_iter<I: IntoIterator<Item = AckKind>>(iter: I) -> Self {
        iter.into_iter().fold(AckKindSet::EMPTY, AckKindSet::with)
    }
}

// ---------------------------------------------------------------------------
// AckEvent / WaitOutcome
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AckEvent {
    pub kind: AckKind,
    pub ord_status: Option<OrdStatus>,
    pub cl_ord_id: ClOrdId,
}

/// Result of [`AckCorrelator::wait_for`]. A timeout is an answer ("no
/// confirmation yet"), not an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    Matched(AckEvent),
    TimedOut,
    Cancelled,
}

impl WaitOutcome {
    pub fn matched(self) -> Option<AckEvent> {
        match self {
            WaitOutcome::Matched(ev) => Some(ev),
            _ => None,
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self, WaitOutcome::Matched(_))
    }
}

// ---------------------------------------------------------------------------
// AckCorrelator
// ---------------------------------------------------------------------------

/// How long a queue nobody waits on may keep buffered events.
pub const DEFAULT_ACK_RETENTION: Duration = Duration::from_secs(30);

#[derive(Debug)]
struct Slot {
    tx: Sender<AckEvent>,
    rx: Receiver<AckEvent>,
    waiters: usize,
    /// Last time the queue was touched while nobody waited on it.
    idle_since: Instant,
}

impl Slot {
    fn new(now: Instant) -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx,
            rx,
            waiters: 0,
            idle_since: now,
        }
    }

    fn expired(&self, now: Instant, retention: Duration) -> bool {
        self.waiters == 0 && now.saturating_duration_since(self.idle_since) >= retention
    }
}

#[derive(Debug)]
struct Slots {
    map: HashMap<ClOrdId, Slot>,
    last_sweep: Instant,
}

#[derive(Debug)]
pub struct AckCorrelator {
    slots: Mutex<Slots>,
    retention: Duration,
}

impl Default for AckCorrelator {
    fn default() -> Self {
        Self::with_retention(DEFAULT_ACK_RETENTION)
    }
}

impl AckCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues with no waiter are dropped after sitting idle for `retention`,
    /// buffered events included.
    pub fn with_retention(retention: Duration) -> Self {
        Self {
            slots: Mutex::new(Slots {
                map: HashMap::new(),
                last_sweep: Instant::now(),
            }),
            retention,
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Queue `event` for `id`. Called from the inbound callback path.
    pub fn notify(&self, id: &ClOrdId, event: AckEvent) {
        let now = Instant::now();
        let mut slots = self.slots.lock();
        self.maybe_sweep(&mut slots, now);
        let slot = slots.map.entry(id.clone()).or_insert_with(|| Slot::new(now));
        if slot.waiters == 0 {
            slot.idle_since = now;
        }
        trace!(cl_ord_id = %id, kind = %event.kind, "ack queued");
        // The slot owns a receiver, so an unbounded send cannot fail.
        let _ = slot.tx.send(event);
    }

    /// Pop events queued for `id` until one is in `acceptable` or `timeout`
    /// elapses. Non-matching events are consumed and discarded.
    ///
    /// A timeout too large to represent as a deadline waits without one.
    pub fn wait_for(&self, id: &ClOrdId, acceptable: AckKindSet, timeout: Duration) -> WaitOutcome {
        let now = Instant::now();
        let deadline = now.checked_add(timeout);
        let rx = {
            let mut slots = self.slots.lock();
            self.maybe_sweep(&mut slots, now);
            let slot = slots.map.entry(id.clone()).or_insert_with(|| Slot::new(now));
            slot.waiters += 1;
            slot.rx.clone()
        };

        let outcome = loop {
            let received = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    rx.recv_timeout(remaining)
                }
                None => rx.recv().map_err(|RecvError| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok(ev) if acceptable.contains(ev.kind) => break WaitOutcome::Matched(ev),
                Ok(ev) => {
                    debug!(cl_ord_id = %id, kind = %ev.kind, "ack discarded by waiter");
                }
                Err(RecvTimeoutError::Timeout) => break WaitOutcome::TimedOut,
                Err(RecvTimeoutError::Disconnected) => break WaitOutcome::Cancelled,
            }
        };

        self.release(id, &rx);
        if !outcome.is_matched() {
            debug!(cl_ord_id = %id, outcome = ?outcome, "wait ended without a matching ack");
        }
        outcome
    }

    /// Abandon the queue for `id`. Blocked waiters return `Cancelled` once
    /// anything already buffered has been drained. Returns whether a queue
    /// existed.
    pub fn cancel(&self, id: &ClOrdId) -> bool {
        self.slots.lock().map.remove(id).is_some()
    }

    /// Drop every queue that has had no waiter for the retention window.
    /// Returns how many were dropped.
    pub fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let mut slots = self.slots.lock();
        self.sweep(&mut slots, now)
    }

    /// Number of identifiers that currently hold a queue.
    pub fn pending_queues(&self) -> usize {
        self.slots.lock().map.len()
    }

    fn maybe_sweep(&self, slots: &mut Slots, now: Instant) {
        if now.saturating_duration_since(slots.last_sweep) >= self.retention / 2 {
            self.sweep(slots, now);
        }
    }

    fn sweep(&self, slots: &mut Slots, now: Instant) -> usize {
        slots.last_sweep = now;
        let before = slots.map.len();
        let retention = self.retention;
        slots.map.retain(|id, slot| {
            let keep = !slot.expired(now, retention);
            if !keep {
                debug!(cl_ord_id = %id, buffered = slot.rx.len(), "idle ack queue dropped");
            }
            keep
        });
        before - slots.map.len()
    }

    fn release(&self, id: &ClOrdId, rx: &Receiver<AckEvent>) {
        let mut slots = self.slots.lock();
        let reap = match slots.map.get_mut(id) {
            // The slot may have been cancelled and recreated meanwhile.
            Some(slot) if slot.rx.same_channel(rx) => {
                slot.waiters = slot.waiters.saturating_sub(1);
                slot.idle_since = Instant::now();
                slot.waiters == 0 && slot.rx.is_empty()
            }
            _ => false,
        };
        if reap {
            slots.map.remove(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn ev(kind: AckKind, id: &str) -> AckEvent {
        AckEvent {
            kind,
            ord_status: None,
            cl_ord_id: ClOrdId::new(id),
        }
    }

    #[test]
    fn notify_before_wait_is_not_lost() {
        let c = AckCorrelator::new();
        let id = ClOrdId::new("c1");
        c.notify(&id, ev(AckKind::New, "c1"));
        let out = c.wait_for(&id, AckKind::New.into(), Duration::from_millis(0));
        assert_eq!(out, WaitOutcome::Matched(ev(AckKind::New, "c1")));
        assert_eq!(c.pending_queues(), 0, "drained queue must be reaped");
    }

    #[test]
    fn non_matching_events_are_discarded() {
        let c = AckCorrelator::new();
        let id = ClOrdId::new("c1");
        c.notify(&id, ev(AckKind::PendingNew, "c1"));
        c.notify(&id, ev(AckKind::New, "c1"));
        let out = c.wait_for(&id, AckKind::New.into(), Duration::from_millis(10));
        assert!(out.is_matched());

        // PendingNew was consumed; nothing left for a second waiter.
        let again = c.wait_for(&id, AckKindSet::any(), Duration::from_millis(5));
        assert_eq!(again, WaitOutcome::TimedOut);
    }

    #[test]
    fn wait_times_out_without_ack() {
        let c = AckCorrelator::new();
        let started = Instant::now();
        let out = c.wait_for(&ClOrdId::new("x"), AckKind::New.into(), Duration::from_millis(30));
        assert_eq!(out, WaitOutcome::TimedOut);
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert_eq!(c.pending_queues(), 0);
    }

    #[test]
    fn waiter_wakes_on_cross_thread_notify() {
        let c = Arc::new(AckCorrelator::new());
        let id = ClOrdId::new("r1");
        let waiter = {
            let c = c.clone();
            let id = id.clone();
            thread::spawn(move || {
                c.wait_for(&id, AckKindSet::of(&[AckKind::Replaced]), Duration::from_secs(5))
            })
        };
        thread::sleep(Duration::from_millis(20));
        c.notify(&id, ev(AckKind::Replaced, "r1"));
        let out = waiter.join().unwrap();
        assert_eq!(out.matched().map(|e| e.kind), Some(AckKind::Replaced));
    }

    #[test]
    fn cancel_releases_blocked_waiter() {
        let c = Arc::new(AckCorrelator::new());
        let id = ClOrdId::new("c9");
        let waiter = {
            let c = c.clone();
            let id = id.clone();
            thread::spawn(move || c.wait_for(&id, AckKind::New.into(), Duration::from_secs(10)))
        };
        // Let the waiter create its queue.
        while c.pending_queues() == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(c.cancel(&id));
        assert_eq!(waiter.join().unwrap(), WaitOutcome::Cancelled);
    }

    #[test]
    fn unbounded_timeout_does_not_overflow() {
        let c = AckCorrelator::new();
        let id = ClOrdId::new("c1");
        c.notify(&id, ev(AckKind::New, "c1"));
        let out = c.wait_for(&id, AckKind::New.into(), Duration::MAX);
        assert_eq!(out, WaitOutcome::Matched(ev(AckKind::New, "c1")));
    }

    #[test]
    fn unbounded_wait_returns_on_cancel() {
        let c = Arc::new(AckCorrelator::new());
        let id = ClOrdId::new("c2");
        let waiter = {
            let c = c.clone();
            let id = id.clone();
            thread::spawn(move || c.wait_for(&id, AckKind::New.into(), Duration::MAX))
        };
        while c.pending_queues() == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        c.cancel(&id);
        assert_eq!(waiter.join().unwrap(), WaitOutcome::Cancelled);
    }

    #[test]
    fn unclaimed_queues_expire_after_retention() {
        let c = AckCorrelator::with_retention(Duration::from_millis(20));
        // Nobody ever waits on these.
        c.notify(&ClOrdId::new("dup"), ev(AckKind::New, "dup"));
        c.notify(&ClOrdId::new("fill"), ev(AckKind::Fill, "fill"));
        assert_eq!(c.pending_queues(), 2);
        assert_eq!(c.evict_idle(), 0, "still inside the retention window");

        thread::sleep(Duration::from_millis(30));
        assert_eq!(c.evict_idle(), 2);
        assert_eq!(c.pending_queues(), 0);
    }

    #[test]
    fn leftovers_after_a_wait_expire_too() {
        let c = AckCorrelator::with_retention(Duration::from_millis(20));
        let id = ClOrdId::new("c1");
        c.notify(&id, ev(AckKind::New, "c1"));
        c.notify(&id, ev(AckKind::New, "c1"));
        assert!(c.wait_for(&id, AckKind::New.into(), Duration::from_millis(0)).is_matched());
        // The duplicate is still buffered for a later waiter.
        assert_eq!(c.pending_queues(), 1);

        thread::sleep(Duration::from_millis(30));
        // Any later traffic sweeps it.
        c.notify(&ClOrdId::new("other"), ev(AckKind::New, "other"));
        assert_eq!(c.pending_queues(), 1);
        assert_eq!(
            c.wait_for(&id, AckKind::New.into(), Duration::from_millis(0)),
            WaitOutcome::TimedOut
        );
    }

    #[test]
    fn queue_with_a_waiter_is_never_swept() {
        let c = Arc::new(AckCorrelator::with_retention(Duration::from_millis(5)));
        let id = ClOrdId::new("slow");
        let waiter = {
            let c = c.clone();
            let id = id.clone();
            thread::spawn(move || c.wait_for(&id, AckKind::New.into(), Duration::from_secs(5)))
        };
        while c.pending_queues() == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        thread::sleep(Duration::from_millis(20));
        assert_eq!(c.evict_idle(), 0);
        c.notify(&id, ev(AckKind::New, "slow"));
        assert!(waiter.join().unwrap().is_matched());
        assert_eq!(c.pending_queues(), 0);
    }

    #[test]
    fn exec_type_classification() {
        assert_eq!(AckKind::from_exec_type("0", None), AckKind::New);
        assert_eq!(AckKind::from_exec_type("5", None), AckKind::Replaced);
        assert_eq!(AckKind::from_exec_type("4", None), AckKind::Canceled);
        assert_eq!(
            AckKind::from_exec_type("F", Some(OrdStatus::Filled)),
            AckKind::Fill
        );
        assert_eq!(
            AckKind::from_exec_type("F", Some(OrdStatus::PartiallyFilled)),
            AckKind::PartialFill
        );
        assert_eq!(AckKind::from_exec_type("Z", None), AckKind::Other);
        assert_eq!(OrdStatus::from_code("2"), Some(OrdStatus::Filled));
        assert_eq!(OrdStatus::from_code(""), None);
    }

    #[test]
    fn kind_set_membership() {
        let set = AckKindSet::of(&[AckKind::New, AckKind::Replaced]);
        assert!(set.contains(AckKind::New));
        assert!(set.contains(AckKind::Replaced));
        assert!(!set.contains(AckKind::Canceled));
        assert!(AckKindSet::EMPTY.is_empty());
        assert!(AckKindSet::any().contains(AckKind::Other));
    }
}
