//! Order Tracker: the local source of truth for every order this client sent.
//!
//! # Index invariant
//!
//! The tracker owns one map `current_id → OrderRecord`. For every entry the
//! key equals the record's `current_id`; no record is reachable under a stale
//! identifier. Every operation (including the remove-old / insert-new re-key
//! on a replace or cancel acknowledgment) runs inside a single critical
//! section on one mutex, so a concurrent [`OrderTracker::lookup`] or
//! [`OrderTracker::live_ids`] sees either the old key or the new key, never
//! both and never neither.
//!
//! # Failure model
//!
//! Nothing here is fatal. Acknowledgments for unknown identifiers return
//! [`AckOutcome::NotFound`]; amendment attempts against orders that are not
//! `Live` return a [`Refusal`] and leave the index untouched. Every
//! transition and refusal is emitted as a `tracing` event so the lifecycle of
//! each order can be reconstructed from logs.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::ids::ClOrdId;
use crate::order::{OrderRecord, OrderState};

// ---------------------------------------------------------------------------
// RejectPolicy
// ---------------------------------------------------------------------------

/// FIX `CxlRejReason` (102) = 1: unknown order.
pub const REJECT_UNKNOWN_ORDER: i32 = 1;
/// FIX `CxlRejReason` (102) = 6 as used by the venues this client was built
/// against: too late to modify.
pub const REJECT_TOO_LATE: i32 = 6;

/// Which cancel/replace reject reason codes mean "the order is gone".
///
/// Venue-specific; the default set is `{1, 6}`. Any other code (or none) is
/// read as "the amendment failed, the underlying order is still working".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RejectPolicy {
    clearing: BTreeSet<i32>,
}

impl RejectPolicy {
    pub fn new(codes: impl IntoIterator<Item = i32>) -> Self {
        Self {
            clearing: codes.into_iter().collect(),
        }
    }

    pub fn clears_liveness(&self, reason: Option<i32>) -> bool {
        reason.map(|c| self.clearing.contains(&c)).unwrap_or(false)
    }

    pub fn codes(&self) -> impl Iterator<Item = i32> + '_ {
        self.clearing.iter().copied()
    }
}

impl Default for RejectPolicy {
    fn default() -> Self {
        Self::new([REJECT_UNKNOWN_ORDER, REJECT_TOO_LATE])
    }
}

// ---------------------------------------------------------------------------
// Refusal / AckOutcome
// ---------------------------------------------------------------------------

/// Why an amendment was refused locally before anything was transmitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refusal {
    NotFound { id: ClOrdId },
    NotLive { id: ClOrdId, state: OrderState },
}

impl std::fmt::Display for Refusal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Refusal::NotFound { id } => write!(f, "REFUSED: unknown order {id}"),
            Refusal::NotLive { id, state } => {
                write!(f, "REFUSED: order {id} is not live (state={state})")
            }
        }
    }
}

impl std::error::Error for Refusal {}

/// Result of applying one inbound acknowledgment.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AckOutcome {
    /// State changed (or was confirmed) for a tracked order.
    Applied,
    /// No record under that identifier.
    NotFound,
    /// Record exists but the ack does not apply in its current state.
    Ignored,
}

// ---------------------------------------------------------------------------
// OrderTracker
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct OrderTracker {
    index: Mutex<HashMap<ClOrdId, OrderRecord>>,
    reject_policy: RejectPolicy,
}

impl OrderTracker {
    pub fn new(reject_policy: RejectPolicy) -> Self {
        Self {
            index: Mutex::new(HashMap::new()),
            reject_policy,
        }
    }

    pub fn reject_policy(&self) -> &RejectPolicy {
        &self.reject_policy
    }

    /// Insert a freshly minted record under its `current_id`.
    ///
    /// Must be called before the corresponding request is transmitted. A
    /// second registration under the same identifier overwrites the first;
    /// that is a generator bug and is only warned about here.
    pub fn register(&self, record: OrderRecord) {
        let id = record.current_id.clone();
        let symbol = record.symbol.clone();
        let previous = self.index.lock().insert(id.clone(), record);
        if previous.is_some() {
            warn!(cl_ord_id = %id, "duplicate registration; previous record overwritten");
        } else {
            info!(cl_ord_id = %id, symbol = %symbol, to = %OrderState::Registered, "order registered");
        }
    }

    /// Apply a New acknowledgment: learn the venue id, `Registered → Live`.
    pub fn apply_new_ack(&self, id: &ClOrdId, venue_order_id: Option<&str>) -> AckOutcome {
        let mut index = self.index.lock();
        let Some(rec) = index.get_mut(id) else {
            debug!(cl_ord_id = %id, "new ack for untracked order");
            return AckOutcome::NotFound;
        };
        if rec.state.is_terminal() {
            warn!(cl_ord_id = %id, state = %rec.state, "late new ack on terminal order ignored");
            return AckOutcome::Ignored;
        }
        if let Some(v) = venue_order_id {
            rec.venue_order_id = Some(v.to_string());
        }
        let from = rec.state;
        if from == OrderState::Registered {
            rec.state = OrderState::Live;
        }
        info!(
            cl_ord_id = %id,
            first_id = %rec.first_id(),
            venue_order_id = ?rec.venue_order_id,
            from = %from,
            to = %rec.state,
            "new ack applied"
        );
        AckOutcome::Applied
    }

    /// Apply a Replace acknowledgment: re-key `orig_id → new_id`, update the
    /// price when the ack carries one, clear the pending amendment, `Live`.
    pub fn apply_replace_ack(
        &self,
        orig_id: &ClOrdId,
        new_id: &ClOrdId,
        new_price: Option<i64>,
    ) -> AckOutcome {
        let mut index = self.index.lock();
        let Some(mut rec) = index.remove(orig_id) else {
            debug!(orig_cl_ord_id = %orig_id, cl_ord_id = %new_id, "replace ack for untracked order");
            return AckOutcome::NotFound;
        };
        if rec.state.is_terminal() {
            warn!(orig_cl_ord_id = %orig_id, state = %rec.state, "replace ack on terminal order ignored");
            index.insert(orig_id.clone(), rec);
            return AckOutcome::Ignored;
        }

        let from = rec.state;
        rec.current_id = new_id.clone();
        if let Some(px) = new_price {
            rec.price = Some(px);
        }
        rec.state = OrderState::Live;
        info!(
            orig_cl_ord_id = %orig_id,
            cl_ord_id = %new_id,
            first_id = %rec.first_id(),
            price = ?rec.price,
            from = %from,
            to = %rec.state,
            "replace ack applied"
        );
        if index.insert(new_id.clone(), rec).is_some() {
            warn!(cl_ord_id = %new_id, "replace ack re-keyed over an existing record");
        }
        AckOutcome::Applied
    }

    /// Apply a Cancel acknowledgment. The chain moves to the cancel request's
    /// identifier (the last one the venue accepted) and the order is terminal.
    pub fn apply_cancel_ack(&self, orig_id: &ClOrdId, cancel_id: &ClOrdId) -> AckOutcome {
        let mut index = self.index.lock();
        let Some(mut rec) = index.remove(orig_id) else {
            debug!(orig_cl_ord_id = %orig_id, cl_ord_id = %cancel_id, "cancel ack for untracked order");
            return AckOutcome::NotFound;
        };
        let from = rec.state;
        rec.current_id = cancel_id.clone();
        rec.state = OrderState::Canceled;
        info!(
            orig_cl_ord_id = %orig_id,
            cl_ord_id = %cancel_id,
            first_id = %rec.first_id(),
            from = %from,
            to = %rec.state,
            "cancel ack applied"
        );
        index.insert(cancel_id.clone(), rec);
        AckOutcome::Applied
    }

    /// Flag an amendment as in flight. Only a `Live` order can carry one;
    /// any other state is left as is and reported `Ignored`.
    pub fn mark_pending_replace(&self, id: &ClOrdId) -> AckOutcome {
        self.mark_pending(id, OrderState::PendingReplace)
    }

    pub fn mark_pending_cancel(&self, id: &ClOrdId) -> AckOutcome {
        self.mark_pending(id, OrderState::PendingCancel)
    }

    fn mark_pending(&self, id: &ClOrdId, pending: OrderState) -> AckOutcome {
        let mut index = self.index.lock();
        let Some(rec) = index.get_mut(id) else {
            debug!(cl_ord_id = %id, "pending mark for untracked order");
            return AckOutcome::NotFound;
        };
        if !rec.state.is_live() {
            debug!(cl_ord_id = %id, state = %rec.state, to = %pending, "pending mark on non-live order ignored");
            return AckOutcome::Ignored;
        }
        rec.state = pending;
        debug!(cl_ord_id = %id, from = %OrderState::Live, to = %pending, "amendment pending");
        AckOutcome::Applied
    }

    /// Check-and-mark for an outbound replace: refuses unless the order is
    /// `Live`, otherwise moves it to `PendingReplace` and returns a snapshot
    /// to build the request from.
    pub fn begin_replace(&self, id: &ClOrdId) -> Result<OrderRecord, Refusal> {
        self.begin_amend(id, OrderState::PendingReplace)
    }

    pub fn begin_cancel(&self, id: &ClOrdId) -> Result<OrderRecord, Refusal> {
        self.begin_amend(id, OrderState::PendingCancel)
    }

    fn begin_amend(&self, id: &ClOrdId, pending: OrderState) -> Result<OrderRecord, Refusal> {
        let mut index = self.index.lock();
        let refusal = match index.get_mut(id) {
            None => Refusal::NotFound { id: id.clone() },
            Some(rec) if !rec.state.is_live() => Refusal::NotLive {
                id: id.clone(),
                state: rec.state,
            },
            Some(rec) => {
                rec.state = pending;
                debug!(cl_ord_id = %id, from = %OrderState::Live, to = %pending, "amendment pending");
                return Ok(rec.clone());
            }
        };
        warn!(cl_ord_id = %id, reason = %refusal, "amendment refused");
        Err(refusal)
    }

    /// Undo a pending amendment that never reached the venue.
    pub fn clear_pending(&self, id: &ClOrdId) -> AckOutcome {
        let mut index = self.index.lock();
        match index.get_mut(id) {
            None => AckOutcome::NotFound,
            Some(rec) if rec.state.is_pending() => {
                rec.state = OrderState::Live;
                AckOutcome::Applied
            }
            Some(_) => AckOutcome::Ignored,
        }
    }

    /// Apply a cancel/replace reject (FIX 35=9) against the target order.
    ///
    /// Reason codes in the [`RejectPolicy`] clear liveness (`Rejected`).
    /// Anything else only clears the pending amendment; the order is assumed
    /// to still be working.
    pub fn apply_reject(&self, id: &ClOrdId, reason: Option<i32>) -> AckOutcome {
        let mut index = self.index.lock();
        let Some(rec) = index.get_mut(id) else {
            debug!(cl_ord_id = %id, reason = ?reason, "reject for untracked order");
            return AckOutcome::NotFound;
        };
        if rec.state.is_terminal() {
            return AckOutcome::Ignored;
        }
        let from = rec.state;
        if self.reject_policy.clears_liveness(reason) {
            rec.state = OrderState::Rejected;
        } else if rec.state.is_pending() {
            rec.state = OrderState::Live;
        }
        warn!(
            cl_ord_id = %id,
            first_id = %rec.first_id(),
            reason = ?reason,
            from = %from,
            to = %rec.state,
            "amendment rejected"
        );
        AckOutcome::Applied
    }

    /// The venue rejected the order itself (ExecType 8).
    pub fn apply_order_reject(&self, id: &ClOrdId) -> AckOutcome {
        let mut index = self.index.lock();
        let Some(rec) = index.get_mut(id) else {
            debug!(cl_ord_id = %id, "order reject for untracked order");
            return AckOutcome::NotFound;
        };
        if rec.state.is_terminal() {
            return AckOutcome::Ignored;
        }
        let from = rec.state;
        rec.state = OrderState::Rejected;
        warn!(cl_ord_id = %id, first_id = %rec.first_id(), from = %from, to = %rec.state, "order rejected");
        AckOutcome::Applied
    }

    /// Accumulate a fill. A full fill is terminal; a partial fill keeps the
    /// current state. Neither implies anything about the remaining quantity.
    pub fn apply_fill(&self, id: &ClOrdId, last_qty: i64, full: bool) -> AckOutcome {
        let mut index = self.index.lock();
        let Some(rec) = index.get_mut(id) else {
            debug!(cl_ord_id = %id, "fill for untracked order");
            return AckOutcome::NotFound;
        };
        if rec.state.is_terminal() {
            return AckOutcome::Ignored;
        }
        let from = rec.state;
        rec.filled_qty += last_qty.max(0);
        if full {
            rec.state = OrderState::Filled;
        } else if rec.state == OrderState::Registered {
            rec.state = OrderState::Live;
        }
        info!(
            cl_ord_id = %id,
            last_qty,
            filled_qty = rec.filled_qty,
            from = %from,
            to = %rec.state,
            "fill applied"
        );
        AckOutcome::Applied
    }

    /// Point read by current identifier.
    pub fn lookup(&self, id: &ClOrdId) -> Option<OrderRecord> {
        self.index.lock().get(id).cloned()
    }

    /// Current identifiers of every amendable (`Live`) order.
    pub fn live_ids(&self) -> BTreeSet<ClOrdId> {
        self.index
            .lock()
            .iter()
            .filter(|(_, rec)| rec.state.is_live())
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.index.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.lock().is_empty()
    }

    pub fn counts_by_state(&self) -> BTreeMap<OrderState, usize> {
        let mut out = BTreeMap::new();
        for rec in self.index.lock().values() {
            *out.entry(rec.state).or_insert(0) += 1;
        }
        out
    }

    /// Drop terminal records. The core never calls this; retention is the
    /// caller's policy. Returns how many records were removed.
    pub fn evict_terminal(&self) -> usize {
        let mut index = self.index.lock();
        let before = index.len();
        index.retain(|_, rec| !rec.state.is_terminal());
        before - index.len()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
