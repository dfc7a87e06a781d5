//! Order Session: the single choke-point between workflows and the protocol
//! engine.
//!
//! # Outbound
//!
//! Every request goes through [`OrderSession::send_new`],
//! [`OrderSession::send_replace`] or [`OrderSession::send_cancel`]:
//!
//! ```text
//! workflow
//!     │
//!     ├──► send_new      register record ─► stamp latency ─► transmit
//!     ├──► send_replace  begin_replace (refuse unless Live) ─► transmit
//!     └──► send_cancel   begin_cancel  (refuse unless Live) ─► transmit
//! ```
//!
//! The record is always in the tracker before the engine sees the request,
//! so an acknowledgment can never beat local bookkeeping.
//!
//! # Inbound
//!
//! The engine calls [`InboundHandler::on_execution_report`] from its own
//! thread. Each report is applied to the tracker, offered to the latency
//! recorder and finally queued on the correlator under the report's
//! `cl_ord_id`. No lock is held across those steps.

use std::sync::Arc;
use std::time::Duration;

use ordtrack_execution::{
    AckCorrelator, AckEvent, AckKind, AckKindSet, AckOutcome, ActionKind, CancelReplaceRequest,
    CancelRequest, ClOrdId, ExecutionReport, IdGenerator, InboundHandler, NewOrder,
    NewOrderSingle, OrderRecord, OrderTracker, OutboundAction, ProtocolEngine, Refusal,
    RejectPolicy, TimeInForce, WaitOutcome,
};
use ordtrack_latency::{AckSample, LatencyRecorder};
use tracing::{debug, error, info, warn};

// ---------------------------------------------------------------------------
// SendError
// ---------------------------------------------------------------------------

/// Why an outbound request did not reach the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// Refused locally; nothing was transmitted.
    Refused(Refusal),
    /// The engine did not accept the message.
    Transport(String),
}

impl SendError {
    pub fn is_refusal(&self) -> bool {
        matches!(self, SendError::Refused(_))
    }
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendError::Refused(r) => write!(f, "{r}"),
            SendError::Transport(msg) => write!(f, "SEND_FAILED: {msg}"),
        }
    }
}

impl std::error::Error for SendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SendError::Refused(r) => Some(r),
            SendError::Transport(_) => None,
        }
    }
}

impl From<Refusal> for SendError {
    fn from(r: Refusal) -> Self {
        SendError::Refused(r)
    }
}

// ---------------------------------------------------------------------------
// Amend
// ---------------------------------------------------------------------------

/// Fields a replace may change. `None` restates the tracked value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Amend {
    pub price: Option<i64>,
    pub quantity: Option<i64>,
}

impl Amend {
    pub fn price(price: i64) -> Self {
        Self {
            price: Some(price),
            quantity: None,
        }
    }
}

// ---------------------------------------------------------------------------
// OrderSession
// ---------------------------------------------------------------------------

pub struct OrderSession<E: ProtocolEngine> {
    engine: E,
    ids: Arc<dyn IdGenerator>,
    tracker: OrderTracker,
    correlator: AckCorrelator,
    latency: Option<Arc<LatencyRecorder>>,
}

impl<E: ProtocolEngine> OrderSession<E> {
    pub fn new(engine: E, ids: Arc<dyn IdGenerator>, reject_policy: RejectPolicy) -> Self {
        Self {
            engine,
            ids,
            tracker: OrderTracker::new(reject_policy),
            correlator: AckCorrelator::new(),
            latency: None,
        }
    }

    /// How long acks nobody waits for stay buffered.
    pub fn with_ack_retention(mut self, retention: Duration) -> Self {
        self.correlator = AckCorrelator::with_retention(retention);
        self
    }

    pub fn with_latency(mut self, recorder: Arc<LatencyRecorder>) -> Self {
        self.latency = Some(recorder);
        self
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn tracker(&self) -> &OrderTracker {
        &self.tracker
    }

    pub fn correlator(&self) -> &AckCorrelator {
        &self.correlator
    }

    pub fn latency(&self) -> Option<&Arc<LatencyRecorder>> {
        self.latency.as_ref()
    }

    pub fn lookup(&self, id: &ClOrdId) -> Option<OrderRecord> {
        self.tracker.lookup(id)
    }

    /// Register and transmit a brand-new order. Returns its first identifier.
    pub fn send_new(&self, order: NewOrder) -> Result<ClOrdId, SendError> {
        let id = self.ids.next_id(ActionKind::New);
        let action = OutboundAction::New(NewOrderSingle {
            cl_ord_id: id.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            quantity: order.quantity,
            price: order.price,
            time_in_force: order.time_in_force.unwrap_or(TimeInForce::Day),
            account: order.account.clone(),
            security_sub_type: order.security_sub_type.clone(),
        });

        self.tracker
            .register(OrderRecord::registered(id.clone(), order));
        if let Some(lat) = &self.latency {
            lat.note_send(&id);
        }

        if let Err(e) = self.engine.transmit(&action) {
            error!(action = %ActionKind::New, cl_ord_id = %id, error = %e, "transmit failed");
            self.tracker.apply_order_reject(&id);
            return Err(SendError::Transport(format!("{e:#}")));
        }
        info!(
            action = %ActionKind::New,
            tag = ActionKind::New.log_tag(),
            cl_ord_id = %id,
            symbol = %action.symbol(),
            "request sent"
        );
        Ok(id)
    }

    /// Amend a live order. Returns the fresh replace identifier.
    ///
    /// Refused without transmitting when `current_id` is unknown or not
    /// `Live`. The tracker keeps the order under `current_id` until the
    /// venue acknowledges the replace.
    pub fn send_replace(&self, current_id: &ClOrdId, amend: Amend) -> Result<ClOrdId, SendError> {
        let snapshot = self.tracker.begin_replace(current_id)?;
        let new_id = self.ids.next_id(ActionKind::Replace);
        let action = OutboundAction::Replace(CancelReplaceRequest {
            orig_cl_ord_id: current_id.clone(),
            cl_ord_id: new_id.clone(),
            venue_order_id: snapshot.venue_order_id.clone(),
            symbol: snapshot.symbol.clone(),
            side: snapshot.side,
            quantity: amend.quantity.unwrap_or(snapshot.quantity),
            price: amend.price.or(snapshot.price),
            time_in_force: snapshot.time_in_force,
            account: snapshot.account.clone(),
            security_sub_type: snapshot.security_sub_type.clone(),
        });
        self.transmit_amendment(current_id, &new_id, &action)?;
        Ok(new_id)
    }

    /// Cancel a live order. Returns the cancel request's identifier.
    pub fn send_cancel(&self, current_id: &ClOrdId) -> Result<ClOrdId, SendError> {
        let snapshot = self.tracker.begin_cancel(current_id)?;
        let new_id = self.ids.next_id(ActionKind::Cancel);
        let action = OutboundAction::Cancel(CancelRequest {
            orig_cl_ord_id: current_id.clone(),
            cl_ord_id: new_id.clone(),
            venue_order_id: snapshot.venue_order_id.clone(),
            symbol: snapshot.symbol.clone(),
            side: snapshot.side,
            quantity: snapshot.quantity,
            time_in_force: snapshot.time_in_force,
            account: snapshot.account.clone(),
            security_sub_type: snapshot.security_sub_type.clone(),
        });
        self.transmit_amendment(current_id, &new_id, &action)?;
        Ok(new_id)
    }

    fn transmit_amendment(
        &self,
        current_id: &ClOrdId,
        new_id: &ClOrdId,
        action: &OutboundAction,
    ) -> Result<(), SendError> {
        let kind = action.action_kind();
        if let Err(e) = self.engine.transmit(action) {
            error!(action = %kind, orig_cl_ord_id = %current_id, cl_ord_id = %new_id, error = %e, "transmit failed");
            self.tracker.clear_pending(current_id);
            return Err(SendError::Transport(format!("{e:#}")));
        }
        info!(
            action = %kind,
            tag = kind.log_tag(),
            orig_cl_ord_id = %current_id,
            cl_ord_id = %new_id,
            "request sent"
        );
        Ok(())
    }

    /// Block until an ack in `kinds` arrives for `id`, or `timeout`.
    pub fn wait_for(&self, id: &ClOrdId, kinds: AckKindSet, timeout: Duration) -> WaitOutcome {
        self.correlator.wait_for(id, kinds, timeout)
    }

    fn apply_to_tracker(&self, report: &ExecutionReport) -> AckOutcome {
        let id = &report.cl_ord_id;
        match report.kind {
            AckKind::New => self
                .tracker
                .apply_new_ack(id, report.venue_order_id.as_deref()),
            AckKind::Replaced => match &report.orig_cl_ord_id {
                Some(orig) => self.tracker.apply_replace_ack(orig, id, report.price),
                None => {
                    warn!(cl_ord_id = %id, "replace ack without orig_cl_ord_id");
                    AckOutcome::Ignored
                }
            },
            // Unsolicited cancels carry no orig; the order is under `id`.
            AckKind::Canceled => {
                let orig = report.orig_cl_ord_id.as_ref().unwrap_or(id);
                self.tracker.apply_cancel_ack(orig, id)
            }
            AckKind::Rejected => self.tracker.apply_order_reject(id),
            AckKind::CancelRejected => {
                let target = report.orig_cl_ord_id.as_ref().unwrap_or(id);
                self.tracker.apply_reject(target, report.reject_reason)
            }
            AckKind::PartialFill | AckKind::Fill => self.tracker.apply_fill(
                id,
                report.last_qty.unwrap_or(0),
                report.kind == AckKind::Fill,
            ),
            AckKind::PendingNew
            | AckKind::PendingReplace
            | AckKind::PendingCancel
            | AckKind::Other => AckOutcome::Ignored,
        }
    }
}

impl<E: ProtocolEngine> InboundHandler for OrderSession<E> {
    fn on_execution_report(&self, report: ExecutionReport) {
        let outcome = self.apply_to_tracker(&report);
        if outcome == AckOutcome::NotFound {
            debug!(cl_ord_id = %report.cl_ord_id, kind = %report.kind, "ack for untracked identifier");
        }

        if let Some(lat) = &self.latency {
            lat.note_ack(AckSample::from(&report));
        }

        let event = AckEvent {
            kind: report.kind,
            ord_status: report.ord_status,
            cl_ord_id: report.cl_ord_id.clone(),
        };
        self.correlator.notify(&report.cl_ord_id, event);
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
