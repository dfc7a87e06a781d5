//! Boundary with the protocol engine.
//!
//! The engine (session layer, sequence numbers, encoding, transport) lives
//! outside this workspace. It is reached through two traits:
//!
//! * [`ProtocolEngine`]: outbound; the session hands it fully built
//!   [`OutboundAction`]s.
//! * [`InboundHandler`]: inbound; the engine calls it from its own dispatch
//!   thread with the correlation fields of every execution report.
//!
//! Prices on both sides are integer micros.

use std::sync::Arc;

use crate::correlator::{AckKind, OrdStatus};
use crate::ids::{ActionKind, ClOrdId};
use crate::order::{Side, TimeInForce};

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Correlation fields extracted from one inbound acknowledgment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionReport {
    pub kind: AckKind,
    /// Identifier of the request being acknowledged (tag 11).
    pub cl_ord_id: ClOrdId,
    /// Prior identifier on replace/cancel acks and cancel rejects (tag 41).
    pub orig_cl_ord_id: Option<ClOrdId>,
    pub venue_order_id: Option<String>,
    pub ord_status: Option<OrdStatus>,
    /// `CxlRejReason` (102) / `OrdRejReason` (103).
    pub reject_reason: Option<i32>,
    pub price: Option<i64>,
    pub quantity: Option<i64>,
    /// Quantity of this fill (tag 32).
    pub last_qty: Option<i64>,
    pub symbol: Option<String>,
}

impl ExecutionReport {
    pub fn new(kind: AckKind, cl_ord_id: impl Into<ClOrdId>) -> Self {
        Self {
            kind,
            cl_ord_id: cl_ord_id.into(),
            orig_cl_ord_id: None,
            venue_order_id: None,
            ord_status: None,
            reject_reason: None,
            price: None,
            quantity: None,
            last_qty: None,
            symbol: None,
        }
    }

    pub fn with_orig(mut self, orig: impl Into<ClOrdId>) -> Self {
        self.orig_cl_ord_id = Some(orig.into());
        self
    }

    pub fn with_venue_order_id(mut self, venue_order_id: impl Into<String>) -> Self {
        self.venue_order_id = Some(venue_order_id.into());
        self
    }

    pub fn with_status(mut self, status: OrdStatus) -> Self {
        self.ord_status = Some(status);
        self
    }

    pub fn with_reject_reason(mut self, reason: i32) -> Self {
        self.reject_reason = Some(reason);
        self
    }

    pub fn with_price(mut self, price: i64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_quantity(mut self, quantity: i64) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn with_last_qty(mut self, last_qty: i64) -> Self {
        self.last_qty = Some(last_qty);
        self
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }
}

/// Receives inbound acknowledgments from the protocol engine.
pub trait InboundHandler: Send + Sync {
    fn on_execution_report(&self, report: ExecutionReport);
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// New Order - Single.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderSingle {
    pub cl_ord_id: ClOrdId,
    pub symbol: String,
    pub side: Side,
    pub quantity: i64,
    pub price: Option<i64>,
    pub time_in_force: TimeInForce,
    pub account: Option<String>,
    pub security_sub_type: Option<String>,
}

/// Order Cancel/Replace Request. Venue-required fields are restated from the
/// tracked record; `price`/`quantity` carry either the amendment or the
/// restated current value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelReplaceRequest {
    pub orig_cl_ord_id: ClOrdId,
    pub cl_ord_id: ClOrdId,
    pub venue_order_id: Option<String>,
    pub symbol: String,
    pub side: Side,
    pub quantity: i64,
    pub price: Option<i64>,
    pub time_in_force: Option<TimeInForce>,
    pub account: Option<String>,
    pub security_sub_type: Option<String>,
}

/// Order Cancel Request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelRequest {
    pub orig_cl_ord_id: ClOrdId,
    pub cl_ord_id: ClOrdId,
    pub venue_order_id: Option<String>,
    pub symbol: String,
    pub side: Side,
    pub quantity: i64,
    pub time_in_force: Option<TimeInForce>,
    pub account: Option<String>,
    pub security_sub_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundAction {
    New(NewOrderSingle),
    Replace(CancelReplaceRequest),
    Cancel(CancelRequest),
}

impl OutboundAction {
    /// The fresh identifier this request was minted with.
    pub fn cl_ord_id(&self) -> &ClOrdId {
        match self {
            OutboundAction::New(req) => &req.cl_ord_id,
            OutboundAction::Replace(req) => &req.cl_ord_id,
            OutboundAction::Cancel(req) => &req.cl_ord_id,
        }
    }

    pub fn orig_cl_ord_id(&self) -> Option<&ClOrdId> {
        match self {
            OutboundAction::New(_) => None,
            OutboundAction::Replace(req) => Some(&req.orig_cl_ord_id),
            OutboundAction::Cancel(req) => Some(&req.orig_cl_ord_id),
        }
    }

    pub fn action_kind(&self) -> ActionKind {
        match self {
            OutboundAction::New(_) => ActionKind::New,
            OutboundAction::Replace(_) => ActionKind::Replace,
            OutboundAction::Cancel(_) => ActionKind::Cancel,
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            OutboundAction::New(req) => &req.symbol,
            OutboundAction::Replace(req) => &req.symbol,
            OutboundAction::Cancel(req) => &req.symbol,
        }
    }
}

/// Outbound half of the protocol engine.
///
/// `transmit` returns once the engine has accepted the message for sending;
/// acknowledgments come back later through [`InboundHandler`].
pub trait ProtocolEngine: Send + Sync {
    fn transmit(&self, action: &OutboundAction) -> anyhow::Result<()>;
}

impl<E: ProtocolEngine + ?Sized> ProtocolEngine for Arc<E> {
    fn transmit(&self, action: &OutboundAction) -> anyhow::Result<()> {
        (**self).transmit(action)
    }
}
