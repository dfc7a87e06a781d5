//! Deterministic venue-side order book.
//!
//! - Venue order ids are `PV-{n}`, n from 1 in acceptance order.
//! - Orders are keyed by the client identifier currently addressing them; a
//!   replace moves the entry to the new identifier.
//! - No matching. Fills only happen through [`PaperBook::fill`].
//! - No randomness, no timestamps.

use std::collections::BTreeMap;
use std::time::Duration;

use ordtrack_execution::{
    AckKind, CancelReplaceRequest, CancelRequest, ClOrdId, ExecutionReport, NewOrderSingle,
    OrdStatus, OutboundAction, Side, REJECT_UNKNOWN_ORDER,
};

/// Knobs for exercising client edge cases.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PaperBehavior {
    /// Delay before each batch of acknowledgments is delivered.
    pub ack_delay: Duration,
    /// Emit every New ack twice.
    pub duplicate_new_acks: bool,
    /// Reject every cancel/replace with this `CxlRejReason`.
    pub reject_replaces_with: Option<i32>,
    /// Reject every new order for this symbol.
    pub reject_symbol: Option<String>,
    /// Accept requests but never acknowledge them.
    pub silent: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VenueOrder {
    pub venue_order_id: String,
    pub symbol: String,
    pub side: Side,
    pub quantity: i64,
    pub price: Option<i64>,
    pub filled_qty: i64,
    pub status: OrdStatus,
}

impl VenueOrder {
    fn is_working(&self) -> bool {
        matches!(self.status, OrdStatus::New | OrdStatus::PartiallyFilled | OrdStatus::Replaced)
    }

    fn report(&self, kind: AckKind, id: &ClOrdId) -> ExecutionReport {
        let mut rep = ExecutionReport::new(kind, id.clone())
            .with_venue_order_id(self.venue_order_id.clone())
            .with_status(self.status)
            .with_quantity(self.quantity)
            .with_symbol(self.symbol.clone());
        if let Some(px) = self.price {
            rep = rep.with_price(px);
        }
        rep
    }
}

#[derive(Clone, Debug)]
pub struct PaperBook {
    behavior: PaperBehavior,
    orders: BTreeMap<ClOrdId, VenueOrder>,
    next_venue_id: u64,
}

impl PaperBook {
    pub fn new(behavior: PaperBehavior) -> Self {
        Self {
            behavior,
            orders: BTreeMap::new(),
            next_venue_id: 1,
        }
    }

    pub fn behavior(&self) -> &PaperBehavior {
        &self.behavior
    }

    /// Process one request and return the acknowledgments it produces, in
    /// delivery order.
    pub fn handle(&mut self, action: &OutboundAction) -> Vec<ExecutionReport> {
        let reports = match action {
            OutboundAction::New(req) => self.accept(req),
            OutboundAction::Replace(req) => self.replace(req),
            OutboundAction::Cancel(req) => self.cancel(req),
        };
        if self.behavior.silent {
            return Vec::new();
        }
        reports
    }

    /// Fill `qty` of the order currently addressed by `id`.
    pub fn fill(&mut self, id: &ClOrdId, qty: i64) -> Option<ExecutionReport> {
        let ord = self.orders.get_mut(id).filter(|o| o.is_working())?;
        let qty = qty.min(ord.quantity - ord.filled_qty);
        if qty <= 0 {
            return None;
        }
        ord.filled_qty += qty;
        let kind = if ord.filled_qty >= ord.quantity {
            ord.status = OrdStatus::Filled;
            AckKind::Fill
        } else {
            ord.status = OrdStatus::PartiallyFilled;
            AckKind::PartialFill
        };
        Some(ord.report(kind, id).with_last_qty(qty))
    }

    pub fn get(&self, id: &ClOrdId) -> Option<&VenueOrder> {
        self.orders.get(id)
    }

    pub fn working_count(&self) -> usize {
        self.orders.values().filter(|o| o.is_working()).count()
    }

    fn accept(&mut self, req: &NewOrderSingle) -> Vec<ExecutionReport> {
        let rejected = self.orders.contains_key(&req.cl_ord_id)
            || self.behavior.reject_symbol.as_deref() == Some(req.symbol.as_str());
        if rejected {
            return vec![ExecutionReport::new(AckKind::Rejected, req.cl_ord_id.clone())
                .with_status(OrdStatus::Rejected)
                .with_symbol(req.symbol.clone())];
        }

        let ord = VenueOrder {
            venue_order_id: format!("PV-{}", self.next_venue_id),
            symbol: req.symbol.clone(),
            side: req.side,
            quantity: req.quantity,
            price: req.price,
            filled_qty: 0,
            status: OrdStatus::New,
        };
        self.next_venue_id += 1;

        let ack = ord.report(AckKind::New, &req.cl_ord_id);
        self.orders.insert(req.cl_ord_id.clone(), ord);
        if self.behavior.duplicate_new_acks {
            vec![ack.clone(), ack]
        } else {
            vec![ack]
        }
    }

    fn replace(&mut self, req: &CancelReplaceRequest) -> Vec<ExecutionReport> {
        if let Some(code) = self.behavior.reject_replaces_with {
            return vec![cancel_reject(&req.cl_ord_id, &req.orig_cl_ord_id, code)];
        }
        let Some(mut ord) = self.take_working(&req.orig_cl_ord_id) else {
            return vec![cancel_reject(&req.cl_ord_id, &req.orig_cl_ord_id, REJECT_UNKNOWN_ORDER)];
        };
        ord.quantity = req.quantity;
        ord.price = req.price.or(ord.price);
        ord.status = OrdStatus::Replaced;

        let ack = ord
            .report(AckKind::Replaced, &req.cl_ord_id)
            .with_orig(req.orig_cl_ord_id.clone());
        self.orders.insert(req.cl_ord_id.clone(), ord);
        vec![ack]
    }

    fn cancel(&mut self, req: &CancelRequest) -> Vec<ExecutionReport> {
        if let Some(code) = self.behavior.reject_replaces_with {
            return vec![cancel_reject(&req.cl_ord_id, &req.orig_cl_ord_id, code)];
        }
        let Some(mut ord) = self.take_working(&req.orig_cl_ord_id) else {
            return vec![cancel_reject(&req.cl_ord_id, &req.orig_cl_ord_id, REJECT_UNKNOWN_ORDER)];
        };
        ord.status = OrdStatus::Canceled;

        let ack = ord
            .report(AckKind::Canceled, &req.cl_ord_id)
            .with_orig(req.orig_cl_ord_id.clone());
        self.orders.insert(req.cl_ord_id.clone(), ord);
        vec![ack]
    }

    fn take_working(&mut self, id: &ClOrdId) -> Option<VenueOrder> {
        match self.orders.get(id) {
            Some(o) if o.is_working() => self.orders.remove(id),
            _ => None,
        }
    }
}

fn cancel_reject(id: &ClOrdId, orig: &ClOrdId, reason: i32) -> ExecutionReport {
    ExecutionReport::new(AckKind::CancelRejected, id.clone())
        .with_orig(orig.clone())
        .with_reject_reason(reason)
}
