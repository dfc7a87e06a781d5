use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::ClOrdId;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// FIX `Side` (54) value.
    pub fn code(&self) -> char {
        match self {
            Side::Buy => '1',
            Side::Sell => '2',
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeInForce {
    Day,
    GoodTillCancel,
    ImmediateOrCancel,
    FillOrKill,
    GoodTillDate,
}

impl TimeInForce {
    /// FIX `TimeInForce` (59) value.
    pub fn code(&self) -> char {
        match self {
            TimeInForce::Day => '0',
            TimeInForce::GoodTillCancel => '1',
            TimeInForce::ImmediateOrCancel => '3',
            TimeInForce::FillOrKill => '4',
            TimeInForce::GoodTillDate => '6',
        }
    }
}

// ---------------------------------------------------------------------------
// OrderState
// ---------------------------------------------------------------------------

/// Local view of where one logical order is in its lifecycle.
///
/// ```text
///  register      New ack                    Replace ack
///  ───────► Registered ──────► Live ◄──────────────────── PendingReplace
///                 │             │  │ begin_replace ───────────►│
///                 │             │  │ begin_cancel ──► PendingCancel ── Cancel ack ─► Canceled
///                 │             │  └─ full fill ─► Filled
///                 └── order reject / clearing reject ─────────────────────────────► Rejected
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OrderState {
    /// Registered locally, not yet acknowledged by the venue.
    Registered,
    /// Acknowledged and working; the only amendable state.
    Live,
    /// A cancel/replace request is in flight.
    PendingReplace,
    /// A cancel request is in flight.
    PendingCancel,
    /// **Terminal.**
    Canceled,
    /// **Terminal.**
    Rejected,
    /// **Terminal.**
    Filled,
}

impl OrderState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Canceled | Self::Rejected | Self::Filled)
    }

    /// Working at the venue and free to be amended.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::PendingReplace | Self::PendingCancel)
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ---------------------------------------------------------------------------
// NewOrder / OrderRecord
// ---------------------------------------------------------------------------

/// Caller-supplied attributes of a brand-new limit order.
/// Prices are integer micros; quantity is always positive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewOrder {
    pub symbol: String,
    pub side: Side,
    pub quantity: i64,
    pub price: Option<i64>,
    pub time_in_force: Option<TimeInForce>,
    pub account: Option<String>,
    pub security_sub_type: Option<String>,
}

impl NewOrder {
    pub fn limit(symbol: impl Into<String>, side: Side, quantity: i64, price: i64) -> Self {
        debug_assert!(quantity > 0, "NewOrder.quantity must be > 0");
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            price: Some(price),
            time_in_force: None,
            account: None,
            security_sub_type: None,
        }
    }

    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    pub fn with_security_sub_type(mut self, sub_type: impl Into<String>) -> Self {
        self.security_sub_type = Some(sub_type.into());
        self
    }

    pub fn with_time_in_force(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = Some(tif);
        self
    }
}

/// One logical order, addressed over its lifetime by a changing identifier.
///
/// `first_id` is fixed at construction. `current_id`, `state`, `price` and
/// `venue_order_id` are only mutated by [`crate::OrderTracker`], which keeps
/// the index key equal to `current_id`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderRecord {
    pub symbol: String,
    pub side: Side,
    pub quantity: i64,
    pub price: Option<i64>,
    pub time_in_force: Option<TimeInForce>,
    pub account: Option<String>,
    pub security_sub_type: Option<String>,
    first_id: ClOrdId,
    pub(crate) current_id: ClOrdId,
    pub venue_order_id: Option<String>,
    pub(crate) state: OrderState,
    /// Cumulative quantity reported filled.
    pub filled_qty: i64,
}

impl OrderRecord {
    /// A freshly minted order under its first identifier.
    pub fn registered(id: ClOrdId, order: NewOrder) -> Self {
        Self {
            symbol: order.symbol,
            side: order.side,
            quantity: order.quantity,
            price: order.price,
            time_in_force: order.time_in_force,
            account: order.account,
            security_sub_type: order.security_sub_type,
            first_id: id.clone(),
            current_id: id,
            venue_order_id: None,
            state: OrderState::Registered,
            filled_qty: 0,
        }
    }

    pub fn first_id(&self) -> &ClOrdId {
        &self.first_id
    }

    pub fn current_id(&self) -> &ClOrdId {
        &self.current_id
    }

    pub fn state(&self) -> OrderState {
        self.state
    }

    pub fn is_live(&self) -> bool {
        self.state.is_live()
    }

    pub fn leaves_qty(&self) -> i64 {
        (self.quantity - self.filled_qty).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_record_starts_unacknowledged() {
        let rec = OrderRecord::registered(
            ClOrdId::new("c1"),
            NewOrder::limit("CBBTC_123125_132500", Side::Buy, 1, 520_000)
                .with_account("acct")
                .with_security_sub_type("YES"),
        );
        assert_eq!(rec.first_id(), rec.current_id());
        assert_eq!(rec.state(), OrderState::Registered);
        assert!(!rec.is_live());
        assert_eq!(rec.venue_order_id, None);
        assert_eq!(rec.security_sub_type.as_deref(), Some("YES"));
        assert_eq!(rec.leaves_qty(), 1);
    }

    #[test]
    fn terminal_and_live_classification() {
        assert!(OrderState::Live.is_live());
        assert!(!OrderState::PendingReplace.is_live());
        assert!(OrderState::PendingCancel.is_pending());
        for s in [OrderState::Canceled, OrderState::Rejected, OrderState::Filled] {
            assert!(s.is_terminal());
            assert!(!s.is_live());
        }
        assert!(!OrderState::Registered.is_terminal());
    }

    #[test]
    fn side_and_tif_codes() {
        assert_eq!(Side::Buy.code(), '1');
        assert_eq!(Side::Sell.code(), '2');
        assert_eq!(TimeInForce::Day.code(), '0');
        assert_eq!(TimeInForce::GoodTillCancel.code(), '1');
    }
}
