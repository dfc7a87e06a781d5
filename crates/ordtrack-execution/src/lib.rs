//! ordtrack-execution
//!
//! Local order bookkeeping for an order-entry client:
//! - identifiers (`ids`) and the order record (`order`)
//! - integer-micros prices, tick quantization, bouncing ladders (`prices`)
//! - the Order Tracker: concurrent index keyed by each order's current
//!   identifier, with atomic re-keying on replace/cancel acks (`tracker`)
//! - the Acknowledgment Correlator: per-identifier wait queues (`correlator`)
//! - the protocol-engine boundary types and traits (`protocol`)
//!
//! Nothing here talks to a network. The engine is injected through
//! [`ProtocolEngine`] and feeds acks back through [`InboundHandler`].

mod correlator;
mod ids;
mod order;
mod prices;
mod protocol;
mod tracker;

pub use correlator::{
    AckCorrelator, AckEvent, AckKind, AckKindSet, OrdStatus, WaitOutcome, DEFAULT_ACK_RETENTION,
};

pub use ids::{ActionKind, ClOrdId, IdGenerator, SequenceIdGenerator, UuidIdGenerator};

pub use order::{NewOrder, OrderRecord, OrderState, Side, TimeInForce};

pub use prices::{
    bounce, clamp_to_ceiling, micros_to_price, price_to_micros, quantize, ratchet_step, Direction,
    PriceLadder, PricingError, MICROS_PER_UNIT,
};

pub use protocol::{
    CancelReplaceRequest, CancelRequest, ExecutionReport, InboundHandler, NewOrderSingle,
    OutboundAction, ProtocolEngine,
};

pub use tracker::{
    AckOutcome, OrderTracker, Refusal, RejectPolicy, REJECT_TOO_LATE, REJECT_UNKNOWN_ORDER,
};
