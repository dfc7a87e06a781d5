//! Workflow driver: order-entry patterns built on [`OrderSession`].
//!
//! Parameters come from [`WorkflowParams`], derived from a validated
//! [`ClientConfig`]. Ack timeouts are counted in the report and never abort
//! a run.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use ordtrack_config::ClientConfig;
use ordtrack_execution::{
    clamp_to_ceiling, price_to_micros, quantize, ratchet_step, AckKind, AckKindSet, ClOrdId,
    NewOrder, PriceLadder, ProtocolEngine, Side, TimeInForce, WaitOutcome,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::session::{Amend, OrderSession, SendError};

// ---------------------------------------------------------------------------
// WorkflowMode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowMode {
    /// Send `max_loop` identical orders.
    SimpleRepeat,
    /// Send `max_loop` orders bouncing across `[price, price + scope]`.
    Layer,
    /// Send a batch, then bump each live order once.
    Replace,
    /// One order, replaced `repeats` times. Steps taken while an ack is
    /// still outstanding are skipped; the run stops once the order is gone.
    Ratchet,
    /// Send a batch, then cancel each order.
    Cancel,
    /// One order per symbol, each ratcheted through a wrapping band.
    LadderMulti,
}

impl WorkflowMode {
    pub const ALL: [WorkflowMode; 6] = [
        WorkflowMode::SimpleRepeat,
        WorkflowMode::Layer,
        WorkflowMode::Replace,
        WorkflowMode::Ratchet,
        WorkflowMode::Cancel,
        WorkflowMode::LadderMulti,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowMode::SimpleRepeat => "simple-repeat",
            WorkflowMode::Layer => "layer",
            WorkflowMode::Replace => "replace",
            WorkflowMode::Ratchet => "ratchet",
            WorkflowMode::Cancel => "cancel",
            WorkflowMode::LadderMulti => "ladder-multi",
        }
    }
}

impl fmt::Display for WorkflowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownModeError(pub String);

impl fmt::Display for UnknownModeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = WorkflowMode::ALL.iter().map(|m| m.as_str()).collect();
        write!(f, "unknown workflow mode '{}' (expected one of: {})", self.0, names.join(", "))
    }
}

impl std::error::Error for UnknownModeError {}

impl FromStr for WorkflowMode {
    type Err = UnknownModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase().replace('_', "-");
        match norm.as_str() {
            "simple-repeat" | "simplerepeat" => Ok(WorkflowMode::SimpleRepeat),
            "layer" => Ok(WorkflowMode::Layer),
            "replace" => Ok(WorkflowMode::Replace),
            "ratchet" => Ok(WorkflowMode::Ratchet),
            "cancel" => Ok(WorkflowMode::Cancel),
            "ladder-multi" => Ok(WorkflowMode::LadderMulti),
            _ => Err(UnknownModeError(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowParams
// ---------------------------------------------------------------------------

/// Config values converted to the units the driver works in (integer micros
/// and `Duration`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowParams {
    pub symbol: String,
    pub symbols: Vec<String>,
    pub side: Side,
    pub account: Option<String>,
    pub security_sub_type: Option<String>,
    pub time_in_force: TimeInForce,
    pub quantity: i64,
    pub price: i64,
    pub tick: i64,
    pub step: i64,
    pub scope: i64,
    pub max_price: i64,
    pub bump: i64,
    pub max_loop: u32,
    pub ratchet_repeats: u32,
    pub ratchet_pause: Duration,
    pub ack_timeout: Duration,
    pub pacing: Duration,
}

impl WorkflowParams {
    pub fn from_config(cfg: &ClientConfig) -> Result<Self> {
        cfg.validate()?;
        let micros = |field: &str, v: f64| {
            price_to_micros(v).with_context(|| format!("convert {field}={v} to micros"))
        };
        let tick = micros("ladder.tick", cfg.ladder.tick)?;
        Ok(Self {
            symbol: cfg.order.symbol.clone(),
            symbols: cfg.ladder_symbols(),
            side: cfg.order.side,
            account: cfg.order.account.clone(),
            security_sub_type: cfg.order.security_sub_type.clone(),
            time_in_force: cfg.order.time_in_force,
            quantity: cfg.order.quantity,
            price: quantize(micros("order.price", cfg.order.price)?, tick)?,
            tick,
            step: quantize(micros("ladder.step", cfg.ladder.step)?, tick)?,
            scope: quantize(micros("ladder.scope", cfg.ladder.scope)?, tick)?,
            max_price: micros("ladder.max_price", cfg.ladder.max_price)?,
            bump: quantize(micros("ratchet.bump", cfg.ratchet.bump)?, tick)?,
            max_loop: cfg.workflow.max_loop,
            ratchet_repeats: cfg.ratchet.repeats,
            ratchet_pause: Duration::from_millis(cfg.ratchet.pause_ms),
            ack_timeout: Duration::from_millis(cfg.workflow.ack_timeout_ms),
            pacing: Duration::from_millis(cfg.workflow.pacing_ms),
        })
    }

    fn order_at(&self, symbol: &str, price: i64) -> NewOrder {
        let mut order = NewOrder::limit(symbol, self.side, self.quantity, price)
            .with_time_in_force(self.time_in_force);
        order.account = self.account.clone();
        order.security_sub_type = self.security_sub_type.clone();
        order
    }

    /// Quantize and cap an amended price.
    fn amended_price(&self, raw: i64) -> Result<i64> {
        Ok(clamp_to_ceiling(quantize(raw, self.tick)?, self.max_price))
    }
}

// ---------------------------------------------------------------------------
// WorkflowReport
// ---------------------------------------------------------------------------

/// Counters for one workflow run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkflowReport {
    /// New orders transmitted.
    pub sent: usize,
    /// New acks received within the timeout.
    pub acked: usize,
    /// Replace acks received within the timeout.
    pub replaced: usize,
    /// Cancel acks received within the timeout.
    pub canceled: usize,
    /// Order rejects and cancel/replace rejects received.
    pub rejected: usize,
    /// Amendments refused locally (order not live).
    pub refused: usize,
    /// Waits that ended without a matching ack.
    pub timed_out: usize,
}

impl fmt::Display for WorkflowReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sent={} acked={} replaced={} canceled={} rejected={} refused={} timed_out={}",
            self.sent,
            self.acked,
            self.replaced,
            self.canceled,
            self.rejected,
            self.refused,
            self.timed_out
        )
    }
}

// ---------------------------------------------------------------------------
// WorkflowDriver
// ---------------------------------------------------------------------------

pub struct WorkflowDriver<E: ProtocolEngine> {
    session: Arc<OrderSession<E>>,
    params: WorkflowParams,
}

impl<E: ProtocolEngine> WorkflowDriver<E> {
    pub fn new(session: Arc<OrderSession<E>>, params: WorkflowParams) -> Self {
        Self { session, params }
    }

    pub fn session(&self) -> &Arc<OrderSession<E>> {
        &self.session
    }

    pub fn params(&self) -> &WorkflowParams {
        &self.params
    }

    pub fn run(&self, mode: WorkflowMode) -> Result<WorkflowReport> {
        info!(mode = %mode, symbol = %self.params.symbol, "workflow started");
        let report = match mode {
            WorkflowMode::SimpleRepeat => self.simple_repeat(),
            WorkflowMode::Layer => self.layer(),
            WorkflowMode::Replace => self.replace(),
            WorkflowMode::Ratchet => self.ratchet(),
            WorkflowMode::Cancel => self.cancel(),
            WorkflowMode::LadderMulti => self.ladder_multi(),
        }?;
        info!(mode = %mode, %report, "workflow finished");
        Ok(report)
    }

    fn simple_repeat(&self) -> Result<WorkflowReport> {
        let mut report = WorkflowReport::default();
        let order = self.params.order_at(&self.params.symbol, self.params.price);
        let mut created = Vec::new();
        for _ in 0..self.params.max_loop {
            created.push(self.send_new(order.clone(), &mut report)?);
            self.pace();
        }
        self.settle_new(&created, &mut report);
        Ok(report)
    }

    fn layer(&self) -> Result<WorkflowReport> {
        let mut report = WorkflowReport::default();
        let p = &self.params;
        let ladder = PriceLadder::new(p.price, p.price + p.scope, p.step, p.tick, p.max_loop as usize)?;
        let mut created = Vec::new();
        for price in ladder {
            created.push(self.send_new(p.order_at(&p.symbol, price), &mut report)?);
            self.pace();
        }
        self.settle_new(&created, &mut report);
        Ok(report)
    }

    fn replace(&self) -> Result<WorkflowReport> {
        let mut report = WorkflowReport::default();
        let p = &self.params;
        let order = p.order_at(&p.symbol, p.price);
        let mut created = Vec::new();
        for _ in 0..p.max_loop {
            created.push(self.send_new(order.clone(), &mut report)?);
            self.pace();
        }
        self.settle_new(&created, &mut report);

        let mut pending = Vec::new();
        for id in &created {
            let Some(rec) = self.session.lookup(id) else {
                report.refused += 1;
                continue;
            };
            let price = p.amended_price(rec.price.unwrap_or(p.price) + p.bump)?;
            if let Some(new_id) = self.try_replace(id, price, &mut report)? {
                pending.push(new_id);
            }
        }
        for new_id in &pending {
            self.await_replace(new_id, &mut report);
        }
        Ok(report)
    }

    fn ratchet(&self) -> Result<WorkflowReport> {
        let mut report = WorkflowReport::default();
        let p = &self.params;
        let first = self.send_new(p.order_at(&p.symbol, p.price), &mut report)?;
        self.settle_new(std::slice::from_ref(&first), &mut report);

        let mut chain = Chain::new(first);
        for k in 0..p.ratchet_repeats {
            match self.step_target(&mut chain) {
                Step::Amend => {}
                Step::Wait => {
                    info!(cl_ord_id = %chain.current, step = k, "ratchet step skipped: order not live yet");
                    thread::sleep(p.ratchet_pause);
                    continue;
                }
                Step::Stop => {
                    info!(cl_ord_id = %chain.current, step = k, "ratchet stopped: order gone");
                    break;
                }
            }
            let price = p.amended_price(p.price + (i64::from(k) + 1) * p.bump)?;
            let Some(new_id) = self.try_replace(&chain.current, price, &mut report)? else {
                break;
            };
            let outcome = self.await_replace(&new_id, &mut report);
            chain.settle(new_id, outcome);
            thread::sleep(p.ratchet_pause);
        }
        Ok(report)
    }

    fn cancel(&self) -> Result<WorkflowReport> {
        let mut report = WorkflowReport::default();
        let p = &self.params;
        let order = p.order_at(&p.symbol, p.price);
        let mut created = Vec::new();
        for _ in 0..p.max_loop {
            created.push(self.send_new(order.clone(), &mut report)?);
        }
        self.settle_new(&created, &mut report);

        let mut cancels = Vec::new();
        for id in &created {
            match self.session.send_cancel(id) {
                Ok(cx) => cancels.push(cx),
                Err(SendError::Refused(r)) => {
                    warn!(cl_ord_id = %id, reason = %r, "cancel skipped");
                    report.refused += 1;
                }
                Err(e) => return Err(e).context("cancel transmit failed"),
            }
        }

        let kinds = AckKindSet::of(&[AckKind::Canceled, AckKind::CancelRejected]);
        for cx in &cancels {
            match self.session.wait_for(cx, kinds, p.ack_timeout) {
                WaitOutcome::Matched(ev) if ev.kind == AckKind::Canceled => report.canceled += 1,
                WaitOutcome::Matched(_) => report.rejected += 1,
                WaitOutcome::TimedOut | WaitOutcome::Cancelled => {
                    warn!(cl_ord_id = %cx, "no cancel ack within timeout");
                    report.timed_out += 1;
                }
            }
        }
        Ok(report)
    }

    fn ladder_multi(&self) -> Result<WorkflowReport> {
        let mut report = WorkflowReport::default();
        let p = &self.params;
        let low = p.price;
        let high = clamp_to_ceiling(p.price + p.step + p.scope, p.max_price);

        let mut ladder: BTreeMap<String, Chain> = BTreeMap::new();
        for sym in &p.symbols {
            let id = self.send_new(p.order_at(sym, p.price), &mut report)?;
            self.settle_new(std::slice::from_ref(&id), &mut report);
            ladder.insert(sym.clone(), Chain::new(id));
        }

        for pass in 0..p.ratchet_repeats {
            info!(pass = pass + 1, of = p.ratchet_repeats, "ladder pass");
            for (sym, chain) in ladder.iter_mut() {
                if self.step_target(chain) != Step::Amend {
                    warn!(symbol = %sym, cl_ord_id = %chain.current, "ladder skip: order not live");
                    continue;
                }
                let Some(rec) = self.session.lookup(&chain.current) else {
                    continue;
                };
                let cur = rec.price.unwrap_or(low);
                let price = p.amended_price(ratchet_step(cur, low, high, p.step))?;
                let Some(new_id) = self.try_replace(&chain.current, price, &mut report)? else {
                    continue;
                };
                let outcome = self.await_replace(&new_id, &mut report);
                chain.settle(new_id, outcome);
            }
            thread::sleep(p.ratchet_pause);
        }
        Ok(report)
    }

    /// Decide whether the chain's order can be amended now. A replace that
    /// timed out is followed once its ack lands.
    fn step_target(&self, chain: &mut Chain) -> Step {
        if let Some(unacked) = &chain.unacked {
            if self.session.lookup(unacked).is_some() {
                info!(orig_cl_ord_id = %chain.current, cl_ord_id = %unacked, "late replace ack followed");
                chain.current = unacked.clone();
                chain.unacked = None;
            }
        }
        match self.session.lookup(&chain.current) {
            Some(rec) if rec.is_live() => {
                // A late cancel-reject put the order back under its old id.
                chain.unacked = None;
                Step::Amend
            }
            Some(rec) if !rec.state().is_terminal() => Step::Wait,
            _ => Step::Stop,
        }
    }

    // -- helpers -------------------------------------------------------------

    fn send_new(&self, order: NewOrder, report: &mut WorkflowReport) -> Result<ClOrdId> {
        let id = self.session.send_new(order).context("new order transmit failed")?;
        report.sent += 1;
        Ok(id)
    }

    /// `Ok(None)` when the replace was refused locally.
    fn try_replace(
        &self,
        id: &ClOrdId,
        price: i64,
        report: &mut WorkflowReport,
    ) -> Result<Option<ClOrdId>> {
        match self.session.send_replace(id, Amend::price(price)) {
            Ok(new_id) => Ok(Some(new_id)),
            Err(SendError::Refused(r)) => {
                warn!(cl_ord_id = %id, reason = %r, "replace skipped");
                report.refused += 1;
                Ok(None)
            }
            Err(e) => Err(e).context("replace transmit failed"),
        }
    }

    /// Wait for the outcome of a replace. Returns the matched ack kind.
    fn await_replace(&self, new_id: &ClOrdId, report: &mut WorkflowReport) -> Option<AckKind> {
        let kinds = AckKindSet::of(&[AckKind::Replaced, AckKind::CancelRejected]);
        match self.session.wait_for(new_id, kinds, self.params.ack_timeout) {
            WaitOutcome::Matched(ev) => {
                if ev.kind == AckKind::Replaced {
                    report.replaced += 1;
                } else {
                    report.rejected += 1;
                }
                Some(ev.kind)
            }
            WaitOutcome::TimedOut | WaitOutcome::Cancelled => {
                warn!(cl_ord_id = %new_id, "no replace ack within timeout");
                report.timed_out += 1;
                None
            }
        }
    }

    fn settle_new(&self, ids: &[ClOrdId], report: &mut WorkflowReport) {
        let kinds = AckKindSet::of(&[AckKind::New, AckKind::Rejected]);
        for id in ids {
            match self.session.wait_for(id, kinds, self.params.ack_timeout) {
                WaitOutcome::Matched(ev) if ev.kind == AckKind::New => report.acked += 1,
                WaitOutcome::Matched(_) => report.rejected += 1,
                WaitOutcome::TimedOut | WaitOutcome::Cancelled => {
                    warn!(cl_ord_id = %id, "no new ack within timeout");
                    report.timed_out += 1;
                }
            }
        }
    }

    fn pace(&self) {
        if !self.params.pacing.is_zero() {
            thread::sleep(self.params.pacing);
        }
    }
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

/// One order being amended step after step.
///
/// `current` is the identifier the tracker files the order under. A replace
/// whose ack did not arrive in time is remembered in `unacked`; the tracker
/// keeps the order under `current` until that ack lands.
#[derive(Debug)]
struct Chain {
    current: ClOrdId,
    unacked: Option<ClOrdId>,
}

impl Chain {
    fn new(first: ClOrdId) -> Self {
        Self {
            current: first,
            unacked: None,
        }
    }

    fn settle(&mut self, new_id: ClOrdId, outcome: Option<AckKind>) {
        match outcome {
            Some(AckKind::Replaced) => {
                self.current = new_id;
                self.unacked = None;
            }
            Some(_) => self.unacked = None,
            None => self.unacked = Some(new_id),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Step {
    Amend,
    /// Not live yet: New or replace ack still outstanding.
    Wait,
    /// Gone (terminal or untracked).
    Stop,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_parse_with_either_separator() {
        assert_eq!("simplerepeat".parse::<WorkflowMode>().unwrap(), WorkflowMode::SimpleRepeat);
        assert_eq!("ladder_multi".parse::<WorkflowMode>().unwrap(), WorkflowMode::LadderMulti);
        assert_eq!("Ladder-Multi".parse::<WorkflowMode>().unwrap(), WorkflowMode::LadderMulti);
        for m in WorkflowMode::ALL {
            assert_eq!(m.as_str().parse::<WorkflowMode>().unwrap(), m);
        }
    }

    #[test]
    fn unknown_mode_lists_choices() {
        let err = "bounce".parse::<WorkflowMode>().unwrap_err();
        assert!(err.to_string().contains("ladder-multi"));
    }

    #[test]
    fn params_convert_to_micros() {
        let p = WorkflowParams::from_config(&ClientConfig::default()).unwrap();
        assert_eq!(p.price, 520_000);
        assert_eq!(p.tick, 10_000);
        assert_eq!(p.scope, 100_000);
        assert_eq!(p.max_price, 990_000);
        assert_eq!(p.ratchet_pause, Duration::from_millis(200));
        assert_eq!(p.symbols, vec![p.symbol.clone()]);
    }

    #[test]
    fn amended_price_is_capped() {
        let p = WorkflowParams::from_config(&ClientConfig::default()).unwrap();
        assert_eq!(p.amended_price(1_500_000).unwrap(), 990_000);
        assert_eq!(p.amended_price(534_999).unwrap(), 530_000);
    }

    #[test]
    fn report_display_lists_every_counter() {
        let r = WorkflowReport {
            sent: 3,
            acked: 2,
            timed_out: 1,
            ..Default::default()
        };
        assert_eq!(
            r.to_string(),
            "sent=3 acked=2 replaced=0 canceled=0 rejected=0 refused=0 timed_out=1"
        );
    }

    #[test]
    fn chain_follows_only_acknowledged_replaces() {
        let mut chain = Chain::new(ClOrdId::new("c1"));
        chain.settle(ClOrdId::new("r1"), None);
        assert_eq!(chain.current, ClOrdId::new("c1"));
        assert_eq!(chain.unacked, Some(ClOrdId::new("r1")));

        chain.settle(ClOrdId::new("r2"), Some(AckKind::CancelRejected));
        assert_eq!(chain.current, ClOrdId::new("c1"));
        assert_eq!(chain.unacked, None);

        chain.settle(ClOrdId::new("r3"), Some(AckKind::Replaced));
        assert_eq!(chain.current, ClOrdId::new("r3"));
    }
}
