use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use ordtrack_execution::{price_to_micros, quantize, Side, TimeInForce};
use serde::{Deserialize, Serialize};

use crate::LoadedConfig;

/// Everything a workflow run reads, passed explicitly to the driver.
///
/// Every section is optional in YAML; missing keys take the defaults below.
/// Unknown keys are an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub session: SessionConfig,
    pub order: OrderConfig,
    /// Instruments for the symbol-ladder workflow. Empty means `order.symbol`.
    pub symbols: Vec<String>,
    pub ladder: LadderConfig,
    pub ratchet: RatchetConfig,
    pub workflow: WorkflowConfig,
    pub venue: VenueConfig,
    pub latency: LatencyConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// SenderSubID (50) stamped on application messages, never on Logon.
    pub sender_sub_id: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sender_sub_id: "4C001".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrderConfig {
    pub symbol: String,
    pub side: Side,
    pub account: Option<String>,
    pub security_sub_type: Option<String>,
    pub quantity: i64,
    /// Initial working price, in price units (0.52 = 52 cents).
    pub price: f64,
    pub time_in_force: TimeInForce,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            symbol: "CBBTC_123125_132500".to_string(),
            side: Side::Buy,
            account: None,
            security_sub_type: Some("YES".to_string()),
            quantity: 1,
            price: 0.52,
            time_in_force: TimeInForce::Day,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LadderConfig {
    /// Width of the price band above `order.price`.
    pub scope: f64,
    pub step: f64,
    pub tick: f64,
    /// No amended price may exceed this.
    pub max_price: f64,
}

impl Default for LadderConfig {
    fn default() -> Self {
        Self {
            scope: 0.10,
            step: 0.01,
            tick: 0.01,
            max_price: 0.99,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RatchetConfig {
    pub repeats: u32,
    pub bump: f64,
    pub pause_ms: u64,
}

impl Default for RatchetConfig {
    fn default() -> Self {
        Self {
            repeats: 10,
            bump: 0.01,
            pause_ms: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkflowConfig {
    /// Orders sent by the repeat, layer, replace and cancel workflows.
    pub max_loop: u32,
    pub ack_timeout_ms: u64,
    /// Gap between consecutive new orders in batch workflows.
    pub pacing_ms: u64,
    /// How long acks nobody waits for stay buffered in the correlator.
    pub ack_retention_ms: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_loop: 10,
            ack_timeout_ms: 1_000,
            pacing_ms: 10,
            ack_retention_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VenueConfig {
    /// Cancel-reject reason codes after which the target is no longer live.
    pub liveness_clearing_reject_codes: Vec<i32>,
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            liveness_clearing_reject_codes: vec![1, 6],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LatencyConfig {
    /// `None` keeps samples in memory only.
    pub csv_path: Option<PathBuf>,
    pub summary_every: usize,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            csv_path: Some(PathBuf::from("data/latency.csv")),
            summary_every: 50,
        }
    }
}

impl ClientConfig {
    /// Deserialize and validate the merged document.
    pub fn from_loaded(loaded: &LoadedConfig) -> Result<Self> {
        let cfg: ClientConfig = serde_json::from_value(loaded.config_json.clone())
            .context("CONFIG_INVALID client config does not match schema")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.session.sender_sub_id.trim().is_empty() {
            bail!("CONFIG_INVALID field=/session/sender_sub_id reason=empty");
        }
        if self.order.symbol.trim().is_empty() {
            bail!("CONFIG_INVALID field=/order/symbol reason=empty");
        }
        if self.order.quantity <= 0 {
            bail!(
                "CONFIG_INVALID field=/order/quantity reason=must be positive (got {})",
                self.order.quantity
            );
        }
        if let Some(i) = self.symbols.iter().position(|s| s.trim().is_empty()) {
            bail!("CONFIG_INVALID field=/symbols/{i} reason=empty");
        }

        let price = checked_price("/order/price", self.order.price)?;
        let tick = checked_price("/ladder/tick", self.ladder.tick)?;
        let step = checked_price("/ladder/step", self.ladder.step)?;
        let max_price = checked_price("/ladder/max_price", self.ladder.max_price)?;
        checked_price("/ladder/scope", self.ladder.scope)?;
        let bump = checked_price("/ratchet/bump", self.ratchet.bump)?;

        if tick <= 0 {
            bail!("CONFIG_INVALID field=/ladder/tick reason=must be positive");
        }
        checked_increment("/ladder/step", step, tick)?;
        checked_increment("/ratchet/bump", bump, tick)?;
        if price > max_price {
            bail!(
                "CONFIG_INVALID field=/order/price reason=above max_price ({} > {})",
                self.order.price,
                self.ladder.max_price
            );
        }
        checked_millis("/workflow/ack_timeout_ms", self.workflow.ack_timeout_ms)?;
        checked_millis("/workflow/ack_retention_ms", self.workflow.ack_retention_ms)?;
        Ok(())
    }

    /// Instruments for the symbol ladder.
    pub fn ladder_symbols(&self) -> Vec<String> {
        if self.symbols.is_empty() {
            vec![self.order.symbol.clone()]
        } else {
            self.symbols.clone()
        }
    }
}

/// Upper bound for any configured wait: one hour.
pub const MAX_WAIT_MS: u64 = 3_600_000;

fn checked_millis(field: &str, value: u64) -> Result<u64> {
    if value == 0 {
        bail!("CONFIG_INVALID field={field} reason=must be positive");
    }
    if value > MAX_WAIT_MS {
        bail!("CONFIG_INVALID field={field} reason=above {MAX_WAIT_MS} ms (got {value})");
    }
    Ok(value)
}

/// Price increments are quantized to the tick before use; one that rounds
/// to zero would never move the price.
fn checked_increment(field: &str, micros: i64, tick: i64) -> Result<()> {
    let quantized = quantize(micros, tick)
        .map_err(|e| anyhow::anyhow!("CONFIG_INVALID field={field} reason={e}"))?;
    if quantized <= 0 {
        bail!("CONFIG_INVALID field={field} reason=rounds to zero at /ladder/tick (got {micros} micros, tick {tick})");
    }
    Ok(())
}

fn checked_price(field: &str, value: f64) -> Result<i64> {
    let micros = price_to_micros(value)
        .map_err(|e| anyhow::anyhow!("CONFIG_INVALID field={field} reason={e}"))?;
    if micros < 0 {
        bail!("CONFIG_INVALID field={field} reason=negative ({value})");
    }
    Ok(micros)
}
