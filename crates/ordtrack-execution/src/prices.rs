//! Integer-micros prices, tick quantization and the bouncing price ladder.
//!
//! # Design invariant
//!
//! Every price inside the tracker and the workflows is an `i64` count of
//! micros (1 unit = 1_000_000 micros). Ladders step thousands of times; in
//! micros each step is exact and the band edges compare equal when they
//! should. `f64` conversions happen only at the protocol-engine boundary:
//!
//! | Direction                  | Function            |
//! |----------------------------|---------------------|
//! | internal → outbound field  | [`micros_to_price`] |
//! | config / inbound → internal| [`price_to_micros`] |

/// Scale factor: 1 price unit = 1_000_000 micros (6 decimal places).
pub const MICROS_PER_UNIT: i64 = 1_000_000;

// ---------------------------------------------------------------------------
// PricingError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PricingError {
    /// Input was `NaN` or infinite.
    NotFinite,
    /// Input would overflow `i64` after scaling or rounding.
    OutOfRange,
    /// Tick (or ladder step) was zero or negative.
    InvalidTick,
    /// Ladder band with `low > high`.
    InvalidBand,
}

impl std::fmt::Display for PricingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PricingError::NotFinite => write!(f, "price: non-finite input (NaN or Inf)"),
            PricingError::OutOfRange => write!(f, "price: out of i64 micros range"),
            PricingError::InvalidTick => write!(f, "price: tick/step must be positive"),
            PricingError::InvalidBand => write!(f, "price: ladder low is above high"),
        }
    }
}

impl std::error::Error for PricingError {}

// ---------------------------------------------------------------------------
// Wire-boundary conversion functions
// ---------------------------------------------------------------------------

/// Convert integer micros to `f64` for an outbound protocol field.
pub fn micros_to_price(micros: i64) -> f64 {
    micros as f64 / MICROS_PER_UNIT as f64
}

/// Convert an `f64` price (config file, inbound report) into integer micros,
/// rounding to the nearest micro.
pub fn price_to_micros(price: f64) -> Result<i64, PricingError> {
    if !price.is_finite() {
        return Err(PricingError::NotFinite);
    }
    let scaled = price * MICROS_PER_UNIT as f64;
    // f64 -> i64 casts saturate; reject instead.
    if scaled > i64::MAX as f64 || scaled < i64::MIN as f64 {
        return Err(PricingError::OutOfRange);
    }
    Ok(scaled.round() as i64)
}

// ---------------------------------------------------------------------------
// Quantizer
// ---------------------------------------------------------------------------

/// Round `price` to the nearest multiple of `tick`, half-way cases upward.
///
/// ```
/// use ordtrack_execution::quantize;
/// // 0.525 on a 0.01 tick -> 0.53
/// assert_eq!(quantize(525_000, 10_000), Ok(530_000));
/// // 0.524999 -> 0.52
/// assert_eq!(quantize(524_999, 10_000), Ok(520_000));
/// ```
pub fn quantize(price: i64, tick: i64) -> Result<i64, PricingError> {
    if tick <= 0 {
        return Err(PricingError::InvalidTick);
    }
    let units = price.div_euclid(tick);
    let rem = price.rem_euclid(tick);
    // rem < tick, so 2*rem only overflows for ticks near i64::MAX.
    let round_up = rem
        .checked_mul(2)
        .map(|twice| twice >= tick)
        .unwrap_or(true);
    let units = if round_up {
        units.checked_add(1).ok_or(PricingError::OutOfRange)?
    } else {
        units
    };
    units.checked_mul(tick).ok_or(PricingError::OutOfRange)
}

/// Never let a ratcheted price cross the configured ceiling.
pub fn clamp_to_ceiling(price: i64, max_price: i64) -> i64 {
    price.min(max_price)
}

/// One ratchet move: climb by `step` (capped at `high`) and wrap back to
/// `low` once `current` has reached `high`.
pub fn ratchet_step(current: i64, low: i64, high: i64, step: i64) -> i64 {
    if current >= high {
        low
    } else {
        current.saturating_add(step).min(high)
    }
}

// ---------------------------------------------------------------------------
// Bounce
// ---------------------------------------------------------------------------

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn flip(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }
}

/// Step `current` by `step` toward `direction`, reversing at the band edges.
///
/// The result is clamped into `[low, high]`; reaching or passing an edge
/// flips the direction for the next call. Requires `step > 0` and
/// `low <= high` (see [`PriceLadder::new`] for the checked constructor).
pub fn bounce(
    current: i64,
    low: i64,
    high: i64,
    step: i64,
    direction: Direction,
) -> (i64, Direction) {
    debug_assert!(step > 0, "bounce step must be positive");
    debug_assert!(low <= high, "bounce band must satisfy low <= high");

    match direction {
        Direction::Up => {
            let next = current.saturating_add(step);
            if next >= high {
                (high, Direction::Down)
            } else {
                (next.max(low), Direction::Up)
            }
        }
        Direction::Down => {
            let next = current.saturating_sub(step);
            if next <= low {
                (low, Direction::Up)
            } else {
                (next.min(high), Direction::Down)
            }
        }
    }
}

/// Quantized prices oscillating `low ..= high ..= low ..` for at most
/// `max_count` items, starting at `low`.
#[derive(Clone, Debug)]
pub struct PriceLadder {
    low: i64,
    high: i64,
    step: i64,
    next: i64,
    direction: Direction,
    remaining: usize,
}

impl PriceLadder {
    /// All inputs are quantized to `tick` first; a step that quantizes to
    /// zero is rejected.
    pub fn new(
        low: i64,
        high: i64,
        step: i64,
        tick: i64,
        max_count: usize,
    ) -> Result<Self, PricingError> {
        let low = quantize(low, tick)?;
        let high = quantize(high, tick)?;
        let step = quantize(step, tick)?;
        if step <= 0 {
            return Err(PricingError::InvalidTick);
        }
        if low > high {
            return Err(PricingError::InvalidBand);
        }
        Ok(Self {
            low,
            high,
            step,
            next: low,
            direction: Direction::Up,
            remaining: max_count,
        })
    }

    pub fn low(&self) -> i64 {
        self.low
    }

    pub fn high(&self) -> i64 {
        self.high
    }
}

impl Iterator for PriceLadder {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let out = self.next;
        if self.low == self.high {
            return Some(out);
        }
        let (next, direction) = bounce(out, self.low, self.high, self.step, self.direction);
        self.next = next;
        self.direction = direction;
        Some(out)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
