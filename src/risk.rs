use std::collections::BTreeMap;

use crate::domain::ExitReason;
use crate::error::{Result, TraderError};

/// Immutable per-run signal thresholds, all expressed as fractions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub buy_threshold: f64,           // 0.005 => +0.5% over the recent low
    pub stop_loss_threshold: f64,     // -0.01 => -1% from entry
    pub trailing_stop_threshold: f64, // -0.005 => -0.5% from the high-water mark
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            buy_threshold: 0.005,
            stop_loss_threshold: -0.01,
            trailing_stop_threshold: -0.005,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<()> {
        let all = [
            self.buy_threshold,
            self.stop_loss_threshold,
            self.trailing_stop_threshold,
        ];
        if all.iter().any(|v| !v.is_finite()) {
            return Err(TraderError::config("thresholds must be finite"));
        }
        if self.buy_threshold <= 0.0 {
            return Err(TraderError::config(format!(
                "buy_threshold must be positive, got {}",
                self.buy_threshold
            )));
        }
        if self.stop_loss_threshold >= 0.0 || self.stop_loss_threshold <= -1.0 {
            return Err(TraderError::config(format!(
                "stop_loss_threshold must be in (-1, 0), got {}",
                self.stop_loss_threshold
            )));
        }
        if self.trailing_stop_threshold >= 0.0 || self.trailing_stop_threshold <= -1.0 {
            return Err(TraderError::config(format!(
                "trailing_stop_threshold must be in (-1, 0), got {}",
                self.trailing_stop_threshold
            )));
        }
        Ok(())
    }
}

/// Relative move from `base` to `price`, e.g. 98 -> 100 is +0.0204.
pub fn change(price: u64, base: u64) -> f64 {
    (price as f64 - base as f64) / base as f64
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstrumentPnl {
    pub round_trips: u32,
    pub trailing_stops: u32,
    pub stop_losses: u32,
    /// Whole currency units, quantity already applied.
    pub realized: i64,
}

/// In-memory accounting of closed round trips for the end-of-run summary.
#[derive(Debug, Clone, Default)]
pub struct RunLedger {
    per_instrument: BTreeMap<String, InstrumentPnl>,
    failed_orders: u32,
}

impl RunLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_close(
        &mut self,
        code: &str,
        quantity: u64,
        entry_price: u64,
        exit_price: u64,
        reason: ExitReason,
    ) -> i64 {
        let pnl = (exit_price as i64 - entry_price as i64) * quantity as i64;
        let entry = self.per_instrument.entry(code.to_string()).or_default();
        entry.round_trips += 1;
        entry.realized += pnl;
        match reason {
            ExitReason::TrailingStop => entry.trailing_stops += 1,
            ExitReason::StopLoss => entry.stop_losses += 1,
        }
        pnl
    }

    pub fn register_failed_order(&mut self) {
        self.failed_orders += 1;
    }

    pub fn failed_orders(&self) -> u32 {
        self.failed_orders
    }

    #[cfg(test)]
    pub fn instrument(&self, code: &str) -> Option<&InstrumentPnl> {
        self.per_instrument.get(code)
    }

    pub fn instruments(&self) -> impl Iterator<Item = (&String, &InstrumentPnl)> {
        self.per_instrument.iter()
    }

    pub fn total_realized(&self) -> i64 {
        self.per_instrument.values().map(|p| p.realized).sum()
    }
}
