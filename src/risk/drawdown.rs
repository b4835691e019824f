//! Drawdown tracking over an equity series

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Tracks peak equity and the deepest peak-to-trough decline
#[derive(Debug, Clone)]
pub struct DrawdownMonitor {
    /// Peak equity value
    pub peak_equity: Decimal,
    /// Current equity value
    pub current_equity: Decimal,
    /// Largest absolute drawdown seen
    pub max_drawdown: Decimal,
    /// Largest drawdown as a fraction of the peak it fell from
    pub max_drawdown_pct: Decimal,
}

impl DrawdownMonitor {
    /// Create a new drawdown monitor
    pub fn new(initial_equity: Decimal) -> Self {
        Self {
            peak_equity: initial_equity,
            current_equity: initial_equity,
            max_drawdown: dec!(0),
            max_drawdown_pct: dec!(0),
        }
    }

    /// Update with new equity value
    pub fn update(&mut self, new_equity: Decimal) {
        self.current_equity = new_equity;
        if new_equity > self.peak_equity {
            self.peak_equity = new_equity;
        }

        let drawdown = self.peak_equity - new_equity;
        if drawdown > self.max_drawdown {
            self.max_drawdown = drawdown;
        }
        let pct = self.current_drawdown();
        if pct > self.max_drawdown_pct {
            self.max_drawdown_pct = pct;
        }
    }

    /// Get current drawdown from peak
    pub fn current_drawdown(&self) -> Decimal {
        if self.peak_equity <= dec!(0) {
            return dec!(0);
        }
        (self.peak_equity - self.current_equity) / self.peak_equity
    }
}
