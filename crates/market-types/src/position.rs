use serde::{Deserialize, Serialize};

use crate::{Price, Quantity};

/// Signed inventory with its cost basis.
///
/// Invariant: `avg_price` is 0 whenever `qty` is 0.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Position {
    pub qty: Quantity,
    pub avg_price: Price,
    pub realized_pnl: f64,
}

impl Position {
    pub fn is_flat(&self) -> bool {
        self.qty == 0.0
    }

    /// Mark-to-market PnL at the given mid: realized plus open-inventory gain.
    pub fn mark_pnl(&self, mid: Price) -> f64 {
        self.realized_pnl + self.qty * (mid - self.avg_price)
    }
}
