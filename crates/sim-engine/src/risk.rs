//! Pre-trade risk caps and post-fill position accounting.

use market_types::{Fill, PlaceOrder, Position, Side};

use crate::config::RiskLimits;

pub struct RiskEngine {
    limits: RiskLimits,
    position: Position,
}

impl RiskEngine {
    pub fn new(limits: RiskLimits) -> Self {
        Self {
            limits,
            position: Position::default(),
        }
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    /// Pre-trade check: the projected position must stay inside both the
    /// absolute-quantity and the notional cap.
    pub fn validate(&self, place: &PlaceOrder, last_price: f64) -> bool {
        let projected_qty = match place.side {
            Side::Buy => self.position.qty + place.size,
            Side::Sell => self.position.qty - place.size,
            Side::Hold => self.position.qty,
        };
        let projected_notional = projected_qty.abs() * last_price.abs();
        projected_qty.abs() <= self.limits.max_position && projected_notional <= self.limits.max_notional
    }

    /// Fold a fill into the position. Reducing or flipping realizes PnL on
    /// the closed quantity; adds blend the average price.
    pub fn update(&mut self, fill: &Fill) {
        let signed_qty = fill.side.sign() * fill.filled_qty;
        if signed_qty == 0.0 {
            return;
        }
        let prev_qty = self.position.qty;
        let new_qty = prev_qty + signed_qty;
        let price = fill.vwap_price;

        if prev_qty == 0.0 || prev_qty.signum() == signed_qty.signum() {
            // Opening or adding: blend the cost basis.
            self.position.avg_price = (self.position.avg_price * prev_qty.abs()
                + price * signed_qty.abs())
                / (prev_qty.abs() + signed_qty.abs());
            self.position.qty = new_qty;
            return;
        }

        // Reducing or flipping: realize on the closed quantity.
        let closed = prev_qty.abs().min(signed_qty.abs());
        self.position.realized_pnl += closed * (price - self.position.avg_price) * prev_qty.signum();
        self.position.qty = new_qty;
        if new_qty == 0.0 {
            self.position.avg_price = 0.0;
        } else if new_qty.signum() != prev_qty.signum() {
            // Flip: the leftover is a fresh position opened at the fill price.
            self.position.avg_price = price;
        }
        // Plain reduce keeps the old average.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_types::Liquidity;

    fn engine(max_position: f64, max_notional: f64) -> RiskEngine {
        RiskEngine::new(RiskLimits {
            max_position,
            max_notional,
        })
    }

    fn fill(side: Side, qty: f64, price: f64) -> Fill {
        Fill::filled(side, price, qty, false, Liquidity::Taker)
    }

    #[test]
    fn validate_enforces_projected_caps() {
        let mut risk = engine(5.0, 100_000.0);
        assert!(risk.validate(&PlaceOrder::market(Side::Buy, 5.0), 100.0));
        assert!(!risk.validate(&PlaceOrder::market(Side::Buy, 5.5), 100.0));

        risk.update(&fill(Side::Sell, 3.0, 100.0));
        // Short 3: selling 2 more is fine, selling 3 breaches.
        assert!(risk.validate(&PlaceOrder::market(Side::Sell, 2.0), 100.0));
        assert!(!risk.validate(&PlaceOrder::market(Side::Sell, 3.0), 100.0));
        // Buying back toward flat always passes the position cap.
        assert!(risk.validate(&PlaceOrder::market(Side::Buy, 3.0), 100.0));
    }

    #[test]
    fn validate_enforces_notional_cap() {
        let risk = engine(100.0, 1_000.0);
        assert!(risk.validate(&PlaceOrder::market(Side::Buy, 9.0), 100.0));
        assert!(!risk.validate(&PlaceOrder::market(Side::Buy, 11.0), 100.0));
    }

    #[test]
    fn adds_blend_average_price() {
        let mut risk = engine(100.0, 1e9);
        risk.update(&fill(Side::Buy, 4.0, 100.0));
        risk.update(&fill(Side::Buy, 6.0, 101.0));
        let pos = risk.position();
        assert!((pos.qty - 10.0).abs() < 1e-9);
        assert!((pos.avg_price - 100.6).abs() < 1e-9);
        assert_eq!(pos.realized_pnl, 0.0);
    }

    #[test]
    fn reduce_realizes_and_keeps_average() {
        let mut risk = engine(100.0, 1e9);
        risk.update(&fill(Side::Buy, 10.0, 100.0));
        risk.update(&fill(Side::Sell, 4.0, 110.0));
        let pos = risk.position();
        assert!((pos.qty - 6.0).abs() < 1e-9);
        assert!((pos.avg_price - 100.0).abs() < 1e-9);
        assert!((pos.realized_pnl - 40.0).abs() < 1e-9);
    }

    #[test]
    fn closing_flat_zeroes_average() {
        let mut risk = engine(100.0, 1e9);
        risk.update(&fill(Side::Buy, 10.0, 100.0));
        risk.update(&fill(Side::Sell, 10.0, 95.0));
        let pos = risk.position();
        assert_eq!(pos.qty, 0.0);
        assert_eq!(pos.avg_price, 0.0);
        assert!((pos.realized_pnl + 50.0).abs() < 1e-9);
    }

    #[test]
    fn flip_opens_remainder_at_fill_price() {
        let mut risk = engine(100.0, 1e9);
        risk.update(&fill(Side::Buy, 10.0, 100.0));
        risk.update(&fill(Side::Sell, 15.0, 110.0));
        let pos = risk.position();
        assert!((pos.qty + 5.0).abs() < 1e-9);
        assert!((pos.avg_price - 110.0).abs() < 1e-9);
        // Realized on the 10 closed: 10 * (110 - 100).
        assert!((pos.realized_pnl - 100.0).abs() < 1e-9);
    }

    #[test]
    fn short_side_reduce_realizes_inverted() {
        let mut risk = engine(100.0, 1e9);
        risk.update(&fill(Side::Sell, 10.0, 100.0));
        risk.update(&fill(Side::Buy, 4.0, 90.0));
        let pos = risk.position();
        assert!((pos.qty + 6.0).abs() < 1e-9);
        assert!((pos.avg_price - 100.0).abs() < 1e-9);
        // Short from 100, bought back at 90: +10 per unit on 4 units.
        assert!((pos.realized_pnl - 40.0).abs() < 1e-9);
    }
}
