//! Venue rules: quantity/price normalization and pre-submit validation.
//!
//! Normalization is conservative: size rounds down to the step, and limit
//! prices round away from the opposing side (Buy floors to the tick, Sell
//! ceils), so rounding can never turn a passive limit into a crossing one.

use market_types::{Book, PlaceOrder, RejectReason, Side, QTY_EPS};

use crate::config::VenueRules;

pub struct RulesEngine {
    cfg: VenueRules,
}

impl RulesEngine {
    pub fn new(cfg: VenueRules) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &VenueRules {
        &self.cfg
    }

    /// Normalize a place intent against the current book, or say why not.
    pub fn normalize(&self, place: &PlaceOrder, book: &Book) -> Result<PlaceOrder, RejectReason> {
        if !place.side.is_tradable() {
            return Err(RejectReason::BadSide);
        }
        if place.size <= 0.0 {
            return Err(RejectReason::ZeroQty);
        }

        let mut norm = place.clone();
        if self.cfg.qty_step > 0.0 {
            norm.size = floor_to_step(place.size, self.cfg.qty_step);
        }
        if norm.size < self.cfg.min_qty - QTY_EPS {
            return Err(RejectReason::MinQty);
        }

        if place.limit_price > 0.0 && self.cfg.tick_size > 0.0 {
            norm.limit_price = round_away_from_cross(place.limit_price, self.cfg.tick_size, place.side);
        } else if place.is_maker && place.limit_price <= 0.0 {
            // Maker intent without a price rests at the same-side top.
            let top = match place.side {
                Side::Buy => book.best_bid,
                _ => book.best_ask,
            };
            norm.limit_price = if top > 0.0 && self.cfg.tick_size > 0.0 {
                round_away_from_cross(top, self.cfg.tick_size, place.side)
            } else {
                top
            };
        }

        let ref_price = self.reference_price(&norm, book);
        if ref_price <= 0.0 {
            return Err(RejectReason::PriceInvalid);
        }
        if self.cfg.price_band_bps > 0.0 && norm.limit_price > 0.0 {
            if let Some(mid) = book.mid_price() {
                let deviation_bps = (norm.limit_price - mid).abs() / mid * 1e4;
                if deviation_bps > self.cfg.price_band_bps {
                    return Err(RejectReason::PriceInvalid);
                }
            }
        }

        let notional = norm.size * ref_price;
        if self.cfg.min_notional > 0.0 && notional < self.cfg.min_notional - QTY_EPS {
            return Err(RejectReason::MinNotional);
        }

        Ok(norm)
    }

    /// Reference price for the notional check: the normalized limit if set,
    /// else the opposite-side top, else the same-side top.
    fn reference_price(&self, place: &PlaceOrder, book: &Book) -> f64 {
        if place.limit_price > 0.0 {
            return place.limit_price;
        }
        match place.side {
            Side::Buy => {
                if book.best_ask > 0.0 {
                    book.best_ask
                } else {
                    book.best_bid
                }
            }
            Side::Sell => {
                if book.best_bid > 0.0 {
                    book.best_bid
                } else {
                    book.best_ask
                }
            }
            Side::Hold => 0.0,
        }
    }
}

fn floor_to_step(value: f64, step: f64) -> f64 {
    (value / step + QTY_EPS).floor() * step
}

fn ceil_to_step(value: f64, step: f64) -> f64 {
    (value / step - QTY_EPS).ceil() * step
}

fn round_away_from_cross(price: f64, tick: f64, side: Side) -> f64 {
    match side {
        Side::Buy => floor_to_step(price, tick),
        _ => ceil_to_step(price, tick),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FeeConfig, FeeRounding};
    use market_types::OrderType;

    fn rules(tick: f64, step: f64, min_qty: f64, min_notional: f64) -> RulesEngine {
        RulesEngine::new(VenueRules {
            tick_size: tick,
            qty_step: step,
            min_qty,
            min_notional,
            price_band_bps: 0.0,
            fees: FeeConfig {
                maker_bps: 1.0,
                taker_bps: 6.0,
                fee_ccy: "USDT".to_string(),
                rounding: FeeRounding::None,
            },
        })
    }

    fn book(bid: f64, ask: f64) -> Book {
        let mut b = Book::empty();
        if bid > 0.0 {
            b.apply_level(Side::Buy, bid, 10.0);
        }
        if ask > 0.0 {
            b.apply_level(Side::Sell, ask, 10.0);
        }
        b.refresh_top();
        b
    }

    #[test]
    fn direction_aware_rounding_never_crosses() {
        let rules = rules(0.1, 0.01, 0.001, 0.0);
        let book = book(100.0, 100.2);

        let buy = PlaceOrder::limit(Side::Buy, 1.019, 100.19);
        let norm = rules.normalize(&buy, &book).unwrap();
        assert!((norm.limit_price - 100.1).abs() < 1e-9);
        assert!((norm.size - 1.01).abs() < 1e-9);
        assert!(!norm.is_crossing(&book));

        let sell = PlaceOrder::limit(Side::Sell, 2.237, 100.01);
        let norm = rules.normalize(&sell, &book).unwrap();
        assert!((norm.limit_price - 100.1).abs() < 1e-9);
        assert!((norm.size - 2.23).abs() < 1e-9);
        assert!(!norm.is_crossing(&book));
    }

    #[test]
    fn exact_multiples_survive_normalization() {
        let rules = rules(0.1, 0.01, 0.001, 0.0);
        let book = book(100.0, 100.2);
        let buy = PlaceOrder::limit(Side::Buy, 2.23, 100.1);
        let norm = rules.normalize(&buy, &book).unwrap();
        assert!((norm.limit_price - 100.1).abs() < 1e-9);
        assert!((norm.size - 2.23).abs() < 1e-9);
    }

    #[test]
    fn side_and_size_guards() {
        let rules = rules(0.1, 0.01, 0.5, 0.0);
        let book = book(100.0, 100.2);

        let hold = PlaceOrder::market(Side::Hold, 1.0);
        assert_eq!(rules.normalize(&hold, &book), Err(RejectReason::BadSide));

        let zero = PlaceOrder::market(Side::Buy, 0.0);
        assert_eq!(rules.normalize(&zero, &book), Err(RejectReason::ZeroQty));

        // 0.4 floors to 0.4 which is under min_qty 0.5.
        let small = PlaceOrder::market(Side::Buy, 0.4);
        assert_eq!(rules.normalize(&small, &book), Err(RejectReason::MinQty));
    }

    #[test]
    fn min_notional_uses_opposite_top_for_market_orders() {
        let rules = rules(0.1, 0.01, 0.001, 500.0);
        let book = book(100.0, 100.2);

        // 1.0 * 100.2 = 100.2 < 500.
        let buy = PlaceOrder::market(Side::Buy, 1.0);
        assert_eq!(rules.normalize(&buy, &book), Err(RejectReason::MinNotional));

        let buy = PlaceOrder::market(Side::Buy, 5.0);
        assert!(rules.normalize(&buy, &book).is_ok());
    }

    #[test]
    fn maker_without_price_rests_at_same_side_top() {
        let rules = rules(0.1, 0.01, 0.001, 0.0);
        let book = book(100.0, 100.2);
        let mut place = PlaceOrder::limit(Side::Buy, 1.0, 0.0);
        place.order_type = OrderType::Limit;
        place.is_maker = true;
        let norm = rules.normalize(&place, &book).unwrap();
        assert!((norm.limit_price - 100.0).abs() < 1e-9);
    }

    #[test]
    fn empty_book_market_order_is_price_invalid() {
        let rules = rules(0.1, 0.01, 0.001, 0.0);
        let book = Book::empty();
        let buy = PlaceOrder::market(Side::Buy, 1.0);
        assert_eq!(rules.normalize(&buy, &book), Err(RejectReason::PriceInvalid));
    }

    #[test]
    fn price_band_rejects_far_limits() {
        let mut engine = rules(0.1, 0.01, 0.001, 0.0);
        engine.cfg.price_band_bps = 50.0;
        let book = book(100.0, 100.2);

        // ~90 bps below mid.
        let far = PlaceOrder::limit(Side::Buy, 1.0, 99.2);
        assert_eq!(engine.normalize(&far, &book), Err(RejectReason::PriceInvalid));

        let near = PlaceOrder::limit(Side::Buy, 1.0, 100.0);
        assert!(engine.normalize(&near, &book).is_ok());
    }
}
