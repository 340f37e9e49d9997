//! Taker matching: walk the opposing depth ladder and report a fill.

use market_types::{Book, Fill, FillStatus, Liquidity, PlaceOrder, PriceLevel, RejectReason, Side, QTY_EPS};
use tracing::debug;

pub struct MatchingEngine {
    symbol: String,
    tick_size: f64,
    /// Fill-or-kill when true; immediate-or-cancel (partials allowed) otherwise.
    reject_on_insufficient_depth: bool,
}

impl MatchingEngine {
    pub fn new(symbol: String, tick_size: f64, reject_on_insufficient_depth: bool) -> Self {
        Self {
            symbol,
            tick_size,
            reject_on_insufficient_depth,
        }
    }

    /// Execute a taker order against the current book.
    pub fn simulate(&self, place: &PlaceOrder, book: &Book) -> Fill {
        if !place.side.is_tradable() {
            return Fill::rejected(place.side, RejectReason::BadSide);
        }
        if place.size <= 0.0 {
            return Fill::rejected(place.side, RejectReason::ZeroQty);
        }

        let mut fallback = Vec::new();
        let levels = opposing_levels(book, place.side, &mut fallback);
        if levels.is_empty() {
            let reason = match place.side {
                Side::Buy => RejectReason::NoAsk,
                _ => RejectReason::NoBid,
            };
            debug!(symbol = %self.symbol, side = place.side.label(), "no opposing depth");
            return Fill::rejected(place.side, reason);
        }

        let mut remaining = place.size;
        let mut filled = 0.0;
        let mut notional = 0.0;
        let mut levels_crossed = 0usize;
        for lvl in levels {
            if remaining <= 0.0 {
                break;
            }
            if lvl.qty <= 0.0 {
                continue;
            }
            let traded = remaining.min(lvl.qty);
            remaining -= traded;
            filled += traded;
            notional += traded * lvl.price;
            levels_crossed += 1;
        }

        if filled <= 0.0 {
            return Fill::rejected(place.side, RejectReason::NoLiquidity);
        }
        if self.reject_on_insufficient_depth && remaining > 0.0 {
            return Fill::rejected(place.side, RejectReason::NoLiquidity);
        }

        let vwap = notional / filled;
        let best = opposing_best(book, place.side);
        let slippage_ticks = if best > 0.0 && self.tick_size > 0.0 {
            match place.side {
                Side::Buy => (vwap - best) / self.tick_size,
                _ => (best - vwap) / self.tick_size,
            }
        } else {
            0.0
        };

        let mut fill = Fill::filled(place.side, vwap, filled, remaining > 0.0, Liquidity::Taker);
        fill.unfilled_qty = remaining.max(0.0);
        fill.levels_crossed = levels_crossed;
        fill.slippage_ticks = slippage_ticks;

        debug_assert!(fill.filled_qty <= place.size + QTY_EPS);
        debug_assert!((fill.vwap_price * fill.filled_qty - notional).abs() < 1e-6);
        debug_assert!(fill.status == FillStatus::Filled);
        fill
    }
}

/// Depth the order consumes: asks for a Buy, bids for a Sell. Empty depth
/// vectors fall back to a single synthesized top-of-book level.
fn opposing_levels<'a>(book: &'a Book, side: Side, fallback: &'a mut Vec<PriceLevel>) -> &'a [PriceLevel] {
    let levels = match side {
        Side::Buy => &book.asks,
        _ => &book.bids,
    };
    if !levels.is_empty() {
        return levels;
    }
    match side {
        Side::Buy if book.best_ask > 0.0 && book.ask_size > 0.0 => {
            fallback.push(PriceLevel::new(book.best_ask, book.ask_size));
        }
        Side::Sell if book.best_bid > 0.0 && book.bid_size > 0.0 => {
            fallback.push(PriceLevel::new(book.best_bid, book.bid_size));
        }
        _ => {}
    }
    fallback
}

fn opposing_best(book: &Book, side: Side) -> f64 {
    match side {
        Side::Buy => {
            if let Some(l) = book.asks.first() {
                l.price
            } else {
                book.best_ask
            }
        }
        _ => {
            if let Some(l) = book.bids.first() {
                l.price
            } else {
                book.best_bid
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(fok: bool) -> MatchingEngine {
        MatchingEngine::new("SIM".to_string(), 0.1, fok)
    }

    fn ladder_book() -> Book {
        let mut book = Book::empty();
        book.apply_level(Side::Buy, 99.0, 10.0);
        book.apply_level(Side::Sell, 101.0, 1.0);
        book.apply_level(Side::Sell, 102.0, 1.0);
        book.apply_level(Side::Sell, 103.0, 1.0);
        book.refresh_top();
        book
    }

    #[test]
    fn single_level_buy_fills_at_best() {
        let mut book = Book::empty();
        book.apply_level(Side::Buy, 100.0, 10.0);
        book.apply_level(Side::Sell, 101.0, 10.0);
        book.refresh_top();

        let fill = engine(false).simulate(&PlaceOrder::market(Side::Buy, 2.0), &book);
        assert!(fill.is_filled());
        assert!((fill.vwap_price - 101.0).abs() < 1e-9);
        assert!((fill.filled_qty - 2.0).abs() < 1e-9);
        assert!(!fill.partial);
        assert_eq!(fill.levels_crossed, 1);
        assert!(fill.slippage_ticks.abs() < 1e-9);
    }

    #[test]
    fn multi_level_buy_reports_vwap_and_slippage() {
        let fill = engine(false).simulate(&PlaceOrder::market(Side::Buy, 2.5), &ladder_book());
        assert!(fill.is_filled());
        assert!((fill.filled_qty - 2.5).abs() < 1e-9);
        // (101 + 102 + 0.5 * 103) / 2.5
        assert!((fill.vwap_price - 101.8).abs() < 1e-9);
        assert_eq!(fill.levels_crossed, 3);
        assert!((fill.slippage_ticks - 8.0).abs() < 1e-9);
        assert!(!fill.partial);
    }

    #[test]
    fn empty_opposing_depth_rejects() {
        let mut book = Book::empty();
        book.apply_level(Side::Buy, 100.0, 10.0);
        book.refresh_top();

        let fill = engine(false).simulate(&PlaceOrder::market(Side::Buy, 1.0), &book);
        assert_eq!(fill.status, FillStatus::Rejected);
        assert_eq!(fill.reason, Some(RejectReason::NoAsk));

        let book = Book::empty();
        let fill = engine(false).simulate(&PlaceOrder::market(Side::Sell, 1.0), &book);
        assert_eq!(fill.reason, Some(RejectReason::NoBid));
    }

    #[test]
    fn top_of_book_fallback_when_depth_vectors_empty() {
        let mut book = Book::empty();
        book.best_ask = 101.0;
        book.ask_size = 3.0;
        let fill = engine(false).simulate(&PlaceOrder::market(Side::Buy, 2.0), &book);
        assert!(fill.is_filled());
        assert!((fill.vwap_price - 101.0).abs() < 1e-9);
    }

    #[test]
    fn ioc_partial_on_insufficient_depth() {
        let fill = engine(false).simulate(&PlaceOrder::market(Side::Buy, 5.0), &ladder_book());
        assert!(fill.is_filled());
        assert!(fill.partial);
        assert!((fill.filled_qty - 3.0).abs() < 1e-9);
        assert!((fill.unfilled_qty - 2.0).abs() < 1e-9);
    }

    #[test]
    fn exact_fit_ioc_is_not_partial() {
        let fill = engine(false).simulate(&PlaceOrder::market(Side::Buy, 3.0), &ladder_book());
        assert!(fill.is_filled());
        assert!(!fill.partial);
        assert!(fill.unfilled_qty.abs() < 1e-9);
    }

    #[test]
    fn fok_rejects_insufficient_depth() {
        let fill = engine(true).simulate(&PlaceOrder::market(Side::Buy, 5.0), &ladder_book());
        assert_eq!(fill.status, FillStatus::Rejected);
        assert_eq!(fill.reason, Some(RejectReason::NoLiquidity));
        assert_eq!(fill.filled_qty, 0.0);
    }

    #[test]
    fn crossing_limit_equals_market() {
        let book = ladder_book();
        let crossing = PlaceOrder::limit(Side::Buy, 1.5, 102.0);
        assert!(crossing.is_crossing(&book));
        let market = PlaceOrder::market(Side::Buy, 1.5);

        let a = engine(false).simulate(&crossing, &book);
        let b = engine(false).simulate(&market, &book);
        assert!((a.filled_qty - b.filled_qty).abs() < 1e-9);
        assert!((a.vwap_price - b.vwap_price).abs() < 1e-9);
        assert_eq!(a.levels_crossed, b.levels_crossed);
        assert!((a.slippage_ticks - b.slippage_ticks).abs() < 1e-9);
    }

    #[test]
    fn sell_walks_bids() {
        let mut book = Book::empty();
        book.apply_level(Side::Buy, 100.0, 1.0);
        book.apply_level(Side::Buy, 99.5, 1.0);
        book.apply_level(Side::Sell, 100.4, 1.0);
        book.refresh_top();

        let fill = engine(false).simulate(&PlaceOrder::market(Side::Sell, 2.0), &book);
        assert!(fill.is_filled());
        assert!((fill.vwap_price - 99.75).abs() < 1e-9);
        assert_eq!(fill.levels_crossed, 2);
        // (100.0 - 99.75) / 0.1
        assert!((fill.slippage_ticks - 2.5).abs() < 1e-9);
    }
}
