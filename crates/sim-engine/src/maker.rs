//! Resting maker order simulation.
//!
//! Fills are inferred from two observable signals per tick: opposing trade
//! prints that reach the resting level (after burning the estimated queue
//! ahead), and decay of the visible quantity at the level, of which a
//! configured fraction is attributed to the queue ahead of us. Every maker
//! fill price is shifted against us by the adverse-selection penalty.

use market_types::{
    Book, Fill, Liquidity, OrderId, PlaceOrder, PriceLevel, Side, Timestamp, TradePrint, QTY_EPS,
};

use crate::config::MakerParams;

#[derive(Debug, Clone)]
pub struct RestingOrder {
    pub order_id: OrderId,
    pub side: Side,
    pub price: f64,
    pub my_qty: f64,
    pub queue_ahead: f64,
    pub submit_ts: Timestamp,
    pub expire_ts: Timestamp,
}

pub struct MakerQueueSim {
    params: MakerParams,
    tick_size: f64,
    orders: Vec<RestingOrder>,
    last_bids: Vec<PriceLevel>,
    last_asks: Vec<PriceLevel>,
}

impl MakerQueueSim {
    pub fn new(params: MakerParams, tick_size: f64) -> Self {
        Self {
            params,
            tick_size,
            orders: Vec::new(),
            last_bids: Vec::new(),
            last_asks: Vec::new(),
        }
    }

    pub fn params(&self) -> &MakerParams {
        &self.params
    }

    pub fn submit(&mut self, order_id: OrderId, place: &PlaceOrder, book: &Book, now_ts: Timestamp) {
        let price = if place.limit_price > 0.0 {
            place.limit_price
        } else {
            match place.side {
                Side::Buy => book.best_bid,
                _ => book.best_ask,
            }
        };
        let level = book.level_qty(place.side, price);
        self.orders.push(RestingOrder {
            order_id,
            side: place.side,
            price,
            my_qty: place.size,
            queue_ahead: level * self.params.q_init,
            submit_ts: now_ts,
            expire_ts: now_ts + self.params.expire_ms,
        });
    }

    /// Remove a resting order. Returns whether it was present.
    pub fn cancel(&mut self, order_id: OrderId) -> bool {
        let before = self.orders.len();
        self.orders.retain(|o| o.order_id != order_id);
        self.orders.len() != before
    }

    pub fn resting_count(&self) -> usize {
        self.orders.len()
    }

    /// Advance all resting orders against the new book and the trade prints
    /// drained for this tick. Returns the maker fills in resting order.
    pub fn on_book(&mut self, book: &Book, now_ts: Timestamp, trades: &[TradePrint]) -> Vec<Fill> {
        let mut fills = Vec::new();
        let mut remaining = Vec::with_capacity(self.orders.len());

        for mut ord in std::mem::take(&mut self.orders) {
            // Trade-hit phase: opposing aggressors that reach our level
            // consume the queue ahead first, then us.
            for tp in trades {
                if ord.my_qty <= 0.0 || !trade_hits(&ord, tp, self.tick_size) {
                    continue;
                }
                let mut remaining_trade = tp.size;
                let burn = ord.queue_ahead.min(remaining_trade);
                ord.queue_ahead -= burn;
                remaining_trade -= burn;
                let fill_qty = ord.my_qty.min(remaining_trade);
                ord.my_qty -= fill_qty;
                if fill_qty > 0.0 {
                    fills.push(self.maker_fill(&ord, fill_qty));
                }
            }

            // Depth-decay phase: visible shrink at our level, split between
            // queue burn (alpha) and candidate fill.
            let prev_qty = level_qty_in(self.last_levels(ord.side), ord.price)
                .unwrap_or_else(|| book.level_qty(ord.side, ord.price));
            let curr_qty = book.level_qty(ord.side, ord.price);
            let delta_down = (prev_qty - curr_qty).max(0.0);
            if delta_down > 0.0 && ord.my_qty > 0.0 {
                let consume_ahead = ord.queue_ahead.min(delta_down * self.params.alpha);
                ord.queue_ahead -= consume_ahead;
                let candidate = delta_down - consume_ahead;
                let fill_qty = ord.my_qty.min(candidate);
                ord.my_qty -= fill_qty;
                if fill_qty > 0.0 {
                    fills.push(self.maker_fill(&ord, fill_qty));
                }
            }

            // TTL: drop silently; the order manager expires it on its own clock.
            if ord.my_qty > 0.0 && now_ts >= ord.expire_ts {
                continue;
            }
            if ord.my_qty > 0.0 {
                remaining.push(ord);
            }
        }

        self.orders = remaining;
        self.last_bids = book.bids.clone();
        self.last_asks = book.asks.clone();
        fills
    }

    fn last_levels(&self, side: Side) -> &[PriceLevel] {
        match side {
            Side::Buy => &self.last_bids,
            _ => &self.last_asks,
        }
    }

    fn maker_fill(&self, ord: &RestingOrder, fill_qty: f64) -> Fill {
        let mut fill = Fill::filled(ord.side, ord.price, fill_qty, ord.my_qty > 0.0, Liquidity::Maker);
        fill.order_id = ord.order_id;
        // Adverse selection: shift the fill price against us.
        let penalty = self.params.adv_ticks * self.tick_size;
        match ord.side {
            Side::Buy => {
                fill.price += penalty;
                fill.vwap_price += penalty;
            }
            _ => {
                fill.price -= penalty;
                fill.vwap_price -= penalty;
            }
        }
        fill.unfilled_qty = ord.my_qty;
        fill.levels_crossed = 1;
        fill.slippage_ticks = 0.0;
        fill
    }
}

fn trade_hits(ord: &RestingOrder, tp: &TradePrint, tick: f64) -> bool {
    match (ord.side, tp.side) {
        (Side::Buy, Side::Sell) => tp.price <= ord.price + tick + QTY_EPS,
        (Side::Sell, Side::Buy) => tp.price >= ord.price - tick - QTY_EPS,
        _ => false,
    }
}

fn level_qty_in(levels: &[PriceLevel], price: f64) -> Option<f64> {
    levels
        .iter()
        .find(|l| (l.price - price).abs() < QTY_EPS)
        .map(|l| l.qty)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(q_init: f64, alpha: f64, expire_ms: i64, adv_ticks: f64) -> MakerParams {
        MakerParams {
            q_init,
            alpha,
            expire_ms,
            adv_ticks,
        }
    }

    fn book_with_bid(price: f64, qty: f64) -> Book {
        let mut b = Book::empty();
        b.apply_level(Side::Buy, price, qty);
        b.apply_level(Side::Sell, price + 0.2, qty);
        b.refresh_top();
        b
    }

    fn resting_buy(sim: &mut MakerQueueSim, book: &Book, size: f64) -> OrderId {
        let mut place = PlaceOrder::limit(Side::Buy, size, 100.0);
        place.is_maker = true;
        sim.submit(7, &place, book, 0);
        7
    }

    #[test]
    fn depth_drop_fills_with_adverse_penalty() {
        let mut sim = MakerQueueSim::new(params(0.0, 1.0, 10_000, 2.0), 0.1);
        let book0 = book_with_bid(100.0, 10.0);
        resting_buy(&mut sim, &book0, 5.0);

        // Prime the level snapshot, no decay yet.
        assert!(sim.on_book(&book0, 1, &[]).is_empty());

        // Bid level drops 10 -> 8 with no prints: 2.0 is a candidate fill.
        let book1 = book_with_bid(100.0, 8.0);
        let fills = sim.on_book(&book1, 2, &[]);
        assert_eq!(fills.len(), 1);
        let f = &fills[0];
        assert!((f.filled_qty - 2.0).abs() < 1e-9);
        assert!((f.vwap_price - 100.2).abs() < 1e-9);
        assert!((f.price - 100.2).abs() < 1e-9);
        assert!(f.partial);
        assert_eq!(f.levels_crossed, 1);
        assert_eq!(f.order_id, 7);
    }

    #[test]
    fn queue_ahead_absorbs_its_share_of_decay() {
        // q_init 1.0 on a 10-lot level: 10 ahead of us. alpha 0.5 sends half
        // of each observed decay to the queue, the rest becomes fillable.
        let mut sim = MakerQueueSim::new(params(1.0, 0.5, 10_000, 0.0), 0.1);
        let book0 = book_with_bid(100.0, 10.0);
        resting_buy(&mut sim, &book0, 5.0);
        sim.on_book(&book0, 1, &[]);

        // Level drops 10 -> 2: decay 8, queue burns 4, candidate 4.
        let book1 = book_with_bid(100.0, 2.0);
        let fills = sim.on_book(&book1, 2, &[]);
        assert_eq!(fills.len(), 1);
        assert!((fills[0].filled_qty - 4.0).abs() < 1e-9);
        assert!(fills[0].partial);
        assert!((fills[0].unfilled_qty - 1.0).abs() < 1e-9);

        // With alpha 1.0 the same decay would have burned queue only.
        let mut sim = MakerQueueSim::new(params(1.0, 1.0, 10_000, 0.0), 0.1);
        resting_buy(&mut sim, &book0, 5.0);
        sim.on_book(&book0, 1, &[]);
        assert!(sim.on_book(&book1, 2, &[]).is_empty());
    }

    #[test]
    fn trade_hit_burns_queue_then_fills() {
        let mut sim = MakerQueueSim::new(params(0.5, 0.0, 10_000, 0.0), 0.1);
        let book0 = book_with_bid(100.0, 10.0);
        resting_buy(&mut sim, &book0, 5.0);
        sim.on_book(&book0, 1, &[]);

        // Opposing sell print of 7 at our price: burns 5 queue-ahead, fills 2.
        let tp = TradePrint::new(2, Side::Sell, 100.0, 7.0, "t1".to_string());
        let fills = sim.on_book(&book0, 2, std::slice::from_ref(&tp));
        assert_eq!(fills.len(), 1);
        assert!((fills[0].filled_qty - 2.0).abs() < 1e-9);
        assert!((fills[0].unfilled_qty - 3.0).abs() < 1e-9);
    }

    #[test]
    fn same_side_trades_do_not_hit() {
        let mut sim = MakerQueueSim::new(params(0.0, 0.0, 10_000, 0.0), 0.1);
        let book0 = book_with_bid(100.0, 10.0);
        resting_buy(&mut sim, &book0, 5.0);
        sim.on_book(&book0, 1, &[]);

        let buy_print = TradePrint::new(2, Side::Buy, 100.0, 7.0, "t1".to_string());
        assert!(sim.on_book(&book0, 2, &[buy_print]).is_empty());
    }

    #[test]
    fn trade_must_reach_the_level() {
        let mut sim = MakerQueueSim::new(params(0.0, 0.0, 10_000, 0.0), 0.1);
        let book0 = book_with_bid(100.0, 10.0);
        resting_buy(&mut sim, &book0, 5.0);
        sim.on_book(&book0, 1, &[]);

        // One tick above our bid still reaches; two ticks does not.
        let near = TradePrint::new(2, Side::Sell, 100.1, 1.0, "near".to_string());
        assert_eq!(sim.on_book(&book0, 2, &[near]).len(), 1);
        let far = TradePrint::new(3, Side::Sell, 100.3, 1.0, "far".to_string());
        assert!(sim.on_book(&book0, 3, &[far]).is_empty());
    }

    #[test]
    fn sell_maker_penalty_lowers_price() {
        let mut sim = MakerQueueSim::new(params(0.0, 1.0, 10_000, 2.0), 0.1);
        let mut book0 = Book::empty();
        book0.apply_level(Side::Buy, 99.8, 10.0);
        book0.apply_level(Side::Sell, 100.0, 10.0);
        book0.refresh_top();
        let mut place = PlaceOrder::limit(Side::Sell, 3.0, 100.0);
        place.is_maker = true;
        sim.submit(9, &place, &book0, 0);
        sim.on_book(&book0, 1, &[]);

        let mut book1 = Book::empty();
        book1.apply_level(Side::Buy, 99.8, 10.0);
        book1.apply_level(Side::Sell, 100.0, 6.0);
        book1.refresh_top();
        let fills = sim.on_book(&book1, 2, &[]);
        assert_eq!(fills.len(), 1);
        assert!((fills[0].vwap_price - 99.8).abs() < 1e-9);
    }

    #[test]
    fn expired_order_never_fills_again() {
        let mut sim = MakerQueueSim::new(params(0.0, 1.0, 5, 0.0), 0.1);
        let book0 = book_with_bid(100.0, 10.0);
        resting_buy(&mut sim, &book0, 5.0);
        sim.on_book(&book0, 1, &[]);

        // TTL elapses with no fill source: the order is dropped.
        assert!(sim.on_book(&book0, 5, &[]).is_empty());
        assert_eq!(sim.resting_count(), 0);

        // Later decay produces nothing.
        let book1 = book_with_bid(100.0, 2.0);
        assert!(sim.on_book(&book1, 6, &[]).is_empty());
    }

    #[test]
    fn cancelled_order_never_fills() {
        let mut sim = MakerQueueSim::new(params(0.0, 1.0, 10_000, 0.0), 0.1);
        let book0 = book_with_bid(100.0, 10.0);
        let id = resting_buy(&mut sim, &book0, 5.0);
        sim.on_book(&book0, 1, &[]);

        assert!(sim.cancel(id));
        assert!(!sim.cancel(id));

        let book1 = book_with_bid(100.0, 1.0);
        assert!(sim.on_book(&book1, 2, &[]).is_empty());
    }

    #[test]
    fn fill_bounded_by_decay_and_trades_when_no_queue() {
        // q_init 0, alpha 1: per tick the fill cannot exceed
        // max(trade hit remainder, observed decay).
        let mut sim = MakerQueueSim::new(params(0.0, 1.0, 10_000, 0.0), 0.1);
        let book0 = book_with_bid(100.0, 10.0);
        resting_buy(&mut sim, &book0, 100.0);
        sim.on_book(&book0, 1, &[]);

        let book1 = book_with_bid(100.0, 7.0);
        let tp = TradePrint::new(2, Side::Sell, 100.0, 2.0, "t".to_string());
        let fills = sim.on_book(&book1, 2, &[tp]);
        let total: f64 = fills.iter().map(|f| f.filled_qty).sum();
        assert!(total <= 2.0 + 3.0 + 1e-9);
    }
}
