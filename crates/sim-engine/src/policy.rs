//! Policy seam: top-of-book features in, intents out.
//!
//! The core only depends on the `Policy` trait; the built-in threshold
//! policy exists so a run is drivable end to end without an external
//! decision process.

use market_types::{Action, Book, PlaceOrder, Position, Side, TradePrint};

#[derive(Debug, Clone, Copy, Default)]
pub struct TopOfBookFeatures {
    pub imbalance: f64,
    pub microprice: f64,
    pub pressure_bid: f64,
    pub pressure_ask: f64,
    pub sweep_signal: f64,
    pub trend_strength: f64,
}

pub fn compute_features(book: &Book, last_trade: Option<&TradePrint>) -> TopOfBookFeatures {
    let spread = (book.best_ask - book.best_bid).max(0.0);
    let mid = if spread > 0.0 {
        book.best_bid + spread / 2.0
    } else {
        book.best_bid
    };
    let depth = book.bid_size + book.ask_size;
    let (last_price, last_size) = last_trade.map(|t| (t.price, t.size)).unwrap_or((mid, 0.0));

    TopOfBookFeatures {
        imbalance: if depth > 0.0 {
            (book.bid_size - book.ask_size) / depth
        } else {
            0.0
        },
        microprice: if depth > 0.0 {
            (book.best_ask * book.bid_size + book.best_bid * book.ask_size) / depth
        } else {
            mid
        },
        pressure_bid: book.bid_size,
        pressure_ask: book.ask_size,
        sweep_signal: if spread > 0.0 {
            last_size / (depth + 1e-6)
        } else {
            0.0
        },
        trend_strength: if spread > 0.0 {
            (last_price - mid) / (spread + 1e-6)
        } else {
            0.0
        },
    }
}

pub trait Policy {
    fn decide(
        &mut self,
        features: &TopOfBookFeatures,
        book: &Book,
        position: &Position,
    ) -> Option<Action>;
}

/// Trade in the direction of trend when the book leans the same way.
pub struct ThresholdPolicy {
    pub threshold: f64,
    pub order_size: f64,
    /// Rest at the same-side top instead of crossing.
    pub post_maker: bool,
}

impl Policy for ThresholdPolicy {
    fn decide(
        &mut self,
        features: &TopOfBookFeatures,
        _book: &Book,
        _position: &Position,
    ) -> Option<Action> {
        let side = if features.trend_strength > self.threshold && features.imbalance > 0.0 {
            Side::Buy
        } else if features.trend_strength < -self.threshold && features.imbalance < 0.0 {
            Side::Sell
        } else {
            return None;
        };
        let mut place = if self.post_maker {
            let mut p = PlaceOrder::limit(side, self.order_size, 0.0);
            p.is_maker = true;
            p
        } else {
            PlaceOrder::market(side, self.order_size)
        };
        place.target_notional = None;
        Some(Action::Place(place))
    }
}

/// Replays a fixed script of (tick index, action) pairs. Used by tests and
/// by external intent files.
pub struct ScriptedPolicy {
    script: Vec<(u64, Action)>,
    tick: u64,
    cursor: usize,
}

impl ScriptedPolicy {
    pub fn new(mut script: Vec<(u64, Action)>) -> Self {
        script.sort_by_key(|(tick, _)| *tick);
        Self {
            script,
            tick: 0,
            cursor: 0,
        }
    }
}

impl Policy for ScriptedPolicy {
    fn decide(
        &mut self,
        _features: &TopOfBookFeatures,
        _book: &Book,
        _position: &Position,
    ) -> Option<Action> {
        let tick = self.tick;
        self.tick += 1;
        match self.script.get(self.cursor) {
            Some((at, action)) if *at == tick => {
                self.cursor += 1;
                Some(action.clone())
            }
            _ => None,
        }
    }
}
