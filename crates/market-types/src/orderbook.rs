use serde::{Deserialize, Serialize};

use crate::{Price, Quantity, Side, Timestamp, QTY_EPS};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Price,
    pub qty: Quantity,
}

impl PriceLevel {
    pub fn new(price: Price, qty: Quantity) -> Self {
        Self { price, qty }
    }
}

/// A single L2 increment: one (side, price, qty) cell keyed by sequence.
///
/// `qty == 0` removes the level, `qty > 0` overwrites it. A snapshot delta
/// clears both sides before it is applied. When `is_snapshot` is false,
/// `prev_seq` must equal the previously applied `seq`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookDelta {
    pub ts_ms: Timestamp,
    pub seq: i64,
    pub prev_seq: i64,
    pub is_snapshot: bool,
    pub side: Side,
    pub price: Price,
    pub qty: Quantity,
}

/// The reconstructed book: top of book plus full sorted depth.
///
/// Bids are sorted descending, asks ascending; the `best_*`/`*_size`
/// fields always mirror the front of the corresponding depth vector.
/// Empty sides report a best price of 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub ts_ms: Timestamp,
    pub seq: i64,
    pub best_bid: Price,
    pub best_ask: Price,
    pub bid_size: Quantity,
    pub ask_size: Quantity,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

impl Book {
    pub fn empty() -> Self {
        Self {
            ts_ms: 0,
            seq: 0,
            best_bid: 0.0,
            best_ask: 0.0,
            bid_size: 0.0,
            ask_size: 0.0,
            bids: Vec::new(),
            asks: Vec::new(),
        }
    }

    pub fn mid_price(&self) -> Option<Price> {
        if self.best_bid > 0.0 && self.best_ask > 0.0 {
            Some((self.best_bid + self.best_ask) / 2.0)
        } else {
            None
        }
    }

    pub fn spread(&self) -> Option<Price> {
        if self.best_bid > 0.0 && self.best_ask > 0.0 {
            Some(self.best_ask - self.best_bid)
        } else {
            None
        }
    }

    /// Visible quantity at an exact price on one side.
    ///
    /// Falls back to the top-of-book size when the depth vector has no
    /// matching entry but the price equals the best.
    pub fn level_qty(&self, side: Side, price: Price) -> Quantity {
        let levels = match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
            Side::Hold => return 0.0,
        };
        for lvl in levels {
            if (lvl.price - price).abs() < QTY_EPS {
                return lvl.qty;
            }
        }
        match side {
            Side::Buy if (price - self.best_bid).abs() < QTY_EPS => self.bid_size,
            Side::Sell if (price - self.best_ask).abs() < QTY_EPS => self.ask_size,
            _ => 0.0,
        }
    }

    /// Insert, overwrite or remove (qty = 0) a level, keeping the side sorted.
    pub fn apply_level(&mut self, side: Side, price: Price, qty: Quantity) {
        let levels = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
            Side::Hold => return,
        };
        let existing = levels
            .iter()
            .position(|l| (l.price - price).abs() < QTY_EPS);
        match existing {
            Some(idx) => {
                if qty < QTY_EPS {
                    levels.remove(idx);
                } else {
                    levels[idx].qty = qty;
                }
            }
            None if qty >= QTY_EPS => {
                // Bids sorted descending, asks ascending.
                let insert_pos = match side {
                    Side::Buy => levels
                        .binary_search_by(|l| price.partial_cmp(&l.price).unwrap())
                        .unwrap_or_else(|e| e),
                    _ => levels
                        .binary_search_by(|l| l.price.partial_cmp(&price).unwrap())
                        .unwrap_or_else(|e| e),
                };
                levels.insert(insert_pos, PriceLevel::new(price, qty));
            }
            None => {} // removing a level that was never there
        }
    }

    /// Re-derive the `best_*`/`*_size` fields from the depth vectors.
    pub fn refresh_top(&mut self) {
        match self.bids.first() {
            Some(l) => {
                self.best_bid = l.price;
                self.bid_size = l.qty;
            }
            None => {
                self.best_bid = 0.0;
                self.bid_size = 0.0;
            }
        }
        match self.asks.first() {
            Some(l) => {
                self.best_ask = l.price;
                self.ask_size = l.qty;
            }
            None => {
                self.best_ask = 0.0;
                self.ask_size = 0.0;
            }
        }
    }
}
