use serde::{Deserialize, Serialize};

use crate::{Price, Quantity, Side, Timestamp};

/// A public trade print, time-aligned to the book feed.
///
/// `side` is the aggressor side: a `Buy` print consumed ask liquidity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradePrint {
    pub ts_ms: Timestamp,
    pub side: Side,
    pub price: Price,
    pub size: Quantity,
    pub trade_id: String,
}

impl TradePrint {
    pub fn new(ts_ms: Timestamp, side: Side, price: Price, size: Quantity, trade_id: String) -> Self {
        Self {
            ts_ms,
            side,
            price,
            size,
            trade_id,
        }
    }
}
