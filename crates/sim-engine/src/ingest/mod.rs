//! CSV ingestion for recorded book deltas and trade prints.
//!
//! These loaders sit outside the core: malformed rows are logged and
//! skipped here, and the core treats whatever survives as authoritative.

mod deltas;
mod trades;

pub use deltas::load_book_deltas;
pub use trades::load_trade_prints;

use market_types::Side;

/// Book side from the first character, case-insensitive: b -> bid, a -> ask.
pub(crate) fn parse_book_side(field: &str) -> Option<Side> {
    match field.trim().chars().next()?.to_ascii_lowercase() {
        'b' => Some(Side::Buy),
        'a' => Some(Side::Sell),
        _ => None,
    }
}

/// Aggressor side from the first character: b -> buy, s -> sell.
pub(crate) fn parse_aggressor_side(field: &str) -> Option<Side> {
    match field.trim().chars().next()?.to_ascii_lowercase() {
        'b' => Some(Side::Buy),
        's' => Some(Side::Sell),
        _ => None,
    }
}
