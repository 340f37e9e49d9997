//! Trade tape alignment: a monotonic cursor over time-sorted trade prints.

use market_types::{Timestamp, TradePrint};

pub struct TradeTape {
    trades: Vec<TradePrint>,
    cursor: usize,
}

impl TradeTape {
    pub fn new(mut trades: Vec<TradePrint>) -> Self {
        // Input is expected time-sorted; a stable sort makes it a guarantee
        // without reordering equal-timestamp prints.
        trades.sort_by_key(|t| t.ts_ms);
        Self { trades, cursor: 0 }
    }

    /// All prints with `ts <= ts_ms` that have not been drained yet.
    pub fn drain_up_to(&mut self, ts_ms: Timestamp) -> &[TradePrint] {
        let start = self.cursor;
        while self.cursor < self.trades.len() && self.trades[self.cursor].ts_ms <= ts_ms {
            self.cursor += 1;
        }
        &self.trades[start..self.cursor]
    }

    pub fn remaining(&self) -> usize {
        self.trades.len() - self.cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_types::Side;

    fn print(ts: i64, id: &str) -> TradePrint {
        TradePrint::new(ts, Side::Buy, 100.0, 1.0, id.to_string())
    }

    #[test]
    fn drains_in_time_order_without_replay() {
        let mut tape = TradeTape::new(vec![print(5, "a"), print(10, "b"), print(20, "c")]);
        let drained = tape.drain_up_to(10);
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].trade_id, "a");
        assert_eq!(drained[1].trade_id, "b");

        // Same timestamp again: already consumed.
        assert!(tape.drain_up_to(10).is_empty());

        let drained = tape.drain_up_to(100);
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].trade_id, "c");
        assert_eq!(tape.remaining(), 0);
    }

    #[test]
    fn sorts_unordered_input() {
        let mut tape = TradeTape::new(vec![print(20, "late"), print(5, "early")]);
        let drained = tape.drain_up_to(50);
        assert_eq!(drained[0].trade_id, "early");
        assert_eq!(drained[1].trade_id, "late");
    }
}
