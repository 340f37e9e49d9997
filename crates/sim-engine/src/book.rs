//! Book reconstruction from an ordered L2 delta stream.
//!
//! Applies one delta per `advance()` call, enforcing sequence continuity.
//! A gap or a negative quantity is a data-integrity fault and fatal to the
//! run; the reconstructed book is authoritative for every other component.

use market_types::{Book, BookDelta, Timestamp};
use tracing::warn;

use crate::error::{SimError, SimResult};

pub struct BookReconstructor {
    deltas: Vec<BookDelta>,
    cursor: usize,
    last_seq: Option<i64>,
    last_ts_ms: Timestamp,
    applied: u64,
    book: Book,
}

impl BookReconstructor {
    pub fn new(deltas: Vec<BookDelta>) -> Self {
        Self {
            deltas,
            cursor: 0,
            last_seq: None,
            last_ts_ms: 0,
            applied: 0,
            book: Book::empty(),
        }
    }

    /// Apply the next delta. Returns `Ok(false)` once the feed is exhausted.
    pub fn advance(&mut self) -> SimResult<bool> {
        let Some(delta) = self.deltas.get(self.cursor) else {
            return Ok(false);
        };
        let delta = delta.clone();
        self.cursor += 1;

        if delta.is_snapshot {
            self.book.bids.clear();
            self.book.asks.clear();
        } else if let Some(last) = self.last_seq {
            if delta.prev_seq > 0 && delta.prev_seq != last {
                warn!(
                    last_seq = last,
                    prev_seq = delta.prev_seq,
                    seq = delta.seq,
                    "book sequence gap"
                );
                return Err(SimError::SequenceGap {
                    last,
                    prev: delta.prev_seq,
                    seq: delta.seq,
                });
            }
        }
        if delta.qty < 0.0 {
            return Err(SimError::NegativeQty {
                seq: delta.seq,
                qty: delta.qty,
            });
        }

        self.last_seq = Some(delta.seq);
        // A delta without a usable timestamp still advances the clock.
        if delta.ts_ms > 0 {
            self.last_ts_ms = delta.ts_ms;
        } else {
            self.last_ts_ms += 1;
        }

        self.book.apply_level(delta.side, delta.price, delta.qty);
        self.book.refresh_top();
        self.book.ts_ms = self.last_ts_ms;
        self.book.seq = delta.seq;
        self.applied += 1;
        Ok(true)
    }

    pub fn current(&self) -> &Book {
        &self.book
    }

    pub fn applied(&self) -> u64 {
        self.applied
    }

    pub fn finished(&self) -> bool {
        self.cursor >= self.deltas.len()
    }
}
