use market_types::{OrderId, OrderStatus};
use thiserror::Error;

/// Fatal simulation faults. Any of these invalidates downstream accounting:
/// the run halts after the current tick's cleanup and the process exits
/// non-zero.
#[derive(Debug, Clone, Error)]
pub enum SimError {
    #[error("sequence gap: last applied seq {last}, next delta prev_seq {prev} (seq {seq})")]
    SequenceGap { last: i64, prev: i64, seq: i64 },

    #[error("negative quantity {qty} in delta seq {seq}")]
    NegativeQty { seq: i64, qty: f64 },

    #[error("fill for unknown order id {0}")]
    UnknownOrder(OrderId),

    #[error("fill on terminal order {id} in status {status:?}")]
    FillOnTerminal { id: OrderId, status: OrderStatus },

    #[error("fill side disagrees with order {0}")]
    SideMismatch(OrderId),

    #[error("overfill on order {id}: filled {filled} exceeds qty {qty}")]
    Overfill { id: OrderId, filled: f64, qty: f64 },

    #[error("filled notional {filled} exceeds target {target} beyond tolerance")]
    NotionalSanity { filled: f64, target: f64 },

    #[error("accounting identity violated: net_total {net_total} vs recomputed {recomputed}")]
    IdentityMismatch { net_total: f64, recomputed: f64 },

    #[error("{0} adverse-selection samples unresolved at shutdown")]
    UnresolvedAdverseSamples(usize),
}

pub type SimResult<T> = Result<T, SimError>;
