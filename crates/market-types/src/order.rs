use serde::{Deserialize, Serialize};

use crate::{OrderId, OrderType, Price, Quantity, Side, Timestamp, QTY_EPS};

/// Order lifecycle state.
///
/// Legal transitions: New -> Partial | terminal, Partial -> terminal, where
/// the terminal set is {Filled, Cancelled, Expired, Replaced, Rejected}.
/// Nothing leaves a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    Partial,
    Filled,
    Cancelled,
    Expired,
    Replaced,
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Cancelled
                | OrderStatus::Expired
                | OrderStatus::Replaced
                | OrderStatus::Rejected
        )
    }

    pub fn is_open(&self) -> bool {
        matches!(self, OrderStatus::New | OrderStatus::Partial)
    }

    pub fn label(&self) -> &'static str {
        match self {
            OrderStatus::New => "new",
            OrderStatus::Partial => "partial",
            OrderStatus::Filled => "filled",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Expired => "expired",
            OrderStatus::Replaced => "replaced",
            OrderStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Price,
    pub qty: Quantity,
    pub filled_qty: Quantity,
    pub avg_fill_price: Price,
    pub status: OrderStatus,
    pub created_ts: Timestamp,
    pub last_update_ts: Timestamp,
    /// 0 means no expiry.
    pub expire_ts: Timestamp,
    pub replaced_from: Option<OrderId>,
    pub replaced_by: Option<OrderId>,
    pub post_only: bool,
    pub reduce_only: bool,
}

impl Order {
    pub fn remaining(&self) -> Quantity {
        (self.qty - self.filled_qty).max(0.0)
    }

    pub fn is_fully_filled(&self) -> bool {
        self.filled_qty + QTY_EPS >= self.qty
    }
}
