use serde::{Deserialize, Serialize};

use crate::{Book, OrderId, Price, Quantity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
    /// No directional intent; only valid on policy output and reject rows.
    Hold,
}

impl Side {
    pub fn sign(&self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
            Side::Hold => 0.0,
        }
    }

    pub fn is_tradable(&self) -> bool {
        matches!(self, Side::Buy | Side::Sell)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
            Side::Hold => "HOLD",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
}

/// A policy intent. Each variant carries only the fields meaningful to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Action {
    Place(PlaceOrder),
    Cancel(CancelOrder),
    Replace(ReplaceOrder),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub side: Side,
    pub order_type: OrderType,
    pub size: Quantity,
    /// 0 for market orders.
    pub limit_price: Price,
    pub is_maker: bool,
    pub post_only: bool,
    pub reduce_only: bool,
    /// Quote notional the policy sized this order off, for fill sanity checks.
    pub target_notional: Option<f64>,
}

impl PlaceOrder {
    pub fn market(side: Side, size: Quantity) -> Self {
        Self {
            side,
            order_type: OrderType::Market,
            size,
            limit_price: 0.0,
            is_maker: false,
            post_only: false,
            reduce_only: false,
            target_notional: None,
        }
    }

    pub fn limit(side: Side, size: Quantity, limit_price: Price) -> Self {
        Self {
            side,
            order_type: OrderType::Limit,
            size,
            limit_price,
            is_maker: false,
            post_only: false,
            reduce_only: false,
            target_notional: None,
        }
    }

    /// Whether this limit order would trade through the opposing best.
    ///
    /// A crossing limit is routed as a taker regardless of `is_maker`.
    pub fn is_crossing(&self, book: &Book) -> bool {
        if self.limit_price <= 0.0 {
            return false;
        }
        match self.side {
            Side::Buy => book.best_ask > 0.0 && self.limit_price >= book.best_ask,
            Side::Sell => book.best_bid > 0.0 && self.limit_price <= book.best_bid,
            Side::Hold => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CancelOrder {
    pub target_order_id: OrderId,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReplaceOrder {
    pub target_order_id: OrderId,
    /// New limit price; <= 0 keeps the old order's price.
    pub new_price: Price,
    /// New total quantity; <= 0 carries the old order's remaining quantity.
    pub new_qty: Quantity,
}
