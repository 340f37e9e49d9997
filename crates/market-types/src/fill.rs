use serde::{Deserialize, Serialize};

use crate::{OrderId, Price, Quantity, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillStatus {
    Filled,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Liquidity {
    Maker,
    Taker,
}

impl Liquidity {
    pub fn label(&self) -> &'static str {
        match self {
            Liquidity::Maker => "MAKER",
            Liquidity::Taker => "TAKER",
        }
    }
}

/// Why an action was refused. These are recoverable: the run continues and
/// the rejection is recorded as a fill row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    BadSide,
    ZeroQty,
    NoBid,
    NoAsk,
    NoLiquidity,
    MinQty,
    MinNotional,
    PriceInvalid,
    RiskLimit,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::BadSide => "bad_side",
            RejectReason::ZeroQty => "zero_qty",
            RejectReason::NoBid => "no_bid",
            RejectReason::NoAsk => "no_ask",
            RejectReason::NoLiquidity => "no_liquidity",
            RejectReason::MinQty => "min_qty",
            RejectReason::MinNotional => "min_notional",
            RejectReason::PriceInvalid => "price_invalid",
            RejectReason::RiskLimit => "risk_limit",
        }
    }
}

/// Outcome of one simulated execution attempt.
///
/// Rejected fills carry only the side and reason; every quantity field is 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: OrderId,
    pub status: FillStatus,
    pub reason: Option<RejectReason>,
    pub side: Side,
    pub liquidity: Liquidity,
    pub price: Price,
    pub vwap_price: Price,
    pub filled_qty: Quantity,
    pub unfilled_qty: Quantity,
    pub partial: bool,
    pub levels_crossed: usize,
    pub slippage_ticks: f64,
}

impl Fill {
    pub fn filled(side: Side, price: Price, qty: Quantity, partial: bool, liquidity: Liquidity) -> Self {
        Self {
            order_id: 0,
            status: FillStatus::Filled,
            reason: None,
            side,
            liquidity,
            price,
            vwap_price: price,
            filled_qty: qty,
            unfilled_qty: 0.0,
            partial,
            levels_crossed: if partial { 1 } else { 0 },
            slippage_ticks: 0.0,
        }
    }

    pub fn rejected(side: Side, reason: RejectReason) -> Self {
        Self {
            order_id: 0,
            status: FillStatus::Rejected,
            reason: Some(reason),
            side,
            liquidity: Liquidity::Taker,
            price: 0.0,
            vwap_price: 0.0,
            filled_qty: 0.0,
            unfilled_qty: 0.0,
            partial: false,
            levels_crossed: 0,
            slippage_ticks: 0.0,
        }
    }

    pub fn is_filled(&self) -> bool {
        self.status == FillStatus::Filled
    }

    pub fn notional(&self) -> f64 {
        self.vwap_price * self.filled_qty
    }
}
