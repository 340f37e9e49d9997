//! Fee computation per fill.

use market_types::{Fill, Liquidity};

use crate::config::{FeeConfig, FeeRounding};

#[derive(Debug, Clone)]
pub struct FeeResult {
    pub fee: f64,
    /// Effective rate after rounding, in basis points of the fill notional.
    pub fee_bps: f64,
}

pub struct FeeModel {
    cfg: FeeConfig,
}

impl FeeModel {
    pub fn new(cfg: FeeConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &FeeConfig {
        &self.cfg
    }

    pub fn compute(&self, fill: &Fill) -> FeeResult {
        if !fill.is_filled() || fill.filled_qty <= 0.0 || fill.vwap_price <= 0.0 {
            return FeeResult {
                fee: 0.0,
                fee_bps: 0.0,
            };
        }
        let notional = fill.notional();
        let bps = match fill.liquidity {
            Liquidity::Maker => self.cfg.maker_bps,
            Liquidity::Taker => self.cfg.taker_bps,
        };
        let fee = self.round(notional * (bps / 1e4));
        FeeResult {
            fee,
            fee_bps: if notional > 0.0 {
                fee / notional * 1e4
            } else {
                0.0
            },
        }
    }

    fn round(&self, fee: f64) -> f64 {
        match self.cfg.rounding {
            FeeRounding::None => fee,
            FeeRounding::CeilToCent => (fee * 100.0).ceil() / 100.0,
        }
    }
}
