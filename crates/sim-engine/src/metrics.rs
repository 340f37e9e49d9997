//! Per-fill accounting aggregation and the end-of-run summary.

use std::collections::BTreeMap;

use market_types::{Liquidity, Position, Timestamp, ACCOUNTING_EPS};
use serde::Serialize;

use crate::config::{LatencyConfig, MakerParams};
use crate::error::{SimError, SimResult};
use crate::orders::OrderCounters;

/// Everything accumulated while fills stream through the scheduler.
#[derive(Debug, Default)]
pub struct PnlAggregate {
    pub gross: f64,
    pub fees: f64,
    /// Realized PnL re-accumulated from per-fill deltas, independently of
    /// the position state, for the end-of-run identity check.
    pub realized_steps: f64,
    pub turnover: f64,
    pub net_steps: Vec<f64>,
    pub net_by_1s: BTreeMap<i64, f64>,
    pub net_by_10s: BTreeMap<i64, f64>,
    /// Mid used for the most recent mark-to-mid delta.
    pub last_mark_mid: Option<f64>,

    pub latency_ms: Vec<f64>,
    pub skew_ms: Vec<f64>,
    pub queue_time_ms: Vec<f64>,
    pub adv_selection_ticks: Vec<f64>,
    pub filled_to_target: Vec<f64>,
    pub fee_bps_maker: Vec<f64>,
    pub fee_bps_taker: Vec<f64>,
    pub exec_cost_maker: Vec<f64>,
    pub exec_cost_taker: Vec<f64>,

    pub filled_count: u64,
    pub rejected_count: u64,
    pub maker_fill_count: u64,
    pub maker_orders_submitted: u64,
    pub reject_counts: BTreeMap<String, u64>,
}

impl PnlAggregate {
    pub fn record_fill(
        &mut self,
        ts_ms: Timestamp,
        liquidity: Liquidity,
        gross_delta: f64,
        realized_delta: f64,
        fee: f64,
        fee_bps: f64,
        exec_cost_ticks: f64,
        notional: f64,
        mark_mid: f64,
    ) {
        let net_delta = gross_delta - fee;
        self.gross += gross_delta;
        self.fees += fee;
        self.realized_steps += realized_delta;
        self.turnover += notional.abs();
        self.net_steps.push(net_delta);
        *self.net_by_1s.entry(ts_ms.div_euclid(1_000)).or_insert(0.0) += net_delta;
        *self.net_by_10s.entry(ts_ms.div_euclid(10_000)).or_insert(0.0) += net_delta;
        self.last_mark_mid = Some(mark_mid);
        self.filled_count += 1;
        match liquidity {
            Liquidity::Maker => {
                self.maker_fill_count += 1;
                self.fee_bps_maker.push(fee_bps);
                self.exec_cost_maker.push(exec_cost_ticks);
            }
            Liquidity::Taker => {
                self.fee_bps_taker.push(fee_bps);
                self.exec_cost_taker.push(exec_cost_ticks);
            }
        }
    }

    pub fn record_reject(&mut self, reason: &str) {
        self.rejected_count += 1;
        *self.reject_counts.entry(reason.to_string()).or_insert(0) += 1;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SharpeStat {
    pub value: f64,
    pub n: usize,
    pub std: f64,
}

/// Sharpe over bucketed net deltas: mean/std * sqrt(n) with sample (n-1)
/// variance; 0 when fewer than two buckets.
pub fn sharpe_from_buckets(buckets: &BTreeMap<i64, f64>) -> SharpeStat {
    let n = buckets.len();
    if n < 2 {
        return SharpeStat {
            value: 0.0,
            n,
            std: 0.0,
        };
    }
    let mean = buckets.values().sum::<f64>() / n as f64;
    let var = buckets
        .values()
        .map(|v| (v - mean) * (v - mean))
        .sum::<f64>()
        / (n as f64 - 1.0);
    let std = var.sqrt();
    let value = if std > 0.0 {
        mean / std * (n as f64).sqrt()
    } else {
        0.0
    };
    SharpeStat { value, n, std }
}

/// Peak-to-trough drawdown of the cumulative net-delta path.
pub fn max_drawdown(steps: &[f64]) -> f64 {
    let mut cum = 0.0;
    let mut peak = 0.0;
    let mut max_dd = 0.0;
    for s in steps {
        cum += s;
        if cum > peak {
            peak = cum;
        }
        let dd = peak - cum;
        if dd > max_dd {
            max_dd = dd;
        }
    }
    max_dd
}

pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let idx = ((sorted.len() - 1) as f64 * p / 100.0) as usize;
    sorted[idx]
}

#[derive(Debug, Clone, Serialize)]
pub struct SampleStats {
    pub n: usize,
    pub mean: f64,
    pub p50: f64,
    pub p90: f64,
    pub p99: f64,
}

pub fn sample_stats(values: &[f64]) -> SampleStats {
    let n = values.len();
    let mean = if n == 0 {
        0.0
    } else {
        values.iter().sum::<f64>() / n as f64
    };
    SampleStats {
        n,
        mean,
        p50: percentile(values, 50.0),
        p90: percentile(values, 90.0),
        p99: percentile(values, 99.0),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FeeBpsStats {
    pub overall: SampleStats,
    pub maker: SampleStats,
    pub taker: SampleStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct LatencySummary {
    pub config: LatencyConfig,
    pub samples: usize,
    pub p50: f64,
    pub p90: f64,
    pub p99: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderSummary {
    #[serde(flatten)]
    pub counters: OrderCounters,
    pub avg_lifetime_ms: f64,
}

/// The metrics.json payload.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub run_id: String,
    pub symbol: String,
    pub gross: f64,
    pub fees: f64,
    pub realized: f64,
    pub unrealized: f64,
    pub net_total: f64,
    pub identity_ok: bool,
    pub sharpe_1s: SharpeStat,
    pub sharpe_10s: SharpeStat,
    pub max_drawdown: f64,
    pub turnover: f64,
    pub fills: u64,
    pub rejects: u64,
    pub fill_rate: f64,
    pub maker_fills: u64,
    pub maker_orders_submitted: u64,
    pub maker_fill_rate: f64,
    pub maker_queue_time_ms: SampleStats,
    pub adverse_selection_ticks: SampleStats,
    pub trade_ts_skew_ms: SampleStats,
    pub fee_bps: FeeBpsStats,
    pub exec_cost_ticks: FeeBpsStats,
    pub filled_to_target_p99: f64,
    pub orders: OrderSummary,
    pub latency: LatencySummary,
    pub maker_params: MakerParams,
    pub reject_counts: BTreeMap<String, u64>,
}

#[allow(clippy::too_many_arguments)]
pub fn build_summary(
    run_id: &str,
    symbol: &str,
    pnl: &PnlAggregate,
    counters: &OrderCounters,
    position: &Position,
    final_mid: f64,
    latency_cfg: &LatencyConfig,
    maker_params: &MakerParams,
) -> SimResult<Summary> {
    let realized = position.realized_pnl;
    let mark = if final_mid > 0.0 {
        final_mid
    } else {
        position.avg_price
    };
    let unrealized = position.qty * (mark - position.avg_price);
    let net_total = realized + unrealized - pnl.fees;
    // The same figure re-derived from the per-fill accumulators. Divergence
    // means a fill touched one path but not the other.
    let recomputed = pnl.realized_steps + unrealized - pnl.fees;
    let identity_ok = (net_total - recomputed).abs() <= ACCOUNTING_EPS;
    if !identity_ok {
        return Err(SimError::IdentityMismatch {
            net_total,
            recomputed,
        });
    }

    let mut fee_bps_all = pnl.fee_bps_maker.clone();
    fee_bps_all.extend_from_slice(&pnl.fee_bps_taker);
    let mut exec_all = pnl.exec_cost_maker.clone();
    exec_all.extend_from_slice(&pnl.exec_cost_taker);

    let attempts = pnl.filled_count + pnl.rejected_count;
    Ok(Summary {
        run_id: run_id.to_string(),
        symbol: symbol.to_string(),
        gross: pnl.gross,
        fees: pnl.fees,
        realized,
        unrealized,
        net_total,
        identity_ok,
        sharpe_1s: sharpe_from_buckets(&pnl.net_by_1s),
        sharpe_10s: sharpe_from_buckets(&pnl.net_by_10s),
        max_drawdown: max_drawdown(&pnl.net_steps),
        turnover: pnl.turnover,
        fills: pnl.filled_count,
        rejects: pnl.rejected_count,
        fill_rate: if attempts > 0 {
            pnl.filled_count as f64 / attempts as f64
        } else {
            0.0
        },
        maker_fills: pnl.maker_fill_count,
        maker_orders_submitted: pnl.maker_orders_submitted,
        maker_fill_rate: if pnl.maker_orders_submitted > 0 {
            pnl.maker_fill_count as f64 / pnl.maker_orders_submitted as f64
        } else {
            0.0
        },
        maker_queue_time_ms: sample_stats(&pnl.queue_time_ms),
        adverse_selection_ticks: sample_stats(&pnl.adv_selection_ticks),
        trade_ts_skew_ms: sample_stats(&pnl.skew_ms),
        fee_bps: FeeBpsStats {
            overall: sample_stats(&fee_bps_all),
            maker: sample_stats(&pnl.fee_bps_maker),
            taker: sample_stats(&pnl.fee_bps_taker),
        },
        exec_cost_ticks: FeeBpsStats {
            overall: sample_stats(&exec_all),
            maker: sample_stats(&pnl.exec_cost_maker),
            taker: sample_stats(&pnl.exec_cost_taker),
        },
        filled_to_target_p99: percentile(&pnl.filled_to_target, 99.0),
        orders: OrderSummary {
            counters: counters.clone(),
            avg_lifetime_ms: counters.avg_lifetime_ms(),
        },
        latency: LatencySummary {
            config: latency_cfg.clone(),
            samples: pnl.latency_ms.len(),
            p50: percentile(&pnl.latency_ms, 50.0),
            p90: percentile(&pnl.latency_ms, 90.0),
            p99: percentile(&pnl.latency_ms, 99.0),
        },
        maker_params: maker_params.clone(),
        reject_counts: pnl.reject_counts.clone(),
    })
}
