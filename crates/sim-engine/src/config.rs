//! Run configuration: venue rules, fee schedule, latency fit, maker model
//! parameters and risk caps.
//!
//! Everything that can move accounting is constructed explicitly; none of
//! these types implement `Default`. The venue-rules file uses an indented
//! key-value layout (venue, then symbol, then keys plus a `fee` sub-block):
//!
//! ```text
//! bybit:
//!   BTCUSDT:
//!     tick_size: 0.1
//!     qty_step: 0.001
//!     min_qty: 0.001
//!     min_notional: 5.0
//!     fee:
//!       maker_bps: 1.0
//!       taker_bps: 6.0
//!       fee_ccy: USDT
//!       rounding: none
//! ```

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeRounding {
    None,
    CeilToCent,
}

impl FeeRounding {
    fn parse(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(FeeRounding::None),
            "ceil_to_cent" => Ok(FeeRounding::CeilToCent),
            other => bail!("unknown fee rounding mode '{}'", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    pub maker_bps: f64,
    pub taker_bps: f64,
    pub fee_ccy: String,
    pub rounding: FeeRounding,
}

/// Per-symbol venue constraints used by the rules engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueRules {
    pub tick_size: f64,
    pub qty_step: f64,
    pub min_qty: f64,
    pub min_notional: f64,
    /// 0 disables the band check.
    pub price_band_bps: f64,
    pub fees: FeeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencyConfig {
    pub base_ms: f64,
    pub jitter_ms: f64,
    pub tail_ms: f64,
    pub tail_prob: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MakerParams {
    /// Fraction of the visible level quantity assumed to be queued ahead
    /// of us at submit time, in [0, 1].
    pub q_init: f64,
    /// Fraction of observed depth decay attributed to queue burn, in [0, 1].
    pub alpha: f64,
    pub expire_ms: i64,
    /// Adverse-selection penalty applied to maker fill prices, in ticks.
    pub adv_ticks: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLimits {
    pub max_position: f64,
    pub max_notional: f64,
}

/// Everything the scheduler needs for one run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub symbol: String,
    pub rules: VenueRules,
    pub latency: LatencyConfig,
    pub maker: MakerParams,
    pub risk: RiskLimits,
    /// TTL stamped on every placed order; 0 disables expiry.
    pub order_ttl_ms: i64,
    /// Horizon for deferred adverse-selection measurement.
    pub adv_horizon_ms: i64,
    /// Fatal (true) or warn (false) on unresolved adverse-selection
    /// samples at shutdown.
    pub strict_shutdown: bool,
    /// Write a bookcheck line every N applied deltas; 0 disables.
    pub bookcheck_every: u64,
}

/// Parse the venue-rules file and select one venue/symbol block.
pub fn parse_venue_rules(text: &str, venue: &str, symbol: &str) -> Result<VenueRules> {
    let mut keys: HashMap<String, String> = HashMap::new();
    let mut fee_keys: HashMap<String, String> = HashMap::new();

    let mut in_venue = false;
    let mut in_symbol = false;
    let mut in_fee = false;
    let mut venue_indent = 0usize;
    let mut symbol_indent = 0usize;
    let mut fee_indent = 0usize;

    for raw in text.lines() {
        let trimmed = raw.trim_end();
        if trimmed.trim().is_empty() || trimmed.trim_start().starts_with('#') {
            continue;
        }
        let indent = trimmed.len() - trimmed.trim_start().len();
        let body = trimmed.trim_start();
        let (key, value) = match body.split_once(':') {
            Some((k, v)) => (k.trim(), v.trim()),
            None => (body, ""),
        };

        if !in_venue {
            if value.is_empty() && key == venue {
                in_venue = true;
                venue_indent = indent;
            }
            continue;
        }
        if indent <= venue_indent {
            // Another top-level venue begins; our block is over.
            break;
        }
        if !in_symbol {
            if value.is_empty() && key == symbol {
                in_symbol = true;
                symbol_indent = indent;
            }
            continue;
        }
        if indent <= symbol_indent {
            break;
        }
        if in_fee && indent > fee_indent {
            fee_keys.insert(key.to_string(), value.to_string());
            continue;
        }
        in_fee = false;
        if key == "fee" && value.is_empty() {
            in_fee = true;
            fee_indent = indent;
            continue;
        }
        keys.insert(key.to_string(), value.to_string());
    }

    if !in_symbol {
        bail!("venue rules: no block for {}/{}", venue, symbol);
    }

    let req = |map: &HashMap<String, String>, name: &str| -> Result<f64> {
        map.get(name)
            .with_context(|| format!("venue rules: missing {} for {}/{}", name, venue, symbol))?
            .parse::<f64>()
            .with_context(|| format!("venue rules: bad {} for {}/{}", name, venue, symbol))
    };

    Ok(VenueRules {
        tick_size: req(&keys, "tick_size")?,
        qty_step: req(&keys, "qty_step")?,
        min_qty: req(&keys, "min_qty")?,
        min_notional: req(&keys, "min_notional")?,
        price_band_bps: keys
            .get("price_band_bps")
            .map(|v| v.parse::<f64>())
            .transpose()
            .context("venue rules: bad price_band_bps")?
            .unwrap_or(0.0),
        fees: FeeConfig {
            maker_bps: req(&fee_keys, "maker_bps")?,
            taker_bps: req(&fee_keys, "taker_bps")?,
            fee_ccy: fee_keys
                .get("fee_ccy")
                .cloned()
                .unwrap_or_else(|| "USDT".to_string()),
            rounding: match fee_keys.get("rounding") {
                Some(v) => FeeRounding::parse(v)?,
                None => FeeRounding::None,
            },
        },
    })
}

pub fn load_venue_rules(path: &Path, venue: &str, symbol: &str) -> Result<VenueRules> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read venue rules {}", path.display()))?;
    parse_venue_rules(&text, venue, symbol)
}

/// Parse a latency fit file: JSON with base_ms/jitter_ms/tail_ms/tail_prob,
/// or plain `key value` / `key: value` lines.
pub fn parse_latency_fit(text: &str) -> Result<LatencyConfig> {
    if let Ok(cfg) = serde_json::from_str::<LatencyConfig>(text) {
        return Ok(cfg);
    }
    let mut vals: HashMap<&str, f64> = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.splitn(2, |c: char| c == ':' || c.is_whitespace());
        let key = parts.next().unwrap_or("").trim();
        let val = parts.next().unwrap_or("").trim();
        if let Ok(v) = val.parse::<f64>() {
            vals.insert(
                match key {
                    "base_ms" => "base_ms",
                    "jitter_ms" => "jitter_ms",
                    "tail_ms" => "tail_ms",
                    "tail_prob" => "tail_prob",
                    _ => continue,
                },
                v,
            );
        }
    }
    let get = |name: &str| -> Result<f64> {
        vals.get(name)
            .copied()
            .with_context(|| format!("latency fit: missing {}", name))
    };
    Ok(LatencyConfig {
        base_ms: get("base_ms")?,
        jitter_ms: get("jitter_ms")?,
        tail_ms: get("tail_ms")?,
        tail_prob: get("tail_prob")?,
    })
}

pub fn load_latency_fit(path: &Path) -> Result<LatencyConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read latency fit {}", path.display()))?;
    parse_latency_fit(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULES: &str = "\
# exchange rules snapshot
bybit:
  BTCUSDT:
    tick_size: 0.1
    qty_step: 0.001
    min_qty: 0.001
    min_notional: 5.0
    fee:
      maker_bps: 1.0
      taker_bps: 6.0
      fee_ccy: USDT
      rounding: ceil_to_cent
  ETHUSDT:
    tick_size: 0.01
    qty_step: 0.01
    min_qty: 0.01
    min_notional: 5.0
    fee:
      maker_bps: 1.0
      taker_bps: 6.0
";

    #[test]
    fn parses_symbol_block() {
        let rules = parse_venue_rules(RULES, "bybit", "BTCUSDT").unwrap();
        assert_eq!(rules.tick_size, 0.1);
        assert_eq!(rules.qty_step, 0.001);
        assert_eq!(rules.min_notional, 5.0);
        assert_eq!(rules.fees.taker_bps, 6.0);
        assert_eq!(rules.fees.rounding, FeeRounding::CeilToCent);
        assert_eq!(rules.fees.fee_ccy, "USDT");
    }

    #[test]
    fn second_symbol_defaults_fee_extras() {
        let rules = parse_venue_rules(RULES, "bybit", "ETHUSDT").unwrap();
        assert_eq!(rules.tick_size, 0.01);
        assert_eq!(rules.fees.rounding, FeeRounding::None);
        assert_eq!(rules.fees.fee_ccy, "USDT");
        assert_eq!(rules.price_band_bps, 0.0);
    }

    #[test]
    fn unknown_symbol_is_an_error() {
        assert!(parse_venue_rules(RULES, "bybit", "SOLUSDT").is_err());
        assert!(parse_venue_rules(RULES, "okx", "BTCUSDT").is_err());
    }

    #[test]
    fn latency_fit_json_and_plain() {
        let json = r#"{"base_ms": 8.0, "jitter_ms": 4.0, "tail_ms": 12.0, "tail_prob": 0.02}"#;
        let cfg = parse_latency_fit(json).unwrap();
        assert_eq!(cfg.base_ms, 8.0);
        assert_eq!(cfg.tail_prob, 0.02);

        let plain = "base_ms 8\njitter_ms: 4\ntail_ms 12\ntail_prob 0.02\n";
        let cfg = parse_latency_fit(plain).unwrap();
        assert_eq!(cfg.jitter_ms, 4.0);
        assert_eq!(cfg.tail_ms, 12.0);

        assert!(parse_latency_fit("base_ms 8\n").is_err());
    }
}
