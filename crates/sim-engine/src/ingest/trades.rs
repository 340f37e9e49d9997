use std::path::Path;

use anyhow::{Context, Result};
use csv::StringRecord;
use market_types::TradePrint;
use tracing::{info, warn};

use super::parse_aggressor_side;

/// Load trade prints: ts_ms, aggressor side, price, size, id. Matched by
/// header names when present, positionally otherwise. Rows that fail to
/// parse are logged and skipped.
pub fn load_trade_prints(path: &Path) -> Result<Vec<TradePrint>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("failed to open trades file {}", path.display()))?;

    let mut records = Vec::new();
    for (line_no, record) in reader.records().enumerate() {
        match record {
            Ok(r) if !r.is_empty() => records.push(r),
            Ok(_) => {}
            Err(e) => warn!(line = line_no + 1, error = %e, "skipping unreadable trade row"),
        }
    }
    if records.is_empty() {
        return Ok(Vec::new());
    }

    let header_like = records[0]
        .iter()
        .any(|f| f.chars().any(|c| c.is_alphabetic()));
    let (columns, data) = if header_like {
        (TradeColumns::from_header(&records[0]), &records[1..])
    } else {
        (TradeColumns::positional(), &records[..])
    };

    fn get<'a>(r: &'a StringRecord, idx: Option<usize>) -> &'a str {
        idx.and_then(|i| r.get(i)).unwrap_or("")
    }
    let mut trades = Vec::with_capacity(data.len());
    for (row_no, record) in data.iter().enumerate() {
        let (Ok(ts_ms), Ok(price), Ok(size)) = (
            get(record, columns.ts).parse::<i64>(),
            get(record, columns.price).parse::<f64>(),
            get(record, columns.size).parse::<f64>(),
        ) else {
            warn!(row = row_no + 1, "skipping malformed trade row");
            continue;
        };
        let Some(side) = parse_aggressor_side(get(record, columns.side)) else {
            warn!(row = row_no + 1, "skipping trade row with unrecognized side");
            continue;
        };
        let id = get(record, columns.id);
        trades.push(TradePrint::new(
            ts_ms,
            side,
            price,
            size,
            if id.is_empty() {
                format!("t{}", row_no + 1)
            } else {
                id.to_string()
            },
        ));
    }
    info!(trades = trades.len(), file = %path.display(), "trade tape loaded");
    Ok(trades)
}

struct TradeColumns {
    ts: Option<usize>,
    side: Option<usize>,
    price: Option<usize>,
    size: Option<usize>,
    id: Option<usize>,
}

impl TradeColumns {
    fn from_header(header: &StringRecord) -> Self {
        let find = |name: &str| header.iter().position(|f| f.eq_ignore_ascii_case(name));
        Self {
            ts: find("ts_ms").or_else(|| find("ts")).or_else(|| find("timestamp")),
            side: find("side"),
            price: find("price"),
            size: find("size").or_else(|| find("qty")).or_else(|| find("amount")),
            id: find("id").or_else(|| find("trade_id")),
        }
    }

    fn positional() -> Self {
        Self {
            ts: Some(0),
            side: Some(1),
            price: Some(2),
            size: Some(3),
            id: Some(4),
        }
    }
}
