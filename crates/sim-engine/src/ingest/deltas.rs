use std::path::Path;

use anyhow::{bail, Context, Result};
use csv::StringRecord;
use market_types::{BookDelta, Side};
use tracing::{info, warn};

use super::parse_book_side;

/// Load a replay file as an ordered delta stream.
///
/// Two layouts are accepted. The L2 delta layout has columns
/// ts_ms, seq, prev_seq, type, book_side (or side), price, size — matched
/// by name when a header row is present, positionally otherwise. The
/// legacy snapshot layout carries best bid/ask and their sizes in the last
/// four columns of each row and is lowered into per-row snapshot deltas.
pub fn load_book_deltas(path: &Path) -> Result<Vec<BookDelta>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("failed to open replay file {}", path.display()))?;

    let mut records = Vec::new();
    for (line_no, record) in reader.records().enumerate() {
        match record {
            Ok(r) if !r.is_empty() => records.push(r),
            Ok(_) => {}
            Err(e) => warn!(line = line_no + 1, error = %e, "skipping unreadable row"),
        }
    }
    if records.is_empty() {
        bail!("replay file {} has no rows", path.display());
    }

    let first = &records[0];
    let header_like = first.iter().any(|f| f.chars().any(|c| c.is_alphabetic()));
    let lowered: Vec<String> = first.iter().map(|f| f.to_ascii_lowercase()).collect();
    let looks_delta = lowered
        .iter()
        .any(|f| f == "seq" || f == "type" || f == "side" || f == "book_side");

    let deltas = if looks_delta {
        load_delta_rows(&records, header_like)
    } else {
        load_snapshot_rows(&records, header_like)
    };
    if deltas.is_empty() {
        bail!("replay file {} produced no usable deltas", path.display());
    }
    info!(rows = records.len(), deltas = deltas.len(), file = %path.display(), "replay loaded");
    Ok(deltas)
}

struct Columns {
    ts: Option<usize>,
    seq: Option<usize>,
    prev_seq: Option<usize>,
    kind: Option<usize>,
    side: Option<usize>,
    price: Option<usize>,
    size: Option<usize>,
}

impl Columns {
    fn from_header(header: &StringRecord) -> Self {
        let find = |name: &str| {
            header
                .iter()
                .position(|f| f.eq_ignore_ascii_case(name))
        };
        Self {
            ts: find("ts_ms").or_else(|| find("ts")).or_else(|| find("timestamp")),
            seq: find("seq"),
            prev_seq: find("prev_seq"),
            kind: find("type"),
            side: find("book_side").or_else(|| find("side")),
            price: find("price"),
            size: find("size"),
        }
    }

    fn positional() -> Self {
        Self {
            ts: Some(0),
            seq: Some(1),
            prev_seq: Some(2),
            kind: Some(3),
            side: Some(4),
            price: Some(5),
            size: Some(6),
        }
    }
}

fn load_delta_rows(records: &[StringRecord], header_like: bool) -> Vec<BookDelta> {
    let (columns, data) = if header_like {
        (Columns::from_header(&records[0]), &records[1..])
    } else {
        (Columns::positional(), records)
    };

    fn get<'a>(r: &'a StringRecord, idx: Option<usize>) -> &'a str {
        idx.and_then(|i| r.get(i)).unwrap_or("")
    }
    let mut deltas = Vec::with_capacity(data.len());
    for (row_no, record) in data.iter().enumerate() {
        let side = match parse_book_side(get(record, columns.side)) {
            Some(s) => s,
            None => {
                warn!(row = row_no + 1, "skipping row with unrecognized book side");
                continue;
            }
        };
        let price: f64 = match get(record, columns.price).parse() {
            Ok(p) => p,
            Err(_) => {
                warn!(row = row_no + 1, "skipping row with unparseable price");
                continue;
            }
        };
        let qty: f64 = match get(record, columns.size).parse() {
            Ok(q) => q,
            Err(_) => {
                warn!(row = row_no + 1, "skipping row with unparseable size");
                continue;
            }
        };
        let kind = get(record, columns.kind);
        deltas.push(BookDelta {
            ts_ms: get(record, columns.ts).parse().unwrap_or(0),
            seq: get(record, columns.seq).parse().unwrap_or(-1),
            prev_seq: get(record, columns.prev_seq).parse().unwrap_or(-1),
            is_snapshot: matches!(kind, "snapshot" | "snap" | "full"),
            side,
            price,
            qty,
        });
    }
    deltas
}

/// Legacy top-of-book rows: each becomes a bid snapshot delta followed by
/// an ask delta at the same timestamp, with synthesized sequence numbers.
fn load_snapshot_rows(records: &[StringRecord], header_like: bool) -> Vec<BookDelta> {
    let data = if header_like { &records[1..] } else { records };
    let mut deltas = Vec::with_capacity(data.len() * 2);
    let mut last_ts = 0i64;
    let mut seq = 0i64;
    for (row_no, record) in data.iter().enumerate() {
        let n = record.len();
        if n < 4 {
            warn!(row = row_no + 1, "skipping malformed snapshot row");
            continue;
        }
        let ts = record
            .get(0)
            .and_then(|f| f.parse::<i64>().ok())
            .unwrap_or(last_ts + 1);
        let field = |i: usize| record.get(n - 4 + i).and_then(|f| f.parse::<f64>().ok());
        let (Some(best_bid), Some(best_ask), Some(bid_size), Some(ask_size)) =
            (field(0), field(1), field(2), field(3))
        else {
            warn!(row = row_no + 1, "skipping malformed snapshot row");
            continue;
        };

        seq += 1;
        deltas.push(BookDelta {
            ts_ms: ts,
            seq,
            prev_seq: seq - 1,
            is_snapshot: true,
            side: Side::Buy,
            price: best_bid,
            qty: if best_bid > 0.0 { bid_size } else { 0.0 },
        });
        seq += 1;
        deltas.push(BookDelta {
            ts_ms: ts,
            seq,
            prev_seq: seq - 1,
            is_snapshot: false,
            side: Side::Sell,
            price: best_ask,
            qty: if best_ask > 0.0 { ask_size } else { 0.0 },
        });
        last_ts = ts;
    }
    deltas
}
