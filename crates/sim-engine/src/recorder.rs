//! Run-directory outputs: fills.csv, metrics.json, latency samples, the
//! append-only event log and the optional bookcheck diagnostic.

use std::fs::{self, File};
use std::io::{BufWriter, Write as IoWrite};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info;

use crate::metrics::Summary;

/// One row of fills.csv. Rejected rows carry the reason and current
/// mid/best; the adverse-selection column is back-annotated later.
#[derive(Debug, Clone)]
pub struct FillRow {
    pub order_id: u64,
    pub ts_ms: i64,
    pub seq: i64,
    pub status: &'static str,
    pub side: &'static str,
    pub liquidity: &'static str,
    pub src: &'static str,
    pub reason: &'static str,
    pub vwap: f64,
    pub filled_qty: f64,
    pub unfilled_qty: f64,
    pub fee: f64,
    pub fee_bps: f64,
    pub gross: f64,
    pub net: f64,
    pub exec_cost_ticks_signed: f64,
    pub mid: f64,
    pub best: f64,
    pub spread_paid_ticks: f64,
    pub slip_ticks: f64,
    pub target_notional: f64,
    pub filled_notional: f64,
    pub crossing: bool,
    pub levels_crossed: usize,
    pub adv_ticks: f64,
    pub queue_time_ms: f64,
    pub adv_selection_ticks: Option<f64>,
}

impl FillRow {
    pub fn reject(
        ts_ms: i64,
        seq: i64,
        side: &'static str,
        src: &'static str,
        reason: &'static str,
        mid: f64,
        best: f64,
    ) -> Self {
        Self {
            order_id: 0,
            ts_ms,
            seq,
            status: "rejected",
            side,
            liquidity: "NONE",
            src,
            reason,
            vwap: 0.0,
            filled_qty: 0.0,
            unfilled_qty: 0.0,
            fee: 0.0,
            fee_bps: 0.0,
            gross: 0.0,
            net: 0.0,
            exec_cost_ticks_signed: 0.0,
            mid,
            best,
            spread_paid_ticks: 0.0,
            slip_ticks: 0.0,
            target_notional: 0.0,
            filled_notional: 0.0,
            crossing: false,
            levels_crossed: 0,
            adv_ticks: 0.0,
            queue_time_ms: 0.0,
            adv_selection_ticks: None,
        }
    }
}

const FILLS_HEADER: [&str; 27] = [
    "order_id",
    "ts_ms",
    "seq",
    "status",
    "side",
    "liquidity",
    "src",
    "reason",
    "vwap",
    "filled_qty",
    "unfilled_qty",
    "fee",
    "fee_bps",
    "gross",
    "net",
    "exec_cost_ticks_signed",
    "mid",
    "best",
    "spread_paid_ticks",
    "slip_ticks",
    "target_notional",
    "filled_notional",
    "crossing",
    "levels_crossed",
    "adv_ticks",
    "queue_time_ms",
    "adv_selection_ticks",
];

pub struct Recorder {
    run_dir: PathBuf,
    run_id: String,
    event_log: BufWriter<File>,
    bookcheck: Option<BufWriter<File>>,
}

impl Recorder {
    /// Create the run directory (named by the run id) and open the streams.
    pub fn create(base_dir: &Path, run_id_override: Option<String>, bookcheck: bool) -> Result<Self> {
        let run_id = run_id_override
            .unwrap_or_else(|| Utc::now().format("run_%Y%m%d_%H%M%S_%3f").to_string());
        let run_dir = base_dir.join(&run_id);
        fs::create_dir_all(&run_dir)
            .with_context(|| format!("failed to create run dir {}", run_dir.display()))?;

        let event_log = BufWriter::new(
            File::create(run_dir.join("events.log")).context("failed to create events.log")?,
        );
        let bookcheck = if bookcheck {
            Some(BufWriter::new(
                File::create(run_dir.join("bookcheck.csv")).context("failed to create bookcheck.csv")?,
            ))
        } else {
            None
        };

        info!(run_id = %run_id, dir = %run_dir.display(), "recorder started");
        Ok(Self {
            run_dir,
            run_id,
            event_log,
            bookcheck,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn event(&mut self, kind: &str, payload: &str) {
        let stamp = Utc::now().format("%F %T");
        let _ = writeln!(self.event_log, "{} | {} | {}", stamp, kind, payload);
    }

    pub fn bookcheck_line(&mut self, seq: i64, best_bid: f64, best_ask: f64, bid_size: f64, ask_size: f64) {
        if let Some(w) = self.bookcheck.as_mut() {
            let _ = writeln!(w, "{},{},{},{},{}", seq, best_bid, best_ask, bid_size, ask_size);
        }
    }

    pub fn write_fills(&self, rows: &[FillRow]) -> Result<()> {
        let path = self.run_dir.join("fills.csv");
        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        writer.write_record(FILLS_HEADER)?;
        for row in rows {
            writer.write_record([
                row.order_id.to_string(),
                row.ts_ms.to_string(),
                row.seq.to_string(),
                row.status.to_string(),
                row.side.to_string(),
                row.liquidity.to_string(),
                row.src.to_string(),
                row.reason.to_string(),
                format_float(row.vwap),
                format_float(row.filled_qty),
                format_float(row.unfilled_qty),
                format_float(row.fee),
                format_float(row.fee_bps),
                format_float(row.gross),
                format_float(row.net),
                format_float(row.exec_cost_ticks_signed),
                format_float(row.mid),
                format_float(row.best),
                format_float(row.spread_paid_ticks),
                format_float(row.slip_ticks),
                format_float(row.target_notional),
                format_float(row.filled_notional),
                if row.crossing { "1" } else { "0" }.to_string(),
                row.levels_crossed.to_string(),
                format_float(row.adv_ticks),
                format_float(row.queue_time_ms),
                row.adv_selection_ticks.map(format_float).unwrap_or_default(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn write_metrics(&self, summary: &Summary) -> Result<()> {
        let path = self.run_dir.join("metrics.json");
        let json = serde_json::to_string_pretty(summary).context("failed to serialize metrics")?;
        // Write through a temp file so a crash cannot leave a torn summary.
        let tmp = self.run_dir.join("metrics.json.tmp");
        fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path).context("failed to finalize metrics.json")?;
        Ok(())
    }

    pub fn write_latency_samples(&self, samples: &[f64]) -> Result<()> {
        let path = self.run_dir.join("latency_samples.csv");
        let mut out = BufWriter::new(
            File::create(&path).with_context(|| format!("failed to create {}", path.display()))?,
        );
        for s in samples {
            writeln!(out, "{}", format_float(*s))?;
        }
        out.flush()?;
        Ok(())
    }

    pub fn flush(&mut self) {
        let _ = self.event_log.flush();
        if let Some(w) = self.bookcheck.as_mut() {
            let _ = w.flush();
        }
    }
}

/// Stable float formatting: round-trip precision without trailing noise.
fn format_float(v: f64) -> String {
    if v == v.trunc() && v.abs() < 1e15 {
        format!("{:.1}", v)
    } else {
        format!("{}", v)
    }
}
