//! The single-threaded main loop.
//!
//! One iteration per book delta. All components observe the same advancing
//! book timestamp; "now" is never the wall clock. Taker actions wait in a
//! min-heap keyed by (fill_ts, submit seq) and are lazily filtered against
//! a terminal-id set, so a drained heap entry for a dead order is not an
//! error. Adverse-selection measurements are deferred in a deque ordered
//! by target timestamp and back-annotated onto their fill rows.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet, VecDeque};

use anyhow::Result;
use market_types::{
    Action, Book, Fill, OrderId, PlaceOrder, RejectReason, Side, Timestamp, TradePrint,
};
use tracing::{error, info, warn};

use crate::book::BookReconstructor;
use crate::config::SimConfig;
use crate::error::SimError;
use crate::fees::FeeModel;
use crate::latency::deterministic_latency_ms;
use crate::maker::MakerQueueSim;
use crate::matching::MatchingEngine;
use crate::metrics::{build_summary, PnlAggregate, Summary};
use crate::orders::OrderManager;
use crate::policy::{compute_features, Policy};
use crate::recorder::{FillRow, Recorder};
use crate::risk::RiskEngine;
use crate::rules::RulesEngine;
use crate::tape::TradeTape;

/// Fatal when filled notional exceeds the target by strictly more than 0.1%.
const NOTIONAL_SANITY_FACTOR: f64 = 1.001;

#[derive(Debug, Clone)]
struct PendingAction {
    place: PlaceOrder,
    order_id: OrderId,
    fill_ts: Timestamp,
    submit_seq: u64,
    crossing: bool,
    target_notional: Option<f64>,
}

// Reverse ordering turns std's max-heap into the min-heap we want:
// earliest fill_ts first, submit order breaking ties.
impl Ord for PendingAction {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .fill_ts
            .cmp(&self.fill_ts)
            .then(other.submit_seq.cmp(&self.submit_seq))
    }
}

impl PartialOrd for PendingAction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for PendingAction {
    fn eq(&self, other: &Self) -> bool {
        self.fill_ts == other.fill_ts && self.submit_seq == other.submit_seq
    }
}

impl Eq for PendingAction {}

#[derive(Debug, Clone)]
struct AdvSample {
    mid_at_fill: f64,
    side: Side,
    row_index: usize,
    target_ts: Timestamp,
}

pub struct Scheduler {
    cfg: SimConfig,
    books: BookReconstructor,
    tape: TradeTape,
    rules: RulesEngine,
    matching: MatchingEngine,
    maker: MakerQueueSim,
    orders: OrderManager,
    risk: RiskEngine,
    fees: FeeModel,
    policy: Box<dyn Policy>,
    recorder: Recorder,

    pending: BinaryHeap<PendingAction>,
    /// Orders cancelled, replaced, expired or otherwise dead; heap entries
    /// referencing them are dropped on pop instead of being edited in place.
    dropped_ids: HashSet<OrderId>,
    adv_pending: VecDeque<AdvSample>,
    rows: Vec<FillRow>,
    pnl: PnlAggregate,
    submit_seq: u64,
    action_idx: u64,
    last_trade: Option<TradePrint>,
}

impl Scheduler {
    pub fn new(
        cfg: SimConfig,
        deltas: Vec<market_types::BookDelta>,
        trades: Vec<TradePrint>,
        policy: Box<dyn Policy>,
        recorder: Recorder,
    ) -> Self {
        let rules = RulesEngine::new(cfg.rules.clone());
        let matching = MatchingEngine::new(cfg.symbol.clone(), cfg.rules.tick_size, false);
        let maker = MakerQueueSim::new(cfg.maker.clone(), cfg.rules.tick_size);
        let fees = FeeModel::new(cfg.rules.fees.clone());
        let risk = RiskEngine::new(cfg.risk.clone());
        Self {
            books: BookReconstructor::new(deltas),
            tape: TradeTape::new(trades),
            rules,
            matching,
            maker,
            orders: OrderManager::new(),
            risk,
            fees,
            policy,
            recorder,
            pending: BinaryHeap::new(),
            dropped_ids: HashSet::new(),
            adv_pending: VecDeque::new(),
            rows: Vec::new(),
            pnl: PnlAggregate::default(),
            submit_seq: 0,
            action_idx: 0,
            last_trade: None,
            cfg,
        }
    }

    /// Drive the run to completion and write all outputs. Fill rows and
    /// latency samples are flushed even when the run dies on a fatal fault.
    pub fn run(mut self) -> Result<Summary> {
        let outcome = self.run_inner();
        self.recorder.flush();
        self.recorder.write_fills(&self.rows)?;
        self.recorder.write_latency_samples(&self.pnl.latency_ms)?;

        outcome?;

        let final_mid = self.books.current().mid_price().unwrap_or(0.0);
        let summary = build_summary(
            self.recorder.run_id(),
            &self.cfg.symbol,
            &self.pnl,
            self.orders.counters(),
            self.risk.position(),
            final_mid,
            &self.cfg.latency,
            &self.cfg.maker,
        )?;
        self.recorder.write_metrics(&summary)?;
        self.recorder.event(
            "summary",
            &format!(
                "realized={} unrealized={} fees={} net_total={} fills={} rejects={}",
                summary.realized,
                summary.unrealized,
                summary.fees,
                summary.net_total,
                summary.fills,
                summary.rejects
            ),
        );
        self.recorder.flush();
        info!(
            net_total = summary.net_total,
            fills = summary.fills,
            rejects = summary.rejects,
            "run complete"
        );
        Ok(summary)
    }

    fn run_inner(&mut self) -> Result<()> {
        loop {
            match self.books.advance() {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    self.recorder.event("fatal", &e.to_string());
                    error!(error = %e, "halting on book fault");
                    return Err(e.into());
                }
            }
            let book = self.books.current().clone();
            let now = book.ts_ms;
            self.recorder.event(
                "tick",
                &format!(
                    "seq={} bid={} ask={}",
                    book.seq, book.best_bid, book.best_ask
                ),
            );
            if self.cfg.bookcheck_every > 0 && self.books.applied() % self.cfg.bookcheck_every == 0
            {
                self.recorder.bookcheck_line(
                    book.seq,
                    book.best_bid,
                    book.best_ask,
                    book.bid_size,
                    book.ask_size,
                );
            }

            self.resolve_adverse_samples(&book);

            for id in self.orders.expire_orders(now) {
                self.maker.cancel(id);
                self.dropped_ids.insert(id);
            }

            let trades: Vec<TradePrint> = self.tape.drain_up_to(now).to_vec();
            for t in &trades {
                self.pnl.skew_ms.push((now - t.ts_ms) as f64);
            }

            let maker_fills = self.maker.on_book(&book, now, &trades);
            for fill in maker_fills {
                self.apply_maker_fill(fill, &book, now)?;
            }

            self.drain_due_pending(&book, now)?;

            let features = compute_features(&book, self.last_trade.as_ref());
            let position = *self.risk.position();
            if let Some(action) = self.policy.decide(&features, &book, &position) {
                self.handle_action(action, &book, now)?;
            }

            if let Some(t) = trades.last() {
                self.last_trade = Some(t.clone());
            }
        }

        // End of feed: remaining pending actions match against the last
        // known book through the same path.
        let book = self.books.current().clone();
        let now = book.ts_ms;
        while let Some(p) = self.pending.pop() {
            self.process_pending(p, &book, now)?;
        }
        self.resolve_adverse_samples(&book);
        if !self.adv_pending.is_empty() {
            let n = self.adv_pending.len();
            if self.cfg.strict_shutdown {
                self.recorder
                    .event("fatal", &format!("{} adverse-selection samples unresolved", n));
                return Err(SimError::UnresolvedAdverseSamples(n).into());
            }
            warn!(unresolved = n, "adverse-selection samples left unresolved at shutdown");
        }
        Ok(())
    }

    /// Resolve deferred adverse-selection samples that have reached their
    /// horizon, back-annotating the corresponding fill rows.
    fn resolve_adverse_samples(&mut self, book: &Book) {
        let Some(mid) = book.mid_price() else {
            return;
        };
        while let Some(front) = self.adv_pending.front() {
            if front.target_ts > book.ts_ms {
                break;
            }
            let sample = self.adv_pending.pop_front().unwrap();
            let direction = match sample.side {
                Side::Buy => 1.0,
                _ => -1.0,
            };
            let adv_ticks = (mid - sample.mid_at_fill) * direction / self.cfg.rules.tick_size;
            self.rows[sample.row_index].adv_selection_ticks = Some(adv_ticks);
            self.pnl.adv_selection_ticks.push(adv_ticks);
        }
    }

    fn apply_maker_fill(&mut self, fill: Fill, book: &Book, now: Timestamp) -> Result<()> {
        let queue_time_ms = self
            .orders
            .get(fill.order_id)
            .map(|o| (now - o.created_ts) as f64)
            .unwrap_or(0.0);
        if let Err(e) = self.orders.apply_fill(&fill, now) {
            self.recorder.event("fatal", &e.to_string());
            error!(error = %e, "halting on maker fill fault");
            return Err(e.into());
        }
        self.pnl.queue_time_ms.push(queue_time_ms);
        self.adv_pending.push_back(AdvSample {
            mid_at_fill: book.mid_price().unwrap_or(fill.vwap_price),
            side: fill.side,
            row_index: self.rows.len(),
            target_ts: now + self.cfg.adv_horizon_ms,
        });
        self.account_fill(&fill, book, now, "maker_sim", queue_time_ms, false, None);
        Ok(())
    }

    fn drain_due_pending(&mut self, book: &Book, now: Timestamp) -> Result<()> {
        while let Some(top) = self.pending.peek() {
            if top.fill_ts > now {
                break;
            }
            let p = self.pending.pop().unwrap();
            self.process_pending(p, book, now)?;
        }
        Ok(())
    }

    fn process_pending(&mut self, p: PendingAction, book: &Book, now: Timestamp) -> Result<()> {
        // Stale entry for an order that died while queued.
        if self.dropped_ids.contains(&p.order_id) {
            return Ok(());
        }
        match self.orders.get(p.order_id) {
            Some(o) if !o.status.is_terminal() => {}
            _ => return Ok(()),
        }

        let mut fill = self.matching.simulate(&p.place, book);
        fill.order_id = p.order_id;
        if fill.is_filled() {
            if let Some(target) = p.target_notional {
                if target > 0.0 && fill.notional() > target * NOTIONAL_SANITY_FACTOR {
                    let err = SimError::NotionalSanity {
                        filled: fill.notional(),
                        target,
                    };
                    self.recorder.event("fatal", &err.to_string());
                    return Err(err.into());
                }
            }
            if let Err(e) = self.orders.apply_fill(&fill, now) {
                self.recorder.event("fatal", &e.to_string());
                return Err(e.into());
            }
            self.account_fill(&fill, book, now, "match", 0.0, p.crossing, p.target_notional);
        } else {
            self.orders.mark_rejected(p.order_id, now);
            self.dropped_ids.insert(p.order_id);
            self.reject_row(
                fill.reason.unwrap_or(RejectReason::NoLiquidity),
                fill.side,
                "match",
                book,
                now,
            );
        }
        Ok(())
    }

    fn handle_action(&mut self, action: Action, book: &Book, now: Timestamp) -> Result<()> {
        match action {
            Action::Place(place) => {
                let norm = match self.rules.normalize(&place, book) {
                    Ok(n) => n,
                    Err(reason) => {
                        self.reject_row(reason, place.side, "rules", book, now);
                        return Ok(());
                    }
                };
                let last_price = book.mid_price().unwrap_or(if norm.limit_price > 0.0 {
                    norm.limit_price
                } else {
                    book.best_ask.max(book.best_bid)
                });
                if !self.risk.validate(&norm, last_price) {
                    self.reject_row(RejectReason::RiskLimit, norm.side, "risk", book, now);
                    return Ok(());
                }
                let order = self.orders.place(&norm, now, self.expire_ts(now));
                self.route(norm, order.id, book, now);
            }
            Action::Cancel(c) => {
                let res = self.orders.cancel(c.target_order_id, now);
                self.maker.cancel(c.target_order_id);
                self.dropped_ids.insert(c.target_order_id);
                self.recorder.event(
                    "cancel",
                    &format!("id={} success={} {}", c.target_order_id, res.success, res.message),
                );
            }
            Action::Replace(r) => {
                let was_resting = self.maker.cancel(r.target_order_id);
                let res = self.orders.replace(
                    r.target_order_id,
                    r.new_price,
                    r.new_qty,
                    now,
                    self.expire_ts(now),
                );
                self.recorder.event(
                    "replace",
                    &format!("id={} success={} {}", r.target_order_id, res.success, res.message),
                );
                if res.success {
                    self.dropped_ids.insert(r.target_order_id);
                }
                if let Some(new_order) = res.new_order {
                    let place = PlaceOrder {
                        side: new_order.side,
                        order_type: new_order.order_type,
                        size: new_order.qty,
                        limit_price: new_order.price,
                        is_maker: was_resting,
                        post_only: new_order.post_only,
                        reduce_only: new_order.reduce_only,
                        target_notional: None,
                    };
                    self.route(place, new_order.id, book, now);
                }
            }
        }
        Ok(())
    }

    /// Maker intents rest in the queue sim; everything else (and any
    /// crossing limit) goes through the latency path to the matcher.
    fn route(&mut self, place: PlaceOrder, order_id: OrderId, book: &Book, now: Timestamp) {
        let crossing = place.is_crossing(book);
        if place.is_maker && !crossing {
            self.maker.submit(order_id, &place, book, now);
            self.pnl.maker_orders_submitted += 1;
            self.recorder.event(
                "maker_submit",
                &format!("id={} side={} px={} qty={}", order_id, place.side.label(), place.limit_price, place.size),
            );
            return;
        }
        let mut place = place;
        place.is_maker = false;
        let latency_ms = deterministic_latency_ms(
            &self.cfg.symbol,
            book.seq.max(0) as u64,
            self.action_idx,
            &self.cfg.latency,
        );
        self.action_idx += 1;
        self.pnl.latency_ms.push(latency_ms);
        let target_notional = place.target_notional;
        self.submit_seq += 1;
        self.pending.push(PendingAction {
            place,
            order_id,
            fill_ts: now + latency_ms as Timestamp,
            submit_seq: self.submit_seq,
            crossing,
            target_notional,
        });
    }

    fn account_fill(
        &mut self,
        fill: &Fill,
        book: &Book,
        now: Timestamp,
        src: &'static str,
        queue_time_ms: f64,
        crossing: bool,
        target_notional: Option<f64>,
    ) {
        let mark = book.mid_price().unwrap_or(fill.vwap_price);
        let prev_realized = self.risk.position().realized_pnl;
        let prev_mark = self.risk.position().mark_pnl(mark);
        self.risk.update(fill);
        let new_mark = self.risk.position().mark_pnl(mark);
        let gross_delta = new_mark - prev_mark;
        let realized_delta = self.risk.position().realized_pnl - prev_realized;
        let fee = self.fees.compute(fill);
        let net_delta = gross_delta - fee.fee;

        let tick = self.cfg.rules.tick_size;
        let mid = book.mid_price().unwrap_or(0.0);
        let (spread_paid_ticks, exec_cost_ticks) = if mid > 0.0 && tick > 0.0 {
            (
                (fill.vwap_price - mid).abs() / tick,
                match fill.side {
                    Side::Buy => (fill.vwap_price - mid) / tick,
                    _ => (mid - fill.vwap_price) / tick,
                },
            )
        } else {
            (0.0, 0.0)
        };

        self.pnl.record_fill(
            now,
            fill.liquidity,
            gross_delta,
            realized_delta,
            fee.fee,
            fee.fee_bps,
            exec_cost_ticks,
            fill.notional(),
            mark,
        );
        if let Some(target) = target_notional {
            if target > 0.0 {
                self.pnl.filled_to_target.push(fill.notional() / target);
            }
        }

        self.rows.push(FillRow {
            order_id: fill.order_id,
            ts_ms: now,
            seq: book.seq,
            status: "filled",
            side: fill.side.label(),
            liquidity: fill.liquidity.label(),
            src,
            reason: "",
            vwap: fill.vwap_price,
            filled_qty: fill.filled_qty,
            unfilled_qty: fill.unfilled_qty,
            fee: fee.fee,
            fee_bps: fee.fee_bps,
            gross: gross_delta,
            net: net_delta,
            exec_cost_ticks_signed: exec_cost_ticks,
            mid,
            best: self.opposing_best(fill.side, book),
            spread_paid_ticks,
            slip_ticks: fill.slippage_ticks,
            target_notional: target_notional.unwrap_or(0.0),
            filled_notional: fill.notional(),
            crossing,
            levels_crossed: fill.levels_crossed,
            adv_ticks: match fill.liquidity {
                market_types::Liquidity::Maker => self.cfg.maker.adv_ticks,
                _ => 0.0,
            },
            queue_time_ms,
            adv_selection_ticks: None,
        });
        self.recorder.event(
            "fill",
            &format!(
                "id={} side={} liq={} vwap={} qty={} net={}",
                fill.order_id,
                fill.side.label(),
                fill.liquidity.label(),
                fill.vwap_price,
                fill.filled_qty,
                net_delta
            ),
        );
    }

    fn reject_row(
        &mut self,
        reason: RejectReason,
        side: Side,
        src: &'static str,
        book: &Book,
        now: Timestamp,
    ) {
        self.pnl.record_reject(reason.as_str());
        self.rows.push(FillRow::reject(
            now,
            book.seq,
            side.label(),
            src,
            reason.as_str(),
            book.mid_price().unwrap_or(0.0),
            self.opposing_best(side, book),
        ));
        self.recorder.event(
            "reject",
            &format!("side={} src={} reason={}", side.label(), src, reason.as_str()),
        );
    }

    fn opposing_best(&self, side: Side, book: &Book) -> f64 {
        match side {
            Side::Buy => book.best_ask,
            Side::Sell => book.best_bid,
            Side::Hold => 0.0,
        }
    }

    fn expire_ts(&self, now: Timestamp) -> Timestamp {
        if self.cfg.order_ttl_ms > 0 {
            now + self.cfg.order_ttl_ms
        } else {
            0
        }
    }
}
