//! Order lifecycle management.
//!
//! Owns the id-keyed order map and is the only writer of order state.
//! `apply_fill` is the single write path for Partial/Filled transitions;
//! any illegal fill latches a fatal error that invalidates the run.

use std::collections::BTreeMap;

use market_types::{
    Fill, Order, OrderId, OrderStatus, PlaceOrder, Price, Quantity, Timestamp, QTY_EPS,
};
use serde::Serialize;
use tracing::debug;

use crate::error::{SimError, SimResult};

#[derive(Debug, Clone, Default, Serialize)]
pub struct OrderCounters {
    pub placed: u64,
    pub cancelled: u64,
    pub cancel_noop: u64,
    pub rejected: u64,
    pub replaced: u64,
    pub replace_noop: u64,
    pub expired: u64,
    pub illegal_transitions: u64,
    pub open_orders_peak: u64,
    pub total_lifetime_ms: f64,
    pub lifetime_samples: u64,
}

impl OrderCounters {
    pub fn avg_lifetime_ms(&self) -> f64 {
        if self.lifetime_samples == 0 {
            0.0
        } else {
            self.total_lifetime_ms / self.lifetime_samples as f64
        }
    }
}

#[derive(Debug, Clone)]
pub struct CancelResult {
    pub success: bool,
    pub message: &'static str,
}

#[derive(Debug, Clone)]
pub struct ReplaceResult {
    pub success: bool,
    pub new_order: Option<Order>,
    pub message: &'static str,
}

pub struct OrderManager {
    // Ordered by id so expiry sweeps are reproducible run to run.
    orders: BTreeMap<OrderId, Order>,
    next_order_id: OrderId,
    counters: OrderCounters,
    /// First fatal fault observed; sticky for the rest of the run.
    error: Option<SimError>,
}

impl OrderManager {
    pub fn new() -> Self {
        Self {
            orders: BTreeMap::new(),
            next_order_id: 1,
            counters: OrderCounters::default(),
            error: None,
        }
    }

    pub fn place(&mut self, place: &PlaceOrder, now_ts: Timestamp, expire_ts: Timestamp) -> Order {
        let order = Order {
            id: self.next_order_id,
            side: place.side,
            order_type: place.order_type,
            price: place.limit_price,
            qty: place.size,
            filled_qty: 0.0,
            avg_fill_price: 0.0,
            status: OrderStatus::New,
            created_ts: now_ts,
            last_update_ts: now_ts,
            expire_ts,
            replaced_from: None,
            replaced_by: None,
            post_only: place.post_only,
            reduce_only: place.reduce_only,
        };
        self.next_order_id += 1;
        self.orders.insert(order.id, order.clone());
        self.counters.placed += 1;
        self.update_open_peak();
        order
    }

    pub fn cancel(&mut self, id: OrderId, now_ts: Timestamp) -> CancelResult {
        let Some(ord) = self.orders.get_mut(&id) else {
            self.counters.cancel_noop += 1;
            return CancelResult {
                success: false,
                message: "order not found",
            };
        };
        if ord.status.is_terminal() {
            self.counters.cancel_noop += 1;
            return CancelResult {
                success: false,
                message: "order already terminal",
            };
        }
        ord.status = OrderStatus::Cancelled;
        ord.last_update_ts = now_ts;
        let lifetime = (now_ts - ord.created_ts) as f64;
        self.counters.cancelled += 1;
        self.record_lifetime(lifetime);
        CancelResult {
            success: true,
            message: "",
        }
    }

    /// Retire the old order as Replaced and synthesize its successor,
    /// carrying over the old price/remaining when the new values are unset.
    pub fn replace(
        &mut self,
        id: OrderId,
        new_price: Price,
        new_qty: Quantity,
        now_ts: Timestamp,
        expire_ts: Timestamp,
    ) -> ReplaceResult {
        let Some(ord) = self.orders.get_mut(&id) else {
            self.counters.replace_noop += 1;
            return ReplaceResult {
                success: false,
                new_order: None,
                message: "order not found",
            };
        };
        if ord.status.is_terminal() {
            self.counters.replace_noop += 1;
            return ReplaceResult {
                success: false,
                new_order: None,
                message: "order already terminal",
            };
        }
        ord.status = OrderStatus::Replaced;
        ord.last_update_ts = now_ts;
        let lifetime = (now_ts - ord.created_ts) as f64;
        let successor = PlaceOrder {
            side: ord.side,
            order_type: ord.order_type,
            size: if new_qty > 0.0 { new_qty } else { ord.remaining() },
            limit_price: if new_price > 0.0 { new_price } else { ord.price },
            is_maker: false,
            post_only: ord.post_only,
            reduce_only: ord.reduce_only,
            target_notional: None,
        };
        self.counters.replaced += 1;
        self.record_lifetime(lifetime);

        let mut new_order = self.place(&successor, now_ts, expire_ts);
        new_order.replaced_from = Some(id);
        self.orders.get_mut(&new_order.id).unwrap().replaced_from = Some(id);
        self.orders.get_mut(&id).unwrap().replaced_by = Some(new_order.id);
        ReplaceResult {
            success: true,
            new_order: Some(new_order),
            message: "",
        }
    }

    /// Apply a fill to its order. Unknown orders, terminal orders, side
    /// disagreement and overfills are fatal faults.
    pub fn apply_fill(&mut self, fill: &Fill, now_ts: Timestamp) -> SimResult<()> {
        let Some(ord) = self.orders.get_mut(&fill.order_id) else {
            return self.latch(SimError::UnknownOrder(fill.order_id));
        };
        if ord.status.is_terminal() {
            let err = SimError::FillOnTerminal {
                id: ord.id,
                status: ord.status,
            };
            self.counters.illegal_transitions += 1;
            return self.latch(err);
        }
        if fill.side != ord.side {
            self.counters.illegal_transitions += 1;
            let id = ord.id;
            return self.latch(SimError::SideMismatch(id));
        }
        let prev_filled = ord.filled_qty;
        let new_filled = prev_filled + fill.filled_qty;
        if new_filled > ord.qty + 1e-6 {
            self.counters.illegal_transitions += 1;
            let err = SimError::Overfill {
                id: ord.id,
                filled: new_filled,
                qty: ord.qty,
            };
            return self.latch(err);
        }

        ord.filled_qty = new_filled;
        if new_filled > 0.0 {
            // Running weighted mean across partial fills.
            ord.avg_fill_price =
                (ord.avg_fill_price * prev_filled + fill.vwap_price * fill.filled_qty) / new_filled;
        }
        ord.last_update_ts = now_ts;
        if new_filled + QTY_EPS >= ord.qty {
            ord.status = OrderStatus::Filled;
            let lifetime = (now_ts - ord.created_ts) as f64;
            self.record_lifetime(lifetime);
        } else {
            ord.status = OrderStatus::Partial;
        }
        Ok(())
    }

    pub fn mark_rejected(&mut self, id: OrderId, now_ts: Timestamp) {
        let Some(ord) = self.orders.get_mut(&id) else {
            return;
        };
        if ord.status.is_open() {
            ord.status = OrderStatus::Rejected;
            ord.last_update_ts = now_ts;
            let lifetime = (now_ts - ord.created_ts) as f64;
            self.counters.rejected += 1;
            self.record_lifetime(lifetime);
        }
    }

    /// Expire every open order whose TTL has elapsed; returns the ids that
    /// transitioned so the caller can reconcile other components.
    pub fn expire_orders(&mut self, now_ts: Timestamp) -> Vec<OrderId> {
        let mut expired = Vec::new();
        let mut lifetimes = 0.0;
        for ord in self.orders.values_mut() {
            if ord.status.is_open() && ord.expire_ts > 0 && now_ts >= ord.expire_ts {
                ord.status = OrderStatus::Expired;
                ord.last_update_ts = now_ts;
                lifetimes += (now_ts - ord.created_ts) as f64;
                expired.push(ord.id);
            }
        }
        if !expired.is_empty() {
            debug!(count = expired.len(), now_ts, "orders expired");
            self.counters.expired += expired.len() as u64;
            self.counters.lifetime_samples += expired.len() as u64;
            self.counters.total_lifetime_ms += lifetimes;
        }
        expired
    }

    pub fn get(&self, id: OrderId) -> Option<&Order> {
        self.orders.get(&id)
    }

    pub fn counters(&self) -> &OrderCounters {
        &self.counters
    }

    pub fn error(&self) -> Option<&SimError> {
        self.error.as_ref()
    }

    fn latch(&mut self, err: SimError) -> SimResult<()> {
        if self.error.is_none() {
            self.error = Some(err.clone());
        }
        Err(err)
    }

    fn record_lifetime(&mut self, lifetime_ms: f64) {
        self.counters.total_lifetime_ms += lifetime_ms;
        self.counters.lifetime_samples += 1;
    }

    fn update_open_peak(&mut self) {
        let open = self
            .orders
            .values()
            .filter(|o| o.status.is_open())
            .count() as u64;
        if open > self.counters.open_orders_peak {
            self.counters.open_orders_peak = open;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_types::{Liquidity, Side};

    fn manager() -> OrderManager {
        OrderManager::new()
    }

    fn buy(size: f64, price: f64) -> PlaceOrder {
        PlaceOrder::limit(Side::Buy, size, price)
    }

    fn fill_for(id: OrderId, side: Side, qty: f64, price: f64) -> Fill {
        let mut f = Fill::filled(side, price, qty, false, Liquidity::Taker);
        f.order_id = id;
        f
    }

    #[test]
    fn ids_are_monotonic_from_one() {
        let mut om = manager();
        let a = om.place(&buy(1.0, 100.0), 0, 0);
        let b = om.place(&buy(1.0, 100.0), 0, 0);
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert_eq!(om.counters().placed, 2);
        assert_eq!(om.counters().open_orders_peak, 2);
    }

    #[test]
    fn partial_then_full_fill_tracks_weighted_average() {
        let mut om = manager();
        let ord = om.place(&buy(10.0, 100.0), 0, 0);

        om.apply_fill(&fill_for(ord.id, Side::Buy, 4.0, 100.0), 1).unwrap();
        let o = om.get(ord.id).unwrap();
        assert_eq!(o.status, OrderStatus::Partial);
        assert!((o.filled_qty - 4.0).abs() < 1e-9);

        om.apply_fill(&fill_for(ord.id, Side::Buy, 6.0, 101.0), 2).unwrap();
        let o = om.get(ord.id).unwrap();
        assert_eq!(o.status, OrderStatus::Filled);
        // (4 * 100 + 6 * 101) / 10
        assert!((o.avg_fill_price - 100.6).abs() < 1e-9);
    }

    #[test]
    fn cancel_is_idempotent_noop_after_success() {
        let mut om = manager();
        let ord = om.place(&buy(1.0, 100.0), 0, 0);

        let first = om.cancel(ord.id, 5);
        assert!(first.success);
        let second = om.cancel(ord.id, 6);
        assert!(!second.success);
        assert_eq!(second.message, "order already terminal");
        assert_eq!(om.get(ord.id).unwrap().status, OrderStatus::Cancelled);
        assert_eq!(om.counters().cancelled, 1);
        assert_eq!(om.counters().cancel_noop, 1);
    }

    #[test]
    fn cancel_unknown_is_noop() {
        let mut om = manager();
        let res = om.cancel(42, 0);
        assert!(!res.success);
        assert_eq!(res.message, "order not found");
    }

    #[test]
    fn fill_on_terminal_order_is_fatal() {
        let mut om = manager();
        let ord = om.place(&buy(1.0, 100.0), 0, 0);
        om.cancel(ord.id, 1);

        let err = om.apply_fill(&fill_for(ord.id, Side::Buy, 1.0, 100.0), 2).unwrap_err();
        assert!(matches!(err, SimError::FillOnTerminal { .. }));
        assert!(om.error().is_some());
        assert_eq!(om.counters().illegal_transitions, 1);
    }

    #[test]
    fn unknown_order_fill_is_fatal() {
        let mut om = manager();
        let err = om.apply_fill(&fill_for(99, Side::Buy, 1.0, 100.0), 0).unwrap_err();
        assert!(matches!(err, SimError::UnknownOrder(99)));
    }

    #[test]
    fn side_mismatch_is_fatal() {
        let mut om = manager();
        let ord = om.place(&buy(1.0, 100.0), 0, 0);
        let err = om.apply_fill(&fill_for(ord.id, Side::Sell, 1.0, 100.0), 0).unwrap_err();
        assert!(matches!(err, SimError::SideMismatch(_)));
    }

    #[test]
    fn overfill_is_fatal() {
        let mut om = manager();
        let ord = om.place(&buy(1.0, 100.0), 0, 0);
        let err = om.apply_fill(&fill_for(ord.id, Side::Buy, 1.5, 100.0), 0).unwrap_err();
        assert!(matches!(err, SimError::Overfill { .. }));
        // The latch is sticky.
        assert!(om.error().is_some());
    }

    #[test]
    fn replace_links_old_and_new() {
        let mut om = manager();
        let ord = om.place(&buy(10.0, 100.0), 0, 0);
        om.apply_fill(&fill_for(ord.id, Side::Buy, 4.0, 100.0), 1).unwrap();

        let res = om.replace(ord.id, 0.0, 0.0, 2, 0);
        assert!(res.success);
        let new_order = res.new_order.unwrap();
        // Fallbacks: old price, remaining qty.
        assert_eq!(new_order.price, 100.0);
        assert!((new_order.qty - 6.0).abs() < 1e-9);
        assert_eq!(new_order.replaced_from, Some(ord.id));

        let old = om.get(ord.id).unwrap();
        assert_eq!(old.status, OrderStatus::Replaced);
        assert_eq!(old.replaced_by, Some(new_order.id));

        // Old order rejects further fills; new order fills normally.
        assert!(om.apply_fill(&fill_for(ord.id, Side::Buy, 1.0, 100.0), 3).is_err());
        assert!(om
            .apply_fill(&fill_for(new_order.id, Side::Buy, 6.0, 100.5), 3)
            .is_ok());
        assert_eq!(om.get(new_order.id).unwrap().status, OrderStatus::Filled);
    }

    #[test]
    fn replace_terminal_is_noop() {
        let mut om = manager();
        let ord = om.place(&buy(1.0, 100.0), 0, 0);
        om.cancel(ord.id, 1);
        let res = om.replace(ord.id, 101.0, 2.0, 2, 0);
        assert!(!res.success);
        assert!(res.new_order.is_none());
        assert_eq!(om.counters().replace_noop, 1);
    }

    #[test]
    fn expiry_honors_ttl_and_reports_ids() {
        let mut om = manager();
        let a = om.place(&buy(1.0, 100.0), 0, 10);
        let b = om.place(&buy(1.0, 100.0), 0, 20);
        let c = om.place(&buy(1.0, 100.0), 0, 0); // no TTL

        assert!(om.expire_orders(5).is_empty());
        let expired = om.expire_orders(10);
        assert_eq!(expired, vec![a.id]);
        assert_eq!(om.get(a.id).unwrap().status, OrderStatus::Expired);

        let expired = om.expire_orders(50);
        assert_eq!(expired, vec![b.id]);
        assert_eq!(om.get(c.id).unwrap().status, OrderStatus::New);
        assert_eq!(om.counters().expired, 2);
    }

    #[test]
    fn mark_rejected_only_touches_open_orders() {
        let mut om = manager();
        let ord = om.place(&buy(1.0, 100.0), 0, 0);
        om.mark_rejected(ord.id, 1);
        assert_eq!(om.get(ord.id).unwrap().status, OrderStatus::Rejected);

        // Already terminal: no double count.
        om.mark_rejected(ord.id, 2);
        assert_eq!(om.counters().rejected, 1);
    }
}
