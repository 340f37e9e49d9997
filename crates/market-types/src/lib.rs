//! Shared market data types used across all simulator components.
//!
//! Plain data only: the reconstructed book, book deltas, trade prints,
//! policy actions, order lifecycle state, fills and positions. Behavior
//! (reconstruction, matching, accounting) lives in `sim-engine`.

pub mod action;
pub mod fill;
pub mod order;
pub mod orderbook;
pub mod position;
pub mod trade;

pub use action::{Action, CancelOrder, OrderType, PlaceOrder, ReplaceOrder, Side};
pub use fill::{Fill, FillStatus, Liquidity, RejectReason};
pub use order::{Order, OrderStatus};
pub use orderbook::{Book, BookDelta, PriceLevel};
pub use position::Position;
pub use trade::TradePrint;

pub type Timestamp = i64; // Milliseconds since epoch
pub type Price = f64;
pub type Quantity = f64;
pub type Symbol = String;
pub type OrderId = u64;

/// Tolerance for price/quantity comparisons.
pub const QTY_EPS: f64 = 1e-9;
/// Tolerance for the end-of-run accounting identity.
pub const ACCOUNTING_EPS: f64 = 1e-6;
