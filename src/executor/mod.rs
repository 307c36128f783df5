//! Order Executor: the single capability the Trading State
//! Machine uses to turn a sized entry decision into a filled position.
//! Dry-run and live implementations share one contract so the state
//! machine never branches on which is active.

pub mod dry_run;
pub mod live;

pub use dry_run::DryRunExecutor;
pub use live::{AuthSession, LiveExecutor};

use crate::domain::{MarketSnapshot, Side};
use crate::error::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// A successfully submitted (and, for FOK orders, filled) order.
#[derive(Debug, Clone)]
pub struct Fill {
    pub order_id: String,
    pub filled_price: Decimal,
}

#[async_trait]
pub trait OrderExecutor: Send + Sync {
    /// Submit an order opening `side` on `snapshot`'s market for `notional`
    /// USD. Returns the fill on success; callers must not mutate `BotState`
    /// on error.
    async fn submit(&self, snapshot: &MarketSnapshot, side: Side, notional: Decimal) -> Result<Fill>;
}
