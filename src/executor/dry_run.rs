use super::{Fill, OrderExecutor};
use crate::domain::{MarketSnapshot, Side};
use crate::error::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Paper-trading executor: fills immediately at `polymarketProb`, the
/// market's current quote, with a synthetic order id.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunExecutor;

impl DryRunExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl OrderExecutor for DryRunExecutor {
    async fn submit(&self, snapshot: &MarketSnapshot, _side: Side, _notional: Decimal) -> Result<Fill> {
        Ok(Fill {
            order_id: format!("dry-run-{}", uuid::Uuid::new_v4()),
            filled_price: snapshot.polymarket_prob,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BetType, CryptoClaim, Direction, Symbol};
    use rust_decimal_macros::dec;

    fn snapshot(prob: rust_decimal::Decimal) -> MarketSnapshot {
        MarketSnapshot {
            claim: CryptoClaim {
                market_id: "m1".into(),
                question: "q".into(),
                symbol: Symbol::Btc,
                target_price: dec!(100_000),
                expiry: chrono::Utc::now() + chrono::Duration::days(10),
                bet_type: BetType::Binary,
                direction: Direction::Above,
            },
            polymarket_prob: prob,
            yes_token_id: "yes".into(),
            no_token_id: "no".into(),
            volume_24h: dec!(0),
        }
    }

    #[tokio::test]
    async fn fills_immediately_at_polymarket_prob() {
        let executor = DryRunExecutor::new();
        let fill = executor
            .submit(&snapshot(dec!(0.42)), Side::Long, dec!(50))
            .await
            .unwrap();
        assert_eq!(fill.filled_price, dec!(0.42));
        assert!(fill.order_id.starts_with("dry-run-"));
    }
}
