use super::claim::{BetType, Direction, Symbol};
use super::opportunity::Opportunity;
use crate::config::BotConfig;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// `short` if edge>0 (market overpriced), `long` if edge<0.
    pub fn from_edge(edge: Decimal) -> Self {
        if edge > Decimal::ZERO {
            Side::Short
        } else {
            Side::Long
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Open,
    Closed,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CloseReason {
    EdgeAligned,
    Expired,
    Manual,
}

/// A single trading position. Exactly one per `market_id` while
/// `status == Open`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub market_id: String,
    pub symbol: Symbol,
    pub target_price: Decimal,
    pub direction: Direction,
    pub bet_type: BetType,
    pub expiry: DateTime<Utc>,
    pub side: Side,
    pub entry_price: Decimal,
    pub notional: Decimal,
    pub shares: Decimal,
    pub entry_edge: Decimal,
    pub entry_timestamp: DateTime<Utc>,
    pub current_price: Decimal,
    pub current_edge: Decimal,
    pub unrealized_pnl: Decimal,
    pub status: PositionStatus,
    pub close_reason: Option<CloseReason>,
    pub close_price: Option<Decimal>,
    pub close_timestamp: Option<DateTime<Utc>>,
    pub realized_pnl: Option<Decimal>,
}

impl Position {
    /// `effective_price` = `entry_price` if long else `1 - entry_price`;
    /// `shares = notional / effective_price`.
    pub fn effective_price(entry_price: Decimal, side: Side) -> Decimal {
        match side {
            Side::Long => entry_price,
            Side::Short => Decimal::ONE - entry_price,
        }
    }

    pub fn open(
        market_id: String,
        symbol: Symbol,
        target_price: Decimal,
        direction: Direction,
        bet_type: BetType,
        expiry: DateTime<Utc>,
        side: Side,
        entry_price: Decimal,
        notional: Decimal,
        entry_edge: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        let effective = Self::effective_price(entry_price, side);
        let shares = if effective > Decimal::ZERO {
            notional / effective
        } else {
            Decimal::ZERO
        };
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            market_id,
            symbol,
            target_price,
            direction,
            bet_type,
            expiry,
            side,
            entry_price,
            notional,
            shares,
            entry_edge,
            entry_timestamp: now,
            current_price: entry_price,
            current_edge: entry_edge,
            unrealized_pnl: Decimal::ZERO,
            status: PositionStatus::Open,
            close_reason: None,
            close_price: None,
            close_timestamp: None,
            realized_pnl: None,
        }
    }

    /// Refresh from a matching opportunity (cycle step "Refresh").
    pub fn refresh(&mut self, polymarket_prob: Decimal, edge: Decimal) {
        self.current_price = polymarket_prob;
        self.current_edge = edge;
        self.unrealized_pnl = self.pnl_at(polymarket_prob);
    }

    fn pnl_at(&self, price: Decimal) -> Decimal {
        match self.side {
            Side::Long => self.shares * (price - self.entry_price),
            Side::Short => self.shares * (self.entry_price - price),
        }
    }

    /// Close the position at `close_price`; a close must happen at most
    /// once.
    pub fn close(&mut self, close_price: Decimal, reason: CloseReason, now: DateTime<Utc>) -> Decimal {
        debug_assert_eq!(self.status, PositionStatus::Open, "position closed twice");
        let pnl = self.pnl_at(close_price);
        self.current_price = close_price;
        self.status = if reason == CloseReason::Expired {
            PositionStatus::Expired
        } else {
            PositionStatus::Closed
        };
        self.close_reason = Some(reason);
        self.close_price = Some(close_price);
        self.close_timestamp = Some(now);
        self.realized_pnl = Some(pnl);
        pnl
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Open,
    Close,
}

/// Append-only trade log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub position_id: String,
    pub market_id: String,
    pub timestamp: DateTime<Utc>,
    pub action: TradeAction,
    pub side: Side,
    pub price: Decimal,
    pub notional: Decimal,
    pub shares: Decimal,
    pub edge: Decimal,
    pub zscore_prob: Decimal,
    pub delta_prob: Option<Decimal>,
    pub spot_at_trade: Decimal,
    pub pnl: Option<Decimal>,
}

/// The full persisted trading state. Sole mutator: the Trading
/// State Machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotState {
    pub starting_balance: Decimal,
    pub current_balance: Decimal,
    pub total_realized_pnl: Decimal,
    pub open_positions: HashMap<String, Position>,
    pub closed_positions: Vec<Position>,
    pub trades: Vec<Trade>,
    pub is_running: bool,
    pub last_update: DateTime<Utc>,
    pub last_error: Option<String>,
    pub win_count: u64,
    pub loss_count: u64,
    pub config: BotConfig,
}

impl BotState {
    pub fn new(config: BotConfig, now: DateTime<Utc>) -> Self {
        Self {
            starting_balance: config.starting_balance,
            current_balance: config.starting_balance,
            total_realized_pnl: Decimal::ZERO,
            open_positions: HashMap::new(),
            closed_positions: Vec::new(),
            trades: Vec::new(),
            is_running: true,
            last_update: now,
            last_error: None,
            win_count: 0,
            loss_count: 0,
            config,
        }
    }

    pub fn total_open_notional(&self) -> Decimal {
        self.open_positions.values().map(|p| p.notional).sum()
    }

    /// Balance invariant: `currentBalance + Σ notional(open)
    /// = startingBalance + totalRealizedPnl`.
    pub fn balance_invariant_holds(&self, tolerance: Decimal) -> bool {
        let lhs = self.current_balance + self.total_open_notional();
        let rhs = self.starting_balance + self.total_realized_pnl;
        (lhs - rhs).abs() <= tolerance
    }

    /// Invariant 6: no two open positions share a market id. Always true
    /// for a `HashMap` keyed by `market_id`; kept as an explicit check for
    /// state loaded from disk (defense against a hand-edited file).
    pub fn no_duplicate_market_ids(&self) -> bool {
        let ids: HashSet<&str> = self
            .open_positions
            .values()
            .map(|p| p.market_id.as_str())
            .collect();
        ids.len() == self.open_positions.len()
    }

    pub fn record_open(&mut self, position: Position, trade: Trade) {
        self.current_balance -= position.notional;
        self.open_positions.insert(position.market_id.clone(), position);
        self.trades.push(trade);
    }

    /// Records a close: credits balance by `notional + pnl`, updates
    /// aggregates, moves the position from open to closed.
    pub fn record_close(&mut self, market_id: &str, mut position: Position, pnl: Decimal, trade: Trade) {
        self.current_balance += position.notional + pnl;
        self.total_realized_pnl += pnl;
        if pnl >= Decimal::ZERO {
            self.win_count += 1;
        } else {
            self.loss_count += 1;
        }
        self.open_positions.remove(market_id);
        position.realized_pnl = Some(pnl);
        self.closed_positions.push(position);
        self.trades.push(trade);
    }

    pub fn win_rate(&self) -> f64 {
        let total = self.win_count + self.loss_count;
        if total == 0 {
            0.0
        } else {
            self.win_count as f64 / total as f64
        }
    }
}

/// Convenience constructor for an "open" trade record from a freshly
/// opened position and the opportunity that produced it.
pub fn open_trade(position: &Position, opportunity: &Opportunity, spot: Decimal, now: DateTime<Utc>) -> Trade {
    Trade {
        id: uuid::Uuid::new_v4().to_string(),
        position_id: position.id.clone(),
        market_id: position.market_id.clone(),
        timestamp: now,
        action: TradeAction::Open,
        side: position.side,
        price: position.entry_price,
        notional: position.notional,
        shares: position.shares,
        edge: position.entry_edge,
        zscore_prob: opportunity.zscore_estimate.probability,
        delta_prob: opportunity.delta_estimate.as_ref().map(|e| e.probability),
        spot_at_trade: spot,
        pnl: None,
    }
}

pub fn close_trade(position: &Position, pnl: Decimal, now: DateTime<Utc>) -> Trade {
    Trade {
        id: uuid::Uuid::new_v4().to_string(),
        position_id: position.id.clone(),
        market_id: position.market_id.clone(),
        timestamp: now,
        action: TradeAction::Close,
        side: position.side,
        price: position.current_price,
        notional: position.notional,
        shares: position.shares,
        edge: position.current_edge,
        zscore_prob: Decimal::ZERO,
        delta_prob: None,
        spot_at_trade: Decimal::ZERO,
        pnl: Some(pnl),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn cfg() -> BotConfig {
        crate::config::RuntimeConfig::default_config(true).bot
    }

    #[test]
    fn shares_computed_from_effective_price_for_short() {
        let now = Utc::now();
        let pos = Position::open(
            "m1".into(),
            Symbol::Btc,
            dec!(120_000),
            Direction::Above,
            BetType::OneTouch,
            now + chrono::Duration::days(30),
            Side::Short,
            dec!(0.40),
            dec!(75),
            dec!(0.10),
            now,
        );
        // shares = 75 / (1 - 0.40) = 125
        assert_eq!(pos.shares, dec!(125));
    }

    #[test]
    fn close_long_position_pnl_matches_scenario_s6() {
        let now = Utc::now();
        let mut pos = Position::open(
            "m1".into(),
            Symbol::Btc,
            dec!(120_000),
            Direction::Above,
            BetType::OneTouch,
            now + chrono::Duration::days(30),
            Side::Short,
            dec!(0.40),
            dec!(75),
            dec!(0.10),
            now,
        );
        let pnl = pos.close(dec!(0.32), CloseReason::EdgeAligned, now);
        assert_eq!(pnl, dec!(10.00));
        assert_eq!(pos.status, PositionStatus::Closed);
    }

    #[test]
    fn bot_state_balance_invariant_holds_after_open_and_close() {
        let now = Utc::now();
        let mut state = BotState::new(cfg(), now);
        state.config.starting_balance = dec!(1000);
        state.starting_balance = dec!(1000);
        state.current_balance = dec!(1000);

        let mut pos = Position::open(
            "m1".into(),
            Symbol::Btc,
            dec!(120_000),
            Direction::Above,
            BetType::OneTouch,
            now + chrono::Duration::days(30),
            Side::Short,
            dec!(0.40),
            dec!(75),
            dec!(0.10),
            now,
        );
        let open_tr = Trade {
            id: "t1".into(),
            position_id: pos.id.clone(),
            market_id: "m1".into(),
            timestamp: now,
            action: TradeAction::Open,
            side: Side::Short,
            price: dec!(0.40),
            notional: dec!(75),
            shares: pos.shares,
            edge: dec!(0.10),
            zscore_prob: dec!(0.30),
            delta_prob: None,
            spot_at_trade: dec!(100_000),
            pnl: None,
        };
        state.record_open(pos.clone(), open_tr);
        assert!(state.balance_invariant_holds(dec!(0.000001)));

        let pnl = pos.close(dec!(0.32), CloseReason::EdgeAligned, now);
        let close_tr = close_trade(&pos, pnl, now);
        state.record_close("m1", pos, pnl, close_tr);

        assert_eq!(state.current_balance, dec!(1010));
        assert_eq!(state.total_realized_pnl, dec!(10));
        assert_eq!(state.win_count, 1);
        assert!(state.balance_invariant_holds(dec!(0.000001)));
        assert!(state.no_duplicate_market_ids());
    }
}
