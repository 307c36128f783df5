//! Trading State Machine: the sole mutator of `BotState`. One
//! non-overlapping cycle per tick — a cycle that outruns the poll interval
//! causes the next tick to be dropped, not queued, following the corpus's
//! general in-flight-guard pattern for its periodic components.

use crate::config::BotConfig;
use crate::domain::{
    close_trade, open_trade, BetType, BotState, CloseReason, Direction, Opportunity, Side,
};
use crate::error::{BotError, Result};
use crate::executor::{Fill, OrderExecutor};
use crate::persistence::PersistenceStore;
use crate::pipeline::OpportunityPipeline;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

const OPPORTUNITY_LIMIT: u32 = 50;
const RESOLVED_LOWER: Decimal = dec!(0.01);
const RESOLVED_UPPER: Decimal = dec!(0.99);
const AGREEMENT_HIGH: f64 = 0.90;
const AGREEMENT_LOW: f64 = 0.10;

/// Diagnostic outcome of one cycle, used by
/// the `status` CLI subcommand and by tests without reaching into private
/// fields.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle_started_at: DateTime<Utc>,
    pub opportunities_seen: usize,
    pub positions_opened: usize,
    pub positions_closed: usize,
    pub error: Option<String>,
    /// Set when the pipeline failed with `BotError::RateLimited`; `run`
    /// doubles the next tick's effective delay in response (backpressure).
    pub rate_limited: bool,
}

pub struct TradingStateMachine {
    pipeline: OpportunityPipeline,
    store: PersistenceStore,
    executor: Arc<dyn OrderExecutor>,
    config: BotConfig,
}

impl TradingStateMachine {
    pub fn new(
        pipeline: OpportunityPipeline,
        store: PersistenceStore,
        executor: Arc<dyn OrderExecutor>,
        config: BotConfig,
    ) -> Self {
        Self {
            pipeline,
            store,
            executor,
            config,
        }
    }

    /// Run the tick loop until `shutdown` fires. Loads state once up
    /// front; persists after every cycle and once more on shutdown. A
    /// rate-limited spot-price fetch doubles the wait before the next
    /// cycle, for that one cycle only: the following tick is consumed
    /// without running a cycle, which (at a fixed `pollInterval` tick
    /// period) doubles the effective delay before the next real cycle.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) -> Result<()> {
        let mut state = self.store.load(&self.config, Utc::now()).await?;

        let mut interval = tokio::time::interval(std::time::Duration::from_secs(self.config.poll_interval_secs));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut skip_next_tick = false;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if skip_next_tick {
                        skip_next_tick = false;
                        continue;
                    }
                    let report = self.run_cycle(&mut state, Utc::now()).await;
                    if let Some(err) = &report.error {
                        warn!(error = %err, "cycle completed with error");
                    } else {
                        info!(
                            opportunities = report.opportunities_seen,
                            opened = report.positions_opened,
                            closed = report.positions_closed,
                            "cycle complete"
                        );
                    }
                    if report.rate_limited {
                        warn!("upstream rate-limited, doubling poll interval for the next cycle");
                        skip_next_tick = true;
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        state.is_running = false;
                        self.store.save(&state).await?;
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Load state, run exactly one cycle, persist, and return the report.
    /// Used by the `once` CLI subcommand as a standalone smoke test.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<CycleReport> {
        let mut state = self.store.load(&self.config, now).await?;
        let report = self.run_cycle(&mut state, now).await;
        self.store.save(&state).await?;
        Ok(report)
    }

    /// Execute exactly one cycle. Exposed directly so tests can drive the
    /// state machine without a live tick loop.
    pub async fn run_cycle(&self, state: &mut BotState, now: DateTime<Utc>) -> CycleReport {
        let mut report = CycleReport {
            cycle_started_at: now,
            opportunities_seen: 0,
            positions_opened: 0,
            positions_closed: 0,
            error: None,
            rate_limited: false,
        };

        let opportunities = match self.pipeline.opportunities(OPPORTUNITY_LIMIT, now).await {
            Ok(o) => o,
            Err(e) => {
                report.rate_limited = matches!(e, BotError::RateLimited(_));
                state.last_error = Some(e.to_string());
                state.last_update = now;
                if let Err(persist_err) = self.store.save(state).await {
                    warn!(error = %persist_err, "failed to persist after pipeline error");
                }
                report.error = Some(e.to_string());
                return report;
            }
        };
        report.opportunities_seen = opportunities.len();

        if opportunities.is_empty() {
            state.last_update = now;
            if let Err(e) = self.store.save(state).await {
                report.error = Some(e.to_string());
            }
            return report;
        }

        let by_market: HashMap<&str, &Opportunity> = opportunities
            .iter()
            .map(|o| (o.snapshot.claim.market_id.as_str(), o))
            .collect();

        self.refresh_positions(state, &by_market);
        report.positions_closed = self.exit_phase(state, &by_market, now);
        report.positions_opened = self.entry_phase(state, &opportunities, now).await;

        state.last_update = now;
        state.last_error = None;
        if let Err(e) = self.store.save(state).await {
            report.error = Some(e.to_string());
        }
        report
    }

    fn refresh_positions(&self, state: &mut BotState, by_market: &HashMap<&str, &Opportunity>) {
        for position in state.open_positions.values_mut() {
            if let Some(opp) = by_market.get(position.market_id.as_str()) {
                position.refresh(opp.snapshot.polymarket_prob, opp.effective_edge());
            }
        }
    }

    fn exit_phase(&self, state: &mut BotState, by_market: &HashMap<&str, &Opportunity>, now: DateTime<Utc>) -> usize {
        let mut market_ids: Vec<String> = state.open_positions.keys().cloned().collect();
        market_ids.sort();

        let mut closed = 0;
        for market_id in market_ids {
            let Some(position) = state.open_positions.get(&market_id) else {
                continue;
            };

            let decision = match by_market.get(market_id.as_str()) {
                None if position.expiry <= now => Some((CloseReason::Expired, position.current_price)),
                None => None,
                Some(opp) => {
                    let edge = position.current_edge;
                    if edge.abs() < self.config.max_edge_to_exit {
                        Some((CloseReason::EdgeAligned, opp.snapshot.polymarket_prob))
                    } else if Side::from_edge(edge) != position.side && edge.abs() >= self.config.min_edge_to_enter {
                        Some((CloseReason::EdgeAligned, opp.snapshot.polymarket_prob))
                    } else {
                        None
                    }
                }
            };

            if let Some((reason, close_price)) = decision {
                let mut position = state
                    .open_positions
                    .remove(&market_id)
                    .expect("market_id taken from this map's own keys");
                let pnl = position.close(close_price, reason, now);
                let trade = close_trade(&position, pnl, now);
                state.record_close(&market_id, position, pnl, trade);
                closed += 1;
            }
        }
        closed
    }

    async fn entry_phase(&self, state: &mut BotState, opportunities: &[Opportunity], now: DateTime<Utc>) -> usize {
        let mut ranked: Vec<&Opportunity> = opportunities.iter().collect();
        ranked.sort_by(|a, b| b.ranking_edge().cmp(&a.ranking_edge()));

        let mut opened = 0;
        for opp in ranked {
            if !self.passes_entry_gates(state, opp, now) {
                continue;
            }

            let remaining_exposure = self.config.max_total_exposure - state.total_open_notional();
            if remaining_exposure <= Decimal::ZERO {
                continue;
            }

            let effective_edge = opp.effective_edge();
            let scaled = self.config.base_position_size + effective_edge.abs() * self.config.edge_multiplier;
            let size = scaled
                .min(self.config.max_position_size)
                .min(remaining_exposure)
                .round_dp(2);

            if size <= Decimal::ZERO || size > state.current_balance {
                continue;
            }

            let side = Side::from_edge(effective_edge);
            match self.executor.submit(&opp.snapshot, side, size).await {
                Ok(Fill { filled_price, .. }) => {
                    let position = crate::domain::Position::open(
                        opp.snapshot.claim.market_id.clone(),
                        opp.snapshot.claim.symbol,
                        opp.snapshot.claim.target_price,
                        opp.snapshot.claim.direction,
                        opp.snapshot.claim.bet_type,
                        opp.snapshot.claim.expiry,
                        side,
                        filled_price,
                        size,
                        effective_edge,
                        now,
                    );
                    let trade = open_trade(&position, opp, opp.spot.price, now);
                    state.record_open(position, trade);
                    opened += 1;
                }
                Err(e) => {
                    warn!(market_id = %opp.snapshot.claim.market_id, error = %e, "order submission failed, skipping");
                }
            }
        }
        opened
    }

    fn passes_entry_gates(&self, state: &BotState, opp: &Opportunity, now: DateTime<Utc>) -> bool {
        let prob = opp.snapshot.polymarket_prob;
        if prob <= RESOLVED_LOWER || prob >= RESOLVED_UPPER {
            return false;
        }

        if opp.snapshot.claim.bet_type == BetType::OneTouch {
            let spot = opp.spot.price;
            let target = opp.snapshot.claim.target_price;
            let already_happened = match opp.snapshot.claim.direction {
                Direction::Below => spot <= target,
                Direction::Above => spot >= target,
            };
            if already_happened {
                return false;
            }
        }

        let model_prob = opp
            .delta_estimate
            .as_ref()
            .map(|e| e.probability)
            .unwrap_or(opp.zscore_estimate.probability);
        let polymarket_prob_f = prob.to_f64().unwrap_or(0.5);
        let both_high = model_prob > AGREEMENT_HIGH && polymarket_prob_f > AGREEMENT_HIGH;
        let both_low = model_prob < AGREEMENT_LOW && polymarket_prob_f < AGREEMENT_LOW;
        if both_high || both_low {
            return false;
        }

        if opp.effective_edge().abs() < self.config.min_edge_to_enter {
            return false;
        }

        if opp.snapshot.claim.days_to_expiry(now) < self.config.min_time_to_expiry_days {
            return false;
        }

        if state.open_positions.contains_key(&opp.snapshot.claim.market_id) {
            return false;
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::domain::{
        BetType, CryptoClaim, Direction, MarketSnapshot, ProbabilityEstimate, ProbabilityMethod, Signal,
        Confidence, SpotPrice, Symbol,
    };
    use crate::providers::{GammaMarket, OrderBook, PredictionMarketProvider, SpotPriceProvider, VolatilityProvider};
    use async_trait::async_trait;

    struct StubExecutor;

    #[async_trait]
    impl OrderExecutor for StubExecutor {
        async fn submit(&self, snapshot: &MarketSnapshot, _side: Side, notional: Decimal) -> Result<Fill> {
            let _ = notional;
            Ok(Fill {
                order_id: "stub-1".to_string(),
                filled_price: snapshot.polymarket_prob,
            })
        }
    }

    fn opportunity(edge_z: Decimal, prob: Decimal, now: DateTime<Utc>) -> Opportunity {
        let claim = CryptoClaim {
            market_id: "m1".to_string(),
            question: "Will BTC hit $120k by next month?".to_string(),
            symbol: Symbol::Btc,
            target_price: dec!(120_000),
            expiry: now + chrono::Duration::days(30),
            bet_type: BetType::OneTouch,
            direction: Direction::Above,
        };
        let snapshot = MarketSnapshot {
            claim,
            polymarket_prob: prob,
            yes_token_id: "yes".to_string(),
            no_token_id: "no".to_string(),
            volume_24h: dec!(1000),
        };
        Opportunity {
            snapshot,
            spot: SpotPrice {
                symbol: Symbol::Btc,
                price: dec!(100_000),
                as_of: now,
            },
            iv_surface: None,
            zscore_estimate: ProbabilityEstimate {
                method: ProbabilityMethod::Zscore,
                probability: (prob - edge_z).to_f64().unwrap_or(0.0),
                volatility_used: 0.55,
                time_to_expiry: 0.08,
                z_score: Some(1.0),
                delta: None,
                audit_trail: vec![],
            },
            delta_estimate: None,
            edge_z,
            edge_delta: None,
            signal: if edge_z > Decimal::ZERO { Signal::Sell } else { Signal::Buy },
            confidence: Confidence::Medium,
        }
    }

    /// `opportunity` with the model probability pinned via `model_prob`
    /// rather than derived only from `edge_z`, so the agreement guard can be
    /// exercised independently of the min-edge gate.
    fn opportunity_with_model(
        edge_z: Decimal,
        prob: Decimal,
        model_prob: f64,
        bet_type: BetType,
        direction: Direction,
        spot_price: Decimal,
        now: DateTime<Utc>,
    ) -> Opportunity {
        let mut opp = opportunity(edge_z, prob, now);
        opp.snapshot.claim.bet_type = bet_type;
        opp.snapshot.claim.direction = direction;
        opp.spot.price = spot_price;
        opp.zscore_estimate.probability = model_prob;
        opp
    }

    fn pipeline_with(market: GammaMarket, spot_price: Decimal) -> OpportunityPipeline {
        let mut spot = HashMap::new();
        spot.insert(Symbol::Btc, SpotPrice { symbol: Symbol::Btc, price: spot_price, as_of: Utc::now() });
        OpportunityPipeline::new(Arc::new(FakeMarkets(vec![market])), Arc::new(FakeSpot(spot)), Arc::new(FakeVol))
    }

    fn machine(pipeline: OpportunityPipeline, config: BotConfig, store_path: std::path::PathBuf) -> TradingStateMachine {
        TradingStateMachine::new(pipeline, PersistenceStore::new(store_path), Arc::new(StubExecutor), config)
    }

    fn temp_store_path(tag: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("cryptoedge_trading_test_{tag}_{}.json", Utc::now().timestamp_nanos_opt().unwrap_or(0)));
        path
    }

    struct FakeMarkets(Vec<GammaMarket>);

    #[async_trait]
    impl PredictionMarketProvider for FakeMarkets {
        async fn active_markets(&self, _limit: u32) -> Result<Vec<GammaMarket>> {
            Ok(self.0.clone())
        }

        async fn order_book(&self, _token_id: &str) -> Result<OrderBook> {
            Ok(OrderBook::default())
        }
    }

    struct FakeSpot(HashMap<Symbol, SpotPrice>);

    #[async_trait]
    impl SpotPriceProvider for FakeSpot {
        async fn prices(&self, _symbols: &[Symbol]) -> Result<HashMap<Symbol, SpotPrice>> {
            Ok(self.0.clone())
        }
    }

    struct FakeVol;

    #[async_trait]
    impl VolatilityProvider for FakeVol {
        async fn surface(&self, symbol: Symbol, underlying_price: f64) -> Result<crate::domain::IvSurface> {
            let underlying = Decimal::try_from(underlying_price).unwrap_or_default();
            Ok(crate::domain::IvSurface::default_for(symbol, underlying))
        }
    }

    fn far_btc_market() -> GammaMarket {
        GammaMarket {
            condition_id: "m-far".to_string(),
            question: "Will Bitcoin hit $500k by December 31, 2026?".to_string(),
            active: true,
            closed: false,
            end_date: Some("2026-12-31T23:59:59Z".to_string()),
            outcomes_raw: Some(r#"["Yes","No"]"#.to_string()),
            outcome_prices_raw: Some(r#"["0.50","0.50"]"#.to_string()),
            clob_token_ids_raw: Some(r#"["m-far-yes","m-far-no"]"#.to_string()),
            volume_24h: Some("1000".to_string()),
        }
    }

    #[test]
    fn resolved_market_guard_rejects_extreme_probabilities() {
        let config = RuntimeConfig::default_config(true).bot;
        let now = Utc::now();
        let state = BotState::new(config.clone(), now);
        let machine = machine(pipeline_with(far_btc_market(), dec!(100_000)), config, temp_store_path("resolved"));
        let opp = opportunity(dec!(0.10), dec!(0.995), now);
        assert!(!machine.passes_entry_gates(&state, &opp, now));
    }

    #[test]
    fn min_edge_gate_rejects_small_edges() {
        let config = RuntimeConfig::default_config(true).bot;
        let now = Utc::now();
        let state = BotState::new(config.clone(), now);
        let machine = machine(pipeline_with(far_btc_market(), dec!(100_000)), config, temp_store_path("min-edge"));
        let opp = opportunity(dec!(0.01), dec!(0.40), now);
        assert!(!machine.passes_entry_gates(&state, &opp, now));
    }

    #[test]
    fn one_per_market_gate_rejects_duplicate_market_id() {
        let config = RuntimeConfig::default_config(true).bot;
        let now = Utc::now();
        let mut state = BotState::new(config.clone(), now);
        let opp = opportunity(dec!(0.10), dec!(0.40), now);
        let position = crate::domain::Position::open(
            opp.snapshot.claim.market_id.clone(),
            Symbol::Btc,
            dec!(120_000),
            Direction::Above,
            BetType::OneTouch,
            now + chrono::Duration::days(30),
            Side::Short,
            dec!(0.40),
            dec!(30),
            dec!(0.10),
            now,
        );
        let trade = open_trade(&position, &opp, dec!(100_000), now);
        state.record_open(position, trade);

        let machine = machine(pipeline_with(far_btc_market(), dec!(100_000)), config, temp_store_path("one-per-market"));
        assert!(!machine.passes_entry_gates(&state, &opp, now));
    }

    #[test]
    fn already_happened_guard_rejects_one_touch_once_target_is_crossed() {
        let config = RuntimeConfig::default_config(true).bot;
        let now = Utc::now();
        let state = BotState::new(config.clone(), now);
        let machine = machine(pipeline_with(far_btc_market(), dec!(125_000)), config, temp_store_path("already-happened"));
        // Direction::Above, spot already at/above the $120k target: the
        // touch has already occurred, so the gate must reject regardless of
        // edge or probability.
        let opp = opportunity_with_model(dec!(0.20), dec!(0.60), 0.40, BetType::OneTouch, Direction::Above, dec!(125_000), now);
        assert!(!machine.passes_entry_gates(&state, &opp, now));
    }

    #[test]
    fn agreement_guard_rejects_when_both_probabilities_are_extremely_high() {
        let config = RuntimeConfig::default_config(true).bot;
        let now = Utc::now();
        let state = BotState::new(config.clone(), now);
        let machine = machine(pipeline_with(far_btc_market(), dec!(100_000)), config, temp_store_path("agreement-high"));
        // poly=0.97, model=0.91 (edge_z=0.06 clears min-edge on its own):
        // both sides agree the claim is almost certainly true, so the
        // pipeline and the model add no information over each other.
        let opp = opportunity_with_model(dec!(0.06), dec!(0.97), 0.91, BetType::Binary, Direction::Above, dec!(100_000), now);
        assert!(!machine.passes_entry_gates(&state, &opp, now));
    }

    #[test]
    fn agreement_guard_rejects_when_both_probabilities_are_extremely_low() {
        let config = RuntimeConfig::default_config(true).bot;
        let now = Utc::now();
        let state = BotState::new(config.clone(), now);
        let machine = machine(pipeline_with(far_btc_market(), dec!(100_000)), config, temp_store_path("agreement-low"));
        let opp = opportunity_with_model(dec!(0.06), dec!(0.08), 0.02, BetType::Binary, Direction::Above, dec!(100_000), now);
        assert!(!machine.passes_entry_gates(&state, &opp, now));
    }

    #[tokio::test]
    async fn entry_phase_opens_a_position_for_a_large_edge_opportunity() {
        let config = RuntimeConfig::default_config(true).bot;
        let now = Utc::now();
        let mut state = BotState::new(config.clone(), now);
        let machine = machine(pipeline_with(far_btc_market(), dec!(100_000)), config, temp_store_path("entry-phase"));

        let opp = opportunity(dec!(0.45), dec!(0.50), now);
        let opened = machine.entry_phase(&mut state, std::slice::from_ref(&opp), now).await;

        assert_eq!(opened, 1);
        assert!(state.open_positions.contains_key(&opp.snapshot.claim.market_id));
    }

    #[test]
    fn exit_phase_closes_a_position_once_its_edge_realigns() {
        let config = RuntimeConfig::default_config(true).bot;
        let now = Utc::now();
        let mut state = BotState::new(config.clone(), now);
        let machine = machine(pipeline_with(far_btc_market(), dec!(100_000)), config.clone(), temp_store_path("exit-phase"));

        let opening_opp = opportunity(dec!(0.45), dec!(0.50), now);
        let position = crate::domain::Position::open(
            opening_opp.snapshot.claim.market_id.clone(),
            Symbol::Btc,
            dec!(120_000),
            Direction::Above,
            BetType::OneTouch,
            now + chrono::Duration::days(30),
            Side::from_edge(opening_opp.edge_z),
            dec!(0.50),
            dec!(30),
            dec!(0.45),
            now,
        );
        let trade = open_trade(&position, &opening_opp, dec!(100_000), now);
        state.record_open(position, trade);

        // Prices have converged: the edge is now well inside
        // `max_edge_to_exit`, so the position should close as EdgeAligned.
        let realigned_opp = opportunity(dec!(0.01), dec!(0.50), now);
        let mut by_market = HashMap::new();
        by_market.insert(realigned_opp.snapshot.claim.market_id.as_str(), &realigned_opp);

        machine.refresh_positions(&mut state, &by_market);
        let closed = machine.exit_phase(&mut state, &by_market, now);
        assert_eq!(closed, 1);
        assert!(state.open_positions.is_empty());
    }

    #[tokio::test]
    async fn run_cycle_opens_then_gates_out_a_second_entry_on_the_same_market() {
        let config = RuntimeConfig::default_config(true).bot;
        let now = Utc::now();
        let mut state = BotState::new(config.clone(), now);
        let store_path = temp_store_path("run-cycle");

        let first = machine(pipeline_with(far_btc_market(), dec!(100_000)), config.clone(), store_path.clone());
        let first_report = first.run_cycle(&mut state, now).await;
        assert_eq!(first_report.positions_opened, 1);
        assert!(first_report.error.is_none());

        let second = machine(pipeline_with(far_btc_market(), dec!(100_000)), config, store_path.clone());
        let second_report = second.run_cycle(&mut state, now + chrono::Duration::seconds(1)).await;
        // The market already has an open position: the one-per-market gate
        // blocks a second entry, and the edge hasn't realigned or expired,
        // so nothing closes either.
        assert_eq!(second_report.positions_opened, 0);
        assert_eq!(second_report.positions_closed, 0);

        let _ = std::fs::remove_file(&store_path);
    }
}
