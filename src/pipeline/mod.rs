//! Opportunity pipeline: candidate markets in, ranked
//! opportunities out. Spot prices are fetched in one bulk call; IV surfaces
//! are fetched per-symbol with bounded concurrency so one slow upstream
//! call doesn't serialize the whole cycle.

use crate::domain::{BetType, Opportunity, ProbabilityEstimate, ProbabilityMethod, Symbol};
use crate::error::{BotError, Result};
use crate::parser::QuestionParser;
use crate::probability;
use crate::providers::SpotPriceProvider;
use crate::providers::VolatilityProvider;
use crate::providers::{PredictionMarketClient, PredictionMarketProvider};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use rust_decimal::prelude::ToPrimitive;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

const MAX_CONCURRENT_VOL_FETCHES: usize = 4;

pub struct OpportunityPipeline {
    markets: Arc<dyn PredictionMarketProvider>,
    spot: Arc<dyn SpotPriceProvider>,
    volatility: Arc<dyn VolatilityProvider>,
}

impl OpportunityPipeline {
    pub fn new(
        markets: Arc<dyn PredictionMarketProvider>,
        spot: Arc<dyn SpotPriceProvider>,
        volatility: Arc<dyn VolatilityProvider>,
    ) -> Self {
        Self {
            markets,
            spot,
            volatility,
        }
    }

    pub async fn opportunities(&self, limit: u32, now: DateTime<Utc>) -> Result<Vec<Opportunity>> {
        let candidates = self.markets.active_markets(limit.saturating_mul(3)).await?;

        let mut claims = Vec::new();
        for market in &candidates {
            let end_hint = market
                .end_date
                .as_deref()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc));
            match QuestionParser::parse(&market.condition_id, &market.question, end_hint, now) {
                Ok(claim) if claim.is_expired_at(now) => {
                    warn!(market_id = %market.condition_id, "discarding expired claim");
                }
                Ok(claim) => {
                    let snapshot = PredictionMarketClient::snapshot_from_market(market, claim);
                    match snapshot {
                        Ok(snap) if snap.polymarket_prob > rust_decimal::Decimal::ZERO
                            && snap.polymarket_prob < rust_decimal::Decimal::ONE =>
                        {
                            claims.push(snap);
                        }
                        Ok(_) => {
                            warn!(market_id = %market.condition_id, "discarding market with degenerate probability");
                        }
                        Err(e) => {
                            warn!(market_id = %market.condition_id, error = %e, "discarding market with invalid snapshot");
                        }
                    }
                }
                Err(_) => {}
            }
            if claims.len() >= limit as usize {
                break;
            }
        }

        if claims.is_empty() {
            return Ok(Vec::new());
        }

        let symbols: Vec<Symbol> = {
            let mut set: Vec<Symbol> = claims.iter().map(|s| s.claim.symbol).collect();
            set.sort_by_key(|s| s.as_str());
            set.dedup();
            set
        };

        let spot_prices = self.spot.prices(&symbols).await?;
        if spot_prices.is_empty() {
            return Err(BotError::NoSpotPrice {
                symbol: "prices-unavailable".to_string(),
            });
        }

        let surfaces = self.fetch_surfaces(&symbols, &spot_prices).await;

        let mut opportunities = Vec::new();
        for snapshot in claims {
            let symbol = snapshot.claim.symbol;
            let Some(spot) = spot_prices.get(&symbol) else {
                warn!(symbol = %symbol, "skipping claim with no spot price");
                continue;
            };

            let time_years = snapshot.claim.time_to_expiry_years(now);
            if time_years <= 0.0 {
                continue;
            }

            let spot_f = match spot.price.to_f64() {
                Some(v) => v,
                None => continue,
            };
            let target_f = match snapshot.claim.target_price.to_f64() {
                Some(v) => v,
                None => continue,
            };
            let polymarket_prob_f = match snapshot.polymarket_prob.to_f64() {
                Some(v) => v,
                None => continue,
            };

            let surface = surfaces.get(&symbol).cloned();
            let sigma = surface.as_ref().map(|s| s.atm_iv).unwrap_or_else(|| symbol.default_vol());

            let zscore_model_prob = match snapshot.claim.bet_type {
                BetType::Binary => {
                    probability::binary_probability(spot_f, target_f, sigma, time_years, snapshot.claim.direction)
                }
                BetType::OneTouch => probability::one_touch_probability(spot_f, target_f, sigma, time_years),
            };
            let edge_z = probability::edge(polymarket_prob_f, zscore_model_prob);
            let zscore_estimate = ProbabilityEstimate {
                method: ProbabilityMethod::Zscore,
                probability: zscore_model_prob,
                volatility_used: sigma,
                time_to_expiry: time_years,
                z_score: Some(probability::z_score(spot_f, target_f, sigma, time_years)),
                delta: None,
                audit_trail: vec![format!(
                    "zscore: S={spot_f} K={target_f} sigma={sigma} T={time_years} -> P={zscore_model_prob}"
                )],
            };

            let mut delta_estimate = None;
            let mut edge_delta = None;
            if let Some(surface) = surface.as_ref().filter(|s| !s.is_default()) {
                if let Some(lookup) = surface.iv_for_strike(snapshot.claim.target_price) {
                    if let Some(delta) = lookup.delta {
                        if let Some(result) = probability::options_delta_probability(
                            spot_f,
                            target_f,
                            delta,
                            lookup.iv,
                            time_years,
                            snapshot.claim.bet_type,
                            snapshot.claim.direction,
                        ) {
                            let e = probability::edge(polymarket_prob_f, result.probability);
                            edge_delta = Some(e);
                            delta_estimate = Some(ProbabilityEstimate {
                                method: ProbabilityMethod::OptionsDelta,
                                probability: result.probability,
                                volatility_used: lookup.iv,
                                time_to_expiry: time_years,
                                z_score: None,
                                delta: Some(result.base_delta),
                                audit_trail: vec![format!(
                                    "options-delta: d1={} baseDelta={} -> P={}",
                                    result.d1, result.base_delta, result.probability
                                )],
                            });
                        }
                    }
                }
            }

            let ranking_source_edge = edge_delta.unwrap_or(edge_z);
            let signal = probability::classify_signal(ranking_source_edge);
            let confidence = probability::classify_confidence(ranking_source_edge);

            let edge_z_decimal = decimal_from_f64(edge_z);
            let edge_delta_decimal = edge_delta.map(decimal_from_f64);

            opportunities.push(Opportunity {
                snapshot: snapshot.clone(),
                spot: spot.clone(),
                iv_surface: surface,
                zscore_estimate,
                delta_estimate,
                edge_z: edge_z_decimal,
                edge_delta: edge_delta_decimal,
                signal,
                confidence,
            });
        }

        opportunities.sort_by(|a, b| {
            b.ranking_edge()
                .cmp(&a.ranking_edge())
                .then_with(|| b.snapshot.volume_24h.cmp(&a.snapshot.volume_24h))
                .then_with(|| a.snapshot.claim.expiry.cmp(&b.snapshot.claim.expiry))
        });

        info!(count = opportunities.len(), "opportunity pipeline produced ranked results");
        Ok(opportunities)
    }

    async fn fetch_surfaces(
        &self,
        symbols: &[Symbol],
        spot_prices: &HashMap<Symbol, crate::domain::SpotPrice>,
    ) -> HashMap<Symbol, crate::domain::IvSurface> {
        let volatility = Arc::clone(&self.volatility);
        let results: Vec<(Symbol, crate::domain::IvSurface)> = stream::iter(symbols.iter().copied())
            .map(|symbol| {
                let volatility = Arc::clone(&volatility);
                let underlying_price = spot_prices.get(&symbol).map(|p| p.price).unwrap_or_default();
                let underlying = underlying_price.to_f64().unwrap_or(0.0);
                async move {
                    match volatility.surface(symbol, underlying).await {
                        Ok(surface) => (symbol, surface),
                        Err(e) => {
                            warn!(symbol = %symbol, error = %e, "iv surface fetch failed, degrading to default vol");
                            (symbol, crate::domain::IvSurface::default_for(symbol, underlying_price))
                        }
                    }
                }
            })
            .buffer_unordered(MAX_CONCURRENT_VOL_FETCHES)
            .collect()
            .await;

        results.into_iter().collect()
    }
}

fn decimal_from_f64(v: f64) -> rust_decimal::Decimal {
    rust_decimal::Decimal::try_from(v).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Symbol;
    use crate::providers::{GammaMarket, OrderBook};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    #[test]
    fn decimal_from_f64_handles_ordinary_edges() {
        assert_eq!(decimal_from_f64(0.05).round_dp(2), rust_decimal::Decimal::new(5, 2));
    }

    fn market(condition_id: &str, question: &str, prices: &str, volume: &str) -> GammaMarket {
        GammaMarket {
            condition_id: condition_id.to_string(),
            question: question.to_string(),
            active: true,
            closed: false,
            end_date: Some("2026-12-31T23:59:59Z".to_string()),
            outcomes_raw: Some(r#"["Yes","No"]"#.to_string()),
            outcome_prices_raw: Some(prices.to_string()),
            clob_token_ids_raw: Some(format!(r#"["{condition_id}-yes","{condition_id}-no"]"#)),
            volume_24h: Some(volume.to_string()),
        }
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

    struct FakeSpot(HashMap<Symbol, crate::domain::SpotPrice>);

    #[async_trait]
    impl SpotPriceProvider for FakeSpot {
        async fn prices(&self, _symbols: &[Symbol]) -> Result<HashMap<Symbol, crate::domain::SpotPrice>> {
            Ok(self.0.clone())
        }
    }

    struct EmptySpot;

    #[async_trait]
    impl SpotPriceProvider for EmptySpot {
        async fn prices(&self, _symbols: &[Symbol]) -> Result<HashMap<Symbol, crate::domain::SpotPrice>> {
            Ok(HashMap::new())
        }
    }

    struct FakeVol;

    #[async_trait]
    impl VolatilityProvider for FakeVol {
        async fn surface(&self, symbol: Symbol, underlying_price: f64) -> Result<crate::domain::IvSurface> {
            let underlying = rust_decimal::Decimal::try_from(underlying_price).unwrap_or_default();
            Ok(crate::domain::IvSurface::default_for(symbol, underlying))
        }
    }

    fn spot_map() -> HashMap<Symbol, crate::domain::SpotPrice> {
        let mut m = HashMap::new();
        m.insert(
            Symbol::Btc,
            crate::domain::SpotPrice { symbol: Symbol::Btc, price: dec!(100_000), as_of: Utc::now() },
        );
        m.insert(
            Symbol::Eth,
            crate::domain::SpotPrice { symbol: Symbol::Eth, price: dec!(4_000), as_of: Utc::now() },
        );
        m
    }

    #[tokio::test]
    async fn opportunities_ranks_by_edge_with_volume_and_expiry_tiebreaks() {
        let markets = vec![
            // Polymarket says 50/50 on a target far above spot: the model
            // disagrees hard, so this should rank first by edge magnitude.
            market("m-btc", "Will Bitcoin hit $500k by December 31, 2026?", r#"["0.50","0.50"]"#, "1000"),
            // Polymarket price close to the model's own estimate: small edge.
            market("m-eth", "Will Ethereum price exceed $4050?", r#"["0.50","0.50"]"#, "5000"),
        ];
        let pipeline = OpportunityPipeline::new(
            Arc::new(FakeMarkets(markets)),
            Arc::new(FakeSpot(spot_map())),
            Arc::new(FakeVol),
        );

        let opportunities = pipeline.opportunities(10, Utc::now()).await.unwrap();
        assert_eq!(opportunities.len(), 2);
        assert!(opportunities[0].ranking_edge() >= opportunities[1].ranking_edge());
        assert_eq!(opportunities[0].snapshot.claim.symbol, Symbol::Btc);
    }

    #[tokio::test]
    async fn opportunities_orders_equal_edge_by_volume_then_expiry() {
        // Two BTC claims at the same target and probability differ only in
        // volume and expiry, to exercise the tiebreak chain in the sort.
        let markets = vec![
            market("m-low-vol", "Will Bitcoin hit $500k by December 31, 2026?", r#"["0.50","0.50"]"#, "100"),
            market("m-high-vol", "Will Bitcoin hit $500k by December 31, 2026?", r#"["0.50","0.50"]"#, "9000"),
        ];
        let pipeline = OpportunityPipeline::new(
            Arc::new(FakeMarkets(markets)),
            Arc::new(FakeSpot(spot_map())),
            Arc::new(FakeVol),
        );

        let opportunities = pipeline.opportunities(10, Utc::now()).await.unwrap();
        assert_eq!(opportunities.len(), 2);
        assert_eq!(opportunities[0].snapshot.claim.market_id, "m-high-vol");
        assert_eq!(opportunities[1].snapshot.claim.market_id, "m-low-vol");
    }

    #[tokio::test]
    async fn opportunities_errors_when_spot_prices_are_unavailable() {
        let markets = vec![market("m-btc", "Will Bitcoin hit $500k by December 31, 2026?", r#"["0.50","0.50"]"#, "1000")];
        let pipeline = OpportunityPipeline::new(
            Arc::new(FakeMarkets(markets)),
            Arc::new(EmptySpot),
            Arc::new(FakeVol),
        );

        let err = pipeline.opportunities(10, Utc::now()).await.unwrap_err();
        assert!(matches!(err, BotError::NoSpotPrice { .. }));
    }

    #[tokio::test]
    async fn opportunities_fans_out_iv_surface_fetches_across_distinct_symbols() {
        // BTC and ETH both need a surface fetch; FakeVol answers both
        // independently through the bounded buffer_unordered fan-out.
        let markets = vec![
            market("m-btc", "Will Bitcoin hit $500k by December 31, 2026?", r#"["0.40","0.60"]"#, "1000"),
            market("m-eth", "Will Ethereum price exceed $8000?", r#"["0.40","0.60"]"#, "1000"),
        ];
        let pipeline = OpportunityPipeline::new(
            Arc::new(FakeMarkets(markets)),
            Arc::new(FakeSpot(spot_map())),
            Arc::new(FakeVol),
        );

        let opportunities = pipeline.opportunities(10, Utc::now()).await.unwrap();
        let symbols: std::collections::HashSet<Symbol> =
            opportunities.iter().map(|o| o.snapshot.claim.symbol).collect();
        assert_eq!(symbols, [Symbol::Btc, Symbol::Eth].into_iter().collect());
        assert!(opportunities.iter().all(|o| o.iv_surface.is_some()));
    }

    #[tokio::test]
    async fn opportunities_discards_expired_and_degenerate_markets() {
        let markets = vec![
            // Already resolved to "No": polymarket_prob would be 0, which the
            // pipeline's degenerate-probability check discards.
            market("m-resolved", "Will Bitcoin hit $500k by December 31, 2026?", r#"["0.00","1.00"]"#, "1000"),
            market("m-btc", "Will Bitcoin hit $500k by December 31, 2026?", r#"["0.40","0.60"]"#, "1000"),
        ];
        let pipeline = OpportunityPipeline::new(
            Arc::new(FakeMarkets(markets)),
            Arc::new(FakeSpot(spot_map())),
            Arc::new(FakeVol),
        );

        let opportunities = pipeline.opportunities(10, Utc::now()).await.unwrap();
        assert_eq!(opportunities.len(), 1);
        assert_eq!(opportunities[0].snapshot.claim.market_id, "m-btc");
    }
}
