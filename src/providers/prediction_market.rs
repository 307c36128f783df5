//! Gamma market catalog + CLOB order book client. Field shapes
//! are grounded on the upstream Gamma API: `outcomes`, `outcomePrices` and
//! `clobTokenIds` all arrive as JSON-encoded strings (e.g.
//! `"[\"0.65\",\"0.35\"]"`) rather than native arrays, so every one of them
//! needs the same decode-twice dance before it's usable.

use crate::domain::MarketSnapshot;
use crate::error::{BotError, Result};
use crate::http::HttpFetcher;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

/// Raw Gamma market record. Field names mirror the upstream JSON; the
/// string-encoded array fields are decoded lazily by `parse_json_array_strings`
/// rather than via a custom `Deserialize` impl, since a market with
/// unparsable arrays should still surface as a `GammaMarket` (and get
/// rejected downstream by the question parser) instead of failing the
/// whole catalog fetch.
#[derive(Debug, Clone, Deserialize)]
pub struct GammaMarket {
    #[serde(rename = "conditionId")]
    pub condition_id: String,
    pub question: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub closed: bool,
    #[serde(rename = "endDate", default)]
    pub end_date: Option<String>,
    #[serde(rename = "outcomes", default)]
    pub outcomes_raw: Option<String>,
    #[serde(rename = "outcomePrices", default)]
    pub outcome_prices_raw: Option<String>,
    #[serde(rename = "clobTokenIds", default)]
    pub clob_token_ids_raw: Option<String>,
    #[serde(rename = "volume24hr", default)]
    pub volume_24h: Option<String>,
}

fn parse_json_array_strings(input: &str) -> std::result::Result<Vec<String>, serde_json::Error> {
    let s = input.trim();
    if s.is_empty() || s == "null" {
        return Ok(Vec::new());
    }
    if let Ok(v) = serde_json::from_str::<Vec<String>>(s) {
        return Ok(v);
    }
    let vals = serde_json::from_str::<Vec<serde_json::Value>>(s)?;
    Ok(vals
        .into_iter()
        .map(|v| match v {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::Bool(b) => b.to_string(),
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        })
        .collect())
}

impl GammaMarket {
    pub fn outcomes(&self) -> Vec<String> {
        self.outcomes_raw
            .as_deref()
            .and_then(|s| parse_json_array_strings(s).ok())
            .unwrap_or_default()
    }

    pub fn outcome_prices(&self) -> Vec<Decimal> {
        self.outcome_prices_raw
            .as_deref()
            .and_then(|s| parse_json_array_strings(s).ok())
            .unwrap_or_default()
            .iter()
            .filter_map(|p| Decimal::from_str(p).ok())
            .collect()
    }

    pub fn clob_token_ids(&self) -> Vec<String> {
        self.clob_token_ids_raw
            .as_deref()
            .and_then(|s| parse_json_array_strings(s).ok())
            .unwrap_or_default()
    }

    /// Index of the "Yes" outcome if present, else the first outcome.
    /// Binary price-target markets are expected to carry exactly
    /// `["Yes", "No"]` or an equivalent pair; anything else is left to the
    /// caller to reject.
    pub fn yes_index(&self) -> Option<usize> {
        let outcomes = self.outcomes();
        outcomes
            .iter()
            .position(|o| o.eq_ignore_ascii_case("yes"))
            .or(if outcomes.is_empty() { None } else { Some(0) })
    }
}

#[derive(Debug, Clone, Deserialize)]
struct GammaMarketsResponse {
    #[serde(default)]
    data: Vec<GammaMarket>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderBookLevel {
    pub price: Decimal,
    pub size: Decimal,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct OrderBook {
    #[serde(default)]
    pub bids: Vec<OrderBookLevel>,
    #[serde(default)]
    pub asks: Vec<OrderBookLevel>,
}

impl OrderBook {
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.iter().map(|l| l.price).min()
    }

    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.iter().map(|l| l.price).max()
    }
}

#[async_trait]
pub trait PredictionMarketProvider: Send + Sync {
    /// Fetch up to `limit` active, unresolved markets ordered by recency
    ///.
    async fn active_markets(&self, limit: u32) -> Result<Vec<GammaMarket>>;

    async fn order_book(&self, token_id: &str) -> Result<OrderBook>;
}

pub struct PredictionMarketClient {
    fetcher: HttpFetcher,
    gamma_base_url: String,
    clob_base_url: String,
}

impl PredictionMarketClient {
    pub fn new(fetcher: HttpFetcher, gamma_base_url: String, clob_base_url: String) -> Self {
        Self {
            fetcher,
            gamma_base_url,
            clob_base_url,
        }
    }

    pub fn snapshot_from_market(
        market: &GammaMarket,
        claim: crate::domain::CryptoClaim,
    ) -> Result<MarketSnapshot> {
        let prices = market.outcome_prices();
        let tokens = market.clob_token_ids();
        let yes_idx = market.yes_index().ok_or_else(|| {
            BotError::InvalidMarketData(format!("market {} has no outcomes", market.condition_id))
        })?;
        let no_idx = 1 - yes_idx.min(1);

        let yes_price = prices
            .get(yes_idx)
            .copied()
            .ok_or_else(|| BotError::InvalidMarketData("missing yes outcome price".to_string()))?;
        let yes_token = tokens
            .get(yes_idx)
            .cloned()
            .ok_or_else(|| BotError::InvalidMarketData("missing yes token id".to_string()))?;
        let no_token = tokens
            .get(no_idx)
            .cloned()
            .unwrap_or_else(|| yes_token.clone());

        let volume_24h = market
            .volume_24h
            .as_deref()
            .and_then(|v| Decimal::from_str(v).ok())
            .unwrap_or_default();

        Ok(MarketSnapshot {
            claim,
            polymarket_prob: yes_price,
            yes_token_id: yes_token,
            no_token_id: no_token,
            volume_24h,
        })
    }
}

#[async_trait]
impl PredictionMarketProvider for PredictionMarketClient {
    async fn active_markets(&self, limit: u32) -> Result<Vec<GammaMarket>> {
        let url = format!(
            "{}/markets?active=true&closed=false&limit={}&order=id&ascending=false",
            self.gamma_base_url, limit
        );
        let response: GammaMarketsResponse = self.fetcher.get_json(&url).await?;
        Ok(response
            .data
            .into_iter()
            .filter(|m| m.active && !m.closed)
            .collect())
    }

    async fn order_book(&self, token_id: &str) -> Result<OrderBook> {
        let url = format!("{}/book?token_id={}", self.clob_base_url, token_id);
        self.fetcher.get_json(&url).await
    }
}
