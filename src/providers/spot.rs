use crate::domain::{SpotPrice, Symbol};
use crate::error::{BotError, Result};
use crate::http::HttpFetcher;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;

/// `prices(symbols) -> map(symbol -> SpotPrice)`. Bulk fetch in
/// a single upstream call when possible; returns a partial map if some
/// symbols are unknown upstream. `historicalSeries` is an optional
/// capability — providers that don't support it inherit a default trait
/// method returning an explicit unsupported error rather than panicking or
/// silently no-op'ing.
#[async_trait]
pub trait SpotPriceProvider: Send + Sync {
    async fn prices(&self, symbols: &[Symbol]) -> Result<HashMap<Symbol, SpotPrice>>;

    async fn historical_series(&self, _symbol: Symbol, _days: u32) -> Result<Vec<(chrono::DateTime<Utc>, Decimal)>> {
        Err(BotError::Validation(
            "historical_series is not supported by this spot price provider".to_string(),
        ))
    }
}

fn coingecko_id(symbol: Symbol) -> &'static str {
    match symbol {
        Symbol::Btc => "bitcoin",
        Symbol::Eth => "ethereum",
        Symbol::Sol => "solana",
        Symbol::Xrp => "ripple",
        Symbol::Doge => "dogecoin",
    }
}

fn symbol_from_coingecko_id(id: &str) -> Option<Symbol> {
    match id {
        "bitcoin" => Some(Symbol::Btc),
        "ethereum" => Some(Symbol::Eth),
        "solana" => Some(Symbol::Sol),
        "ripple" => Some(Symbol::Xrp),
        "dogecoin" => Some(Symbol::Doge),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct CoinGeckoEntry {
    id: String,
    current_price: f64,
    #[allow(dead_code)]
    #[serde(default)]
    price_change_percentage_24h: Option<f64>,
    #[allow(dead_code)]
    #[serde(default)]
    total_volume: Option<f64>,
}

pub struct CoinGeckoSpotProvider {
    fetcher: HttpFetcher,
    base_url: String,
}

impl CoinGeckoSpotProvider {
    pub fn new(fetcher: HttpFetcher, base_url: String) -> Self {
        Self { fetcher, base_url }
    }
}

#[async_trait]
impl SpotPriceProvider for CoinGeckoSpotProvider {
    async fn prices(&self, symbols: &[Symbol]) -> Result<HashMap<Symbol, SpotPrice>> {
        if symbols.is_empty() {
            return Ok(HashMap::new());
        }
        let ids: Vec<&str> = symbols.iter().map(|s| coingecko_id(*s)).collect();
        let csv = ids.join(",");
        let url = format!(
            "{}/coins/markets?vs_currency=usd&ids={}",
            self.base_url, csv
        );

        let entries: Vec<CoinGeckoEntry> = self.fetcher.get_json(&url).await?;

        let now = Utc::now();
        let mut out = HashMap::new();
        for entry in entries {
            let Some(symbol) = symbol_from_coingecko_id(&entry.id) else {
                continue;
            };
            let Ok(price) = Decimal::try_from(entry.current_price) else {
                continue;
            };
            out.insert(
                symbol,
                SpotPrice {
                    symbol,
                    price,
                    as_of: now,
                },
            );
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coingecko_id_round_trips_through_symbol_from_coingecko_id() {
        for s in [Symbol::Btc, Symbol::Eth, Symbol::Sol, Symbol::Xrp, Symbol::Doge] {
            assert_eq!(symbol_from_coingecko_id(coingecko_id(s)), Some(s));
        }
    }
}
