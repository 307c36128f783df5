//! Options-exchange implied-volatility surface. The supported
//! instrument set is narrow (BTC/ETH have a real options chain on the
//! upstream exchange; everything else falls straight back to a hardcoded
//! default vol) so most of this module's weight is in building the
//! per-strike smile for the two symbols that have one.

use crate::domain::{IvSurface, PerStrikeIv, Symbol};
use crate::error::Result;
use crate::http::HttpFetcher;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use tracing::warn;

const MAX_EXPIRIES: usize = 3;
const MAX_STRIKES_PER_EXPIRY: usize = 10;

#[async_trait]
pub trait VolatilityProvider: Send + Sync {
    async fn surface(&self, symbol: Symbol, underlying_price: f64) -> Result<IvSurface>;
}

#[derive(Debug, Clone, Deserialize)]
struct InstrumentsResponse {
    result: Vec<Instrument>,
}

#[derive(Debug, Clone, Deserialize)]
struct Instrument {
    instrument_name: String,
    strike: f64,
    expiration_timestamp: i64,
    option_type: String,
}

#[derive(Debug, Clone, Deserialize)]
struct TickerResponse {
    result: TickerResult,
}

#[derive(Debug, Clone, Deserialize)]
struct TickerResult {
    mark_iv: Option<f64>,
    greeks: Option<Greeks>,
}

#[derive(Debug, Clone, Deserialize)]
struct Greeks {
    delta: Option<f64>,
}

pub struct DeribitVolatilityProvider {
    fetcher: HttpFetcher,
    base_url: String,
}

impl DeribitVolatilityProvider {
    pub fn new(fetcher: HttpFetcher, base_url: String) -> Self {
        Self { fetcher, base_url }
    }

    fn currency(symbol: Symbol) -> Option<&'static str> {
        match symbol {
            Symbol::Btc => Some("BTC"),
            Symbol::Eth => Some("ETH"),
            _ => None,
        }
    }

    async fn fetch_instruments(&self, currency: &str) -> Result<Vec<Instrument>> {
        let url = format!(
            "{}/public/get_instruments?currency={}&kind=option&expired=false",
            self.base_url, currency
        );
        let response: InstrumentsResponse = self.fetcher.get_json(&url).await?;
        Ok(response.result)
    }

    async fn fetch_ticker(&self, instrument_name: &str) -> Result<TickerResult> {
        let url = format!("{}/public/ticker?instrument_name={}", self.base_url, instrument_name);
        let response: TickerResponse = self.fetcher.get_json(&url).await?;
        Ok(response.result)
    }
}

#[async_trait]
impl VolatilityProvider for DeribitVolatilityProvider {
    async fn surface(&self, symbol: Symbol, underlying_price: f64) -> Result<IvSurface> {
        let underlying_decimal = rust_decimal::Decimal::try_from(underlying_price).unwrap_or_default();

        let Some(currency) = Self::currency(symbol) else {
            return Ok(IvSurface::default_for(symbol, underlying_decimal));
        };

        let instruments = match self.fetch_instruments(currency).await {
            Ok(list) if !list.is_empty() => list,
            _ => return Ok(IvSurface::default_for(symbol, underlying_decimal)),
        };

        let mut expiries: Vec<i64> = instruments.iter().map(|i| i.expiration_timestamp).collect();
        expiries.sort_unstable();
        expiries.dedup();
        let nearest_expiries: Vec<i64> = expiries.into_iter().take(MAX_EXPIRIES).collect();

        let atm_strike = instruments
            .iter()
            .map(|i| i.strike)
            .min_by(|a, b| {
                (a - underlying_price)
                    .abs()
                    .partial_cmp(&(b - underlying_price).abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

        let atm_from_ticker = if let (Some(&nearest), Some(strike)) =
            (nearest_expiries.first(), atm_strike)
        {
            instruments
                .iter()
                .find(|i| i.expiration_timestamp == nearest && i.strike == strike && i.option_type == "call")
                .map(|i| i.instrument_name.clone())
        } else {
            None
        };

        let atm_mark_iv = match atm_from_ticker {
            Some(name) => match self.fetch_ticker(&name).await {
                Ok(ticker) => ticker.mark_iv.map(|v| v / 100.0),
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "atm ticker fetch failed, will try per-strike mean");
                    None
                }
            },
            None => None,
        };

        let mut per_strike = std::collections::HashMap::new();
        for &expiry_ts in &nearest_expiries {
            let mut strikes: Vec<f64> = instruments
                .iter()
                .filter(|i| {
                    i.expiration_timestamp == expiry_ts
                        && i.strike >= 0.5 * underlying_price
                        && i.strike <= 2.0 * underlying_price
                })
                .map(|i| i.strike)
                .collect();
            strikes.sort_by(|a, b| {
                (a - underlying_price)
                    .abs()
                    .partial_cmp(&(b - underlying_price).abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            strikes.dedup_by(|a, b| (*a - *b).abs() < f64::EPSILON);
            strikes.truncate(MAX_STRIKES_PER_EXPIRY);

            let expiry = DateTime::<Utc>::from_timestamp(expiry_ts / 1000, 0).unwrap_or_else(Utc::now);
            let days_to_expiry = (expiry - Utc::now()).num_days().max(0);

            let fetches = strikes.into_iter().map(|strike| {
                let call_name = instruments
                    .iter()
                    .find(|i| i.expiration_timestamp == expiry_ts && (i.strike - strike).abs() < f64::EPSILON && i.option_type == "call")
                    .map(|i| i.instrument_name.clone());
                let put_name = instruments
                    .iter()
                    .find(|i| i.expiration_timestamp == expiry_ts && (i.strike - strike).abs() < f64::EPSILON && i.option_type == "put")
                    .map(|i| i.instrument_name.clone());
                async move {
                    let call = match &call_name {
                        Some(n) => self.fetch_ticker(n).await.ok(),
                        None => None,
                    };
                    let put = match &put_name {
                        Some(n) => self.fetch_ticker(n).await.ok(),
                        None => None,
                    };
                    (strike, call, put)
                }
            });

            for (strike, call, put) in join_all(fetches).await {
                let call_iv = call.as_ref().and_then(|t| t.mark_iv).map(|v| v / 100.0);
                let call_delta = call.as_ref().and_then(|t| t.greeks.as_ref()).and_then(|g| g.delta);
                let put_iv = put.as_ref().and_then(|t| t.mark_iv).map(|v| v / 100.0);
                let put_delta = put.as_ref().and_then(|t| t.greeks.as_ref()).and_then(|g| g.delta);

                let (Some(call_iv), Some(put_iv)) = (call_iv, put_iv) else {
                    continue;
                };

                per_strike.insert(
                    format!("{strike}"),
                    PerStrikeIv {
                        call_iv,
                        call_delta,
                        put_iv,
                        put_delta,
                        expiry,
                        days_to_expiry,
                    },
                );
            }
        }

        let atm_iv = match (atm_mark_iv, per_strike.is_empty()) {
            (Some(iv), _) => iv,
            (None, false) => per_strike.values().map(|s| s.call_iv).sum::<f64>() / per_strike.len() as f64,
            (None, true) => return Ok(IvSurface::default_for(symbol, underlying_decimal)),
        };

        Ok(IvSurface {
            symbol,
            underlying_price: underlying_decimal,
            atm_iv,
            per_strike,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_symbol_has_no_options_chain() {
        assert!(DeribitVolatilityProvider::currency(Symbol::Doge).is_none());
        assert!(DeribitVolatilityProvider::currency(Symbol::Btc).is_some());
    }

    #[test]
    fn to_primitive_is_available_for_decimal_conversions() {
        let d = rust_decimal::Decimal::new(123, 2);
        assert_eq!(d.to_f64(), Some(1.23));
    }
}
