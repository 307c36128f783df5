use super::claim::{CryptoClaim, Symbol};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A snapshot of a live prediction market joined to its parsed claim
///. `polymarket_prob == 0` or `== 1` means resolved and the
/// pipeline excludes it before constructing this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub claim: CryptoClaim,
    pub polymarket_prob: Decimal,
    pub yes_token_id: String,
    pub no_token_id: String,
    pub volume_24h: Decimal,
}

impl MarketSnapshot {
    pub fn is_resolved(&self) -> bool {
        self.polymarket_prob <= Decimal::ZERO || self.polymarket_prob >= Decimal::ONE
    }

    pub fn token_id_for_side(&self, side: super::position::Side) -> &str {
        match side {
            super::position::Side::Long => &self.yes_token_id,
            super::position::Side::Short => &self.no_token_id,
        }
    }
}

/// Latest USD quote for a symbol. Latest wins; per-symbol
/// monotonic `as_of`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpotPrice {
    pub symbol: Symbol,
    pub price: Decimal,
    pub as_of: DateTime<Utc>,
}

/// A single strike's call/put implied vol and deltas, as surfaced by the
/// options exchange.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerStrikeIv {
    pub call_iv: f64,
    pub call_delta: Option<f64>,
    pub put_iv: f64,
    pub put_delta: Option<f64>,
    pub expiry: DateTime<Utc>,
    pub days_to_expiry: i64,
}

/// The implied-volatility surface for a symbol, or its default-vol
/// fallback when the options exchange doesn't cover it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IvSurface {
    pub symbol: Symbol,
    pub underlying_price: Decimal,
    pub atm_iv: f64,
    pub per_strike: HashMap<String, PerStrikeIv>,
}

impl IvSurface {
    /// A surface with no per-strike data, carrying only a hard-coded
    /// fallback ATM vol.
    pub fn default_for(symbol: Symbol, underlying_price: Decimal) -> Self {
        Self {
            symbol,
            underlying_price,
            atm_iv: symbol.default_vol(),
            per_strike: HashMap::new(),
        }
    }

    pub fn is_default(&self) -> bool {
        self.per_strike.is_empty()
    }

    /// Smile lookup: pick the closest strike in `per_strike`;
    /// return its call IV and — only if the strike differs from the
    /// target by <20% relative — its call delta.
    pub fn iv_for_strike(&self, target_strike: Decimal) -> Option<StrikeLookup> {
        if self.per_strike.is_empty() {
            return None;
        }
        let target: f64 = target_strike.try_into().unwrap_or(0.0);
        if target <= 0.0 {
            return None;
        }

        let mut best: Option<(f64, &str, &PerStrikeIv)> = None;
        for (strike_key, entry) in &self.per_strike {
            let Ok(strike) = strike_key.parse::<f64>() else {
                continue;
            };
            let distance = (strike - target).abs();
            if best.map(|(d, _, _)| distance < d).unwrap_or(true) {
                best = Some((distance, strike_key.as_str(), entry));
            }
        }

        let (_, strike_key, entry) = best?;
        let strike: f64 = strike_key.parse().ok()?;
        let relative_diff = (strike - target).abs() / target;
        let delta = if relative_diff < 0.20 {
            entry.call_delta
        } else {
            None
        };

        Some(StrikeLookup {
            iv: entry.call_iv,
            delta,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrikeLookup {
    pub iv: f64,
    pub delta: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn strike(call_iv: f64, call_delta: Option<f64>) -> PerStrikeIv {
        PerStrikeIv {
            call_iv,
            call_delta,
            put_iv: call_iv,
            put_delta: None,
            expiry: Utc::now(),
            days_to_expiry: 7,
        }
    }

    #[test]
    fn default_surface_has_no_per_strike_entries() {
        let surface = IvSurface::default_for(Symbol::Sol, dec!(150));
        assert!(surface.is_default());
        assert_eq!(surface.atm_iv, Symbol::Sol.default_vol());
    }

    #[test]
    fn iv_for_strike_drops_delta_when_strike_is_far_from_target() {
        let mut surface = IvSurface::default_for(Symbol::Btc, dec!(100_000));
        surface.per_strike.insert("50000".to_string(), strike(0.6, Some(0.3)));
        let lookup = surface.iv_for_strike(dec!(100_000)).unwrap();
        assert_eq!(lookup.iv, 0.6);
        assert_eq!(lookup.delta, None);
    }

    #[test]
    fn iv_for_strike_keeps_delta_when_strike_is_close_to_target() {
        let mut surface = IvSurface::default_for(Symbol::Btc, dec!(100_000));
        surface.per_strike.insert("95000".to_string(), strike(0.55, Some(0.4)));
        let lookup = surface.iv_for_strike(dec!(100_000)).unwrap();
        assert_eq!(lookup.delta, Some(0.4));
    }

    #[test]
    fn market_snapshot_detects_resolved_markets() {
        let claim = CryptoClaim {
            market_id: "m1".into(),
            question: "q".into(),
            symbol: Symbol::Btc,
            target_price: dec!(100_000),
            expiry: Utc::now(),
            bet_type: super::super::claim::BetType::Binary,
            direction: super::super::claim::Direction::Above,
        };
        let snapshot = MarketSnapshot {
            claim,
            polymarket_prob: Decimal::ONE,
            yes_token_id: "y".into(),
            no_token_id: "n".into(),
            volume_24h: dec!(0),
        };
        assert!(snapshot.is_resolved());
    }
}
