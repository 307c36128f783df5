use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Crypto symbols the parser and providers understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Symbol {
    Btc,
    Eth,
    Sol,
    Xrp,
    Doge,
}

impl Symbol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Symbol::Btc => "BTC",
            Symbol::Eth => "ETH",
            Symbol::Sol => "SOL",
            Symbol::Xrp => "XRP",
            Symbol::Doge => "DOGE",
        }
    }

    /// Whether the options exchange carries a chain for this symbol
    ///.
    pub fn has_options_chain(&self) -> bool {
        matches!(self, Symbol::Btc | Symbol::Eth)
    }

    /// Hard-coded fallback volatility used when no options surface is
    /// available.
    pub fn default_vol(&self) -> f64 {
        match self {
            Symbol::Btc => 0.55,
            Symbol::Eth => 0.65,
            Symbol::Sol => 0.85,
            Symbol::Xrp => 0.90,
            Symbol::Doge => 1.10,
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BetType {
    Binary,
    OneTouch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Above,
    Below,
}

impl Direction {
    pub fn opposite(&self) -> Direction {
        match self {
            Direction::Above => Direction::Below,
            Direction::Below => Direction::Above,
        }
    }
}

/// A deterministically parsed crypto price-target claim.
/// Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CryptoClaim {
    pub market_id: String,
    pub question: String,
    pub symbol: Symbol,
    pub target_price: rust_decimal::Decimal,
    pub expiry: DateTime<Utc>,
    pub bet_type: BetType,
    pub direction: Direction,
}

impl CryptoClaim {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry <= now
    }

    pub fn days_to_expiry(&self, now: DateTime<Utc>) -> i64 {
        (self.expiry - now).num_seconds() / 86_400
    }

    pub fn time_to_expiry_years(&self, now: DateTime<Utc>) -> f64 {
        let secs = (self.expiry - now).num_seconds() as f64;
        secs / (365.25 * 86_400.0)
    }
}
