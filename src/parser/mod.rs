//! Deterministically converts a free-text market question into a typed
//! `CryptoClaim` or rejects it. Table-driven per Design Notes
//! §9: the disqualifying patterns, symbol patterns, and date patterns are
//! data, not control flow, so ordering bugs like "ETH" matching inside
//! "MegaETH" can't creep back in silently.

use crate::domain::{BetType, CryptoClaim, Direction, Symbol};
use crate::error::{BotError, Result};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::LazyLock;

/// Step 1: disqualifying phrases. Checked before symbol detection so that
/// "MegaETH" never reaches the ETH symbol regex.
static DISQUALIFYING_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)market\s*cap", r"(?i)\bfdv\b", r"(?i)\btvl\b", r"(?i)\bmcap\b",
        r"(?i)dominance", r"(?i)\bfees?\b", r"(?i)\bgas\b", r"(?i)staking",
        r"(?i)airdrop", r"(?i)\betf\b", r"(?i)halving", r"(?i)wrapped",
        r"(?i)staked", r"(?i)megaeth",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("disqualifying pattern must compile"))
    .collect()
});

/// Step 2: ordered `(regex, symbol)` pairs; first match wins.
static SYMBOL_PATTERNS: LazyLock<Vec<(Regex, Symbol)>> = LazyLock::new(|| {
    vec![
        (Regex::new(r"(?i)\bbitcoin\b|\bbtc\b").unwrap(), Symbol::Btc),
        (Regex::new(r"(?i)\bethereum\b|\beth\b").unwrap(), Symbol::Eth),
        (Regex::new(r"(?i)\bsolana\b|\bsol\b").unwrap(), Symbol::Sol),
        (Regex::new(r"(?i)\bripple\b|\bxrp\b").unwrap(), Symbol::Xrp),
        (Regex::new(r"(?i)\bdogecoin\b|\bdoge\b").unwrap(), Symbol::Doge),
    ]
});

static PRICE_INTENT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)price|hit|reach|above|below|exceed|surpass|over|under|dip|\$").unwrap()
});

/// Step 4: four price-extraction patterns, tried in order.
static PRICE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"\$\s*([0-9][0-9,]*(?:\.[0-9]+)?)\s*[kK]\b").unwrap(),
        Regex::new(r"([0-9][0-9,]*(?:\.[0-9]+)?)\s*thousand").unwrap(),
        Regex::new(r"\$\s*([0-9][0-9,]*(?:\.[0-9]+)?)").unwrap(),
        Regex::new(r"([0-9][0-9,]*(?:\.[0-9]+)?)\s*(?:dollars|usd)\b").unwrap(),
    ]
});

static ONE_TOUCH_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bhit\b|\breach\b|\btouch\b|\bsurpass\b|\bexceed\b|\bdip\b|\bdrop\b|\bcrash\b").unwrap()
});

static BELOW_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bbelow\b|\bunder\b|less\s+than|\bfall\b|\bdip\b|\bdrop\b|\bcrash\b|\bsink\b|\bplunge\b|\bdecline\b",
    )
    .unwrap()
});

static MONTH_DAY_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(January|February|March|April|May|June|July|August|September|October|November|December)\s+(\d{1,2}),?\s+(\d{4})").unwrap()
});
static DAY_MONTH_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d{1,2})\s+(January|February|March|April|May|June|July|August|September|October|November|December)\s+(\d{4})").unwrap()
});
static SLASH_DATE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d{1,2})/(\d{1,2})/(\d{4})").unwrap());
static BY_END_OF_YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)by\s+(?:end\s+of\s+)?(\d{4})").unwrap());
static BEFORE_YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)before\s+(\d{4})").unwrap());
static IN_YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bin\s+(\d{4})").unwrap());

pub struct QuestionParser;

impl QuestionParser {
    /// Parses `question` into a `CryptoClaim`, or rejects with
    /// `BotError::ParseRejected`. `market_end_hint` is used as an expiry
    /// fallback per step 7.
    pub fn parse(
        market_id: &str,
        question: &str,
        market_end_hint: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<CryptoClaim> {
        if DISQUALIFYING_PATTERNS.iter().any(|re| re.is_match(question)) {
            return Err(BotError::ParseRejected(format!(
                "disqualifying pattern matched in: {question}"
            )));
        }

        let symbol = SYMBOL_PATTERNS
            .iter()
            .find(|(re, _)| re.is_match(question))
            .map(|(_, sym)| *sym)
            .ok_or_else(|| BotError::ParseRejected("no crypto symbol detected".to_string()))?;

        if !PRICE_INTENT_PATTERN.is_match(question) {
            return Err(BotError::ParseRejected("no price-intent keyword".to_string()));
        }

        let target_price = Self::extract_price(question)
            .ok_or_else(|| BotError::ParseRejected("no target price extracted".to_string()))?;

        let bet_type = if ONE_TOUCH_KEYWORDS.is_match(question) {
            BetType::OneTouch
        } else {
            BetType::Binary
        };

        let direction = if BELOW_KEYWORDS.is_match(question) {
            Direction::Below
        } else {
            Direction::Above
        };

        let expiry = Self::extract_expiry(question)
            .or(market_end_hint)
            .ok_or_else(|| BotError::ParseRejected("no expiry found and no market end hint".to_string()))?;

        if expiry <= now {
            return Err(BotError::ParseRejected("expiry is in the past".to_string()));
        }

        Ok(CryptoClaim {
            market_id: market_id.to_string(),
            question: question.to_string(),
            symbol,
            target_price,
            expiry,
            bet_type,
            direction,
        })
    }

    fn extract_price(question: &str) -> Option<Decimal> {
        for (i, pattern) in PRICE_PATTERNS.iter().enumerate() {
            if let Some(caps) = pattern.captures(question) {
                let raw = caps.get(1)?.as_str().replace(',', "");
                let mut value = Decimal::from_str(&raw).ok()?;
                // patterns 0 ("$N k") and 1 ("N thousand") multiply by 1000
                if i == 0 || i == 1 {
                    value *= Decimal::from(1000);
                }
                return Some(value);
            }
        }
        None
    }

    fn extract_expiry(question: &str) -> Option<DateTime<Utc>> {
        if let Some(caps) = MONTH_DAY_YEAR.captures(question) {
            let month = month_number(&caps[1])?;
            let day: u32 = caps[2].parse().ok()?;
            let year: i32 = caps[3].parse().ok()?;
            return end_of_day(year, month, day);
        }
        if let Some(caps) = DAY_MONTH_YEAR.captures(question) {
            let day: u32 = caps[1].parse().ok()?;
            let month = month_number(&caps[2])?;
            let year: i32 = caps[3].parse().ok()?;
            return end_of_day(year, month, day);
        }
        if let Some(caps) = SLASH_DATE.captures(question) {
            let month: u32 = caps[1].parse().ok()?;
            let day: u32 = caps[2].parse().ok()?;
            let year: i32 = caps[3].parse().ok()?;
            return end_of_day(year, month, day);
        }
        if let Some(caps) = BY_END_OF_YEAR.captures(question) {
            let year: i32 = caps[1].parse().ok()?;
            return end_of_day(year, 12, 31);
        }
        if let Some(caps) = BEFORE_YEAR.captures(question) {
            let year: i32 = caps[1].parse().ok()?;
            return end_of_day(year - 1, 12, 31);
        }
        if let Some(caps) = IN_YEAR.captures(question) {
            let year: i32 = caps[1].parse().ok()?;
            return end_of_day(year, 12, 31);
        }
        None
    }
}

fn month_number(name: &str) -> Option<u32> {
    let months = [
        "january", "february", "march", "april", "may", "june", "july", "august", "september",
        "october", "november", "december",
    ];
    months
        .iter()
        .position(|m| m.eq_ignore_ascii_case(name))
        .map(|i| i as u32 + 1)
}

fn end_of_day(year: i32, month: u32, day: u32) -> Option<DateTime<Utc>> {
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let naive = date.and_hms_opt(23, 59, 59)?;
    Some(Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_s4_parser_acceptance() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let claim = QuestionParser::parse(
            "m1",
            "Will Bitcoin hit $200k by December 31, 2025?",
            None,
            now,
        )
        .unwrap();
        assert_eq!(claim.symbol, Symbol::Btc);
        assert_eq!(claim.target_price, Decimal::from(200_000));
        assert_eq!(claim.bet_type, BetType::OneTouch);
        assert_eq!(claim.direction, Direction::Above);
        assert_eq!(claim.expiry, Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 59).unwrap());
    }

    #[test]
    fn scenario_s5_parser_rejection() {
        let now = Utc::now();
        let result = QuestionParser::parse("m2", "MegaETH market cap above $5B in 2026", None, now);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_eth_match_inside_megaeth_name() {
        // Without the disqualifying-pattern check firing first, "ETH" would
        // match inside "MegaETH" — reject handles this via rule 1, not by
        // special-casing the symbol regex.
        let now = Utc::now();
        let result = QuestionParser::parse("m3", "Will MegaETH reach $10 in 2026?", None, now);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_expired_claims() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let result = QuestionParser::parse("m4", "Will Bitcoin hit $200k by December 31, 2025?", None, now);
        assert!(result.is_err());
    }

    #[test]
    fn falls_back_to_market_end_hint_when_no_expiry_in_text() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let hint = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let claim = QuestionParser::parse("m5", "Will Ethereum price exceed $5000?", Some(hint), now).unwrap();
        assert_eq!(claim.expiry, hint);
        assert_eq!(claim.symbol, Symbol::Eth);
    }

    #[test]
    fn detects_below_direction_keywords() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let claim = QuestionParser::parse(
            "m6",
            "Will Solana fall below $80 before 2026?",
            None,
            now,
        )
        .unwrap();
        assert_eq!(claim.direction, Direction::Below);
        assert_eq!(claim.symbol, Symbol::Sol);
        // "before YYYY" effective year is YYYY-1
        assert_eq!(claim.expiry, Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 59).unwrap());
    }
}
