use thiserror::Error;

/// Crate-wide error taxonomy. Every fallible public
/// function returns `Result<T>`.
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Question is not a crypto price market; expected and silent.
    #[error("Unparseable question: {0}")]
    ParseRejected(String),

    /// Symbol has no quote this cycle; skip the opportunity, keep positions.
    #[error("No spot price for symbol: {symbol}")]
    NoSpotPrice { symbol: String },

    /// Upstream rate limiting; cycle aborts cleanly, next cycle delayed.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Order rejected or network failure while submitting; no state mutation.
    #[error("Order execution failed: {0}")]
    ExecutorFailed(String),

    /// Persisted state file unreadable on startup. Never overwrite.
    #[error("State file corrupted: {0}")]
    StateCorruption(String),

    /// 5xx/timeout/connection error that exhausted its retry budget.
    #[error("Transient network failure: {0}")]
    TransientNetwork(String),

    #[error("Invalid market data: {0}")]
    InvalidMarketData(String),

    #[error("Signature error: {0}")]
    Signature(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, BotError>;

impl BotError {
    /// False only for `StateCorruption`: every other variant is handled
    /// locally within a cycle per the recovery policy (§7).
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, BotError::StateCorruption(_))
    }

    pub fn taxonomy_label(&self) -> &'static str {
        match self {
            BotError::ParseRejected(_) => "parse-rejected",
            BotError::NoSpotPrice { .. } => "no-spot-price",
            BotError::RateLimited(_) => "rate-limited",
            BotError::ExecutorFailed(_) => "executor-failed",
            BotError::StateCorruption(_) => "state-corruption",
            BotError::TransientNetwork(_) => "transient-network",
            _ => "other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_corruption_is_the_only_unrecoverable_variant() {
        assert!(!BotError::StateCorruption("bad json".into()).is_recoverable());
        assert!(BotError::RateLimited("429".into()).is_recoverable());
        assert!(BotError::ExecutorFailed("rejected".into()).is_recoverable());
    }

    #[test]
    fn taxonomy_label_matches_error_kind() {
        assert_eq!(
            BotError::NoSpotPrice { symbol: "BTC".into() }.taxonomy_label(),
            "no-spot-price"
        );
    }
}
