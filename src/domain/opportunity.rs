use super::market::{IvSurface, MarketSnapshot, SpotPrice};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProbabilityMethod {
    Zscore,
    OptionsDelta,
    VerticalSpread,
}

/// The output of the probability engine for a single claim.
/// `auditTrail` is advisory, not load-bearing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityEstimate {
    pub method: ProbabilityMethod,
    pub probability: f64,
    pub volatility_used: f64,
    pub time_to_expiry: f64,
    pub z_score: Option<f64>,
    pub delta: Option<f64>,
    pub audit_trail: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Buy,
    Sell,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// A ranked trading candidate produced by the Opportunity Pipeline.
/// Ranked by `max(|edge_delta|, |edge_z|)` descending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub snapshot: MarketSnapshot,
    pub spot: SpotPrice,
    pub iv_surface: Option<IvSurface>,
    pub zscore_estimate: ProbabilityEstimate,
    pub delta_estimate: Option<ProbabilityEstimate>,
    pub edge_z: Decimal,
    pub edge_delta: Option<Decimal>,
    pub signal: Signal,
    pub confidence: Confidence,
}

impl Opportunity {
    /// `max(|edgeDelta|, |edgeZ|)`.
    pub fn ranking_edge(&self) -> Decimal {
        let z = self.edge_z.abs();
        match self.edge_delta {
            Some(d) => z.max(d.abs()),
            None => z,
        }
    }

    /// `effectiveEdge = edgeDelta if present else edgeZ`, used by the entry
    /// gates.
    pub fn effective_edge(&self) -> Decimal {
        self.edge_delta.unwrap_or(self.edge_z)
    }
}
