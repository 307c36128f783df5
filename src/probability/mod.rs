//! Pure, side-effect-free probability machinery. No I/O, no
//! `self` over shared state — every function takes plain values and
//! returns plain values.

use crate::domain::{BetType, Direction};

/// Standard normal CDF via the Abramowitz–Stegun 7.1.26 rational
/// approximation (max error ≤ 7.5e-8).
pub fn normal_cdf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs() / std::f64::consts::SQRT_2;

    let a1 = 0.254_829_592;
    let a2 = -0.284_496_736;
    let a3 = 1.421_413_741;
    let a4 = -1.453_152_027;
    let a5 = 1.061_405_429;
    let p = 0.327_591_1;

    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();

    0.5 * (1.0 + sign * y)
}

/// `z = ln(K/S) / (σ·√T)`. Undefined inputs (σ or T
/// non-positive) collapse to ±∞ by the sign of `(K-S)`, matching the
/// spec's "undefined inputs" clause.
pub fn z_score(spot: f64, target: f64, sigma: f64, time_years: f64) -> f64 {
    if sigma <= 0.0 || time_years <= 0.0 || spot <= 0.0 || target <= 0.0 {
        return if target >= spot {
            f64::INFINITY
        } else {
            f64::NEG_INFINITY
        };
    }
    (target / spot).ln() / (sigma * time_years.sqrt())
}

/// `P(S_T > K) = 1 - Φ(z)`; for `direction = below`, report `1 - P(above)`
///.
pub fn binary_probability(spot: f64, target: f64, sigma: f64, time_years: f64, direction: Direction) -> f64 {
    let z = z_score(spot, target, sigma, time_years);
    let p_above = 1.0 - normal_cdf(z);
    match direction {
        Direction::Above => p_above,
        Direction::Below => 1.0 - p_above,
    }
}

/// `q = P(above) if K>S else P(below)`; `min(1, 2q)`. Used
/// identically regardless of the source of σ.
pub fn one_touch_probability(spot: f64, target: f64, sigma: f64, time_years: f64) -> f64 {
    let direction = if target > spot { Direction::Above } else { Direction::Below };
    let q = binary_probability(spot, target, sigma, time_years, direction);
    (2.0 * q).min(1.0)
}

/// Black–Scholes call delta `Φ(d1)`, `d1 = [ln(S/K) + 0.5σ²T] / (σ√T)`,
/// risk-free rate = 0 by design.
pub fn call_delta(spot: f64, strike: f64, sigma: f64, time_years: f64) -> f64 {
    if sigma <= 0.0 || time_years <= 0.0 || spot <= 0.0 || strike <= 0.0 {
        return if spot >= strike { 1.0 } else { 0.0 };
    }
    let d1 = ((spot / strike).ln() + 0.5 * sigma * sigma * time_years) / (sigma * time_years.sqrt());
    normal_cdf(d1)
}

/// `P = clamp(spreadPrice/strikeWidth, 0, 1)`. Present for
/// completeness, not used by the main pipeline.
pub fn vertical_spread_probability(spread_price: f64, strike_width: f64) -> f64 {
    if strike_width <= 0.0 {
        return 0.0;
    }
    (spread_price / strike_width).clamp(0.0, 1.0)
}

/// Result of the options-delta method. `None` when the
/// engine's output would sit at the `{0,1}` boundary — callers require
/// `P ∈ (0,1)` strictly or "no estimate".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptionsDeltaResult {
    pub probability: f64,
    pub base_delta: f64,
    pub d1: f64,
}

/// Options-delta method: given σ from `ivForStrike` and the
/// bet's direction/type, compute the model probability from the call
/// delta rather than the z-score.
pub fn options_delta_probability(
    spot: f64,
    strike: f64,
    call_delta_value: f64,
    sigma: f64,
    time_years: f64,
    bet_type: BetType,
    direction: Direction,
) -> Option<OptionsDeltaResult> {
    let d1 = if sigma > 0.0 && time_years > 0.0 && spot > 0.0 && strike > 0.0 {
        ((spot / strike).ln() + 0.5 * sigma * sigma * time_years) / (sigma * time_years.sqrt())
    } else {
        0.0
    };

    let probability = match bet_type {
        BetType::Binary => match direction {
            Direction::Above => call_delta_value,
            Direction::Below => 1.0 - call_delta_value,
        },
        BetType::OneTouch => {
            let base = if strike > spot {
                call_delta_value
            } else {
                1.0 - call_delta_value
            };
            (2.0 * base).min(1.0)
        }
    };

    if probability <= 0.0 || probability >= 1.0 {
        return None;
    }

    Some(OptionsDeltaResult {
        probability,
        base_delta: call_delta_value,
        d1,
    })
}

/// `edge = polymarketProb - modelProb`.
pub fn edge(polymarket_prob: f64, model_prob: f64) -> f64 {
    polymarket_prob - model_prob
}

/// signal = neutral if |edge|<0.03, else sell if edge>0, else buy.
pub fn classify_signal(edge: f64) -> crate::domain::Signal {
    use crate::domain::Signal;
    if edge.abs() < 0.03 {
        Signal::Neutral
    } else if edge > 0.0 {
        Signal::Sell
    } else {
        Signal::Buy
    }
}

/// confidence = high if |edge|>0.10, medium if >0.05, else low.
pub fn classify_confidence(edge: f64) -> crate::domain::Confidence {
    use crate::domain::Confidence;
    let magnitude = edge.abs();
    if magnitude > 0.10 {
        Confidence::High
    } else if magnitude > 0.05 {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn normal_cdf_is_monotone_and_symmetric(z in -6.0f64..6.0) {
            let direct = normal_cdf(z);
            let complement = normal_cdf(-z);
            prop_assert!((direct + complement - 1.0).abs() < 1e-6);
            prop_assert!(direct >= 0.0 && direct <= 1.0);
        }

        #[test]
        fn z_score_probability_is_symmetric_under_swap(
            s in 1.0f64..1_000_000.0,
            k in 1.0f64..1_000_000.0,
            sigma in 0.01f64..5.0,
            t in 0.01f64..5.0,
        ) {
            let p1 = binary_probability(s, k, sigma, t, Direction::Above);
            let p2 = binary_probability(k, s, sigma, t, Direction::Above);
            prop_assert!((p1 + p2 - 1.0).abs() < 1e-6);
        }

        #[test]
        fn one_touch_bounds_hold(
            s in 1.0f64..1_000_000.0,
            k in 1.0f64..1_000_000.0,
            sigma in 0.01f64..5.0,
            t in 0.01f64..5.0,
        ) {
            let direction = if k > s { Direction::Above } else { Direction::Below };
            let binary = binary_probability(s, k, sigma, t, direction);
            let touch = one_touch_probability(s, k, sigma, t);
            prop_assert!(touch >= binary - 1e-9);
            prop_assert!(touch <= (2.0 * binary).min(1.0) + 1e-9);
        }

        #[test]
        fn signal_classification_has_non_overlapping_bands(e in -1.0f64..1.0) {
            let signal = classify_signal(e);
            let confidence = classify_confidence(e);
            match signal {
                crate::domain::Signal::Neutral => prop_assert!(e.abs() < 0.03),
                crate::domain::Signal::Sell => prop_assert!(e > 0.0),
                crate::domain::Signal::Buy => prop_assert!(e < 0.0),
            }
            let magnitude = e.abs();
            match confidence {
                crate::domain::Confidence::High => prop_assert!(magnitude > 0.10),
                crate::domain::Confidence::Medium => prop_assert!(magnitude > 0.05 && magnitude <= 0.10),
                crate::domain::Confidence::Low => prop_assert!(magnitude <= 0.05),
            }
        }
    }
}
