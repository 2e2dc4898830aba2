//! Hallucination guardrail: deterministic price validator.
//!
//! Any proposed price, whether from the LLM or from strategy math, is clamped
//! into [reservation, anchor] before it can leave the engine. The validator is
//! a clamp, not a finiteness filter; NaN/infinite buyer input is rejected at
//! the state-machine boundary.

use serde::{Deserialize, Serialize};

use crate::models::round2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatedPrice {
    pub price: f64,
    pub was_overridden: bool,
    pub override_reason: String,
}

pub fn validate_price(proposed: f64, reservation: f64, anchor: f64) -> ValidatedPrice {
    if proposed < reservation {
        return ValidatedPrice {
            price: reservation,
            was_overridden: true,
            override_reason: format!(
                "proposed {proposed} is below floor {reservation}; overridden to floor"
            ),
        };
    }
    if proposed > anchor {
        return ValidatedPrice {
            price: anchor,
            was_overridden: true,
            override_reason: format!(
                "proposed {proposed} exceeds anchor {anchor}; clamped to anchor"
            ),
        };
    }
    ValidatedPrice {
        price: round2(proposed),
        was_overridden: false,
        override_reason: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_range_passes() {
        let v = validate_price(800.0, 700.0, 1000.0);
        assert_eq!(v.price, 800.0);
        assert!(!v.was_overridden);
    }

    #[test]
    fn below_floor_overridden() {
        let v = validate_price(500.0, 700.0, 1000.0);
        assert_eq!(v.price, 700.0);
        assert!(v.was_overridden);
        assert!(v.override_reason.contains("below floor"));
    }

    #[test]
    fn above_anchor_clamped() {
        let v = validate_price(1200.0, 700.0, 1000.0);
        assert_eq!(v.price, 1000.0);
        assert!(v.was_overridden);
        assert!(v.override_reason.contains("exceeds anchor"));
    }

    #[test]
    fn exact_bounds_pass() {
        assert!(!validate_price(700.0, 700.0, 1000.0).was_overridden);
        assert!(!validate_price(1000.0, 700.0, 1000.0).was_overridden);
    }

    #[test]
    fn rounds_to_two_decimals() {
        let v = validate_price(850.456, 700.0, 1000.0);
        assert_eq!(v.price, 850.46);
        assert!(!v.was_overridden);
    }

    #[test]
    fn negative_and_zero_overridden_to_floor() {
        assert_eq!(validate_price(-100.0, 700.0, 1000.0).price, 700.0);
        assert_eq!(validate_price(0.0, 700.0, 1000.0).price, 700.0);
    }

    #[test]
    fn infinities_are_clamped() {
        let v = validate_price(f64::INFINITY, 700.0, 1000.0);
        assert_eq!(v.price, 1000.0);
        assert!(v.was_overridden);

        let v = validate_price(f64::NEG_INFINITY, 700.0, 1000.0);
        assert_eq!(v.price, 700.0);
        assert!(v.was_overridden);
    }

    #[test]
    fn nan_passes_through_unclamped() {
        // NaN compares false against both bounds, so the clamp lets it
        // through. The state machine rejects non-finite input before it can
        // reach here; this documents the division of responsibility.
        let v = validate_price(f64::NAN, 700.0, 1000.0);
        assert!(v.price.is_nan());
    }
}
