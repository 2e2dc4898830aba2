//! Catalogue product with the derived negotiation band.

use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::models::round2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: String,
    /// Listing / sticker price the seller opens with.
    pub anchor_price: f64,
    /// Base cost to the seller.
    pub cost_price: f64,
    /// Minimum margin fraction, e.g. 0.05 for 5%.
    pub min_margin: f64,
    /// Target margin fraction, e.g. 0.30 for 30%.
    pub target_margin: f64,
}

impl Product {
    /// Validate the price logic invariants. Call before a product enters the
    /// catalogue; stored products are assumed valid.
    pub fn validate(&self) -> Result<(), ServiceError> {
        if !(self.anchor_price.is_finite() && self.anchor_price > 0.0) {
            return Err(ServiceError::InvalidInput(
                "anchor_price must be a positive finite number".into(),
            ));
        }
        if !(self.cost_price.is_finite() && self.cost_price > 0.0) {
            return Err(ServiceError::InvalidInput(
                "cost_price must be a positive finite number".into(),
            ));
        }
        if self.cost_price >= self.anchor_price {
            return Err(ServiceError::InvalidInput(
                "cost_price must be less than anchor_price".into(),
            ));
        }
        for (name, margin) in [("min_margin", self.min_margin), ("target_margin", self.target_margin)] {
            if !(margin > 0.0 && margin <= 1.0) {
                return Err(ServiceError::InvalidInput(format!(
                    "{name} must be in (0, 1]"
                )));
            }
        }
        if self.min_margin > self.target_margin {
            return Err(ServiceError::InvalidInput(
                "min_margin must not exceed target_margin".into(),
            ));
        }
        Ok(())
    }

    /// Floor price = cost * (1 + min_margin). Never sell below this.
    pub fn reservation_price(&self) -> f64 {
        round2(self.cost_price * (1.0 + self.min_margin))
    }

    /// Ideal selling price = cost * (1 + target_margin).
    pub fn target_price(&self) -> f64 {
        round2(self.cost_price * (1.0 + self.target_margin))
    }

    /// (reservation_price, anchor_price), the negotiable range.
    pub fn zopa_range(&self) -> (f64, f64) {
        (self.reservation_price(), self.anchor_price)
    }
}
