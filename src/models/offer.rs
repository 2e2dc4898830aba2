//! Offers and the per-session append-only offer history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Actor {
    Buyer,
    Seller,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offer {
    pub round: u32,
    pub actor: Actor,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    /// Signed change relative to this actor's previous offer; 0 if none.
    #[serde(default)]
    pub concession_delta: f64,
    #[serde(default)]
    pub message: String,
}

impl Offer {
    pub fn new(round: u32, actor: Actor, price: f64) -> Self {
        Self {
            round,
            actor,
            price,
            timestamp: Utc::now(),
            concession_delta: 0.0,
            message: String::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_delta(mut self, delta: f64) -> Self {
        self.concession_delta = delta;
        self
    }
}

/// Append-only sequence of offers for one session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OfferHistory {
    pub offers: Vec<Offer>,
}

impl OfferHistory {
    pub fn add(&mut self, offer: Offer) {
        self.offers.push(offer);
    }

    pub fn last_buyer_offer(&self) -> Option<&Offer> {
        self.offers.iter().rev().find(|o| o.actor == Actor::Buyer)
    }

    pub fn last_seller_offer(&self) -> Option<&Offer> {
        self.offers.iter().rev().find(|o| o.actor == Actor::Seller)
    }

    pub fn buyer_offers(&self) -> impl Iterator<Item = &Offer> {
        self.offers.iter().filter(|o| o.actor == Actor::Buyer)
    }

    pub fn seller_offers(&self) -> impl Iterator<Item = &Offer> {
        self.offers.iter().filter(|o| o.actor == Actor::Seller)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_accessors() {
        let mut h = OfferHistory::default();
        h.add(Offer::new(0, Actor::Seller, 1000.0).with_message("Opening offer"));
        h.add(Offer::new(1, Actor::Buyer, 600.0));
        h.add(Offer::new(1, Actor::Seller, 950.0).with_delta(-50.0));
        h.add(Offer::new(2, Actor::Buyer, 700.0).with_delta(100.0));

        assert_eq!(h.last_buyer_offer().unwrap().price, 700.0);
        assert_eq!(h.last_seller_offer().unwrap().price, 950.0);
        assert_eq!(h.buyer_offers().count(), 2);
        assert_eq!(h.seller_offers().count(), 2);
        assert_eq!(h.offers.len(), 4);
    }
}
