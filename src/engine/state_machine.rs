//! SAO (Stacked Alternating Offers) state machine.
//!
//! States: IDLE -> PROPOSING -> RESPONDING -> { AGREED | BROKEN | TIMED_OUT }
//!
//! Orchestrates the concession curve and TFT reciprocity into a unified
//! negotiation strategy. Every counter it produces satisfies
//! reservation <= counter <= previous seller price <= anchor.

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;

use crate::engine::concession::compute_offer;
use crate::engine::reciprocity::ReciprocityTracker;
use crate::engine::validator::{validate_price, ValidatedPrice};
use crate::models::{round2, Actor, NegotiationSession, NegotiationState, Offer};

/// Share of |anchor - reservation| the TFT mirror may concede per round.
const MAX_CONCESSION_SHARE: f64 = 0.1;
/// One-shot concession offered to a departing buyer.
const WALK_AWAY_CONCESSION_PCT: f64 = 0.05;
const TRACKER_WINDOW: usize = 3;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EngineError {
    #[error("buyer_price must be a finite number")]
    NonFiniteBuyerPrice,
    #[error("buyer_price must be positive")]
    NonPositiveBuyerPrice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tactic {
    Opening,
    Accept,
    HoldFirm,
    MinorConcession,
    Concession,
    MajorConcession,
    TimeoutFinal,
    WalkAwaySave,
    WalkAwayFailed,
    QuantityPivot,
}

impl Tactic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tactic::Opening => "opening",
            Tactic::Accept => "accept",
            Tactic::HoldFirm => "hold_firm",
            Tactic::MinorConcession => "minor_concession",
            Tactic::Concession => "concession",
            Tactic::MajorConcession => "major_concession",
            Tactic::TimeoutFinal => "timeout_final",
            Tactic::WalkAwaySave => "walk_away_save",
            Tactic::WalkAwayFailed => "walk_away_failed",
            Tactic::QuantityPivot => "quantity_pivot",
        }
    }
}

/// Structured extras attached to a turn result.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle_total: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_applied: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_discount: Option<f64>,
}

/// Output of a single negotiation turn.
#[derive(Debug, Clone)]
pub struct EngineResult {
    pub counter_price: f64,
    pub state: NegotiationState,
    pub tactic: Tactic,
    pub acceptance_threshold_met: bool,
    pub validation: Option<ValidatedPrice>,
    pub metadata: EngineMetadata,
}

impl EngineResult {
    fn new(counter_price: f64, state: NegotiationState, tactic: Tactic) -> Self {
        Self {
            counter_price,
            state,
            tactic,
            acceptance_threshold_met: false,
            validation: None,
            metadata: EngineMetadata::default(),
        }
    }
}

/// Core SAO negotiation engine. Borrows the session exclusively for the
/// duration of one turn.
pub struct NegotiationEngine<'a> {
    session: &'a mut NegotiationSession,
    tracker: ReciprocityTracker,
}

impl<'a> NegotiationEngine<'a> {
    pub fn new(session: &'a mut NegotiationSession) -> Self {
        let max_concession =
            (session.anchor_price - session.reservation_price).abs() * MAX_CONCESSION_SHARE;
        let mut tracker = ReciprocityTracker::new(session.alpha, max_concession, TRACKER_WINDOW);
        // Replay buyer history into the tracker
        for price in session
            .offer_history
            .buyer_offers()
            .map(|o| o.price)
            .collect::<Vec<_>>()
        {
            tracker.record_buyer_offer(price);
        }
        Self { session, tracker }
    }

    /// Begin negotiation: the seller opens with the anchor price.
    pub fn start_negotiation(&mut self) -> EngineResult {
        let s = &mut *self.session;
        s.state = NegotiationState::Proposing;
        s.current_round = 0;
        s.current_seller_price = s.anchor_price;
        s.updated_at = Utc::now();

        let anchor = s.anchor_price;
        s.offer_history
            .add(Offer::new(0, Actor::Seller, anchor).with_message("Opening offer"));

        EngineResult::new(anchor, NegotiationState::Proposing, Tactic::Opening)
    }

    /// Process an incoming buyer offer and generate a counter.
    pub fn process_buyer_offer(&mut self, buyer_price: f64) -> Result<EngineResult, EngineError> {
        if !buyer_price.is_finite() {
            return Err(EngineError::NonFiniteBuyerPrice);
        }
        if buyer_price <= 0.0 {
            return Err(EngineError::NonPositiveBuyerPrice);
        }

        let s = &mut *self.session;
        s.current_round += 1;
        s.state = NegotiationState::Responding;
        s.updated_at = Utc::now();

        // Record the buyer offer before any accept/timeout decision
        let prev_buyer = s.offer_history.last_buyer_offer().map(|o| o.price);
        let mut buyer_offer = Offer::new(s.current_round, Actor::Buyer, buyer_price);
        if let Some(prev) = prev_buyer {
            buyer_offer.concession_delta = buyer_price - prev;
        }
        s.offer_history.add(buyer_offer);
        self.tracker.record_buyer_offer(buyer_price);

        let s = &mut *self.session;
        let base_price = compute_offer(
            s.anchor_price,
            s.reservation_price,
            s.current_round,
            s.max_rounds,
            s.beta,
            0.0,
        );

        // Acceptance: buyer offered at or above our current willingness
        if buyer_price >= base_price {
            s.state = NegotiationState::Agreed;
            s.agreed_price = Some(buyer_price);
            s.updated_at = Utc::now();
            let mut result =
                EngineResult::new(buyer_price, NegotiationState::Agreed, Tactic::Accept);
            result.acceptance_threshold_met = true;
            return Ok(result);
        }

        // Deadline: last-ditch reservation offer, then stop
        if s.current_round >= s.max_rounds {
            s.state = NegotiationState::TimedOut;
            s.updated_at = Utc::now();
            return Ok(EngineResult::new(
                s.reservation_price,
                NegotiationState::TimedOut,
                Tactic::TimeoutFinal,
            ));
        }

        // Counter: time-curve base with a TFT perturbation, never rising
        // above the previous seller price
        let prev_seller = s.current_seller_price;
        let tft_price = prev_seller - self.tracker.compute_ai_concession();
        let counter = validate_price(
            prev_seller.min(base_price.max(tft_price)),
            s.reservation_price,
            s.anchor_price,
        );

        s.offer_history.add(
            Offer::new(s.current_round, Actor::Seller, counter.price)
                .with_delta(prev_seller - counter.price)
                .with_message("counter"),
        );
        s.current_seller_price = counter.price;

        let tactic = classify_tactic(
            prev_seller,
            counter.price,
            s.anchor_price,
            s.reservation_price,
        );

        let mut result = EngineResult::new(counter.price, NegotiationState::Responding, tactic);
        result.validation = Some(counter);
        Ok(result)
    }

    /// Buyer signalled exit intent: the one-shot "digital flounce" save.
    /// Concede 5% if that stays inside the ZOPA, otherwise let them go.
    /// Does not consume a round.
    pub fn handle_walk_away(&mut self) -> EngineResult {
        let s = &mut *self.session;
        let current = effective_seller_price(s);
        let new_price = current * (1.0 - WALK_AWAY_CONCESSION_PCT);

        if new_price < s.reservation_price {
            s.state = NegotiationState::Broken;
            s.updated_at = Utc::now();
            return EngineResult::new(
                s.reservation_price,
                NegotiationState::Broken,
                Tactic::WalkAwayFailed,
            );
        }

        let validated = validate_price(new_price, s.reservation_price, s.anchor_price);

        s.offer_history.add(
            Offer::new(s.current_round, Actor::Seller, validated.price)
                .with_delta(current - validated.price)
                .with_message("walk_away_save"),
        );
        s.current_seller_price = validated.price;
        s.updated_at = Utc::now();

        let mut result = EngineResult::new(
            validated.price,
            NegotiationState::Responding,
            Tactic::WalkAwaySave,
        );
        result.validation = Some(validated);
        result
    }

    /// Price talk is stuck: pivot to quantity bargaining. Leaves state and
    /// round untouched; the caller decides whether to surface the bundle.
    pub fn handle_quantity_pivot(&mut self, quantity: u32, discount_per_unit: f64) -> EngineResult {
        let s = &mut *self.session;
        let quantity = quantity.max(2);

        let unit_price = effective_seller_price(s);
        let total_discount = discount_per_unit * (quantity - 1) as f64;
        let bundle_unit_price = unit_price - total_discount / quantity as f64;

        let validated = validate_price(bundle_unit_price, s.reservation_price, s.anchor_price);

        let mut result = EngineResult::new(validated.price, s.state, Tactic::QuantityPivot);
        result.metadata.quantity = Some(quantity);
        result.metadata.bundle_total = Some(round2(validated.price * quantity as f64));
        result.validation = Some(validated);
        result
    }
}

fn effective_seller_price(s: &NegotiationSession) -> f64 {
    if s.current_seller_price > 0.0 {
        s.current_seller_price
    } else {
        s.anchor_price
    }
}

/// Classify the tactic from the drop relative to the full negotiation range,
/// measured against the seller price before this counter was applied.
fn classify_tactic(prev_seller: f64, counter: f64, anchor: f64, reservation: f64) -> Tactic {
    let total_range = anchor - reservation;
    if total_range == 0.0 {
        return Tactic::HoldFirm;
    }
    let drop_pct = (prev_seller - counter) / total_range;
    if drop_pct < 0.01 {
        Tactic::HoldFirm
    } else if drop_pct < 0.05 {
        Tactic::MinorConcession
    } else if drop_pct < 0.15 {
        Tactic::Concession
    } else {
        Tactic::MajorConcession
    }
}
