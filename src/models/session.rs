//! Negotiation session state.

use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{OfferHistory, Product};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationState {
    Idle,
    Proposing,
    Responding,
    Agreed,
    Broken,
    TimedOut,
}

impl NegotiationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            NegotiationState::Idle => "idle",
            NegotiationState::Proposing => "proposing",
            NegotiationState::Responding => "responding",
            NegotiationState::Agreed => "agreed",
            NegotiationState::Broken => "broken",
            NegotiationState::TimedOut => "timed_out",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NegotiationState::Agreed | NegotiationState::Broken | NegotiationState::TimedOut
        )
    }
}

/// Strategy parameters a session is created with.
#[derive(Debug, Clone, Copy)]
pub struct SessionParams {
    pub beta: f64,
    pub alpha: f64,
    pub max_rounds: u32,
    pub ttl_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationSession {
    pub session_id: String,
    pub transaction_id: String,
    pub product_id: String,
    pub product_name: String,

    // Negotiation parameters
    pub anchor_price: f64,
    pub reservation_price: f64,
    /// Concession exponent (boulware above 1).
    pub beta: f64,
    /// Reciprocity damping.
    pub alpha: f64,
    pub max_rounds: u32,
    pub current_round: u32,
    pub ttl_seconds: u64,

    // State
    pub state: NegotiationState,
    #[serde(default)]
    pub offer_history: OfferHistory,
    pub current_seller_price: f64,
    pub agreed_price: Option<f64>,

    // Security
    pub bot_score: f64,
    #[serde(default)]
    pub buyer_ip: String,
    #[serde(default)]
    pub session_token: String,

    // Timestamps
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl NegotiationSession {
    pub fn new(product: &Product, params: SessionParams, buyer_ip: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4().simple().to_string(),
            transaction_id: Uuid::new_v4().simple().to_string(),
            product_id: product.id.clone(),
            product_name: product.name.clone(),
            anchor_price: product.anchor_price,
            reservation_price: product.reservation_price(),
            beta: params.beta,
            alpha: params.alpha,
            max_rounds: params.max_rounds,
            current_round: 0,
            ttl_seconds: params.ttl_seconds,
            state: NegotiationState::Idle,
            offer_history: OfferHistory::default(),
            current_seller_price: 0.0,
            agreed_price: None,
            bot_score: 0.0,
            buyer_ip: buyer_ip.into(),
            session_token: generate_session_token(),
            created_at: now,
            updated_at: now,
            expires_at: now + Duration::seconds(params.ttl_seconds as i64),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// How far along the deadline we are, 0.0 at round 0 to 1.0 at max_rounds.
    pub fn relative_time(&self) -> f64 {
        if self.max_rounds == 0 {
            return 1.0;
        }
        (self.current_round as f64 / self.max_rounds as f64).clamp(0.0, 1.0)
    }
}

/// 32 random bytes from the OS RNG, hex-encoded: 256 bits of entropy.
pub fn generate_session_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Session ids are uuid4 hex: exactly 32 lowercase hex characters.
pub fn is_valid_session_id(candidate: &str) -> bool {
    candidate.len() == 32
        && candidate
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widget() -> Product {
        Product {
            id: "widget-1".into(),
            name: "Widget".into(),
            category: String::new(),
            anchor_price: 1000.0,
            cost_price: 625.0,
            min_margin: 0.12,
            target_margin: 0.30,
        }
    }

    fn params() -> SessionParams {
        SessionParams {
            beta: 5.0,
            alpha: 0.6,
            max_rounds: 10,
            ttl_seconds: 300,
        }
    }

    #[test]
    fn fresh_session_is_idle_and_addressable() {
        let s = NegotiationSession::new(&widget(), params(), "1.2.3.4");
        assert_eq!(s.state, NegotiationState::Idle);
        assert_eq!(s.current_round, 0);
        assert!(is_valid_session_id(&s.session_id));
        assert_eq!(s.session_token.len(), 64);
        assert_eq!(s.reservation_price, 700.0);
        assert!(!s.is_terminal());
        assert!(s.expires_at > s.created_at);
    }

    #[test]
    fn tokens_are_unique() {
        assert_ne!(generate_session_token(), generate_session_token());
    }

    #[test]
    fn session_id_format() {
        assert!(is_valid_session_id("aabbccdd11223344aabbccdd11223344"));
        assert!(!is_valid_session_id("AABBCCDD11223344AABBCCDD11223344"));
        assert!(!is_valid_session_id("short"));
        assert!(!is_valid_session_id("zzbbccdd11223344aabbccdd11223344"));
    }

    #[test]
    fn terminal_states() {
        for state in [
            NegotiationState::Agreed,
            NegotiationState::Broken,
            NegotiationState::TimedOut,
        ] {
            assert!(state.is_terminal());
        }
        for state in [
            NegotiationState::Idle,
            NegotiationState::Proposing,
            NegotiationState::Responding,
        ] {
            assert!(!state.is_terminal());
        }
    }

    #[test]
    fn state_serializes_snake_case() {
        let json = serde_json::to_string(&NegotiationState::TimedOut).unwrap();
        assert_eq!(json, "\"timed_out\"");
    }
}
