//! Placeholder for bilateral digital signatures.
//!
//! Signs agreed quotes with a sha256 digest so downstream systems get a
//! stable record shape today. Replace with Ed25519/RSA before any production
//! deployment that needs tamper-proof agreements.

use std::sync::Once;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::warn;

static STUB_WARNING: Once = Once::new();

#[derive(Debug, Clone, Serialize)]
pub struct SignedAgreement {
    pub session_id: String,
    pub product_id: String,
    pub agreed_price: f64,
    pub timestamp: DateTime<Utc>,
    pub signature: String,
    pub algorithm: &'static str,
}

/// Generate a stub signature for a completed negotiation.
pub fn sign_agreement(session_id: &str, product_id: &str, agreed_price: f64) -> SignedAgreement {
    STUB_WARNING.call_once(|| {
        warn!("sign_agreement uses a sha256 digest, not real crypto; replace before production");
    });

    let timestamp = Utc::now();
    let canonical = format!(
        "agreed_price={agreed_price:.2}&product_id={product_id}&session_id={session_id}&timestamp={}",
        timestamp.to_rfc3339()
    );
    let digest = Sha256::digest(canonical.as_bytes());

    SignedAgreement {
        session_id: session_id.to_string(),
        product_id: product_id.to_string(),
        agreed_price,
        timestamp,
        signature: hex::encode(digest),
        algorithm: "sha256-stub",
    }
}
