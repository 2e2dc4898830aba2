//! Beckn/ONDC protocol DTOs for the /beckn surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BecknPrice {
    #[serde(default = "default_currency")]
    pub currency: String,
    pub value: String,
}

fn default_currency() -> String {
    "INR".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BecknBreakupItem {
    pub title: String,
    pub price: BecknPrice,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BecknQuote {
    pub price: BecknPrice,
    #[serde(default)]
    pub breakup: Vec<BecknBreakupItem>,
    /// ISO 8601 duration.
    pub ttl: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BecknContext {
    #[serde(default = "default_domain")]
    pub domain: String,
    #[serde(default)]
    pub action: String,
    #[serde(default = "new_hex_id")]
    pub transaction_id: String,
    #[serde(default = "new_hex_id")]
    pub message_id: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default = "default_context_ttl")]
    pub ttl: String,
}

fn default_domain() -> String {
    "retail".to_string()
}

fn default_context_ttl() -> String {
    "PT1M".to_string()
}

fn new_hex_id() -> String {
    Uuid::new_v4().simple().to_string()
}

impl BecknContext {
    /// Reply context for an `on_select`: echoes domain and transaction id,
    /// fresh message id and timestamp.
    pub fn reply(&self, action: &str) -> Self {
        Self {
            domain: self.domain.clone(),
            action: action.to_string(),
            transaction_id: self.transaction_id.clone(),
            message_id: new_hex_id(),
            timestamp: Utc::now(),
            ttl: default_context_ttl(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BecknItemTags {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BecknSelectItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub price: Option<BecknItemPrice>,
    #[serde(default)]
    pub tags: Option<BecknItemTags>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BecknItemPrice {
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BecknNegotiationRef {
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BecknSelectOrder {
    #[serde(default)]
    pub items: Vec<BecknSelectItem>,
    #[serde(default)]
    pub negotiation: Option<BecknNegotiationRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BecknSelectMessage {
    #[serde(default)]
    pub order: BecknSelectOrder,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BecknSelectRequest {
    pub context: BecknContext,
    #[serde(default)]
    pub message: BecknSelectMessage,
}

#[derive(Debug, Clone, Serialize)]
pub struct BecknNegotiationStatus {
    pub session_id: String,
    pub state: String,
    pub round: u32,
    pub seller_message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BecknOnSelectOrder {
    pub quote: BecknQuote,
    pub negotiation: BecknNegotiationStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct BecknOnSelectMessage {
    pub order: BecknOnSelectOrder,
}

#[derive(Debug, Clone, Serialize)]
pub struct BecknOnSelectResponse {
    pub context: BecknContext,
    pub message: BecknOnSelectMessage,
}
