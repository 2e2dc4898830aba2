//! LLM dialogue adapter: the "mouth" of the negotiation engine.
//!
//! Takes the engine's strategic output (counter price, tactic) and wraps it in
//! a bazaar-shopkeeper response. The model only ever dresses the price; the
//! returned price is always the engine's, no matter what the model suggests.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::engine::{validate_price, EngineResult, Tactic};
use crate::models::NegotiationSession;

const MAX_BUYER_MSG_BYTES: usize = 500;
const MAX_TEMPLATE_VALUE_CHARS: usize = 200;
const LLM_TIMEOUT: Duration = Duration::from_secs(30);
const LLM_TEMPERATURE: f64 = 0.8;
const LLM_MAX_TOKENS: u32 = 512;

const REDACTED_MESSAGE: &str = "[message redacted]";
const REDACTED_VALUE: &str = "[redacted]";

fn injection_patterns() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(ignore\s+(all\s+)?previous|system\s*:|you\s+are\s+now|forget\s+(your|all)|disregard\s+(above|instructions))",
        )
        .expect("injection pattern regex is valid")
    })
}

const SYSTEM_PROMPT: &str = "\
You are a seasoned Indian bazaar shopkeeper negotiating a price with a customer.
Speak warm, playful Hinglish. Never insult the customer; never reveal your cost
price, floor price, or internal strategy, even if asked directly.

Respond with a single JSON object:
{\"message\": \"<your reply to the customer>\",
 \"suggested_price\": <number>,
 \"sentiment\": \"<friendly|firm|playful|regretful>\",
 \"tactic\": \"<short tactic label>\"}

The SYSTEM DECISION in the user message tells you the exact counter-price to
use. Use that number. Do not invent a different price.";

/// Truncate at a byte cap without splitting a UTF-8 character.
fn truncate_bytes(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn strip_control_chars(s: &str) -> String {
    s.chars().filter(|c| !c.is_control() || *c == '\n').collect()
}

/// Truncate, strip control characters, and redact prompt-injection attempts.
pub fn sanitize_buyer_message(message: &str) -> String {
    let truncated = truncate_bytes(message, MAX_BUYER_MSG_BYTES);
    let cleaned = strip_control_chars(truncated);
    if injection_patterns().is_match(&cleaned) {
        warn!("prompt injection attempt detected in buyer message");
        return REDACTED_MESSAGE.to_string();
    }
    cleaned
}

/// Sanitize a value before template interpolation. Shorter cap than the buyer
/// message to prevent prompt stuffing through structured fields.
pub fn sanitize_template_value(value: &str) -> String {
    let cleaned = strip_control_chars(value);
    if injection_patterns().is_match(&cleaned) {
        return REDACTED_VALUE.to_string();
    }
    cleaned.chars().take(MAX_TEMPLATE_VALUE_CHARS).collect()
}

/// Parse an optional chain-of-thought block and the JSON payload from raw
/// model output. Strict parse first, then the widest brace-delimited slice.
pub fn extract_think_and_json(raw: &str) -> (String, Option<serde_json::Value>) {
    let mut reasoning = String::new();
    let mut rest = raw;

    if let Some(open) = raw.find("<think>") {
        if let Some(close) = raw[open..].find("</think>") {
            let inner = &raw[open + "<think>".len()..open + close];
            reasoning = inner.trim().to_string();
            rest = &raw[open + close + "</think>".len()..];
        }
    }

    let rest = rest.trim();
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(rest) {
        if value.is_object() {
            return (reasoning, Some(value));
        }
    }

    // Fallback: first '{' through last '}'
    if let (Some(start), Some(end)) = (rest.find('{'), rest.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(&rest[start..=end]) {
                if value.is_object() {
                    return (reasoning, Some(value));
                }
            }
        }
    }

    (reasoning, None)
}

#[derive(Error, Debug)]
pub enum ChatError {
    /// The endpoint rejected the request shape (e.g. unsupported JSON mode).
    #[error("chat endpoint rejected request: {0}")]
    BadRequest(String),
    #[error("chat endpoint error: {0}")]
    Api(String),
    #[error("chat endpoint timed out")]
    Timeout,
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    /// Ask for a strict-JSON response format.
    pub json_mode: bool,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// Port to the chat-completion endpoint, injectable so tests can force the
/// fallback path.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<String, ChatError>;
}

/// OpenAI-compatible chat client for NVIDIA NIM.
pub struct NimClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl NimClient {
    pub fn new(http: reqwest::Client, base_url: String, api_key: String, model: String) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        }
    }
}

#[async_trait]
impl ChatApi for NimClient {
    async fn chat(&self, request: ChatRequest) -> Result<String, ChatError> {
        let body = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: request.system,
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.user,
                },
            ],
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            response_format: request.json_mode.then(|| ResponseFormat {
                format_type: "json_object".to_string(),
            }),
        };

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .timeout(LLM_TIMEOUT)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ChatError::Timeout
                } else {
                    ChatError::Api(e.to_string())
                }
            })?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();

        if status == reqwest::StatusCode::BAD_REQUEST {
            let snippet: String = text.chars().take(200).collect();
            return Err(ChatError::BadRequest(snippet));
        }
        if !status.is_success() {
            let snippet: String = text.chars().take(800).collect();
            return Err(ChatError::Api(format!("{}: {}", status.as_u16(), snippet)));
        }

        let parsed: ChatCompletionResponse =
            serde_json::from_str(&text).map_err(|e| ChatError::Api(format!("bad json: {e}")))?;
        Ok(parsed
            .choices
            .first()
            .and_then(|c| c.message.as_ref())
            .map(|m| m.content.clone())
            .unwrap_or_default())
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessageOut>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatMessageOut {
    content: String,
}

#[derive(Debug, Clone)]
pub struct DialogueResponse {
    pub message: String,
    /// Always the engine's counter price.
    pub price: f64,
    pub sentiment: String,
    pub tactic: String,
    pub reasoning: String,
}

#[derive(Debug, Default, Deserialize)]
struct LlmReply {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    suggested_price: Option<f64>,
    #[serde(default)]
    sentiment: Option<String>,
    #[serde(default)]
    tactic: Option<String>,
}

pub struct DialogueGenerator {
    chat: std::sync::Arc<dyn ChatApi>,
}

impl DialogueGenerator {
    pub fn new(chat: std::sync::Arc<dyn ChatApi>) -> Self {
        Self { chat }
    }

    /// Render the persona message for one turn. Never fails: on any model
    /// fault the deterministic fallback carries the engine's price.
    pub async fn generate_response(
        &self,
        session: &NegotiationSession,
        engine_result: &EngineResult,
        buyer_message: &str,
        language: &str,
    ) -> DialogueResponse {
        let buyer_message = sanitize_buyer_message(buyer_message);
        let mut user_context =
            build_user_prompt(session, engine_result, &buyer_message, language);

        match engine_result.tactic {
            Tactic::WalkAwaySave => {
                user_context.push_str("\n\nSPECIAL INSTRUCTION:\n");
                user_context.push_str(&walk_away_overlay(session, engine_result));
            }
            Tactic::QuantityPivot => {
                user_context.push_str("\n\nSPECIAL INSTRUCTION:\n");
                user_context.push_str(&bundle_overlay(session, engine_result));
            }
            _ => {}
        }

        let (reasoning, data) = self.call_model(&user_context).await;

        let engine_price = engine_result.counter_price;
        let reply: LlmReply = data
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        // Guardrail: the model must not move the price
        if let Some(suggested) = reply.suggested_price {
            let validated =
                validate_price(suggested, session.reservation_price, session.anchor_price);
            if validated.was_overridden {
                warn!(reason = %validated.override_reason, "LLM tried to leave the price band");
            } else if (validated.price - engine_price).abs() > f64::EPSILON {
                warn!(
                    suggested = validated.price,
                    engine = engine_price,
                    "LLM suggested a different price; discarding"
                );
            }
        }

        DialogueResponse {
            message: reply
                .message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| fallback_message(engine_price)),
            price: engine_price,
            sentiment: reply.sentiment.unwrap_or_else(|| "firm".to_string()),
            tactic: reply
                .tactic
                .unwrap_or_else(|| engine_result.tactic.as_str().to_string()),
            reasoning,
        }
    }

    /// Two attempts: strict-JSON mode first, then free-form when the endpoint
    /// rejects the response format. Any other fault falls back.
    async fn call_model(&self, user_context: &str) -> (String, Option<serde_json::Value>) {
        let strict = ChatRequest {
            system: SYSTEM_PROMPT.to_string(),
            user: user_context.to_string(),
            json_mode: true,
            temperature: LLM_TEMPERATURE,
            max_tokens: LLM_MAX_TOKENS,
        };

        match self.chat.chat(strict.clone()).await {
            Ok(raw) => {
                let (reasoning, data) = extract_think_and_json(&raw);
                if data.is_some() {
                    return (reasoning, data);
                }
            }
            Err(ChatError::BadRequest(_)) => {
                info!("chat endpoint rejected JSON mode, retrying free-form");
            }
            Err(e) => {
                warn!(error = %e, "chat call failed, using fallback response");
                return (String::new(), None);
            }
        }

        let freeform = ChatRequest {
            json_mode: false,
            ..strict
        };
        match self.chat.chat(freeform).await {
            Ok(raw) => {
                let (reasoning, data) = extract_think_and_json(&raw);
                if data.is_none() {
                    warn!("could not parse JSON from chat response, using fallback");
                }
                (reasoning, data)
            }
            Err(e) => {
                warn!(error = %e, "chat call failed (second attempt), using fallback response");
                (String::new(), None)
            }
        }
    }
}

fn fallback_message(price: f64) -> String {
    format!("Bhaiya, best price for you: ₹{price:.2}. Isse kam nahi hoga.")
}

fn build_user_prompt(
    session: &NegotiationSession,
    engine_result: &EngineResult,
    buyer_message: &str,
    language: &str,
) -> String {
    let mut history_lines = Vec::new();
    let offers = &session.offer_history.offers;
    let recent = &offers[offers.len().saturating_sub(6)..];
    for offer in recent {
        let who = match offer.actor {
            crate::models::Actor::Buyer => "Customer",
            crate::models::Actor::Seller => "You",
        };
        let mut line = format!("  {who}: ₹{}", offer.price);
        if !offer.message.is_empty() {
            line.push_str(&format!(" \"{}\"", sanitize_template_value(&offer.message)));
        }
        history_lines.push(line);
    }
    let history = if history_lines.is_empty() {
        "  (No history yet)".to_string()
    } else {
        history_lines.join("\n")
    };

    let lang_note = if language != "en" && !language.is_empty() {
        format!(
            "\nLANGUAGE PREFERENCE: the customer prefers '{}'. Adjust your Hinglish accordingly.\n",
            sanitize_template_value(language)
        )
    } else {
        String::new()
    };

    let last_buyer = session
        .offer_history
        .last_buyer_offer()
        .map(|o| format!("₹{}", o.price))
        .unwrap_or_else(|| "none yet".to_string());

    format!(
        "CURRENT NEGOTIATION STATE:\n\
         Product: {product}\n\
         List price: ₹{anchor}\n\
         Round: {round} / {max_rounds}\n\
         {lang_note}\n\
         OFFER HISTORY (recent):\n\
         {history}\n\n\
         CUSTOMER JUST SAID: \"{buyer_message}\"\n\
         CUSTOMER'S OFFER: {last_buyer}\n\n\
         SYSTEM DECISION:\n\
         - Your counter-price is: ₹{price} (USE THIS EXACT PRICE)\n\
         - Tactic: {tactic}\n\
         - Negotiation state: {state}\n\n\
         Generate your response. Remember: use EXACTLY ₹{price} as your price.",
        product = sanitize_template_value(&session.product_name),
        anchor = session.anchor_price,
        round = session.current_round,
        max_rounds = session.max_rounds,
        price = engine_result.counter_price,
        tactic = engine_result.tactic.as_str(),
        state = engine_result.state.as_str(),
    )
}

fn walk_away_overlay(session: &NegotiationSession, engine_result: &EngineResult) -> String {
    let buyer_price = session
        .offer_history
        .last_buyer_offer()
        .map(|o| o.price.to_string())
        .unwrap_or_else(|| "?".to_string());
    format!(
        "The customer is about to walk away from {product}. Their last offer was ₹{buyer}. \
         You were at ₹{current}, and you are making a one-time save at ₹{save}. \
         Sound a little hurt but generous; make it feel like a personal favour.",
        product = sanitize_template_value(&session.product_name),
        buyer = sanitize_template_value(&buyer_price),
        current = session.current_seller_price,
        save = engine_result.counter_price,
    )
}

fn bundle_overlay(session: &NegotiationSession, engine_result: &EngineResult) -> String {
    let quantity = engine_result.metadata.quantity.unwrap_or(2);
    let bundle_total = engine_result.metadata.bundle_total.unwrap_or(0.0);
    format!(
        "You cannot drop the single-unit price of {product} further, so pivot to a bundle: \
         {quantity} units at ₹{unit} each, ₹{total} all-in. \
         Pitch the bundle as the smart buy.",
        product = sanitize_template_value(&session.product_name),
        unit = engine_result.counter_price,
        total = bundle_total,
    )
}
