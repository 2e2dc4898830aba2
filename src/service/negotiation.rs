//! Central negotiation orchestrator.
//!
//! Binds together the bot detector, exit-intent detection, the SAO engine,
//! the dialogue generator, the coupon service, and persistence. All
//! session-mutating work runs under a per-session lock so turns for one
//! session are strictly serial; the lock TTL covers a holder that dies
//! mid-turn.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::Settings;
use crate::dialogue::{detect_exit_intent, sanitize_buyer_message, DialogueGenerator, DialogueResponse};
use crate::engine::{
    validate_price, BotDetector, DetectorRegistry, EngineMetadata, EngineResult, NegotiationEngine,
};
use crate::error::ServiceError;
use crate::models::{NegotiationSession, NegotiationState, SessionParams};
use crate::service::coupons;
use crate::store::records::AuditRecord;
use crate::store::{RecordStore, SessionCache};

#[derive(Debug, Clone, Serialize)]
pub struct NegotiationResponse {
    pub session_id: String,
    /// Shown to the caller exactly once, on `start`.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub session_token: String,
    pub message: String,
    pub current_price: f64,
    pub state: NegotiationState,
    pub tactic: String,
    pub sentiment: String,
    pub round: u32,
    pub max_rounds: u32,
    pub quote_ttl_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agreed_price: Option<f64>,
    pub metadata: EngineMetadata,
}

pub struct NegotiationService {
    settings: Arc<Settings>,
    cache: Arc<dyn SessionCache>,
    records: Arc<dyn RecordStore>,
    dialogue: DialogueGenerator,
    detectors: DetectorRegistry,
}

impl NegotiationService {
    pub fn new(
        settings: Arc<Settings>,
        cache: Arc<dyn SessionCache>,
        records: Arc<dyn RecordStore>,
        dialogue: DialogueGenerator,
    ) -> Self {
        Self {
            settings,
            cache,
            records,
            dialogue,
            detectors: DetectorRegistry::new(),
        }
    }

    /// Start a new negotiation session for a product.
    pub async fn start(
        &self,
        product_id: &str,
        buyer_name: &str,
        buyer_ip: &str,
    ) -> Result<NegotiationResponse, ServiceError> {
        let product = self
            .records
            .get_product(product_id)
            .await
            .map_err(degraded)?
            .ok_or_else(|| ServiceError::NotFound(format!("product {product_id}")))?;

        let mut session = NegotiationSession::new(
            &product,
            SessionParams {
                beta: self.settings.default_beta,
                alpha: self.settings.default_alpha,
                max_rounds: self.settings.default_max_rounds,
                ttl_seconds: self.settings.default_session_ttl_seconds,
            },
            buyer_ip,
        );

        let result = NegotiationEngine::new(&mut session).start_negotiation();

        let opener = if buyer_name.is_empty() { "Customer" } else { buyer_name };
        let dialogue = self
            .dialogue
            .generate_response(&session, &result, opener, "en")
            .await;

        self.persist_session(&session).await?;

        info!(
            session_id = %session.session_id,
            product_id = %product.id,
            "negotiation started"
        );

        Ok(build_response(&session, &dialogue, &result, true))
    }

    /// Process one round of negotiation, serialised per session.
    pub async fn negotiate(
        &self,
        session_id: &str,
        buyer_message: &str,
        buyer_price: f64,
    ) -> Result<NegotiationResponse, ServiceError> {
        let acquired = self.cache.acquire_lock(session_id).await.map_err(degraded)?;
        if !acquired {
            return Err(ServiceError::Conflict(format!(
                "session {session_id} is currently being processed, try again"
            )));
        }

        let result = self
            .negotiate_locked(session_id, buyer_message, buyer_price)
            .await;

        if let Err(e) = self.cache.release_lock(session_id).await {
            warn!(session_id, error = %e, "failed to release session lock; TTL will reap it");
        }

        result
    }

    async fn negotiate_locked(
        &self,
        session_id: &str,
        buyer_message: &str,
        buyer_price: f64,
    ) -> Result<NegotiationResponse, ServiceError> {
        let mut session = self
            .load_session(session_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("session {session_id}")))?;

        if session.is_terminal() {
            return Err(ServiceError::InvalidInput(format!(
                "session {session_id} is already {}",
                session.state.as_str()
            )));
        }

        // Bot detection
        let bot_score = self.detectors.with(session_id, |detector| {
            detector.record(chrono::Utc::now(), buyer_price);
            detector.compute_bot_score()
        });
        session.bot_score = bot_score;
        let effective_beta = BotDetector::recommended_beta(bot_score, session.beta);

        // Exit intent runs on the sanitised message so injection payloads
        // cannot fake a walk-away
        let sanitized_message = sanitize_buyer_message(buyer_message);
        let exit_intent = detect_exit_intent(&sanitized_message);

        let mut result = if exit_intent.is_leaving && exit_intent.confidence >= 0.5 {
            NegotiationEngine::new(&mut session).handle_walk_away()
        } else {
            // The recommendation applies to this round only; the stored beta
            // is untouched
            let original_beta = session.beta;
            session.beta = effective_beta;
            let outcome = NegotiationEngine::new(&mut session).process_buyer_offer(buyer_price);
            session.beta = original_beta;
            outcome.map_err(|e| ServiceError::InvalidInput(e.to_string()))?
        };

        // Invisible coupons: applied only when the re-validated price stays
        // inside the band. A failed lookup never rolls back the turn.
        if result.state == NegotiationState::Responding {
            match coupons::find_applicable(self.records.as_ref(), &session.product_id, result.counter_price)
                .await
            {
                Ok(Some(coupon)) => {
                    let discounted = result.counter_price - coupon.discount_amount;
                    let validated = validate_price(
                        discounted,
                        session.reservation_price,
                        session.anchor_price,
                    );
                    if !validated.was_overridden {
                        result.counter_price = validated.price;
                        result.metadata.coupon_applied = Some(true);
                        result.metadata.coupon_discount = Some(coupon.discount_amount);
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(session_id, error = %e, "promotion lookup failed"),
            }
        }

        let dialogue = self
            .dialogue
            .generate_response(&session, &result, &sanitized_message, "en")
            .await;

        self.persist_session(&session).await?;

        if session.is_terminal() {
            self.detectors.evict(session_id);
        }

        // Audit trail is best-effort; the turn already happened
        let audit = AuditRecord {
            session_id: session_id.to_string(),
            round: session.current_round,
            buyer_message: buyer_message.chars().take(500).collect(),
            buyer_price,
            counter_price: result.counter_price,
            tactic: result.tactic.as_str().to_string(),
            bot_score,
            state: result.state.as_str().to_string(),
            timestamp: chrono::Utc::now(),
        };
        if let Err(e) = self.records.append_audit(&audit).await {
            warn!(session_id, error = %e, "failed to append audit record");
        }

        Ok(build_response(&session, &dialogue, &result, false))
    }

    /// Load a session: cache first, then the durable store. Cache read
    /// failures degrade to a miss.
    pub async fn load_session(
        &self,
        session_id: &str,
    ) -> Result<Option<NegotiationSession>, ServiceError> {
        match self.cache.load_session(session_id).await {
            Ok(Some(raw)) => match serde_json::from_str::<NegotiationSession>(&raw) {
                Ok(session) => return Ok(Some(session)),
                Err(e) => warn!(session_id, error = %e, "corrupt cached session, falling back"),
            },
            Ok(None) => {}
            Err(e) => warn!(session_id, error = %e, "cache read failed, falling back"),
        }

        self.records.load_session(session_id).await.map_err(degraded)
    }

    async fn persist_session(&self, session: &NegotiationSession) -> Result<(), ServiceError> {
        let payload = serde_json::to_string(session)
            .map_err(|e| ServiceError::Degraded(format!("serialize session: {e}")))?;
        self.cache
            .store_session(
                &session.session_id,
                payload,
                Duration::from_secs(session.ttl_seconds),
            )
            .await
            .map_err(degraded)?;
        self.records.upsert_session(session).await.map_err(degraded)?;
        Ok(())
    }
}

fn degraded(err: anyhow::Error) -> ServiceError {
    ServiceError::Degraded(err.to_string())
}

fn build_response(
    session: &NegotiationSession,
    dialogue: &DialogueResponse,
    result: &EngineResult,
    include_token: bool,
) -> NegotiationResponse {
    NegotiationResponse {
        session_id: session.session_id.clone(),
        session_token: if include_token {
            session.session_token.clone()
        } else {
            String::new()
        },
        message: dialogue.message.clone(),
        current_price: result.counter_price,
        state: result.state,
        tactic: dialogue.tactic.clone(),
        sentiment: dialogue.sentiment.clone(),
        round: session.current_round,
        max_rounds: session.max_rounds,
        quote_ttl_seconds: session.ttl_seconds,
        agreed_price: session.agreed_price,
        metadata: result.metadata.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialogue::{ChatApi, ChatError, ChatRequest};
    use crate::models::Product;
    use crate::store::records::{DiscountType, Promotion, SqliteRecords, ALL_PRODUCTS};
    use crate::store::InMemoryCache;
    use async_trait::async_trait;

    struct DeadChat;

    #[async_trait]
    impl ChatApi for DeadChat {
        async fn chat(&self, _request: ChatRequest) -> Result<String, ChatError> {
            Err(ChatError::Api("stubbed out".into()))
        }
    }

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

    async fn service_with(settings: Settings) -> NegotiationService {
        let file = tempfile::NamedTempFile::new().unwrap();
        let (_, path) = file.keep().unwrap();
        let records = Arc::new(SqliteRecords::new(path.to_str().unwrap()).unwrap());
        records.create_product(&widget()).await.unwrap();

        NegotiationService::new(
            Arc::new(settings),
            Arc::new(InMemoryCache::new()),
            records,
            DialogueGenerator::new(Arc::new(DeadChat)),
        )
    }

    fn default_settings() -> Settings {
        Settings {
            default_beta: 5.0,
            default_max_rounds: 10,
            ..Settings::default()
        }
    }

    #[tokio::test]
    async fn start_unknown_product_is_not_found() {
        let service = service_with(default_settings()).await;
        let err = service.start("nope", "", "").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn start_returns_token_once() {
        let service = service_with(default_settings()).await;
        let start = service.start("widget-1", "Rahul", "1.2.3.4").await.unwrap();
        assert_eq!(start.session_token.len(), 64);
        assert_eq!(start.current_price, 1000.0);
        assert_eq!(start.round, 0);

        let turn = service
            .negotiate(&start.session_id, "kam karo", 600.0)
            .await
            .unwrap();
        assert!(turn.session_token.is_empty());
    }

    #[tokio::test]
    async fn lock_conflict_rejected() {
        let service = service_with(default_settings()).await;
        let start = service.start("widget-1", "", "").await.unwrap();

        // simulate a concurrent holder
        assert!(service.cache.acquire_lock(&start.session_id).await.unwrap());
        let err = service
            .negotiate(&start.session_id, "", 600.0)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn lock_released_after_failed_turn() {
        let service = service_with(default_settings()).await;
        let start = service.start("widget-1", "", "").await.unwrap();

        let err = service
            .negotiate(&start.session_id, "", -5.0)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));

        // the lock must not leak from the failed turn
        let ok = service
            .negotiate(&start.session_id, "", 600.0)
            .await
            .unwrap();
        assert_eq!(ok.round, 1);
    }

    #[tokio::test]
    async fn terminal_session_rejects_turns() {
        let mut settings = default_settings();
        settings.default_beta = 1.0;
        let service = service_with(settings).await;
        let start = service.start("widget-1", "", "").await.unwrap();

        let agreed = service
            .negotiate(&start.session_id, "deal", 990.0)
            .await
            .unwrap();
        assert_eq!(agreed.state, NegotiationState::Agreed);
        assert_eq!(agreed.agreed_price, Some(990.0));

        let err = service
            .negotiate(&start.session_id, "one more", 995.0)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn terminal_session_evicts_detector() {
        let mut settings = default_settings();
        settings.default_beta = 1.0;
        let service = service_with(settings).await;
        let start = service.start("widget-1", "", "").await.unwrap();

        service
            .negotiate(&start.session_id, "", 990.0)
            .await
            .unwrap();
        assert!(service.detectors.is_empty());
    }

    #[tokio::test]
    async fn walk_away_message_triggers_save() {
        let service = service_with(default_settings()).await;
        let start = service.start("widget-1", "", "").await.unwrap();

        let turn = service
            .negotiate(&start.session_id, "too expensive, forget it", 600.0)
            .await
            .unwrap();
        assert_eq!(turn.tactic, "walk_away_save");
        // 5% off the anchor opener
        assert_eq!(turn.current_price, 950.0);
        // walk-away does not consume a round
        assert_eq!(turn.round, 0);
    }

    #[tokio::test]
    async fn coupon_applied_and_annotated() {
        let service = service_with(default_settings()).await;
        let now = chrono::Utc::now();
        service
            .records
            .upsert_promotion(&Promotion {
                id: "festival".into(),
                product_id: ALL_PRODUCTS.into(),
                discount_type: DiscountType::Flat,
                discount_value: 50.0,
                min_price: 0.0,
                active: true,
                valid_from: now - chrono::Duration::minutes(1),
                valid_until: now + chrono::Duration::minutes(1),
                description: String::new(),
            })
            .await
            .unwrap();

        let start = service.start("widget-1", "", "").await.unwrap();
        let turn = service
            .negotiate(&start.session_id, "thoda kam karo", 600.0)
            .await
            .unwrap();

        assert_eq!(turn.metadata.coupon_applied, Some(true));
        assert_eq!(turn.metadata.coupon_discount, Some(50.0));
        // counter at round 1 (boulware) is 1000, minus the invisible 50
        assert_eq!(turn.current_price, 950.0);
    }

    #[tokio::test]
    async fn coupon_not_applied_below_floor() {
        let service = service_with(default_settings()).await;
        let now = chrono::Utc::now();
        service
            .records
            .upsert_promotion(&Promotion {
                id: "too-generous".into(),
                product_id: "widget-1".into(),
                discount_type: DiscountType::Flat,
                discount_value: 500.0,
                min_price: 0.0,
                active: true,
                valid_from: now - chrono::Duration::minutes(1),
                valid_until: now + chrono::Duration::minutes(1),
                description: String::new(),
            })
            .await
            .unwrap();

        let start = service.start("widget-1", "", "").await.unwrap();
        let turn = service
            .negotiate(&start.session_id, "", 600.0)
            .await
            .unwrap();

        // 1000 - 500 = 500 is below the 700 floor: coupon discarded
        assert!(turn.metadata.coupon_applied.is_none());
        assert_eq!(turn.current_price, 1000.0);
    }

    #[tokio::test]
    async fn session_survives_cache_miss() {
        let service = service_with(default_settings()).await;
        let start = service.start("widget-1", "", "").await.unwrap();

        // drop the active copy; the durable mirror must carry the session
        service.cache.delete_session(&start.session_id).await.unwrap();
        let turn = service
            .negotiate(&start.session_id, "", 600.0)
            .await
            .unwrap();
        assert_eq!(turn.round, 1);
    }

    #[tokio::test]
    async fn audit_trail_appended_per_turn() {
        let service = service_with(default_settings()).await;
        let start = service.start("widget-1", "", "").await.unwrap();

        service.negotiate(&start.session_id, "msg one", 500.0).await.unwrap();
        service.negotiate(&start.session_id, "msg two", 550.0).await.unwrap();

        let logs = service
            .records
            .list_audit(&start.session_id, 0, 50)
            .await
            .unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].round, 1);
        assert_eq!(logs[0].buyer_message, "msg one");
        assert_eq!(logs[1].round, 2);
    }
}
