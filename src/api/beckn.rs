//! Beckn/ONDC protocol surface (stubbed).
//!
//! Maps /beckn/select onto the internal negotiation service: a select without
//! a negotiation reference starts a session, one with a session id continues
//! it. Real ONDC gateway integration will replace this stub.

use axum::{extract::State, response::Json};

use crate::api::AppState;
use crate::error::ServiceError;
use crate::models::beckn::{
    BecknContext, BecknNegotiationStatus, BecknOnSelectMessage, BecknOnSelectOrder,
    BecknOnSelectResponse, BecknSelectRequest,
};
use crate::protocol::build_quote;
use crate::service::NegotiationResponse;

/// POST /beckn/select
pub async fn beckn_select(
    State(state): State<AppState>,
    Json(body): Json<BecknSelectRequest>,
) -> Result<Json<BecknOnSelectResponse>, ServiceError> {
    let order = &body.message.order;
    let item = order
        .items
        .first()
        .ok_or_else(|| ServiceError::InvalidInput("no items in select message".into()))?;

    let buyer_price: f64 = item
        .price
        .as_ref()
        .map(|p| p.value.trim().parse::<f64>())
        .transpose()
        .map_err(|_| ServiceError::InvalidInput("invalid price value".into()))?
        .unwrap_or(0.0);

    let session_ref = order
        .negotiation
        .as_ref()
        .and_then(|n| n.session_id.clone());

    let result = match session_ref {
        Some(session_id) => {
            let buyer_message = item
                .tags
                .as_ref()
                .and_then(|t| t.message.clone())
                .unwrap_or_default();
            state
                .service
                .negotiate(&session_id, &buyer_message, buyer_price)
                .await?
        }
        None => state.service.start(&item.id, "", "").await?,
    };

    Ok(Json(build_on_select_response(&result, &body.context)))
}

/// Convert an internal negotiation response to Beckn on_select format.
pub fn build_on_select_response(
    nego: &NegotiationResponse,
    original_context: &BecknContext,
) -> BecknOnSelectResponse {
    let discount = nego.metadata.coupon_discount.unwrap_or(0.0);
    // The counter price already carries any coupon; lift the item line back
    // up so the breakup sums to the quoted total.
    let item_price = nego.current_price + discount;
    let quote = build_quote(item_price, nego.quote_ttl_seconds, 0.0, discount);

    BecknOnSelectResponse {
        context: original_context.reply("on_select"),
        message: BecknOnSelectMessage {
            order: BecknOnSelectOrder {
                quote,
                negotiation: BecknNegotiationStatus {
                    session_id: nego.session_id.clone(),
                    state: nego.state.as_str().to_string(),
                    round: nego.round,
                    seller_message: nego.message.clone(),
                },
            },
        },
    }
}
