use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};

use crate::db::AppState;
use crate::payments::{Provider, WompiEvent};

use super::common::{
    handle_webhook, SignatureOutcome, StatusUpdate, WebhookEvent, WebhookResult, WebhookSource,
};

/// Wompi webhook source.
///
/// Wompi pushes `transaction.updated` events carrying the full transaction,
/// with a checksum block inside the body (not a header). Test-environment
/// events sometimes omit the checksum entirely.
pub struct WompiWebhookSource;

impl WebhookSource for WompiWebhookSource {
    fn provider(&self) -> Provider {
        Provider::Wompi
    }

    fn parse_event(&self, body: &Bytes) -> Result<WebhookEvent, WebhookResult> {
        let event: WompiEvent = serde_json::from_slice(body).map_err(|e| {
            tracing::error!("Failed to parse Wompi webhook: {}", e);
            (StatusCode::BAD_REQUEST, "Invalid event envelope")
        })?;

        match event.event.as_str() {
            "transaction.updated" => {
                let transaction = event
                    .data
                    .transaction
                    .ok_or((StatusCode::BAD_REQUEST, "Event missing transaction payload"))?;

                Ok(WebhookEvent::StatusUpdate(StatusUpdate {
                    provider_transaction_id: Some(transaction.id),
                    external_reference: Some(transaction.reference),
                    native_status: transaction.status,
                }))
            }
            _ => Ok(WebhookEvent::Ignored),
        }
    }

    fn check_signature(
        &self,
        state: &AppState,
        _headers: &HeaderMap,
        body: &Bytes,
    ) -> SignatureOutcome {
        // parse_event already rejected malformed bodies
        let Ok(event) = serde_json::from_slice::<WompiEvent>(body) else {
            return SignatureOutcome::Unsigned;
        };
        if event.signature.is_none() {
            return SignatureOutcome::Unsigned;
        }
        if state.providers.wompi.verify_event_checksum(&event) {
            SignatureOutcome::Valid
        } else {
            SignatureOutcome::Invalid
        }
    }
}

/// Axum handler for Wompi webhooks.
pub async fn handle_wompi_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    handle_webhook(&WompiWebhookSource, &state, headers, body).await
}
