use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};

use crate::db::AppState;
use crate::payments::{MercadoPagoWebhookEvent, Provider};

use super::common::{
    handle_webhook, SignatureOutcome, WebhookEvent, WebhookResult, WebhookSource,
};

/// Mercado Pago webhook source.
///
/// Mercado Pago events are pointers: `data.id` names a payment, and the
/// payment's state has to be fetched back through the API. The signature
/// lives in the `x-signature` header, tied to `data.id`, `x-request-id` and
/// a timestamp.
pub struct MercadoPagoWebhookSource;

impl WebhookSource for MercadoPagoWebhookSource {
    fn provider(&self) -> Provider {
        Provider::MercadoPago
    }

    fn parse_event(&self, body: &Bytes) -> Result<WebhookEvent, WebhookResult> {
        let event: MercadoPagoWebhookEvent = serde_json::from_slice(body).map_err(|e| {
            tracing::error!("Failed to parse Mercado Pago webhook: {}", e);
            (StatusCode::BAD_REQUEST, "Invalid event envelope")
        })?;

        match event.event_type.as_str() {
            "payment" => Ok(WebhookEvent::RequiresLookup {
                transaction_id: event.data.id,
            }),
            _ => Ok(WebhookEvent::Ignored),
        }
    }

    fn check_signature(
        &self,
        state: &AppState,
        headers: &HeaderMap,
        body: &Bytes,
    ) -> SignatureOutcome {
        let Some(signature) = headers.get("x-signature").and_then(|v| v.to_str().ok()) else {
            return SignatureOutcome::Unsigned;
        };
        let request_id = headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        // parse_event already rejected malformed bodies
        let Ok(event) = serde_json::from_slice::<MercadoPagoWebhookEvent>(body) else {
            return SignatureOutcome::Unsigned;
        };

        match state.providers.mercado_pago.verify_webhook_signature(
            &event.data.id,
            request_id,
            signature,
        ) {
            Ok(true) => SignatureOutcome::Valid,
            Ok(false) => SignatureOutcome::Invalid,
            Err(e) => {
                tracing::warn!("Malformed Mercado Pago x-signature header: {}", e);
                SignatureOutcome::Invalid
            }
        }
    }
}

/// Axum handler for Mercado Pago webhooks.
pub async fn handle_mercadopago_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    handle_webhook(&MercadoPagoWebhookSource, &state, headers, body).await
}
