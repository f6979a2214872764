//! Common webhook ingestion infrastructure for payment providers.
//!
//! Providers retry aggressively on non-2xx responses, and retried
//! deliveries are harmless here (transitions are idempotent) but cost real
//! traffic. The boundary therefore answers by an explicit policy table
//! rather than by whatever error happens to escape:
//!
//! | outcome                                      | response |
//! |----------------------------------------------|----------|
//! | malformed envelope (event type/payload gone) | 400      |
//! | signature present but invalid                | 200, logged, unprocessed |
//! | signature absent                             | processed as unverified, logged |
//! | event type irrelevant                        | 200      |
//! | purchase unresolvable                        | 200, logged |
//! | provider lookup failed                       | 200, logged (sweep recovers) |
//! | storage failure                              | 200, logged (sweep recovers) |
//! | transition applied / no-op / lost race       | 200      |
//!
//! The 400 on a malformed envelope is the single deliberate exception: it
//! signals an incompatible payload, which is a bug to surface, not a
//! transient condition to ride out.

use axum::{
    body::Bytes,
    http::{HeaderMap, StatusCode},
};
use rusqlite::Connection;

use crate::db::{queries, AppState};
use crate::error::Result;
use crate::models::Purchase;
use crate::payments::{normalize, Provider};
use crate::transition::{self, ApplyOutcome, NoopReason};

/// Result type for webhook operations: status code plus a short reason the
/// boundary returns as the body.
pub type WebhookResult = (StatusCode, &'static str);

/// A normalized transition proposal extracted from a provider event.
#[derive(Debug)]
pub struct StatusUpdate {
    pub provider_transaction_id: Option<String>,
    pub external_reference: Option<String>,
    pub native_status: String,
}

/// Parsed webhook event. Everything a provider can push collapses into one
/// of these three shapes; unexpected payload forms fail at the parsing
/// boundary instead of being poked at speculatively.
#[derive(Debug)]
pub enum WebhookEvent {
    /// The event carried the transaction state inline (Wompi)
    StatusUpdate(StatusUpdate),
    /// The event is a pointer; the state lives behind the provider API
    /// (Mercado Pago)
    RequiresLookup { transaction_id: String },
    /// Valid envelope, event type not relevant to purchase state
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureOutcome {
    Valid,
    Invalid,
    /// No signature material on this delivery. Providers omit signatures on
    /// some event types, so this is "unverified", not "forged".
    Unsigned,
}

/// Trait for provider-specific webhook handling. Implementors own the
/// envelope format and signature scheme; the shared driver owns policy,
/// purchase resolution and the transition.
pub trait WebhookSource: Send + Sync {
    fn provider(&self) -> Provider;

    /// Parse the raw body into a [`WebhookEvent`]. Errors here are the only
    /// path to a non-2xx response.
    fn parse_event(&self, body: &Bytes) -> std::result::Result<WebhookEvent, WebhookResult>;

    /// Check the delivery's authenticity. Called only after `parse_event`
    /// succeeded, so implementations may re-parse the body freely.
    fn check_signature(
        &self,
        state: &AppState,
        headers: &HeaderMap,
        body: &Bytes,
    ) -> SignatureOutcome;
}

/// Generic webhook driver shared by all providers.
pub async fn handle_webhook<S: WebhookSource>(
    source: &S,
    state: &AppState,
    headers: HeaderMap,
    body: Bytes,
) -> WebhookResult {
    let provider = source.provider();

    let event = match source.parse_event(&body) {
        Ok(e) => e,
        Err(e) => return e,
    };

    // Irrelevant event types are answered before signature evaluation:
    // their payloads don't carry the signed transaction properties, so
    // there is nothing to verify them against.
    if matches!(event, WebhookEvent::Ignored) {
        return (StatusCode::OK, "Event ignored");
    }

    match source.check_signature(state, &headers, &body) {
        SignatureOutcome::Valid => {}
        SignatureOutcome::Invalid => {
            tracing::warn!("{} webhook signature invalid, event discarded", provider.as_ref());
            return (StatusCode::OK, "Invalid signature - event discarded");
        }
        SignatureOutcome::Unsigned => {
            tracing::warn!("{} webhook arrived unsigned, processing as unverified", provider.as_ref());
        }
    }

    let update = match event {
        WebhookEvent::Ignored => return (StatusCode::OK, "Event ignored"),
        WebhookEvent::StatusUpdate(update) => update,
        WebhookEvent::RequiresLookup { transaction_id } => {
            match resolve_lookup(state, provider, transaction_id).await {
                Ok(update) => update,
                Err(e) => {
                    tracing::warn!(
                        "{} webhook lookup failed ({}), deferring to sweep",
                        provider.as_ref(),
                        e
                    );
                    return (StatusCode::OK, "Provider lookup failed - deferred to sweep");
                }
            }
        }
    };

    let conn = match state.db.get() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("webhook: DB connection error: {}", e);
            return (StatusCode::OK, "Storage error - deferred to sweep");
        }
    };

    let purchase = match resolve_purchase(&conn, provider, &update) {
        Ok(Some(p)) => p,
        Ok(None) => {
            tracing::info!(
                "{} webhook for unknown purchase (tx={:?}, reference={:?})",
                provider.as_ref(),
                update.provider_transaction_id,
                update.external_reference
            );
            return (StatusCode::OK, "Unknown reference");
        }
        Err(e) => {
            tracing::error!("webhook: purchase lookup failed: {}", e);
            return (StatusCode::OK, "Storage error - deferred to sweep");
        }
    };

    // The provider has now positively tied a transaction id to this
    // purchase; record it so the sweep can query live status directly.
    if let Some(transaction_id) = &update.provider_transaction_id {
        if !purchase.provider_confirmed {
            if let Err(e) = queries::confirm_provider_transaction(&conn, &purchase.id, transaction_id)
            {
                tracing::error!("webhook: failed to record transaction id: {}", e);
                return (StatusCode::OK, "Storage error - deferred to sweep");
            }
        }
    }

    let proposed = normalize(provider, &update.native_status);
    match transition::apply(&conn, &purchase, proposed) {
        Ok(ApplyOutcome::Transitioned { .. }) => (StatusCode::OK, "OK"),
        Ok(ApplyOutcome::Skipped(NoopReason::Terminal)) => (StatusCode::OK, "Already finalized"),
        Ok(ApplyOutcome::Skipped(NoopReason::Unchanged)) => (StatusCode::OK, "No change"),
        Ok(ApplyOutcome::LostRace) => (StatusCode::OK, "Superseded by concurrent update"),
        Err(e) => {
            tracing::error!("webhook: transition failed: {}", e);
            (StatusCode::OK, "Storage error - deferred to sweep")
        }
    }
}

/// Turn a pointer event into a full status update via the provider API.
async fn resolve_lookup(
    state: &AppState,
    provider: Provider,
    transaction_id: String,
) -> Result<StatusUpdate> {
    match provider {
        Provider::MercadoPago => {
            let payment = state.providers.mercado_pago.fetch_payment(&transaction_id).await?;
            Ok(StatusUpdate {
                provider_transaction_id: Some(transaction_id),
                external_reference: payment.external_reference,
                native_status: payment.status,
            })
        }
        Provider::Wompi => {
            let tx = state.providers.wompi.fetch_transaction(&transaction_id).await?;
            Ok(StatusUpdate {
                provider_transaction_id: Some(tx.id),
                external_reference: Some(tx.reference),
                native_status: tx.status,
            })
        }
    }
}

/// Resolve the purchase an update refers to: provider transaction id first,
/// falling back to the external reference for purchases that only know
/// their own reference so far.
fn resolve_purchase(
    conn: &Connection,
    provider: Provider,
    update: &StatusUpdate,
) -> Result<Option<Purchase>> {
    if let Some(transaction_id) = &update.provider_transaction_id {
        if let Some(purchase) =
            queries::get_purchase_by_provider_transaction(conn, provider, transaction_id)?
        {
            return Ok(Some(purchase));
        }
    }

    if let Some(reference) = &update.external_reference {
        if let Some(purchase) = queries::get_purchase_by_reference(conn, reference)? {
            if purchase.provider != provider {
                tracing::warn!(
                    "{} event references purchase {} created for {}, ignoring",
                    provider.as_ref(),
                    purchase.id,
                    purchase.provider.as_ref()
                );
                return Ok(None);
            }
            return Ok(Some(purchase));
        }
    }

    Ok(None)
}
