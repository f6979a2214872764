use std::collections::BTreeSet;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::db::{queries, AppState};
use crate::error::{msg, AppError, OptionExt, Result};
use crate::extractors::Json;
use crate::id;
use crate::models::{CreatePurchase, Purchase, PurchaseStatus};
use crate::payments::{CheckoutIntent, Provider};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Deserialize)]
pub struct CreatePurchaseRequest {
    pub wallpaper_numbers: Vec<u32>,
    pub buyer_email: String,
    pub buyer_name: String,
    pub buyer_national_id: String,
    pub buyer_phone: String,
    /// "wompi" or "mercadopago"
    pub provider: String,
}

#[derive(Debug, Serialize)]
pub struct CreatePurchaseResponse {
    pub purchase_id: String,
    pub reference: String,
    pub checkout_url: String,
    pub status: PurchaseStatus,
}

/// Start a purchase: reserve the wallpaper numbers, create the provider
/// checkout and insert the PENDING row. From here on the record is only
/// touched by the webhook and sweep paths.
pub async fn create_purchase(
    State(state): State<AppState>,
    Json(request): Json<CreatePurchaseRequest>,
) -> Result<Json<CreatePurchaseResponse>> {
    let provider = request
        .provider
        .parse::<Provider>()
        .map_err(|_| AppError::BadRequest(msg::INVALID_PROVIDER.into()))?;

    if request.wallpaper_numbers.is_empty() {
        return Err(AppError::BadRequest(msg::EMPTY_WALLPAPER_SET.into()));
    }
    if request.wallpaper_numbers.contains(&0) {
        return Err(AppError::BadRequest(msg::INVALID_WALLPAPER_NUMBER.into()));
    }
    let numbers: Vec<u32> = request
        .wallpaper_numbers
        .iter()
        .copied()
        .collect::<BTreeSet<u32>>()
        .into_iter()
        .collect();

    // Cheap pre-check before spending a provider round trip; the
    // authoritative check happens again inside the insert transaction.
    {
        let conn = state.db.get()?;
        check_availability(&conn, &numbers)?;
    }

    let amount_cents = state.pricing.wallpaper_price_cents * numbers.len() as i64;
    let reference = id::payment_reference();
    let redirect_url = format!("{}/?reference={}", state.redirect_url, reference);
    let notification_url = format!("{}/webhook/mercadopago", state.base_url);

    let intent = CheckoutIntent {
        reference: &reference,
        amount_cents,
        currency: &state.pricing.currency,
        buyer_email: &request.buyer_email,
        buyer_name: &request.buyer_name,
        redirect_url: &redirect_url,
        notification_url: &notification_url,
    };

    let checkout = match provider {
        Provider::Wompi => state.providers.wompi.create_checkout(&intent)?,
        Provider::MercadoPago => state.providers.mercado_pago.create_preference(&intent).await?,
    };

    let mut conn = state.db.get()?;
    let tx = conn.transaction()?;
    check_availability(&tx, &numbers)?;
    let purchase = queries::create_purchase(
        &tx,
        &CreatePurchase {
            wallpaper_numbers: numbers,
            buyer_email: request.buyer_email,
            buyer_name: request.buyer_name,
            buyer_national_id: request.buyer_national_id,
            buyer_phone: request.buyer_phone,
            provider,
            external_reference: reference.clone(),
            // The checkout handle (Mercado Pago preference id) is stored
            // unconfirmed; the real transaction id replaces it once the
            // provider confirms one.
            provider_transaction_id: checkout.provider_handle,
            amount_cents,
            currency: state.pricing.currency.clone(),
        },
    )?;
    tx.commit()?;

    tracing::info!(
        "purchase {} created: provider={} reference={} wallpapers={:?}",
        purchase.id,
        provider.as_ref(),
        purchase.external_reference,
        purchase.wallpaper_numbers
    );

    Ok(Json(CreatePurchaseResponse {
        purchase_id: purchase.id,
        reference,
        checkout_url: checkout.checkout_url,
        status: purchase.status,
    }))
}

fn check_availability(conn: &rusqlite::Connection, numbers: &[u32]) -> Result<()> {
    let taken = queries::unavailable_wallpapers(conn)?;
    let conflicts: Vec<u32> = numbers.iter().copied().filter(|n| taken.contains(n)).collect();
    if !conflicts.is_empty() {
        return Err(AppError::Conflict(format!(
            "Wallpapers already sold or on hold: {:?}",
            conflicts
        )));
    }
    Ok(())
}

/// Public view of a purchase for the buyer's return page. Buyer PII stays
/// out of it; the purchase id is the only credential.
#[derive(Debug, Serialize)]
pub struct PurchaseView {
    pub id: String,
    pub reference: String,
    pub wallpaper_numbers: Vec<u32>,
    pub status: PurchaseStatus,
    pub amount_cents: i64,
    pub currency: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<Purchase> for PurchaseView {
    fn from(p: Purchase) -> Self {
        Self {
            id: p.id,
            reference: p.external_reference,
            wallpaper_numbers: p.wallpaper_numbers,
            status: p.status,
            amount_cents: p.amount_cents,
            currency: p.currency,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

pub async fn get_purchase(
    State(state): State<AppState>,
    Path(purchase_id): Path<String>,
) -> Result<Json<PurchaseView>> {
    if !id::is_valid_purchase_id(&purchase_id) {
        return Err(AppError::NotFound(msg::PURCHASE_NOT_FOUND.into()));
    }

    let conn = state.db.get()?;
    let purchase = queries::get_purchase_by_id(&conn, &purchase_id)?
        .or_not_found(msg::PURCHASE_NOT_FOUND)?;

    Ok(Json(purchase.into()))
}

#[derive(Debug, Serialize)]
pub struct UnavailableWallpapersResponse {
    pub wallpapers: Vec<u32>,
}

/// Wallpaper numbers that cannot currently be bought: claimed by a pending
/// purchase or already sold. Derived, never stored.
pub async fn list_unavailable_wallpapers(
    State(state): State<AppState>,
) -> Result<Json<UnavailableWallpapersResponse>> {
    let conn = state.db.get()?;
    let taken = queries::unavailable_wallpapers(&conn)?;

    Ok(Json(UnavailableWallpapersResponse {
        wallpapers: taken.into_iter().collect(),
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/purchases", post(create_purchase))
        .route("/purchases/{id}", get(get_purchase))
        .route("/wallpapers/unavailable", get(list_unavailable_wallpapers))
}
