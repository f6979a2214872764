use std::collections::BTreeSet;

use chrono::Utc;
use rusqlite::{params, Connection};

use crate::error::{msg, AppError, Result};
use crate::id;
use crate::models::{CreatePurchase, Purchase, PurchaseStatus};
use crate::payments::Provider;

use super::from_row::{query_all, query_one, PURCHASE_COLS};

fn now() -> i64 {
    Utc::now().timestamp()
}

/// Insert a new purchase in PENDING.
///
/// The UNIQUE constraint on external_reference backs up the generator's
/// uniqueness guarantee; a collision surfaces as a constraint error here
/// rather than as two purchases sharing a reference.
pub fn create_purchase(conn: &Connection, input: &CreatePurchase) -> Result<Purchase> {
    if input.wallpaper_numbers.is_empty() {
        return Err(AppError::BadRequest(msg::EMPTY_WALLPAPER_SET.into()));
    }

    let purchase_id = id::purchase_id();
    let wallpapers = serde_json::to_string(&input.wallpaper_numbers)?;
    let created_at = now();

    conn.execute(
        "INSERT INTO purchases (id, wallpaper_numbers, buyer_email, buyer_name, \
         buyer_national_id, buyer_phone, provider, external_reference, \
         provider_transaction_id, provider_confirmed, amount_cents, currency, \
         status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10, ?11, ?12, ?13, ?13)",
        params![
            purchase_id,
            wallpapers,
            input.buyer_email,
            input.buyer_name,
            input.buyer_national_id,
            input.buyer_phone,
            input.provider.as_ref(),
            input.external_reference,
            input.provider_transaction_id,
            input.amount_cents,
            input.currency,
            PurchaseStatus::Pending.as_ref(),
            created_at,
        ],
    )?;

    Ok(Purchase {
        id: purchase_id,
        wallpaper_numbers: input.wallpaper_numbers.clone(),
        buyer_email: input.buyer_email.clone(),
        buyer_name: input.buyer_name.clone(),
        buyer_national_id: input.buyer_national_id.clone(),
        buyer_phone: input.buyer_phone.clone(),
        provider: input.provider,
        external_reference: input.external_reference.clone(),
        provider_transaction_id: input.provider_transaction_id.clone(),
        provider_confirmed: false,
        amount_cents: input.amount_cents,
        currency: input.currency.clone(),
        status: PurchaseStatus::Pending,
        created_at,
        updated_at: created_at,
    })
}

pub fn get_purchase_by_id(conn: &Connection, id: &str) -> Result<Option<Purchase>> {
    query_one(
        conn,
        &format!("SELECT {} FROM purchases WHERE id = ?1", PURCHASE_COLS),
        &[&id],
    )
}

pub fn get_purchase_by_reference(conn: &Connection, reference: &str) -> Result<Option<Purchase>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM purchases WHERE external_reference = ?1",
            PURCHASE_COLS
        ),
        &[&reference],
    )
}

pub fn get_purchase_by_provider_transaction(
    conn: &Connection,
    provider: Provider,
    transaction_id: &str,
) -> Result<Option<Purchase>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM purchases WHERE provider = ?1 AND provider_transaction_id = ?2",
            PURCHASE_COLS
        ),
        &[&provider.as_ref(), &transaction_id],
    )
}

/// All purchases in a given status, oldest first.
///
/// Ordering matters for sweep fairness: under pacing, the purchases that
/// have waited longest get looked at first.
pub fn list_purchases_by_status(
    conn: &Connection,
    status: PurchaseStatus,
) -> Result<Vec<Purchase>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM purchases WHERE status = ?1 ORDER BY created_at ASC",
            PURCHASE_COLS
        ),
        &[&status.as_ref()],
    )
}

/// Conditional status write: succeeds only if the row still holds the
/// status the caller read when it decided the transition.
///
/// Returns false when the guard fails: either the row is gone or another
/// writer (webhook vs. sweep) got there first. Losing that race is not an
/// error; the winner already moved the purchase forward.
pub fn try_transition_status(
    conn: &Connection,
    id: &str,
    expected: PurchaseStatus,
    next: PurchaseStatus,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE purchases SET status = ?1, updated_at = ?2 \
         WHERE id = ?3 AND status = ?4",
        params![next.as_ref(), now(), id, expected.as_ref()],
    )?;
    Ok(affected > 0)
}

/// Record the provider-issued transaction id and mark it confirmed,
/// replacing any unconfirmed checkout handle stored at creation.
///
/// First confirmation wins: once provider_confirmed is set the id is never
/// replaced, so duplicate webhook deliveries cannot flap it.
pub fn confirm_provider_transaction(
    conn: &Connection,
    id: &str,
    transaction_id: &str,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE purchases SET provider_transaction_id = ?1, provider_confirmed = 1, \
         updated_at = ?2 WHERE id = ?3 AND provider_confirmed = 0",
        params![transaction_id, now(), id],
    )?;
    Ok(affected > 0)
}

/// The derived availability view: wallpaper numbers claimed by any purchase
/// that is pending or successfully paid. Not stored anywhere, just recomputed
/// from the purchase rows each time.
pub fn unavailable_wallpapers(conn: &Connection) -> Result<BTreeSet<u32>> {
    let mut stmt = conn.prepare(
        "SELECT wallpaper_numbers FROM purchases WHERE status IN (?1, ?2)",
    )?;
    let rows = stmt.query_map(
        params![
            PurchaseStatus::Pending.as_ref(),
            PurchaseStatus::Approved.as_ref()
        ],
        |row| row.get::<_, String>(0),
    )?;

    let mut taken = BTreeSet::new();
    for raw in rows {
        let numbers: Vec<u32> = serde_json::from_str(&raw?)?;
        taken.extend(numbers);
    }
    Ok(taken)
}
