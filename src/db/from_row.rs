//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::{Purchase, PurchaseStatus};
use crate::payments::Provider;

/// Parse a string column into an enum type, converting parse errors to
/// rusqlite errors instead of panicking on corrupt data.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Parse the wallpaper-numbers JSON array column.
fn parse_wallpapers(row: &Row, col: usize) -> rusqlite::Result<Vec<u32>> {
    let raw: String = row.get(col)?;
    serde_json::from_str(&raw).map_err(|_| {
        rusqlite::Error::InvalidColumnType(
            col,
            "wallpaper_numbers".to_string(),
            rusqlite::types::Type::Text,
        )
    })
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const PURCHASE_COLS: &str = "id, wallpaper_numbers, buyer_email, buyer_name, \
     buyer_national_id, buyer_phone, provider, external_reference, \
     provider_transaction_id, provider_confirmed, amount_cents, currency, \
     status, created_at, updated_at";

impl FromRow for Purchase {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Purchase {
            id: row.get(0)?,
            wallpaper_numbers: parse_wallpapers(row, 1)?,
            buyer_email: row.get(2)?,
            buyer_name: row.get(3)?,
            buyer_national_id: row.get(4)?,
            buyer_phone: row.get(5)?,
            provider: parse_enum::<Provider>(row, 6, "provider")?,
            external_reference: row.get(7)?,
            provider_transaction_id: row.get(8)?,
            provider_confirmed: row.get(9)?,
            amount_cents: row.get(10)?,
            currency: row.get(11)?,
            status: parse_enum::<PurchaseStatus>(row, 12, "status")?,
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
        })
    }
}
