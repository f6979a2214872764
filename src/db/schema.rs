use rusqlite::Connection;

use crate::error::Result;

/// Initialize the schema. Idempotent; runs at startup and in tests.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;

        -- Purchases are never deleted: the row is the audit trail of the
        -- sale. Status is only written through the guarded transition
        -- update, never overwritten blindly.
        CREATE TABLE IF NOT EXISTS purchases (
            id TEXT PRIMARY KEY,
            wallpaper_numbers TEXT NOT NULL,
            buyer_email TEXT NOT NULL,
            buyer_name TEXT NOT NULL,
            buyer_national_id TEXT NOT NULL,
            buyer_phone TEXT NOT NULL,
            provider TEXT NOT NULL,
            external_reference TEXT NOT NULL UNIQUE,
            provider_transaction_id TEXT,
            provider_confirmed INTEGER NOT NULL DEFAULT 0,
            amount_cents INTEGER NOT NULL,
            currency TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'PENDING',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- The sweep scans by status oldest-first; webhooks resolve by
        -- provider transaction id.
        CREATE INDEX IF NOT EXISTS idx_purchases_status
            ON purchases(status, created_at);
        CREATE INDEX IF NOT EXISTS idx_purchases_provider_tx
            ON purchases(provider, provider_transaction_id);
        "#,
    )?;
    Ok(())
}
