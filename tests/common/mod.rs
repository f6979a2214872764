//! Test utilities and fixtures for Fondo integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use rusqlite::{params, Connection};
use tempfile::TempDir;

pub use fondo::config::{MercadoPagoConfig, PricingConfig, WompiConfig};
pub use fondo::db::{create_pool, init_db, queries, AppState, DbPool};
pub use fondo::models::*;
pub use fondo::payments::{
    MercadoPagoClient, Provider, ProviderError, ProviderSet, TransactionStatusSource, WompiClient,
};

pub const TEST_WOMPI_EVENTS_SECRET: &str = "test_events_secret";
pub const TEST_WOMPI_INTEGRITY_SECRET: &str = "test_integrity_secret";
pub const TEST_MP_WEBHOOK_SECRET: &str = "test_mp_webhook_secret";

/// Create an in-memory test database with schema initialized
pub fn setup_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    init_db(&conn).expect("Failed to initialize schema");
    conn
}

/// Create a file-backed pool (the sweep and handlers take a pool, and
/// pooled in-memory databases would not share state)
pub fn setup_test_pool() -> (TempDir, DbPool) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("fondo_test.db");
    let pool = create_pool(path.to_str().expect("non-UTF-8 temp path"))
        .expect("Failed to create pool");
    {
        let conn = pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize schema");
    }
    (dir, pool)
}

pub fn test_wompi_config() -> WompiConfig {
    WompiConfig {
        api_url: "http://127.0.0.1:9/v1".to_string(),
        checkout_url: "https://checkout.wompi.co/p/".to_string(),
        public_key: "pub_test_xxx".to_string(),
        private_key: "prv_test_xxx".to_string(),
        integrity_secret: TEST_WOMPI_INTEGRITY_SECRET.to_string(),
        events_secret: TEST_WOMPI_EVENTS_SECRET.to_string(),
    }
}

pub fn test_mercado_pago_config() -> MercadoPagoConfig {
    MercadoPagoConfig {
        api_url: "http://127.0.0.1:9".to_string(),
        access_token: "TEST-token".to_string(),
        webhook_secret: TEST_MP_WEBHOOK_SECRET.to_string(),
    }
}

/// App state wired to a temp database and clients pointing at a dead
/// address; anything that would hit the network fails fast instead.
pub fn test_app_state() -> (TempDir, AppState) {
    let (dir, pool) = setup_test_pool();
    let state = AppState {
        db: pool,
        providers: ProviderSet {
            wompi: WompiClient::new(&test_wompi_config()),
            mercado_pago: MercadoPagoClient::new(&test_mercado_pago_config()),
        },
        pricing: PricingConfig {
            wallpaper_price_cents: 2_500_000,
            currency: "COP".to_string(),
        },
        base_url: "http://localhost:3000".to_string(),
        redirect_url: "http://localhost:3000".to_string(),
    };
    (dir, state)
}

/// Create a test purchase in PENDING
pub fn create_test_purchase(
    conn: &Connection,
    provider: Provider,
    reference: &str,
    wallpapers: &[u32],
) -> Purchase {
    queries::create_purchase(
        conn,
        &CreatePurchase {
            wallpaper_numbers: wallpapers.to_vec(),
            buyer_email: "buyer@example.com".to_string(),
            buyer_name: "Test Buyer".to_string(),
            buyer_national_id: "1020304050".to_string(),
            buyer_phone: "+573001112233".to_string(),
            provider,
            external_reference: reference.to_string(),
            provider_transaction_id: None,
            amount_cents: 2_500_000 * wallpapers.len() as i64,
            currency: "COP".to_string(),
        },
    )
    .expect("Failed to create test purchase")
}

/// Store an unconfirmed checkout handle, the way purchase creation does
/// for providers that hand one out
pub fn record_unconfirmed_handle(conn: &Connection, id: &str, handle: &str) {
    conn.execute(
        "UPDATE purchases SET provider_transaction_id = ?1 WHERE id = ?2",
        params![handle, id],
    )
    .expect("Failed to record handle");
}

/// Backdate a purchase so the sweep's timeout policies see it as old
pub fn backdate_purchase(conn: &Connection, id: &str, seconds: i64) {
    conn.execute(
        "UPDATE purchases SET created_at = created_at - ?1 WHERE id = ?2",
        params![seconds, id],
    )
    .expect("Failed to backdate purchase");
}

/// Canned provider responses for sweep tests
#[derive(Debug, Clone, Copy)]
pub enum StubResponse {
    Status(&'static str),
    Unavailable,
    NotFound,
    RateLimited,
    Malformed,
}

/// A [`TransactionStatusSource`] that answers from a fixed table instead of
/// the network. Unknown transaction ids answer NotFound.
#[derive(Default)]
pub struct StubStatusSource {
    responses: HashMap<String, StubResponse>,
}

impl StubStatusSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, transaction_id: &str, response: StubResponse) -> Self {
        self.responses.insert(transaction_id.to_string(), response);
        self
    }
}

impl TransactionStatusSource for StubStatusSource {
    fn fetch_native_status<'a>(
        &'a self,
        _provider: Provider,
        transaction_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, ProviderError>> + Send + 'a>> {
        Box::pin(async move {
            match self.responses.get(transaction_id) {
                Some(StubResponse::Status(s)) => Ok(s.to_string()),
                Some(StubResponse::Unavailable) => {
                    Err(ProviderError::Unavailable("stubbed outage".to_string()))
                }
                Some(StubResponse::NotFound) | None => Err(ProviderError::NotFound),
                Some(StubResponse::RateLimited) => Err(ProviderError::RateLimited),
                Some(StubResponse::Malformed) => {
                    Err(ProviderError::Malformed("stubbed garbage".to_string()))
                }
            }
        })
    }
}
