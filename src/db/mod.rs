mod from_row;
mod schema;
pub mod queries;

pub use schema::init_db;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::PricingConfig;
use crate::payments::ProviderSet;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state holding the database pool, provider clients and the
/// configuration the handlers need.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub providers: ProviderSet,
    pub pricing: PricingConfig,
    /// Base URL of this API (e.g. https://api.fondo.shop)
    pub base_url: String,
    /// Storefront URL buyers return to after checkout
    pub redirect_url: String,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path);
    Pool::builder().max_size(10).build(manager)
}
