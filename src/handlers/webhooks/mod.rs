pub mod common;
pub mod mercadopago;
pub mod wompi;

pub use mercadopago::handle_mercadopago_webhook;
pub use wompi::handle_wompi_webhook;

use axum::{routing::post, Router};

use crate::db::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/webhook/wompi", post(handle_wompi_webhook))
        .route("/webhook/mercadopago", post(handle_mercadopago_webhook))
}
