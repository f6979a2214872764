mod mercadopago;
mod status;
mod wompi;

pub use mercadopago::*;
pub use status::*;
pub use wompi::*;

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};
use thiserror::Error;

/// Supported payment networks. Closed set; adding one means adding a client
/// module, a status mapping table and a webhook source.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Wompi,
    #[strum(to_string = "mercadopago", serialize = "mp")]
    #[serde(rename = "mercadopago")]
    MercadoPago,
}

/// Failure taxonomy for provider network calls.
///
/// `fetch` never guesses a status: any of these means "no answer", and the
/// caller decides what that implies (the sweep maps the first three onto the
/// hard-timeout policy).
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider unreachable: {0}")]
    Unavailable(String),

    #[error("provider has no record of the transaction")]
    NotFound,

    #[error("provider rate limit hit")]
    RateLimited,

    #[error("unexpected provider response: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Errors the sweep recovers from via the timeout table rather than
    /// reporting as unexpected.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ProviderError::Malformed(_))
    }
}

/// Input to checkout creation, provider-agnostic.
#[derive(Debug, Clone)]
pub struct CheckoutIntent<'a> {
    pub reference: &'a str,
    pub amount_cents: i64,
    pub currency: &'a str,
    pub buyer_email: &'a str,
    pub buyer_name: &'a str,
    /// Where the buyer lands after paying
    pub redirect_url: &'a str,
    /// Where the provider pushes events (used by providers that take a
    /// per-checkout notification URL)
    pub notification_url: &'a str,
}

/// Result of checkout creation.
#[derive(Debug, Clone)]
pub struct CreatedCheckout {
    pub checkout_url: String,
    /// Provider-side handle for the checkout, when the provider assigns one
    /// at creation (Mercado Pago preference id). Not a transaction id.
    pub provider_handle: Option<String>,
    /// Integrity signature embedded in the checkout, when the provider
    /// requires one (Wompi)
    pub integrity_signature: Option<String>,
}

/// Live transaction status lookup, dispatched by provider.
///
/// Object-safe via boxed futures so the sweep can take `&dyn` and tests can
/// substitute a stub that never touches the network.
pub trait TransactionStatusSource: Send + Sync {
    /// Fetch the provider-native status string for a transaction id.
    fn fetch_native_status<'a>(
        &'a self,
        provider: Provider,
        transaction_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, ProviderError>> + Send + 'a>>;
}

/// The concrete client pair the application runs with.
#[derive(Clone)]
pub struct ProviderSet {
    pub wompi: WompiClient,
    pub mercado_pago: MercadoPagoClient,
}

impl ProviderSet {
    pub fn new(config: &crate::config::Config) -> Self {
        Self {
            wompi: WompiClient::new(&config.wompi),
            mercado_pago: MercadoPagoClient::new(&config.mercado_pago),
        }
    }
}

impl TransactionStatusSource for ProviderSet {
    fn fetch_native_status<'a>(
        &'a self,
        provider: Provider,
        transaction_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, ProviderError>> + Send + 'a>> {
        Box::pin(async move {
            match provider {
                Provider::Wompi => {
                    let tx = self.wompi.fetch_transaction(transaction_id).await?;
                    Ok(tx.status)
                }
                Provider::MercadoPago => {
                    let payment = self.mercado_pago.fetch_payment(transaction_id).await?;
                    Ok(payment.status)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parses_aliases() {
        assert_eq!("wompi".parse::<Provider>().unwrap(), Provider::Wompi);
        assert_eq!(
            "mercadopago".parse::<Provider>().unwrap(),
            Provider::MercadoPago
        );
        assert_eq!("mp".parse::<Provider>().unwrap(), Provider::MercadoPago);
        assert!("stripe".parse::<Provider>().is_err());
    }

    #[test]
    fn test_provider_round_trips_through_storage_form() {
        for provider in [Provider::Wompi, Provider::MercadoPago] {
            assert_eq!(provider.as_ref().parse::<Provider>().unwrap(), provider);
        }
    }
}
