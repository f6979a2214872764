use std::time::Duration;

use serde::Deserialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::config::WompiConfig;

use super::{CheckoutIntent, CreatedCheckout, ProviderError};

/// Timeout for every outbound Wompi call. A hung provider call must never
/// stall a sweep beyond this.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct WompiClient {
    client: reqwest::Client,
    api_url: String,
    checkout_url: String,
    public_key: String,
    private_key: String,
    integrity_secret: String,
    events_secret: String,
}

impl WompiClient {
    pub fn new(config: &WompiConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build HTTP client");
        Self {
            client,
            api_url: config.api_url.clone(),
            checkout_url: config.checkout_url.clone(),
            public_key: config.public_key.clone(),
            private_key: config.private_key.clone(),
            integrity_secret: config.integrity_secret.clone(),
            events_secret: config.events_secret.clone(),
        }
    }

    /// Integrity signature Wompi requires on every checkout: SHA-256 hex of
    /// reference + amount + currency + integrity secret. Wompi recomputes it
    /// server-side, so a tampered amount or reference kills the checkout.
    pub fn integrity_signature(&self, reference: &str, amount_cents: i64, currency: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(reference.as_bytes());
        hasher.update(amount_cents.to_string().as_bytes());
        hasher.update(currency.as_bytes());
        hasher.update(self.integrity_secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Build a hosted Web Checkout URL. No API call is needed: the checkout
    /// is defined entirely by its query parameters plus the integrity
    /// signature, and Wompi assigns a transaction id only once the buyer
    /// actually starts paying.
    pub fn create_checkout(
        &self,
        intent: &CheckoutIntent<'_>,
    ) -> Result<CreatedCheckout, ProviderError> {
        let signature =
            self.integrity_signature(intent.reference, intent.amount_cents, intent.currency);

        let amount = intent.amount_cents.to_string();
        let url = reqwest::Url::parse_with_params(
            &self.checkout_url,
            [
                ("public-key", self.public_key.as_str()),
                ("currency", intent.currency),
                ("amount-in-cents", amount.as_str()),
                ("reference", intent.reference),
                ("signature:integrity", signature.as_str()),
                ("redirect-url", intent.redirect_url),
                ("customer-data:email", intent.buyer_email),
                ("customer-data:full-name", intent.buyer_name),
            ],
        )
        .map_err(|e| ProviderError::Malformed(format!("checkout URL: {}", e)))?;

        Ok(CreatedCheckout {
            checkout_url: url.into(),
            provider_handle: None,
            integrity_signature: Some(signature),
        })
    }

    /// Fetch the live state of a transaction.
    ///
    /// Never guesses: every failure mode maps to a [`ProviderError`] and the
    /// caller applies its own policy.
    pub async fn fetch_transaction(&self, id: &str) -> Result<WompiTransaction, ProviderError> {
        let url = format!("{}/transactions/{}", self.api_url, id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.private_key)
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("Wompi API: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound);
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited);
        }
        if !status.is_success() {
            return Err(ProviderError::Unavailable(format!("Wompi HTTP {}", status)));
        }

        let envelope: WompiTransactionEnvelope = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(format!("Wompi response: {}", e)))?;

        Ok(envelope.data)
    }

    /// Verify an inbound event's checksum.
    ///
    /// Wompi signs the property values listed in `signature.properties`,
    /// concatenated in order, followed by the event timestamp and the events
    /// secret. Returns false for events whose signed property list we cannot
    /// resolve: an unverifiable checksum is an invalid one.
    pub fn verify_event_checksum(&self, event: &WompiEvent) -> bool {
        let (Some(signature), Some(timestamp)) = (&event.signature, event.timestamp) else {
            return false;
        };
        let Some(transaction) = &event.data.transaction else {
            return false;
        };

        let mut hasher = Sha256::new();
        for property in &signature.properties {
            let value = match property.as_str() {
                "transaction.id" => transaction.id.clone(),
                "transaction.status" => transaction.status.clone(),
                "transaction.reference" => transaction.reference.clone(),
                "transaction.amount_in_cents" => transaction.amount_in_cents.to_string(),
                other => {
                    tracing::warn!("unknown Wompi signed property: {}", other);
                    return false;
                }
            };
            hasher.update(value.as_bytes());
        }
        hasher.update(timestamp.to_string().as_bytes());
        hasher.update(self.events_secret.as_bytes());
        let expected = hex::encode(hasher.finalize());

        // Wompi emits uppercase hex; compare case-insensitively but in
        // constant time.
        let provided = signature.checksum.to_lowercase();
        if expected.len() != provided.len() {
            return false;
        }
        expected.as_bytes().ct_eq(provided.as_bytes()).into()
    }
}

#[derive(Debug, Deserialize)]
struct WompiTransactionEnvelope {
    data: WompiTransaction,
}

/// The transaction object as Wompi reports it, both in `GET /transactions`
/// responses and inside `transaction.updated` events.
#[derive(Debug, Clone, Deserialize)]
pub struct WompiTransaction {
    /// Provider-issued id, e.g. "15113-1668624561-28454"
    pub id: String,
    pub status: String,
    /// Our external reference, echoed back
    pub reference: String,
    pub amount_in_cents: i64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub status_message: Option<String>,
    #[serde(default)]
    pub finalized_at: Option<String>,
}

/// Inbound event envelope. `event` and `data` are the mandatory parts;
/// anything else may be missing on some event types.
#[derive(Debug, Deserialize)]
pub struct WompiEvent {
    pub event: String,
    pub data: WompiEventData,
    #[serde(default)]
    pub signature: Option<WompiEventSignature>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub environment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WompiEventData {
    #[serde(default)]
    pub transaction: Option<WompiTransaction>,
}

#[derive(Debug, Deserialize)]
pub struct WompiEventSignature {
    pub checksum: String,
    pub properties: Vec<String>,
}
