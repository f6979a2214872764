use std::time::Duration;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Deserializer, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::MercadoPagoConfig;
use crate::error::{msg, AppError, Result};

use super::{CheckoutIntent, CreatedCheckout, ProviderError};

type HmacSha256 = Hmac<Sha256>;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct CreatePreferenceRequest {
    items: Vec<PreferenceItem>,
    external_reference: String,
    notification_url: String,
    back_urls: PreferenceBackUrls,
    auto_return: String,
    payer: PreferencePayer,
}

#[derive(Debug, Serialize)]
struct PreferenceItem {
    title: String,
    quantity: u32,
    unit_price: f64,
    currency_id: String,
}

#[derive(Debug, Serialize)]
struct PreferenceBackUrls {
    success: String,
    failure: String,
    pending: String,
}

#[derive(Debug, Serialize)]
struct PreferencePayer {
    email: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct CreatePreferenceResponse {
    id: String,
    init_point: String,
}

#[derive(Debug, Clone)]
pub struct MercadoPagoClient {
    client: reqwest::Client,
    api_url: String,
    access_token: String,
    webhook_secret: String,
}

impl MercadoPagoClient {
    pub fn new(config: &MercadoPagoConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build HTTP client");
        Self {
            client,
            api_url: config.api_url.clone(),
            access_token: config.access_token.clone(),
            webhook_secret: config.webhook_secret.clone(),
        }
    }

    /// Create a Checkout Pro preference carrying our external reference.
    ///
    /// Mercado Pago assigns payment ids only when the buyer actually pays;
    /// the preference id returned here is a checkout handle, not a
    /// transaction id, and must not be stored as one.
    pub async fn create_preference(
        &self,
        intent: &CheckoutIntent<'_>,
    ) -> std::result::Result<CreatedCheckout, ProviderError> {
        let request = CreatePreferenceRequest {
            items: vec![PreferenceItem {
                title: format!("Numbered wallpapers ({})", intent.reference),
                quantity: 1,
                // Mercado Pago prices in currency units, not cents
                unit_price: intent.amount_cents as f64 / 100.0,
                currency_id: intent.currency.to_string(),
            }],
            external_reference: intent.reference.to_string(),
            notification_url: intent.notification_url.to_string(),
            back_urls: PreferenceBackUrls {
                success: intent.redirect_url.to_string(),
                failure: intent.redirect_url.to_string(),
                pending: intent.redirect_url.to_string(),
            },
            auto_return: "approved".to_string(),
            payer: PreferencePayer {
                email: intent.buyer_email.to_string(),
                name: intent.buyer_name.to_string(),
            },
        };

        let response = self
            .client
            .post(format!("{}/checkout/preferences", self.api_url))
            .bearer_auth(&self.access_token)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("Mercado Pago API: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Unavailable(format!(
                "Mercado Pago HTTP {}: {}",
                status, body
            )));
        }

        let preference: CreatePreferenceResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(format!("Mercado Pago response: {}", e)))?;

        Ok(CreatedCheckout {
            checkout_url: preference.init_point,
            provider_handle: Some(preference.id),
            integrity_signature: None,
        })
    }

    /// Fetch the live state of a payment.
    pub async fn fetch_payment(
        &self,
        id: &str,
    ) -> std::result::Result<MercadoPagoPayment, ProviderError> {
        let url = format!("{}/v1/payments/{}", self.api_url, id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("Mercado Pago API: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound);
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited);
        }
        if !status.is_success() {
            return Err(ProviderError::Unavailable(format!(
                "Mercado Pago HTTP {}",
                status
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(format!("Mercado Pago response: {}", e)))
    }

    /// Maximum age of a webhook timestamp before it's rejected (in seconds).
    const WEBHOOK_TIMESTAMP_TOLERANCE_SECS: i64 = 300;

    /// Verify the `x-signature` header of an inbound webhook.
    ///
    /// Header format: `ts=timestamp,v1=signature`, where `v1` is the
    /// HMAC-SHA-256 of the manifest `id:{data.id};request-id:{rid};ts:{ts};`
    /// keyed with the webhook secret. Alphanumeric ids are lowercased
    /// before signing, per Mercado Pago's manifest rules.
    pub fn verify_webhook_signature(
        &self,
        data_id: &str,
        request_id: &str,
        signature_header: &str,
    ) -> Result<bool> {
        let parts: Vec<&str> = signature_header.split(',').collect();

        let mut timestamp = None;
        let mut sig_v1 = None;

        for part in parts {
            if let Some(t) = part.trim().strip_prefix("ts=") {
                timestamp = Some(t);
            } else if let Some(s) = part.trim().strip_prefix("v1=") {
                sig_v1 = Some(s);
            }
        }

        let timestamp_str =
            timestamp.ok_or_else(|| AppError::BadRequest(msg::INVALID_SIGNATURE_FORMAT.into()))?;
        let sig_v1 =
            sig_v1.ok_or_else(|| AppError::BadRequest(msg::INVALID_SIGNATURE_FORMAT.into()))?;

        // Reject stale timestamps to blunt replay. Stale deliveries are
        // harmless to state (transitions are idempotent) but there is no
        // reason to accept them as authentic.
        let timestamp_secs: i64 = timestamp_str
            .parse::<i64>()
            .map(|t| if t > 1_000_000_000_000 { t / 1000 } else { t })
            .map_err(|_| AppError::BadRequest(msg::INVALID_SIGNATURE_FORMAT.into()))?;

        let age = chrono::Utc::now().timestamp() - timestamp_secs;
        if age > Self::WEBHOOK_TIMESTAMP_TOLERANCE_SECS {
            tracing::warn!(
                "Mercado Pago webhook rejected: timestamp too old (age={}s, max={}s)",
                age,
                Self::WEBHOOK_TIMESTAMP_TOLERANCE_SECS
            );
            return Ok(false);
        }
        if age < -60 {
            tracing::warn!(
                "Mercado Pago webhook rejected: timestamp in the future (age={}s)",
                age
            );
            return Ok(false);
        }

        let manifest = format!(
            "id:{};request-id:{};ts:{};",
            data_id.to_lowercase(),
            request_id,
            timestamp_str
        );

        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|_| AppError::Internal("invalid webhook secret".into()))?;
        mac.update(manifest.as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());

        // Constant-time comparison; signature length is not secret (always
        // 64 hex chars for SHA-256)
        let expected_bytes = expected.as_bytes();
        let provided_bytes = sig_v1.as_bytes();
        if expected_bytes.len() != provided_bytes.len() {
            return Ok(false);
        }

        Ok(expected_bytes.ct_eq(provided_bytes).into())
    }
}

/// The payment object as Mercado Pago reports it.
#[derive(Debug, Clone, Deserialize)]
pub struct MercadoPagoPayment {
    pub id: i64,
    pub status: String,
    #[serde(default)]
    pub status_detail: Option<String>,
    /// Our external reference, echoed back when the preference carried one
    #[serde(default)]
    pub external_reference: Option<String>,
    #[serde(default)]
    pub transaction_amount: Option<f64>,
}

/// Inbound webhook envelope. Mercado Pago pushes only a pointer (the
/// payment id), never the payment state itself.
#[derive(Debug, Deserialize)]
pub struct MercadoPagoWebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: MercadoPagoEventData,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub live_mode: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct MercadoPagoEventData {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
}

/// `data.id` arrives as a JSON number for payments but as a string in other
/// event families; accept both.
fn id_as_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(i64),
        String(String),
    }

    Ok(match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => n.to_string(),
        NumberOrString::String(s) => s,
    })
}
