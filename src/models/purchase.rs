use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use crate::payments::Provider;

/// Canonical purchase status.
///
/// `Approved` is the single terminal-success status: both Wompi's APPROVED
/// and Mercado Pago's approved normalize to it. `Rejected` means the
/// provider declined the payment; `Cancelled` means the purchase timed out,
/// was voided, or was abandoned before payment. Everything except `Pending`
/// is terminal and sticky: once written, no automated path changes it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PurchaseStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl PurchaseStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, PurchaseStatus::Pending)
    }
}

/// A sale of one or more numbered wallpapers to one buyer.
///
/// Never deleted (audit trail); mutated only through the status transition
/// path and the provider transaction confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Purchase {
    pub id: String,
    /// Non-empty, fixed at creation
    pub wallpaper_numbers: Vec<u32>,
    pub buyer_email: String,
    pub buyer_name: String,
    /// Cédula / national id, required by local payment regulation
    pub buyer_national_id: String,
    pub buyer_phone: String,
    pub provider: Provider,
    /// Our correlation key, handed to the provider at checkout. Unique.
    pub external_reference: String,
    /// Checkout handle recorded at creation (when the provider issues one)
    /// or the provider's real transaction id once confirmed. Trustworthy
    /// as a transaction id only when `provider_confirmed` is set.
    pub provider_transaction_id: Option<String>,
    /// True only after the provider positively confirmed the transaction id
    /// (signed webhook or successful status fetch). Drives the sweep's
    /// timeout policy selection.
    pub provider_confirmed: bool,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PurchaseStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Input for inserting a new purchase row.
///
/// The external reference is generated before the row exists because the
/// provider checkout has to be created first.
#[derive(Debug, Clone)]
pub struct CreatePurchase {
    pub wallpaper_numbers: Vec<u32>,
    pub buyer_email: String,
    pub buyer_name: String,
    pub buyer_national_id: String,
    pub buyer_phone: String,
    pub provider: Provider,
    pub external_reference: String,
    /// Checkout handle from the provider, if it assigned one at creation
    pub provider_transaction_id: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
}
