//! Provider status normalization.
//!
//! Each provider speaks its own status vocabulary; everything the rest of
//! the system sees is [`PurchaseStatus`]. Mapping is total: a string we do
//! not recognize normalizes to `Pending`, so a provider rolling out a new
//! status can never push a purchase into a wrong terminal state; the next
//! sweep or event gets another chance at it.
//!
//! The tables are disjoint per provider and must never be cross-applied;
//! Wompi's `VOIDED` and Mercado Pago's `cancelled` only mean what they mean
//! in their own vocabulary.

use crate::models::PurchaseStatus;

use super::Provider;

/// Map a provider-native status string to the canonical status.
pub fn normalize(provider: Provider, native: &str) -> PurchaseStatus {
    match provider {
        Provider::Wompi => normalize_wompi(native),
        Provider::MercadoPago => normalize_mercado_pago(native),
    }
}

fn normalize_wompi(native: &str) -> PurchaseStatus {
    match native {
        "APPROVED" => PurchaseStatus::Approved,
        "DECLINED" | "ERROR" => PurchaseStatus::Rejected,
        "VOIDED" => PurchaseStatus::Cancelled,
        "PENDING" => PurchaseStatus::Pending,
        other => {
            tracing::debug!("unknown Wompi status '{}', treating as PENDING", other);
            PurchaseStatus::Pending
        }
    }
}

fn normalize_mercado_pago(native: &str) -> PurchaseStatus {
    match native {
        "approved" => PurchaseStatus::Approved,
        "rejected" => PurchaseStatus::Rejected,
        // Post-approval money movement is recorded as a status only; a
        // terminal purchase is sticky, so these matter just for payments
        // that die before approval.
        "cancelled" | "refunded" | "charged_back" => PurchaseStatus::Cancelled,
        "pending" | "in_process" | "in_mediation" | "authorized" => PurchaseStatus::Pending,
        other => {
            tracing::debug!(
                "unknown Mercado Pago status '{}', treating as PENDING",
                other
            );
            PurchaseStatus::Pending
        }
    }
}
