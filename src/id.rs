//! Prefixed ID and payment reference generation.
//!
//! Purchase IDs use a `fnd_` brand prefix to guarantee collision avoidance
//! with provider identifiers (Wompi's `{shop}-{ts}-{seq}` transaction ids,
//! Mercado Pago's numeric payment ids).
//!
//! Payment references embed a Unix-seconds component plus random hex so a
//! reference can never repeat across purchases, even for the same buyer and
//! wallpaper set.

use chrono::Utc;
use uuid::Uuid;

const PURCHASE_PREFIX: &str = "fnd_pur_";
const REFERENCE_PREFIX: &str = "FND";

/// Generates a new purchase ID: `fnd_pur_{32 hex chars}`.
pub fn purchase_id() -> String {
    format!("{}{}", PURCHASE_PREFIX, Uuid::new_v4().as_simple())
}

/// Generates a new external payment reference: `FND-{unix_ts}-{12 hex chars}`.
///
/// This is the correlation key handed to the payment provider; it must be
/// unique for the lifetime of the system (enforced again by a UNIQUE
/// constraint at the store layer).
pub fn payment_reference() -> String {
    let entropy = Uuid::new_v4().as_simple().to_string();
    format!(
        "{}-{}-{}",
        REFERENCE_PREFIX,
        Utc::now().timestamp(),
        &entropy[..12]
    )
}

/// Validate that a string is a well-formed purchase ID.
///
/// Cheap check to reject garbage before hitting the database.
pub fn is_valid_purchase_id(s: &str) -> bool {
    let Some(hex_part) = s.strip_prefix(PURCHASE_PREFIX) else {
        return false;
    };
    hex_part.len() == 32 && hex_part.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_purchase_id_format() {
        let id = purchase_id();
        assert!(id.starts_with("fnd_pur_"));
        // fnd_pur_ (8 chars) + 32 hex chars = 40 chars total
        assert_eq!(id.len(), 40);
        assert!(is_valid_purchase_id(&id));
    }

    #[test]
    fn test_purchase_ids_are_unique() {
        let id1 = purchase_id();
        let id2 = purchase_id();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_payment_reference_format() {
        let reference = payment_reference();
        let parts: Vec<&str> = reference.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "FND");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 12);
    }

    #[test]
    fn test_payment_references_are_unique() {
        // Same second, different entropy
        assert_ne!(payment_reference(), payment_reference());
    }

    #[test]
    fn test_is_valid_purchase_id_rejects_garbage() {
        assert!(!is_valid_purchase_id(""));
        assert!(!is_valid_purchase_id("fnd_pur_tooshort"));
        assert!(!is_valid_purchase_id("pur_a1b2c3d4e5f6789012345678901234ab"));
        assert!(!is_valid_purchase_id("fnd_pur_a1b2c3d4e5f6789012345678901234zz"));
        // Wompi-shaped id must not pass
        assert!(!is_valid_purchase_id("15113-1668624561-28454"));
    }
}
