//! Temp-id generation for entities created offline.

use uuid::Uuid;

/// Reserved prefix marking identifiers assigned on the device.
///
/// An entity created while offline receives a temp id before it is cached.
/// The id is rewritten in place to the server-assigned id when the create
/// is pushed; a temp id must never reach the backend.
pub const TEMP_ID_PREFIX: &str = "temp_";

/// Generates a fresh temp id.
#[must_use]
pub fn temp_id() -> String {
    format!("{TEMP_ID_PREFIX}{}", Uuid::new_v4().simple())
}

/// Returns true if `id` carries the reserved temp prefix.
#[must_use]
pub fn is_temp_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_ids_are_unique() {
        let a = temp_id();
        let b = temp_id();
        assert_ne!(a, b);
    }

    #[test]
    fn temp_ids_carry_prefix() {
        assert!(is_temp_id(&temp_id()));
        assert!(is_temp_id("temp_abc"));
        assert!(!is_temp_id("abc"));
        assert!(!is_temp_id(""));
    }
}
