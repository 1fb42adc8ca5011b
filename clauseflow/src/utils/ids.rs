//! Run identifier generation and validation.

use crate::errors::StoreError;
use uuid::Uuid;

/// Longest accepted run id.
pub const MAX_RUN_ID_LEN: usize = 128;

/// Generates a new run id (UUID v4).
#[must_use]
pub fn generate_run_id() -> String {
    Uuid::new_v4().to_string()
}

/// Checks that a run id is usable as a storage key and file name.
///
/// Accepted ids are non-empty, at most [`MAX_RUN_ID_LEN`] characters, and
/// contain only ASCII letters, digits, `-` and `_`.
pub fn validate_run_id(run_id: &str) -> Result<(), StoreError> {
    let valid = !run_id.is_empty()
        && run_id.len() <= MAX_RUN_ID_LEN
        && run_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidRunId(run_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(generate_run_id(), generate_run_id());
    }

    #[test]
    fn test_validate_run_id() {
        assert!(validate_run_id("run_2026-10-16").is_ok());
        assert!(validate_run_id("").is_err());
        assert!(validate_run_id("../etc/passwd").is_err());
        assert!(validate_run_id("has space").is_err());
        assert!(validate_run_id(&"a".repeat(MAX_RUN_ID_LEN)).is_ok());
        assert!(validate_run_id(&"a".repeat(MAX_RUN_ID_LEN + 1)).is_err());
    }
}
