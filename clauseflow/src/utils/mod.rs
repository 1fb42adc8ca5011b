//! Utility functions for run identifiers and timestamp handling.

pub mod timestamps;
mod ids;

pub use ids::{generate_run_id, validate_run_id, MAX_RUN_ID_LEN};
pub use timestamps::{cutoff, Timestamp};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_run_id_is_valid() {
        let id = generate_run_id();
        assert!(validate_run_id(&id).is_ok());
    }
}
