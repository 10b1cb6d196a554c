//! Column conversion helpers shared by the PostgreSQL adapters.

use std::fmt::Display;

use crate::domain::foundation::{DomainError, ErrorCode};

pub(super) fn db_error(context: &str, err: impl Display) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, format!("Failed to {}: {}", context, err))
}

/// A stored value that no longer parses into its domain type.
pub(super) fn invalid_column(column: &str, err: impl Display) -> DomainError {
    DomainError::new(
        ErrorCode::DataIntegrity,
        format!("Invalid {} value: {}", column, err),
    )
}

pub(super) fn to_i32(column: &str, value: u32) -> Result<i32, DomainError> {
    i32::try_from(value).map_err(|e| invalid_column(column, e))
}

pub(super) fn to_u32(column: &str, value: i32) -> Result<u32, DomainError> {
    u32::try_from(value).map_err(|e| invalid_column(column, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_counts_are_integrity_errors() {
        let err = to_u32("current_attempt", -1).unwrap_err();
        assert_eq!(err.code, ErrorCode::DataIntegrity);
        assert!(err.message.contains("current_attempt"));
    }

    #[test]
    fn large_counts_do_not_fit_integer_columns() {
        assert!(to_i32("attempt_number", u32::MAX).is_err());
        assert_eq!(to_i32("attempt_number", 3).unwrap(), 3);
    }
}
