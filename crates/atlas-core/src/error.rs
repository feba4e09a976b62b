//! # Error Types
//!
//! Cross-layer error vocabulary for the Atlas backend.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  atlas-core errors (this file)                                         │
//! │  ├── ErrorStatus      - Status classification (maps to HTTP status)   │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  atlas-db errors (separate crate)                                      │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  Flow: DbError carries an ErrorStatus → HTTP edge serializes it        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (field names, limits)
//! 3. Errors are enum variants, never String

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Status Classification
// =============================================================================

/// Status class attached to every error that crosses a layer boundary.
///
/// The database layer classifies driver failures into one of these
/// (unique-constraint violations become [`ErrorStatus::Conflict`], anything
/// unexpected becomes [`ErrorStatus::Internal`]); the HTTP edge maps the
/// class onto a response status without inspecting driver details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorStatus {
    /// Malformed or rejected input.
    BadRequest,
    /// Missing or invalid credentials.
    Unauthorized,
    /// Authenticated but not allowed.
    Forbidden,
    /// The requested row/resource does not exist.
    NotFound,
    /// State conflict, e.g. a unique-constraint violation.
    Conflict,
    /// Unexpected failure; the safe default classification.
    Internal,
    /// A downstream dependency (the database) is unreachable.
    Unavailable,
}

impl ErrorStatus {
    /// Numeric status code this class maps onto at the HTTP edge.
    pub fn code(&self) -> u16 {
        match self {
            ErrorStatus::BadRequest => 400,
            ErrorStatus::Unauthorized => 401,
            ErrorStatus::Forbidden => 403,
            ErrorStatus::NotFound => 404,
            ErrorStatus::Conflict => 409,
            ErrorStatus::Internal => 500,
            ErrorStatus::Unavailable => 503,
        }
    }

    /// True for classes the caller can fix by changing the request.
    pub fn is_client_error(&self) -> bool {
        self.code() < 500
    }
}

impl std::fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorStatus::BadRequest => "BAD_REQUEST",
            ErrorStatus::Unauthorized => "UNAUTHORIZED",
            ErrorStatus::Forbidden => "FORBIDDEN",
            ErrorStatus::NotFound => "NOT_FOUND",
            ErrorStatus::Conflict => "CONFLICT",
            ErrorStatus::Internal => "INTERNAL",
            ErrorStatus::Unavailable => "UNAVAILABLE",
        };
        write!(f, "{}", name)
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation failures.
///
/// Raised by [`crate::validation`] before a value ever reaches the
/// database layer.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ValidationError {
    /// A required field was empty or missing.
    #[error("{field} is required")]
    Required { field: String },

    /// Value exceeds the maximum allowed length.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value does not match the expected format.
    #[error("{field} is invalid: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// A check-digit protected number failed verification.
    #[error("{field} has invalid check digits")]
    CheckDigitMismatch { field: String },
}

impl ValidationError {
    /// Every validation failure is a client error.
    pub fn status(&self) -> ErrorStatus {
        ErrorStatus::BadRequest
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ErrorStatus::Conflict.code(), 409);
        assert_eq!(ErrorStatus::Internal.code(), 500);
        assert_eq!(ErrorStatus::NotFound.code(), 404);
    }

    #[test]
    fn test_client_error_split() {
        assert!(ErrorStatus::BadRequest.is_client_error());
        assert!(ErrorStatus::Conflict.is_client_error());
        assert!(!ErrorStatus::Internal.is_client_error());
        assert!(!ErrorStatus::Unavailable.is_client_error());
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::TooLong {
            field: "name".to_string(),
            max: 200,
        };
        assert_eq!(err.to_string(), "name must be at most 200 characters");
        assert_eq!(err.status(), ErrorStatus::BadRequest);
    }
}
