//! # Validation Module
//!
//! Request-level value validation for the Atlas backend.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: HTTP edge                                                    │
//! │  ├── Type validation (deserialization)                                 │
//! │  └── THIS MODULE: value-object validation                              │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Database (PostgreSQL)                                        │
//! │  ├── NOT NULL constraints                                              │
//! │  ├── UNIQUE constraints                                                │
//! │  └── Foreign key constraints                                           │
//! │                                                                         │
//! │  Defense in depth: each layer catches different errors                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use atlas_core::validation::validate_cnpj;
//!
//! // Punctuation is accepted and ignored
//! assert!(validate_cnpj("11.222.333/0001-81").is_ok());
//! assert!(validate_cnpj("11222333000180").is_err());
//! ```

use crate::error::ValidationError;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Number of digits in a company registry number (CNPJ).
const CNPJ_LEN: usize = 14;

// =============================================================================
// Registry Number (CNPJ)
// =============================================================================

/// Validates a Brazilian company registry number (CNPJ).
///
/// ## Rules
/// - Exactly 14 digits after stripping `.`, `/` and `-`
/// - Not all digits identical (catches `00000000000000` and friends)
/// - Both check digits must verify; a number with only one matching
///   check digit is rejected
///
/// ## Check Digit Algorithm
/// The 13th digit is computed over the first 12 digits and the 14th over
/// the first 13, each as a weighted sum mod 11 (`rem < 2` maps to 0).
pub fn validate_cnpj(input: &str) -> ValidationResult<()> {
    let digits: Vec<u32> = input
        .chars()
        .filter(|c| !matches!(c, '.' | '/' | '-' | ' '))
        .map(|c| c.to_digit(10).ok_or(()))
        .collect::<Result<_, _>>()
        .map_err(|_| ValidationError::InvalidFormat {
            field: "cnpj".to_string(),
            reason: "must contain only digits and separators".to_string(),
        })?;

    if digits.is_empty() {
        return Err(ValidationError::Required {
            field: "cnpj".to_string(),
        });
    }

    if digits.len() != CNPJ_LEN {
        return Err(ValidationError::InvalidFormat {
            field: "cnpj".to_string(),
            reason: format!("must have exactly {} digits", CNPJ_LEN),
        });
    }

    // Sequences like 11.111.111/1111-11 pass the check-digit math but are
    // not valid registry numbers
    if digits.iter().all(|&d| d == digits[0]) {
        return Err(ValidationError::InvalidFormat {
            field: "cnpj".to_string(),
            reason: "repeated digit sequence".to_string(),
        });
    }

    let first = check_digit(&digits[..12]);
    let second = check_digit(&digits[..13]);

    // Both digits must match
    if first != digits[12] || second != digits[13] {
        return Err(ValidationError::CheckDigitMismatch {
            field: "cnpj".to_string(),
        });
    }

    Ok(())
}

/// Weighted mod-11 check digit over a 12- or 13-digit prefix.
///
/// Weights run 5..2 then wrap to 9..2 for the first digit, 6..2 then 9..2
/// for the second; equivalent to starting at `len - 7` and resetting to 9
/// after 2.
fn check_digit(prefix: &[u32]) -> u32 {
    let mut weight = (prefix.len() as u32) - 7;
    let mut sum = 0;

    for &digit in prefix {
        sum += digit * weight;
        weight -= 1;
        if weight < 2 {
            weight = 9;
        }
    }

    let rem = sum % 11;
    if rem < 2 {
        0
    } else {
        11 - rem
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_cnpj() {
        assert!(validate_cnpj("11222333000181").is_ok());
        assert!(validate_cnpj("11.222.333/0001-81").is_ok());
    }

    #[test]
    fn test_single_bad_check_digit_rejected() {
        // 13th digit wrong
        assert!(validate_cnpj("11222333000171").is_err());
        // 14th digit wrong
        assert!(validate_cnpj("11222333000180").is_err());
    }

    #[test]
    fn test_repeated_digits_rejected() {
        assert!(validate_cnpj("00000000000000").is_err());
        assert!(validate_cnpj("11.111.111/1111-11").is_err());
    }

    #[test]
    fn test_length_and_format() {
        assert!(validate_cnpj("").is_err());
        assert!(validate_cnpj("1122233300018").is_err());
        assert!(validate_cnpj("112223330001811").is_err());
        assert!(validate_cnpj("1122233300018a").is_err());
    }
}
