//! Decoded-code sanity checks.
//!
//! This is a cheap pre-filter run before any network call. It rejects empty,
//! whitespace-only and obviously garbled payloads; it is not a format
//! authority, the remote validator decides whether a ticket is real.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Minimum trimmed length of an acceptable code.
pub const MIN_CODE_LENGTH: usize = 2;

/// Accepted shapes. A code passes if any one of them matches.
static CODE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // Uppercase alphanumeric with hyphens and underscores
        r"^[A-Z0-9\-_]+$",
        // Mixed-case alphanumeric with hyphens and underscores
        r"^[a-zA-Z0-9\-_]+$",
        // Digits only
        r"^[0-9]+$",
        // Alphanumeric extended with dots, slashes and whitespace
        r"^[a-zA-Z0-9\-_./\s]+$",
        r"^[A-Z0-9\-_./\s]+$",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// Why a decoded code was rejected before reaching the network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// Nothing but whitespace was decoded.
    #[error("Scanned code is empty")]
    Empty,

    /// The trimmed code is shorter than [`MIN_CODE_LENGTH`].
    #[error("Scanned code is too short (minimum {min} characters, got {actual})")]
    TooShort {
        /// Minimum accepted length.
        min: usize,
        /// Trimmed length of the scanned code.
        actual: usize,
    },

    /// The code contains characters no accepted pattern allows.
    #[error("Scanned code contains unsupported characters")]
    UnsupportedCharacters,
}

/// Checks a decoded payload and returns its trimmed form.
///
/// # Errors
///
/// Returns a [`FormatError`] describing the first rule the code breaks.
pub fn check_code(raw: &str) -> Result<&str, FormatError> {
    let clean = raw.trim();
    let length = clean.chars().count();

    if length == 0 {
        return Err(FormatError::Empty);
    }
    if length < MIN_CODE_LENGTH {
        return Err(FormatError::TooShort {
            min: MIN_CODE_LENGTH,
            actual: length,
        });
    }
    if CODE_PATTERNS.iter().any(|pattern| pattern.is_match(clean)) {
        Ok(clean)
    } else {
        Err(FormatError::UnsupportedCharacters)
    }
}

/// Returns `true` if the decoded payload is worth sending to the validator.
#[inline]
#[must_use]
pub fn is_valid_code(raw: &str) -> bool {
    check_code(raw).is_ok()
}
