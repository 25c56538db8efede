//! Metadata key syntax.
//!
//! Keys are case-insensitive: they are lower-cased first and then must
//! consist of digits, lowercase ASCII letters, `.`, `_` and `-` only.

use crate::SpecError;
use regex::Regex;
use std::sync::OnceLock;

/// Accepted key syntax (applied after lower-casing).
pub const KEY_PATTERN: &str = r"^[0-9a-z._-]+$";

/// Validates and canonicalizes metadata keys.
#[derive(Debug, Clone)]
pub struct KeyValidator {
    pattern: Regex,
}

impl KeyValidator {
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(KEY_PATTERN).expect("KEY_PATTERN is a valid regex"),
        }
    }

    /// Lower-case `raw` and return it if it is a valid key.
    pub fn validate(&self, raw: &str) -> Result<String, SpecError> {
        let key = raw.to_lowercase();
        if !self.pattern.is_match(&key) {
            return Err(SpecError::InvalidKey {
                key,
                pattern: KEY_PATTERN,
            });
        }
        Ok(key)
    }

    pub fn is_valid(&self, raw: &str) -> bool {
        self.validate(raw).is_ok()
    }
}

impl Default for KeyValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn shared_validator() -> &'static KeyValidator {
    static VALIDATOR: OnceLock<KeyValidator> = OnceLock::new();
    VALIDATOR.get_or_init(KeyValidator::new)
}

/// Validate `raw` with the shared validator.
pub fn validate_key(raw: &str) -> Result<String, SpecError> {
    shared_validator().validate(raw)
}
