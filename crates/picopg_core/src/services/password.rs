//! Reversible password transform for saved profiles.
//!
//! Passwords are base64-encoded before they reach local storage so the stored
//! list stays compatible with existing picopg data. This is an encoding and
//! offers no protection: anyone who can read the data directory can read the
//! passwords.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::PicoError;

/// Encode a plain password for storage. The empty password stays empty.
pub fn encode(plain: &str) -> String {
    if plain.is_empty() {
        return String::new();
    }
    STANDARD.encode(plain.as_bytes())
}

/// Decode a stored password. The empty string decodes to the empty password.
pub fn decode(stored: &str) -> Result<String, PicoError> {
    if stored.is_empty() {
        return Ok(String::new());
    }
    let bytes = STANDARD.decode(stored.as_bytes())?;
    String::from_utf8(bytes)
        .map_err(|e| PicoError::storage_with_source("Stored password is not valid UTF-8", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_encoding() {
        assert_eq!(encode("postgres"), "cG9zdGdyZXM=");
        assert_eq!(decode("cG9zdGdyZXM=").unwrap(), "postgres");
    }

    #[test]
    fn test_empty_password() {
        assert_eq!(encode(""), "");
        assert_eq!(decode("").unwrap(), "");
    }

    #[test]
    fn test_non_ascii_password() {
        let stored = encode("pässwörd");
        assert_ne!(stored, "pässwörd");
        assert_eq!(decode(&stored).unwrap(), "pässwörd");
    }

    #[test]
    fn test_invalid_stored_value() {
        assert!(decode("%%%").is_err());
        // valid base64, invalid UTF-8
        assert!(decode("/w==").is_err());
    }
}
