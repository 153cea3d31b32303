//! Checksum normalization
//!
//! Checksums arrive as case-insensitive hexadecimal text from two places: the
//! reference shards and the report rows. Both sides go through [`normalize`]
//! before they are stored or compared, so equality is plain string equality.
//!
//! No digest length is assumed; MD5, SHA-1 and SHA-256 strings are all
//! handled the same way.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Trim surrounding whitespace and lowercase.
///
/// Idempotent: `normalize(&normalize(x)) == normalize(x)`.
pub fn normalize(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

/// Whether `raw` is a non-empty run of hex digits once trimmed.
pub fn is_hex_checksum(raw: &str) -> bool {
    let trimmed = raw.trim();
    !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_hexdigit())
}

/// A normalized checksum
///
/// Construct with [`Checksum::parse`] (validates hex) or
/// [`Checksum::normalized`] (accepts anything, only normalizes).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checksum(String);

impl Checksum {
    /// Normalize and validate a hex checksum. Returns `None` for blank or
    /// non-hex input.
    pub fn parse(raw: &str) -> Option<Self> {
        if is_hex_checksum(raw) {
            Some(Self(normalize(raw)))
        } else {
            None
        }
    }

    /// Normalize without validating.
    pub fn normalized(raw: &str) -> Self {
        Self(normalize(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    /// Number of hex digits
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Checksum {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// Hashes identically to the inner String, so sets of Checksum can be probed with &str.
impl Borrow<str> for Checksum {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_lowercases_and_trims() {
        assert_eq!(normalize("  ABC123\r\n"), "abc123");
        assert_eq!(normalize("d41d8cd98f00b204e9800998ecf8427e"), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for raw in ["", "  ", "AbC", " D41D8CD98F00B204E9800998ECF8427E\t", "xyz Q", "é"] {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once, "input {:?}", raw);
        }
    }

    #[test]
    fn test_is_hex_checksum() {
        assert!(is_hex_checksum("abc123"));
        assert!(is_hex_checksum(" ABCDEF0123456789 "));
        assert!(!is_hex_checksum(""));
        assert!(!is_hex_checksum("   "));
        assert!(!is_hex_checksum("#%%%% VirusShare %%%%"));
        assert!(!is_hex_checksum("abc 123"));
    }

    #[test]
    fn test_parse_rejects_non_hex() {
        assert_eq!(Checksum::parse("ABC123").unwrap().as_str(), "abc123");
        assert!(Checksum::parse("not-a-hash").is_none());
        assert!(Checksum::parse("").is_none());
    }

    #[test]
    fn test_length_is_not_fixed() {
        let md5 = Checksum::parse("d41d8cd98f00b204e9800998ecf8427e").unwrap();
        let sha256 = Checksum::parse(
            "E3B0C44298FC1C149AFBF4C8996FB92427AE41E4649B934CA495991B7852B855",
        )
        .unwrap();
        assert_eq!(md5.len(), 32);
        assert_eq!(sha256.len(), 64);
    }
}
