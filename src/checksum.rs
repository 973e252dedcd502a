//! Checksum utilities for journal integrity verification

use sha2::{Digest, Sha256};
use std::fmt;

/// SHA256 checksum of one journal entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Checksum(String);

impl Checksum {
    /// Compute checksum from raw bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(format!("{:x}", hash))
    }

    /// Compute checksum of a string
    pub fn of(content: &str) -> Self {
        Self::from_bytes(content.as_bytes())
    }

    /// Get the hex string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Verify that content matches this checksum
    pub fn verify(&self, content: &str) -> bool {
        *self == Self::of(content)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Checksum {
    fn from(s: &str) -> Self {
        Self(s.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_consistency() {
        let content = r#"{"field_name":"limit","seq":1}"#;
        assert_eq!(Checksum::of(content), Checksum::of(content));
        assert_eq!(Checksum::of(content).as_str().len(), 64);
    }

    #[test]
    fn test_checksum_verification() {
        let content = r#"{"field_name":"limit"}"#;
        let checksum = Checksum::of(content);
        assert!(checksum.verify(content));
        assert!(!checksum.verify(r#"{"field_name":"potrzeba"}"#));

        let parsed = Checksum::from(checksum.as_str().to_uppercase().as_str());
        assert_eq!(parsed, checksum);
    }
}
