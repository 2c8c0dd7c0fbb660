//! Composite subject/version keys
//!
//! The CRC is a stable 32-bit index, not an identity: two pairs may share a
//! CRC, so every key also carries the pair itself and equality compares it.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// CRC-32 over `subject` followed by `version`
pub fn composite_key(subject: &str, version: &str) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(subject.as_bytes());
    hasher.update(version.as_bytes());
    hasher.finalize()
}

/// Subject/version pair indexed by its composite key
#[derive(Debug, Clone)]
pub struct SubjectVersionKey {
    crc: u32,
    subject: Arc<str>,
    version: Arc<str>,
}

impl SubjectVersionKey {
    pub fn new(subject: &str, version: &str) -> Self {
        Self::with_crc(composite_key(subject, version), subject, version)
    }

    pub(crate) fn with_crc(crc: u32, subject: &str, version: &str) -> Self {
        Self {
            crc,
            subject: Arc::from(subject),
            version: Arc::from(version),
        }
    }

    pub fn crc(&self) -> u32 {
        self.crc
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Whether this key names `subject`/`version`
    pub fn matches(&self, subject: &str, version: &str) -> bool {
        &*self.subject == subject && &*self.version == version
    }
}

impl PartialEq for SubjectVersionKey {
    fn eq(&self, other: &Self) -> bool {
        self.crc == other.crc && self.subject == other.subject && self.version == other.version
    }
}

impl Eq for SubjectVersionKey {}

impl Hash for SubjectVersionKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u32(self.crc);
    }
}

impl std::fmt::Display for SubjectVersionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.subject, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_composite_key_is_stable() {
        assert_eq!(composite_key("orders", "3"), composite_key("orders", "3"));
        assert_eq!(composite_key("orders", "3"), crc32fast::hash(b"orders3"));
        assert_ne!(composite_key("orders", "3"), composite_key("orders", "4"));
    }

    #[test]
    fn test_keys_compare_by_pair_not_crc() {
        // "orders" + "13" and "orders1" + "3" concatenate identically
        let a = SubjectVersionKey::new("orders", "13");
        let b = SubjectVersionKey::new("orders1", "3");

        assert_eq!(a.crc(), b.crc());
        assert_ne!(a, b);

        let mut set = HashSet::new();
        set.insert(a.clone());
        set.insert(b);
        assert_eq!(set.len(), 2);
        assert!(set.contains(&a));
    }

    #[test]
    fn test_matches() {
        let key = SubjectVersionKey::new("payments", "latest");
        assert!(key.matches("payments", "latest"));
        assert!(!key.matches("payments", "1"));
        assert_eq!(key.to_string(), "payments:latest");
    }
}
