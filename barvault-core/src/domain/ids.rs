use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer asset identifier (the `id` column of the row store).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(pub i64);

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Deterministic dataset hash (content hash of the row store in id/day order)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetHash(pub String);

impl DatasetHash {
    pub fn from_hash(hash: &str) -> Self {
        Self(hash.to_string())
    }

    /// Short prefix for display in tables.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for DatasetHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_id_displays_raw_integer() {
        assert_eq!(AssetId(42).to_string(), "42");
    }

    #[test]
    fn dataset_hash_short_prefix() {
        let hash = DatasetHash::from_hash("0123456789abcdef");
        assert_eq!(hash.short(), "0123456789ab");
        assert_eq!(DatasetHash::from_hash("abc").short(), "abc");
    }
}
