use serde::{Deserialize, Serialize};

/// A processed block as stored in the database.
///
/// For any two consecutive non-stale rows (n, n+1), `parent_hash` of n+1
/// equals `hash` of n. Rows are never deleted; a chain reorganization marks
/// the abandoned rows stale instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBlock {
    /// Block number.
    pub blocknumber: i64,
    /// Block hash, canonical lowercase hex.
    pub hash: String,
    /// Hash of the parent block, canonical lowercase hex.
    pub parent_hash: String,
    /// Unix timestamp of the block.
    pub timestamp: i64,
    /// Whether the block was abandoned by a chain reorganization.
    #[serde(default)]
    pub stale: bool,
}

/// The single-row high-water mark: the highest block number whose
/// transactions have been fully processed and persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredHighWater {
    /// The high-water block number.
    pub blocknumber: i64,
}
