use super::transaction::TransactionStatus;
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

/// An ERC-20 token tracked by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    /// Token contract address, canonical lowercase hex.
    pub contract_address: String,
    /// Whether existing registrations have been pushed into the token cache.
    pub ready: bool,
    /// Custom tokens are user supplied and skip the cache backfill.
    pub custom: bool,
}

/// An ERC-20 or WETH value movement attached to a tracked transaction.
///
/// Keyed by `(transaction_id, transaction_log_index)`. Transfers synthesized
/// from pending call data use log index 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTokenTransaction {
    /// Surrogate id of the parent transaction.
    pub transaction_id: ObjectId,
    /// Index of the originating log within the parent transaction.
    pub transaction_log_index: i64,
    /// Token contract address, canonical lowercase hex.
    pub contract_address: String,
    /// Token sender, canonical lowercase hex.
    pub from_address: String,
    /// Token recipient, canonical lowercase hex.
    pub to_address: String,
    /// Transferred amount, hex quantity.
    pub value: String,
    /// Lifecycle state of the transfer.
    pub status: TransactionStatus,
}
