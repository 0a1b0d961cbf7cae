use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a tracked transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Freshly inserted, not yet dispatched.
    New,
    /// Seen in the mempool but not yet included in a block.
    Unconfirmed,
    /// Included in a block.
    Confirmed,
    /// Dropped, overwritten or failed.
    Error,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::New => "new",
            Self::Unconfirmed => "unconfirmed",
            Self::Confirmed => "confirmed",
            Self::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// A tracked transaction as stored in the database.
///
/// Uniqueness is not `hash`: several rows may share `(from_address, nonce)`,
/// representing overwrite attempts for the same account slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTransaction {
    /// Surrogate id.
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<ObjectId>,
    /// Transaction hash, canonical lowercase hex.
    pub hash: String,
    /// Sender address, canonical lowercase hex.
    pub from_address: String,
    /// Recipient address, canonical lowercase hex. `"0x"` for contract creation.
    pub to_address: String,
    /// Account nonce.
    pub nonce: i64,
    /// Transferred wei, hex quantity.
    pub value: String,
    /// Gas limit, hex quantity.
    pub gas: String,
    /// Gas price, hex quantity.
    pub gas_price: String,
    /// Call data, hex.
    pub data: String,
    /// Block the transaction was included in; null while unconfirmed.
    #[serde(default)]
    pub blocknumber: Option<i64>,
    /// Lifecycle state.
    pub status: TransactionStatus,
    /// Signature `v` component; set only for transactions signed and submitted
    /// through the service, null for transactions observed externally.
    #[serde(default)]
    pub v: Option<i64>,
}

impl StoredTransaction {
    /// Returns the surrogate id, which is always present for rows read back
    /// from the database.
    pub fn id(&self) -> ObjectId {
        self.transaction_id.unwrap_or_default()
    }
}

/// A new transaction row, observed on chain or in the mempool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    /// Transaction hash, canonical lowercase hex.
    pub hash: String,
    /// Sender address, canonical lowercase hex.
    pub from_address: String,
    /// Recipient address, canonical lowercase hex. `"0x"` for contract creation.
    pub to_address: String,
    /// Account nonce.
    pub nonce: i64,
    /// Transferred wei, hex quantity.
    pub value: String,
    /// Gas limit, hex quantity.
    pub gas: String,
    /// Gas price, hex quantity.
    pub gas_price: String,
    /// Call data, hex.
    pub data: String,
}

impl From<NewTransaction> for StoredTransaction {
    fn from(tx: NewTransaction) -> Self {
        Self {
            transaction_id: None,
            hash: tx.hash,
            from_address: tx.from_address,
            to_address: tx.to_address,
            nonce: tx.nonce,
            value: tx.value,
            gas: tx.gas,
            gas_price: tx.gas_price,
            data: tx.data,
            blocknumber: None,
            status: TransactionStatus::New,
            v: None,
        }
    }
}
