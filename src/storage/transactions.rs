use super::{
    types::{
        token::StoredTokenTransaction,
        transaction::{NewTransaction, StoredTransaction},
    },
    Database, FindOpts,
};
use crate::error::StorageError;
use async_trait::async_trait;
use auto_impl::auto_impl;
use mongodb::bson::{doc, oid::ObjectId};

/// Transaction correlation queries and writes.
///
/// The `(from_address, nonce)` pair is the correlation key: a later signed
/// transaction reusing the pair overwrites the earlier one in the mempool, so
/// several rows may exist for one pair and the classifier has to pick between
/// them.
#[async_trait]
#[auto_impl(Arc, &)]
pub trait TransactionStore: Send + Sync {
    /// Returns every row recorded for `(from_address, nonce)`.
    async fn find_txs_by_from_nonce(&self, from: &str, nonce: i64) -> Result<Vec<StoredTransaction>, StorageError>;

    /// Returns the non-error row matching `(from_address, nonce, hash)`.
    async fn find_tx_by_from_nonce_hash(
        &self,
        from: &str,
        nonce: i64,
        hash: &str,
    ) -> Result<Option<StoredTransaction>, StorageError>;

    /// Returns the non-error rows for `(from_address, nonce)` carrying a
    /// different hash.
    async fn find_txs_by_from_nonce_not_hash_not_error(
        &self,
        from: &str,
        nonce: i64,
        hash: &str,
    ) -> Result<Vec<StoredTransaction>, StorageError>;

    /// Inserts a new transaction row and returns its surrogate id.
    async fn insert_transaction(&self, tx: NewTransaction) -> Result<ObjectId, StorageError>;

    /// Moves a confirmed transaction to a different block after a reorg.
    async fn set_transaction_block(&self, id: ObjectId, blocknumber: i64) -> Result<(), StorageError>;

    /// Inserts a token transfer for `(transaction_id, transaction_log_index)`;
    /// on conflict updates the endpoints and value, keeping the stored status.
    async fn upsert_token_transaction(&self, token_tx: StoredTokenTransaction) -> Result<(), StorageError>;
}

#[async_trait]
impl TransactionStore for Database {
    async fn find_txs_by_from_nonce(&self, from: &str, nonce: i64) -> Result<Vec<StoredTransaction>, StorageError> {
        self.find(doc! {"from_address": from, "nonce": nonce}, FindOpts::default()).await
    }

    async fn find_tx_by_from_nonce_hash(
        &self,
        from: &str,
        nonce: i64,
        hash: &str,
    ) -> Result<Option<StoredTransaction>, StorageError> {
        self.find_one(doc! {"from_address": from, "nonce": nonce, "hash": hash, "status": {"$ne": "error"}}, None)
            .await
    }

    async fn find_txs_by_from_nonce_not_hash_not_error(
        &self,
        from: &str,
        nonce: i64,
        hash: &str,
    ) -> Result<Vec<StoredTransaction>, StorageError> {
        self.find(
            doc! {"from_address": from, "nonce": nonce, "hash": {"$ne": hash}, "status": {"$ne": "error"}},
            FindOpts::default(),
        )
        .await
    }

    async fn insert_transaction(&self, tx: NewTransaction) -> Result<ObjectId, StorageError> {
        self.insert_one(StoredTransaction::from(tx)).await
    }

    async fn set_transaction_block(&self, id: ObjectId, blocknumber: i64) -> Result<(), StorageError> {
        self.modify_one::<StoredTransaction>(doc! {"_id": id}, doc! {"$set": {"blocknumber": blocknumber}}, false).await
    }

    async fn upsert_token_transaction(&self, token_tx: StoredTokenTransaction) -> Result<(), StorageError> {
        let filter = doc! {
            "transaction_id": token_tx.transaction_id,
            "transaction_log_index": token_tx.transaction_log_index,
        };
        let status = mongodb::bson::to_bson(&token_tx.status)?;
        let update = doc! {
            "$set": {
                "from_address": &token_tx.from_address,
                "to_address": &token_tx.to_address,
                "value": &token_tx.value,
            },
            "$setOnInsert": {
                "contract_address": &token_tx.contract_address,
                "status": status,
            },
        };
        self.modify_one::<StoredTokenTransaction>(filter, update, true).await
    }
}
