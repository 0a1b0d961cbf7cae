use super::{
    types::block::{StoredBlock, StoredHighWater},
    Database, FindOpts,
};
use crate::error::StorageError;
use async_trait::async_trait;
use auto_impl::auto_impl;
use mongodb::bson::doc;

/// Persistent record of processed blocks and the ingestion high-water mark.
#[async_trait]
#[auto_impl(Arc, &)]
pub trait BlockStore: Send + Sync {
    /// Returns the highest-numbered block row that is not stale.
    async fn latest_non_stale_block(&self) -> Result<Option<StoredBlock>, StorageError>;

    /// Returns the block row with the given number.
    async fn block_at(&self, number: i64) -> Result<Option<StoredBlock>, StorageError>;

    /// Returns the highest stored block number strictly below the given one.
    async fn highest_block_below(&self, number: i64) -> Result<Option<i64>, StorageError>;

    /// Returns up to `limit` block rows with number at or below the given one,
    /// highest first.
    async fn blocks_at_or_below_desc(&self, number: i64, limit: u64) -> Result<Vec<StoredBlock>, StorageError>;

    /// Inserts or updates the row for the block's number, clearing `stale`.
    async fn upsert_block(&self, block: StoredBlock) -> Result<(), StorageError>;

    /// Marks every block row above the given number stale. Idempotent.
    async fn mark_stale_above(&self, number: i64) -> Result<(), StorageError>;

    /// Reads the persisted high-water mark.
    async fn load_high_water(&self) -> Result<Option<i64>, StorageError>;

    /// Seeds the high-water mark on first start.
    async fn seed_high_water(&self, number: i64) -> Result<(), StorageError>;

    /// Raises the high-water mark to the given number if it is higher than
    /// the persisted one.
    async fn bump_high_water(&self, number: i64) -> Result<(), StorageError>;
}

#[async_trait]
impl BlockStore for Database {
    async fn latest_non_stale_block(&self) -> Result<Option<StoredBlock>, StorageError> {
        self.find_one(doc! {"stale": false}, doc! {"blocknumber": -1}).await
    }

    async fn block_at(&self, number: i64) -> Result<Option<StoredBlock>, StorageError> {
        self.find_one(doc! {"blocknumber": number}, None).await
    }

    async fn highest_block_below(&self, number: i64) -> Result<Option<i64>, StorageError> {
        Ok(self
            .find_one::<StoredBlock>(doc! {"blocknumber": {"$lt": number}}, doc! {"blocknumber": -1})
            .await?
            .map(|block| block.blocknumber))
    }

    async fn blocks_at_or_below_desc(&self, number: i64, limit: u64) -> Result<Vec<StoredBlock>, StorageError> {
        self.find(
            doc! {"blocknumber": {"$lte": number}},
            FindOpts::default().sort(doc! {"blocknumber": -1}).limit(limit),
        )
        .await
    }

    async fn upsert_block(&self, block: StoredBlock) -> Result<(), StorageError> {
        self.upsert(doc! {"blocknumber": block.blocknumber}, block).await
    }

    async fn mark_stale_above(&self, number: i64) -> Result<(), StorageError> {
        self.modify_many::<StoredBlock>(doc! {"blocknumber": {"$gt": number}}, doc! {"$set": {"stale": true}}).await
    }

    async fn load_high_water(&self) -> Result<Option<i64>, StorageError> {
        Ok(self.find_one::<StoredHighWater>(doc! {}, None).await?.map(|row| row.blocknumber))
    }

    async fn seed_high_water(&self, number: i64) -> Result<(), StorageError> {
        self.upsert(doc! {}, StoredHighWater { blocknumber: number }).await
    }

    async fn bump_high_water(&self, number: i64) -> Result<(), StorageError> {
        self.modify_one::<StoredHighWater>(doc! {}, doc! {"$max": {"blocknumber": number}}, true).await
    }
}
