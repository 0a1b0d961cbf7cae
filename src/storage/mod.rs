pub mod blocks;
pub mod filter;
pub mod registrations;
pub mod transactions;
pub mod types;

use crate::error::StorageError;
use crate::storage::types::{
    block::{StoredBlock, StoredHighWater},
    registration::{StoredCollectible, StoredFilterRegistration, StoredNotificationRegistration, StoredTokenRegistration},
    token::{StoredToken, StoredTokenTransaction},
    transaction::StoredTransaction,
};
use blocks::BlockStore;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, Document},
    options::{CountOptions, FindOneOptions, FindOptions, UpdateOptions},
    Collection, Database as MongoDatabase,
};
use registrations::RegistrationStore;
use serde::{de::DeserializeOwned, Serialize};
use transactions::TransactionStore;

type StorageResult<T> = Result<T, StorageError>;

/// The full store surface the monitor runs against.
pub trait MonitorStore: BlockStore + TransactionStore + RegistrationStore {}

impl<T> MonitorStore for T where T: BlockStore + TransactionStore + RegistrationStore {}

/// Options for multi-document reads: page limit, offset and sort order.
#[derive(Clone, Debug, Default)]
pub struct FindOpts {
    limit: Option<i64>,
    skip: Option<u64>,
    sort: Option<Document>,
}

impl FindOpts {
    /// Caps the number of documents returned.
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(i64::try_from(limit).unwrap_or(i64::MAX));
        self
    }

    /// Skips the first `skip` documents.
    #[must_use]
    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Orders the documents by the given sort document.
    #[must_use]
    pub fn sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    fn into_options(self) -> FindOptions {
        FindOptions::builder().limit(self.limit).skip(self.skip).sort(self.sort).build()
    }
}

/// Typed access to the monitor's MongoDB collections. Every collection is
/// addressed through its document type's [`CollectionName`], so a query can
/// never land in the wrong collection.
#[derive(Clone, Debug)]
pub struct Database {
    inner: MongoDatabase,
}

impl Database {
    pub fn new(database: MongoDatabase) -> Self {
        Self { inner: database }
    }

    fn collection<T>(&self) -> Collection<T>
    where
        T: CollectionName + Sync + Send,
    {
        self.inner.collection::<T>(T::collection_name())
    }

    /// Reads every document matching the filter, subject to the options.
    pub async fn find<T>(&self, filter: Document, opts: FindOpts) -> StorageResult<Vec<T>>
    where
        T: DeserializeOwned + CollectionName + Sync + Send,
    {
        Ok(self.collection::<T>().find(filter).with_options(opts.into_options()).await?.try_collect().await?)
    }

    /// Reads the first document matching the filter, optionally after sorting.
    pub async fn find_one<T>(&self, filter: Document, sort: impl Into<Option<Document>>) -> StorageResult<Option<T>>
    where
        T: DeserializeOwned + Unpin + Send + Sync + CollectionName,
    {
        let options = FindOneOptions::builder().sort(sort).build();
        Ok(self.collection::<T>().find_one(filter).with_options(options).await?)
    }

    /// Serializes the row and `$set`s it onto the document matching the
    /// filter, inserting a fresh document when none matches.
    pub async fn upsert<T>(&self, filter: Document, row: T) -> StorageResult<()>
    where
        T: Serialize + CollectionName + Sync + Send,
    {
        let row = mongodb::bson::to_document(&row)?;
        self.collection::<T>()
            .update_one(filter, doc! {"$set": row})
            .with_options(UpdateOptions::builder().upsert(true).build())
            .await?;
        Ok(())
    }

    /// Applies a raw update to the first document matching the filter.
    pub async fn modify_one<T>(&self, filter: Document, update: Document, upsert: bool) -> StorageResult<()>
    where
        T: CollectionName + Sync + Send,
    {
        self.collection::<T>()
            .update_one(filter, update)
            .with_options(UpdateOptions::builder().upsert(upsert).build())
            .await?;
        Ok(())
    }

    /// Applies a raw update to every document matching the filter.
    pub async fn modify_many<T>(&self, filter: Document, update: Document) -> StorageResult<()>
    where
        T: CollectionName + Sync + Send,
    {
        self.collection::<T>().update_many(filter, update).await?;
        Ok(())
    }

    /// Inserts a document, returning the object id the driver assigned.
    pub async fn insert_one<T>(&self, row: T) -> StorageResult<ObjectId>
    where
        T: Serialize + CollectionName + Sync + Send,
    {
        let result = self.collection::<T>().insert_one(row).await?;
        result.inserted_id.as_object_id().ok_or(StorageError::MissingInsertedId)
    }

    /// Returns true if any document matches the filter. Stops counting at the
    /// first hit.
    pub async fn exists<T>(&self, filter: Document) -> StorageResult<bool>
    where
        T: CollectionName + Sync + Send,
    {
        let options = CountOptions::builder().limit(1).build();
        Ok(self.collection::<T>().count_documents(filter).with_options(options).await? > 0)
    }

    /// Counts the documents matching the filter.
    pub async fn count<T>(&self, filter: Document) -> StorageResult<u64>
    where
        T: CollectionName + Sync + Send,
    {
        Ok(self.collection::<T>().count_documents(filter).await?)
    }
}

/// Trait for associating a type with its collection name
pub trait CollectionName {
    /// Returns the name of the collection associated with the type
    fn collection_name() -> &'static str;
}

/// Implement [`CollectionName`] for [`StoredBlock`]
impl CollectionName for StoredBlock {
    fn collection_name() -> &'static str {
        "blocks"
    }
}

/// Implement [`CollectionName`] for [`StoredHighWater`]
impl CollectionName for StoredHighWater {
    fn collection_name() -> &'static str {
        "last_blocknumber"
    }
}

/// Implement [`CollectionName`] for [`StoredTransaction`]
impl CollectionName for StoredTransaction {
    fn collection_name() -> &'static str {
        "transactions"
    }
}

/// Implement [`CollectionName`] for [`StoredTokenTransaction`]
impl CollectionName for StoredTokenTransaction {
    fn collection_name() -> &'static str {
        "token_transactions"
    }
}

/// Implement [`CollectionName`] for [`StoredToken`]
impl CollectionName for StoredToken {
    fn collection_name() -> &'static str {
        "tokens"
    }
}

/// Implement [`CollectionName`] for [`StoredNotificationRegistration`]
impl CollectionName for StoredNotificationRegistration {
    fn collection_name() -> &'static str {
        "notification_registrations"
    }
}

/// Implement [`CollectionName`] for [`StoredTokenRegistration`]
impl CollectionName for StoredTokenRegistration {
    fn collection_name() -> &'static str {
        "token_registrations"
    }
}

/// Implement [`CollectionName`] for [`StoredFilterRegistration`]
impl CollectionName for StoredFilterRegistration {
    fn collection_name() -> &'static str {
        "filter_registrations"
    }
}

/// Implement [`CollectionName`] for [`StoredCollectible`]
impl CollectionName for StoredCollectible {
    fn collection_name() -> &'static str {
        "collectibles"
    }
}
