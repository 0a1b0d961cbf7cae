use thiserror::Error;

/// Error raised by calls against the Ethereum node.
///
/// Connection failures, HTTP errors and JSON-RPC errors are all treated the
/// same way by callers: log with context, break the current loop iteration,
/// retry on the next scheduled tick.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Error related to the transport or the JSON-RPC call itself.
    #[error(transparent)]
    Client(#[from] jsonrpsee::core::ClientError),
    /// A batched request came back with fewer results than requests.
    #[error("batch response is missing entries")]
    IncompleteBatch,
}

/// Error related to the durable store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Error related to the database.
    #[error(transparent)]
    Database(#[from] mongodb::error::Error),
    /// Error related to document serialization.
    #[error(transparent)]
    Serialization(#[from] mongodb::bson::ser::Error),
    /// The driver did not hand back an object id for an inserted document.
    #[error("missing inserted document id")]
    MissingInsertedId,
}

/// Error related to the key-value store.
#[derive(Debug, Error)]
pub enum KvError {
    /// Error related to the key-value store connection or commands.
    #[error(transparent)]
    Redis(#[from] redis::RedisError),
}

/// Error that can occur while running the block monitor.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Error related to the Ethereum node.
    #[error(transparent)]
    Rpc(#[from] RpcError),
    /// Error related to the durable store.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Error related to the key-value store.
    #[error(transparent)]
    Kv(#[from] KvError),
}
