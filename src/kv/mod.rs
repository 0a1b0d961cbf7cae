use crate::constants::{SANITY_CHECK_OK_KEY, UNCONFIRMED_TXS_KEY};
use crate::error::KvError;
use async_trait::async_trait;
use auto_impl::auto_impl;
use redis::{aio::ConnectionManager, AsyncCommands};
use std::collections::HashMap;
use std::time::Duration;

/// Ephemeral set of unconfirmed transaction hashes with arrival timestamps,
/// plus the monitor health heartbeat.
///
/// Nothing in here is authoritative across restarts; entries that never show
/// up on chain are evicted after a fixed expiry.
#[async_trait]
#[auto_impl(Arc, &)]
pub trait PendingTxStore: Send + Sync {
    /// Records the first sighting of a pending transaction hash. A hash that
    /// is already tracked keeps its original timestamp.
    async fn add_if_absent(&self, tx_hash: &str, seen_at: i64) -> Result<(), KvError>;

    /// Drops a hash from the tracker.
    async fn remove(&self, tx_hash: &str) -> Result<(), KvError>;

    /// Number of tracked hashes.
    async fn size(&self) -> Result<u64, KvError>;

    /// Full copy of the tracked `{hash -> first seen, unix seconds}` map.
    async fn snapshot(&self) -> Result<HashMap<String, i64>, KvError>;

    /// Publishes the health heartbeat with the given time-to-live.
    async fn set_sanity_ok(&self, ttl: Duration) -> Result<(), KvError>;
}

/// Redis-backed pending transaction tracker.
#[derive(Clone)]
pub struct RedisKv {
    connection: ConnectionManager,
}

impl std::fmt::Debug for RedisKv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisKv").finish_non_exhaustive()
    }
}

impl RedisKv {
    pub const fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl PendingTxStore for RedisKv {
    async fn add_if_absent(&self, tx_hash: &str, seen_at: i64) -> Result<(), KvError> {
        let mut connection = self.connection.clone();
        let _: bool = connection.hset_nx(UNCONFIRMED_TXS_KEY, tx_hash, seen_at).await?;
        Ok(())
    }

    async fn remove(&self, tx_hash: &str) -> Result<(), KvError> {
        let mut connection = self.connection.clone();
        let _: u64 = connection.hdel(UNCONFIRMED_TXS_KEY, tx_hash).await?;
        Ok(())
    }

    async fn size(&self) -> Result<u64, KvError> {
        let mut connection = self.connection.clone();
        Ok(connection.hlen(UNCONFIRMED_TXS_KEY).await?)
    }

    async fn snapshot(&self) -> Result<HashMap<String, i64>, KvError> {
        let mut connection = self.connection.clone();
        Ok(connection.hgetall(UNCONFIRMED_TXS_KEY).await?)
    }

    async fn set_sanity_ok(&self, ttl: Duration) -> Result<(), KvError> {
        let mut connection = self.connection.clone();
        let _: () = connection.set_ex(SANITY_CHECK_OK_KEY, "OK", ttl.as_secs()).await?;
        Ok(())
    }
}
