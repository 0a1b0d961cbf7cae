//! In-memory doubles of the node, store and key-value collaborators, used by
//! the loop tests.

use crate::client::EthereumRpc;
use crate::error::{KvError, RpcError, StorageError};
use crate::kv::PendingTxStore;
use crate::storage::types::{
    block::StoredBlock,
    registration::StoredFilterRegistration,
    token::{StoredToken, StoredTokenTransaction},
    transaction::{NewTransaction, StoredTransaction, TransactionStatus},
};
use crate::storage::{blocks::BlockStore, registrations::RegistrationStore, transactions::TransactionStore};
use alloy_primitives::B256;
use alloy_rpc_types::{Block, Log, Transaction};
use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

#[derive(Debug, Default)]
pub(crate) struct MemoryStore {
    blocks: Mutex<BTreeMap<i64, StoredBlock>>,
    high_water: Mutex<Option<i64>>,
    transactions: Mutex<Vec<StoredTransaction>>,
    token_transactions: Mutex<Vec<StoredTokenTransaction>>,
    tokens: Mutex<Vec<StoredToken>>,
    notification_registrations: Mutex<HashSet<String>>,
    token_registrations: Mutex<Vec<String>>,
    filter_registrations: Mutex<Vec<StoredFilterRegistration>>,
    collectibles: Mutex<Vec<(String, i64)>>,
}

impl MemoryStore {
    pub(crate) fn register_notification(&self, eth_address: String) {
        self.notification_registrations.lock().unwrap().insert(eth_address);
    }

    pub(crate) fn register_token(&self, eth_address: String) {
        self.token_registrations.lock().unwrap().push(eth_address);
    }

    pub(crate) fn add_token(&self, contract_address: String) {
        self.tokens.lock().unwrap().push(StoredToken { contract_address, ready: true, custom: false });
    }

    pub(crate) fn add_non_ready_token(&self, contract_address: String) {
        self.tokens.lock().unwrap().push(StoredToken { contract_address, ready: false, custom: false });
    }

    pub(crate) fn add_filter_registration(&self, registration: StoredFilterRegistration) {
        self.filter_registrations.lock().unwrap().push(registration);
    }

    pub(crate) fn add_collectible(&self, contract_address: String, last_block: i64) {
        self.collectibles.lock().unwrap().push((contract_address, last_block));
    }

    pub(crate) fn seed_block(&self, block: StoredBlock) {
        self.blocks.lock().unwrap().insert(block.blocknumber, block);
    }

    pub(crate) fn set_high_water(&self, number: i64) {
        *self.high_water.lock().unwrap() = Some(number);
    }

    pub(crate) fn seed_transaction(
        &self,
        from_address: String,
        nonce: i64,
        hash: String,
        status: TransactionStatus,
        v: Option<i64>,
    ) -> ObjectId {
        let id = ObjectId::new();
        self.transactions.lock().unwrap().push(StoredTransaction {
            transaction_id: Some(id),
            hash,
            from_address,
            to_address: "0x".to_string(),
            nonce,
            value: "0x0".to_string(),
            gas: "0x0".to_string(),
            gas_price: "0x0".to_string(),
            data: "0x".to_string(),
            blocknumber: None,
            status,
            v,
        });
        id
    }

    pub(crate) fn set_transaction_status(&self, id: ObjectId, status: TransactionStatus) {
        for tx in self.transactions.lock().unwrap().iter_mut() {
            if tx.transaction_id == Some(id) {
                tx.status = status;
            }
        }
    }

    pub(crate) fn set_transaction_blocknumber(&self, id: ObjectId, blocknumber: i64) {
        for tx in self.transactions.lock().unwrap().iter_mut() {
            if tx.transaction_id == Some(id) {
                tx.blocknumber = Some(blocknumber);
            }
        }
    }

    pub(crate) fn transactions(&self) -> Vec<StoredTransaction> {
        self.transactions.lock().unwrap().clone()
    }

    pub(crate) fn token_transactions(&self) -> Vec<StoredTokenTransaction> {
        self.token_transactions.lock().unwrap().clone()
    }

    pub(crate) fn blocks(&self) -> Vec<StoredBlock> {
        self.blocks.lock().unwrap().values().cloned().collect()
    }

    pub(crate) fn high_water(&self) -> Option<i64> {
        *self.high_water.lock().unwrap()
    }

    pub(crate) fn collectibles(&self) -> Vec<(String, i64)> {
        self.collectibles.lock().unwrap().clone()
    }

    pub(crate) fn tokens(&self) -> Vec<StoredToken> {
        self.tokens.lock().unwrap().clone()
    }
}

#[async_trait]
impl BlockStore for MemoryStore {
    async fn latest_non_stale_block(&self) -> Result<Option<StoredBlock>, StorageError> {
        Ok(self.blocks.lock().unwrap().values().rev().find(|block| !block.stale).cloned())
    }

    async fn block_at(&self, number: i64) -> Result<Option<StoredBlock>, StorageError> {
        Ok(self.blocks.lock().unwrap().get(&number).cloned())
    }

    async fn highest_block_below(&self, number: i64) -> Result<Option<i64>, StorageError> {
        Ok(self.blocks.lock().unwrap().range(..number).next_back().map(|(n, _)| *n))
    }

    async fn blocks_at_or_below_desc(&self, number: i64, limit: u64) -> Result<Vec<StoredBlock>, StorageError> {
        Ok(self
            .blocks
            .lock()
            .unwrap()
            .range(..=number)
            .rev()
            .take(limit as usize)
            .map(|(_, block)| block.clone())
            .collect())
    }

    async fn upsert_block(&self, block: StoredBlock) -> Result<(), StorageError> {
        self.seed_block(block);
        Ok(())
    }

    async fn mark_stale_above(&self, number: i64) -> Result<(), StorageError> {
        for (_, block) in self.blocks.lock().unwrap().range_mut(number + 1..) {
            block.stale = true;
        }
        Ok(())
    }

    async fn load_high_water(&self) -> Result<Option<i64>, StorageError> {
        Ok(self.high_water())
    }

    async fn seed_high_water(&self, number: i64) -> Result<(), StorageError> {
        *self.high_water.lock().unwrap() = Some(number);
        Ok(())
    }

    async fn bump_high_water(&self, number: i64) -> Result<(), StorageError> {
        let mut high_water = self.high_water.lock().unwrap();
        if high_water.is_none() || high_water.is_some_and(|current| current < number) {
            *high_water = Some(number);
        }
        Ok(())
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn find_txs_by_from_nonce(&self, from: &str, nonce: i64) -> Result<Vec<StoredTransaction>, StorageError> {
        Ok(self
            .transactions
            .lock()
            .unwrap()
            .iter()
            .filter(|tx| tx.from_address == from && tx.nonce == nonce)
            .cloned()
            .collect())
    }

    async fn find_tx_by_from_nonce_hash(
        &self,
        from: &str,
        nonce: i64,
        hash: &str,
    ) -> Result<Option<StoredTransaction>, StorageError> {
        Ok(self
            .transactions
            .lock()
            .unwrap()
            .iter()
            .find(|tx| {
                tx.from_address == from
                    && tx.nonce == nonce
                    && tx.hash == hash
                    && tx.status != TransactionStatus::Error
            })
            .cloned())
    }

    async fn find_txs_by_from_nonce_not_hash_not_error(
        &self,
        from: &str,
        nonce: i64,
        hash: &str,
    ) -> Result<Vec<StoredTransaction>, StorageError> {
        Ok(self
            .transactions
            .lock()
            .unwrap()
            .iter()
            .filter(|tx| {
                tx.from_address == from
                    && tx.nonce == nonce
                    && tx.hash != hash
                    && tx.status != TransactionStatus::Error
            })
            .cloned()
            .collect())
    }

    async fn insert_transaction(&self, tx: NewTransaction) -> Result<ObjectId, StorageError> {
        let id = ObjectId::new();
        let mut stored = StoredTransaction::from(tx);
        stored.transaction_id = Some(id);
        self.transactions.lock().unwrap().push(stored);
        Ok(id)
    }

    async fn set_transaction_block(&self, id: ObjectId, blocknumber: i64) -> Result<(), StorageError> {
        self.set_transaction_blocknumber(id, blocknumber);
        Ok(())
    }

    async fn upsert_token_transaction(&self, token_tx: StoredTokenTransaction) -> Result<(), StorageError> {
        let mut token_txs = self.token_transactions.lock().unwrap();
        if let Some(existing) = token_txs.iter_mut().find(|existing| {
            existing.transaction_id == token_tx.transaction_id
                && existing.transaction_log_index == token_tx.transaction_log_index
        }) {
            existing.from_address = token_tx.from_address;
            existing.to_address = token_tx.to_address;
            existing.value = token_tx.value;
        } else {
            token_txs.push(token_tx);
        }
        Ok(())
    }
}

#[async_trait]
impl RegistrationStore for MemoryStore {
    async fn is_known_token(&self, contract_address: &str) -> Result<bool, StorageError> {
        Ok(self.tokens.lock().unwrap().iter().any(|token| token.contract_address == contract_address))
    }

    async fn has_notification_registration(&self, addresses: &[&str]) -> Result<bool, StorageError> {
        let registrations = self.notification_registrations.lock().unwrap();
        Ok(addresses.iter().any(|address| registrations.contains(*address)))
    }

    async fn has_token_registration(&self, addresses: &[&str]) -> Result<bool, StorageError> {
        let registrations = self.token_registrations.lock().unwrap();
        Ok(addresses.iter().any(|address| registrations.iter().any(|registered| registered == address)))
    }

    async fn non_ready_tokens(&self) -> Result<Vec<String>, StorageError> {
        Ok(self
            .tokens
            .lock()
            .unwrap()
            .iter()
            .filter(|token| !token.ready && !token.custom)
            .map(|token| token.contract_address.clone())
            .collect())
    }

    async fn count_token_registrations(&self) -> Result<u64, StorageError> {
        Ok(self.token_registrations.lock().unwrap().len() as u64)
    }

    async fn token_registration_page(&self, skip: u64, limit: u64) -> Result<Vec<String>, StorageError> {
        Ok(self
            .token_registrations
            .lock()
            .unwrap()
            .iter()
            .skip(skip as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn mark_tokens_ready(&self, contract_addresses: &[String]) -> Result<(), StorageError> {
        for token in self.tokens.lock().unwrap().iter_mut() {
            if contract_addresses.contains(&token.contract_address) {
                token.ready = true;
            }
        }
        Ok(())
    }

    async fn filter_registrations_for(
        &self,
        contract_address: &str,
        topic_id: &str,
    ) -> Result<Vec<StoredFilterRegistration>, StorageError> {
        Ok(self
            .filter_registrations
            .lock()
            .unwrap()
            .iter()
            .filter(|registration| {
                registration.contract_address == contract_address && registration.topic_id == topic_id
            })
            .cloned()
            .collect())
    }

    async fn clamp_collectibles_last_block(&self, last_block: i64) -> Result<(), StorageError> {
        for (_, block) in self.collectibles.lock().unwrap().iter_mut() {
            if *block > last_block {
                *block = last_block;
            }
        }
        Ok(())
    }
}

/// Scripted node double. Blocks, transactions and logs are looked up from
/// seeded maps; filter changes are drained from a queue.
#[derive(Debug, Default)]
pub(crate) struct MockRpc {
    pub blocks: Mutex<HashMap<u64, Block>>,
    pub transactions: Mutex<HashMap<B256, Transaction>>,
    pub logs: Mutex<HashMap<u64, Vec<Log>>>,
    pub block_number: AtomicU64,
    pub filter_changes: Mutex<VecDeque<Result<Vec<B256>, RpcError>>>,
    pub filter_registration_count: AtomicUsize,
    pub bulk_calls: AtomicUsize,
}

impl MockRpc {
    pub(crate) fn seed_block(&self, number: u64, block: Block) {
        self.blocks.lock().unwrap().insert(number, block);
    }

    pub(crate) fn seed_transaction(&self, tx: Transaction) {
        self.transactions.lock().unwrap().insert(tx.hash, tx);
    }

    pub(crate) fn seed_logs(&self, number: u64, logs: Vec<Log>) {
        self.logs.lock().unwrap().insert(number, logs);
    }

    pub(crate) fn push_filter_changes(&self, changes: Result<Vec<B256>, RpcError>) {
        self.filter_changes.lock().unwrap().push_back(changes);
    }
}

#[async_trait]
impl EthereumRpc for MockRpc {
    async fn block_number(&self) -> Result<u64, RpcError> {
        Ok(self.block_number.load(Ordering::Relaxed))
    }

    async fn block_by_number(&self, number: u64, _full: bool) -> Result<Option<Block>, RpcError> {
        Ok(self.blocks.lock().unwrap().get(&number).cloned())
    }

    async fn blocks_by_number_bulk(&self, numbers: &[u64]) -> Result<Vec<Option<Block>>, RpcError> {
        self.bulk_calls.fetch_add(1, Ordering::Relaxed);
        let blocks = self.blocks.lock().unwrap();
        Ok(numbers.iter().map(|number| blocks.get(number).cloned()).collect())
    }

    async fn transaction_by_hash(&self, hash: B256) -> Result<Option<Transaction>, RpcError> {
        Ok(self.transactions.lock().unwrap().get(&hash).cloned())
    }

    async fn logs_for_block(&self, number: u64) -> Result<Vec<Log>, RpcError> {
        Ok(self.logs.lock().unwrap().get(&number).cloned().unwrap_or_default())
    }

    async fn new_pending_transaction_filter(&self) -> Result<String, RpcError> {
        let count = self.filter_registration_count.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(format!("0x{count:x}"))
    }

    async fn filter_changes(&self, _filter_id: &str) -> Result<Vec<B256>, RpcError> {
        self.filter_changes.lock().unwrap().pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// In-memory stand-in for the Redis-backed pending transaction tracker.
#[derive(Debug, Default)]
pub(crate) struct MockKv {
    pub entries: Mutex<HashMap<String, i64>>,
    pub heartbeats: AtomicUsize,
}

impl MockKv {
    pub(crate) fn seed(&self, tx_hash: &str, seen_at: i64) {
        self.entries.lock().unwrap().insert(tx_hash.to_string(), seen_at);
    }

    pub(crate) fn contains(&self, tx_hash: &str) -> bool {
        self.entries.lock().unwrap().contains_key(tx_hash)
    }
}

#[async_trait]
impl PendingTxStore for MockKv {
    async fn add_if_absent(&self, tx_hash: &str, seen_at: i64) -> Result<(), KvError> {
        self.entries.lock().unwrap().entry(tx_hash.to_string()).or_insert(seen_at);
        Ok(())
    }

    async fn remove(&self, tx_hash: &str) -> Result<(), KvError> {
        self.entries.lock().unwrap().remove(tx_hash);
        Ok(())
    }

    async fn size(&self) -> Result<u64, KvError> {
        Ok(self.entries.lock().unwrap().len() as u64)
    }

    async fn snapshot(&self) -> Result<HashMap<String, i64>, KvError> {
        Ok(self.entries.lock().unwrap().clone())
    }

    async fn set_sanity_ok(&self, _ttl: Duration) -> Result<(), KvError> {
        self.heartbeats.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
