use super::{classify, reorg, MonitorInner};
use crate::client::EthereumRpc;
use crate::constants::PROGRESS_LOG_INTERVAL;
use crate::error::MonitorError;
use crate::kv::PendingTxStore;
use crate::storage::{
    filter::{hex_address, hex_hash},
    types::block::StoredBlock,
    MonitorStore,
};
use alloy_primitives::B256;
use alloy_rpc_types::{BlockTransactions, Log, Transaction};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};
use tokio::time::Instant;

impl<N, S, K> MonitorInner<N, S, K>
where
    N: EthereumRpc + 'static,
    S: MonitorStore + 'static,
    K: PendingTxStore + 'static,
{
    /// Ingests confirmed blocks one at a time, starting above the high-water
    /// mark, until the node has no next block. Handles gaps, reorgs and
    /// per-transaction classification along the way.
    pub(crate) async fn block_check(self: Arc<Self>) -> Result<(), MonitorError> {
        while !self.shutdown.is_cancelled() {
            let next_number = self.last_block_number() + 1;
            let block = match self.eth.block_by_number(next_number, true).await {
                Ok(block) => block,
                Err(err) => {
                    tracing::warn!(?err, blocknumber = next_number, "failed eth_getBlockByNumber call");
                    break;
                }
            };
            let Some(block) = block else { break };

            self.dispatcher.update_default_gas_price(next_number);
            self.mark_saw_new_block();
            let processing_start = Instant::now();
            self.log_progress(next_number);

            // Missing our own previous block row means there is a gap to
            // backfill before this block can be chained.
            let last_number = self.last_block_number() as i64;
            match self.store.block_at(last_number).await? {
                None => {
                    if let Some(resume_from) = self.store.highest_block_below(last_number).await? {
                        tracing::warn!(blocknumber = resume_from + 1, "found gap in blocks");
                        self.set_last_block_number(resume_from as u64);
                        continue;
                    }
                }
                Some(stored) => {
                    if stored.hash != hex_hash(block.header.parent_hash) {
                        match reorg::handle_reorg(&self.eth, &self.store, last_number as u64).await {
                            Ok(Some(forked_at)) => {
                                self.set_last_block_number(forked_at);
                                continue;
                            }
                            // Without a fork point, keep ingesting so the
                            // system as a whole stays operational.
                            Ok(None) => {}
                            Err(err) => {
                                tracing::warn!(?err, "reorg handling hit a node error");
                                break;
                            }
                        }
                    }
                }
            }

            // a row already present for this number means we are reprocessing
            // reorged blocks
            let is_reorg = self.store.block_at(next_number as i64).await?.is_some();

            let logs_list = if block.header.logs_bloom.is_zero() {
                Vec::new()
            } else {
                match self.eth.logs_for_block(next_number).await {
                    Ok(logs) => logs,
                    Err(err) => {
                        tracing::warn!(?err, blocknumber = next_number, "failed eth_getLogs call");
                        break;
                    }
                }
            };

            let transactions: Vec<Transaction> = match &block.transactions {
                BlockTransactions::Full(transactions) => transactions.clone(),
                _ => Vec::new(),
            };
            let mut logs_by_tx: HashMap<B256, Vec<Log>> = HashMap::new();
            for log in &logs_list {
                if let Some(tx_hash) = log.transaction_hash {
                    logs_by_tx.entry(tx_hash).or_default().push(log.clone());
                }
            }

            let jobs: Vec<(Transaction, Vec<Log>)> = transactions
                .into_iter()
                .map(|tx| {
                    let tx_logs = logs_by_tx.remove(&tx.hash).unwrap_or_default();
                    (tx, tx_logs)
                })
                .collect();
            let results = futures::future::join_all(jobs.iter().map(|(tx, tx_logs)| {
                classify::process_transaction(&self.store, &self.dispatcher, &self.weth_address, tx, tx_logs, is_reorg)
            }))
            .await;
            for result in results {
                if let Err(err) = result {
                    tracing::error!(?err, "failed processing transaction");
                }
            }

            // forward raw events to anyone registered on (contract, topic)
            for event in &logs_list {
                let contract_address = hex_address(event.inner.address);
                for topic in event.inner.data.topics() {
                    let registrations =
                        self.store.filter_registrations_for(&contract_address, &hex_hash(*topic)).await?;
                    for registration in registrations {
                        self.dispatcher.send_filter_notification(
                            registration.filter_id,
                            registration.topic,
                            event.inner.data.data.to_string(),
                        );
                    }
                }
            }

            let block_number = block.header.number.unwrap_or(next_number);
            if self.last_block_number() < block_number {
                self.set_last_block_number(block_number);
            }

            self.store.bump_high_water(block_number as i64).await?;
            self.store
                .upsert_block(StoredBlock {
                    blocknumber: block_number as i64,
                    hash: hex_hash(block.header.hash.unwrap_or_default()),
                    parent_hash: hex_hash(block.header.parent_hash),
                    timestamp: block_timestamp(block.header.timestamp),
                    stale: false,
                })
                .await?;

            self.dispatcher.notify_new_block(block_number);
            self.record_block_time(processing_start.elapsed());
        }

        Ok(())
    }

    /// Logs block progress and the rolling average processing time, at most
    /// once per interval.
    fn log_progress(&self, blocknumber: u64) {
        let mut last_log = self.last_progress_log.lock().expect("progress log lock poisoned");
        if last_log.is_some_and(|at| at.elapsed() < PROGRESS_LOG_INTERVAL) {
            return;
        }
        *last_log = Some(Instant::now());
        tracing::info!(blocknumber, "processing block");
        if let Some(average) = self.average_block_time() {
            tracing::info!(average_ms = average.as_millis() as u64, "average processing time per block");
        }
    }
}

fn block_timestamp(timestamp: u64) -> i64 {
    if timestamp == 0 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
    } else {
        timestamp as i64
    }
}
