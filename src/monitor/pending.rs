use super::{classify, unix_seconds_now, MonitorInner};
use crate::client::EthereumRpc;
use crate::constants::PENDING_TX_EXPIRY;
use crate::error::MonitorError;
use crate::kv::PendingTxStore;
use crate::storage::MonitorStore;
use alloy_primitives::B256;
use std::{str::FromStr, sync::Arc};

impl<N, S, K> MonitorInner<N, S, K>
where
    N: EthereumRpc + 'static,
    S: MonitorStore + 'static,
    K: PendingTxStore + 'static,
{
    /// Looks every tracked unconfirmed hash up on the node. Hashes the node
    /// doesn't know are dropped once they outlive the expiry; hashes that
    /// made it into a block are left to the block check; the rest go through
    /// the classifier as pending transactions.
    pub(crate) async fn process_unconfirmed_transactions(self: Arc<Self>) -> Result<(), MonitorError> {
        if self.shutdown.is_cancelled() {
            return Ok(());
        }

        let unmatched = self.pending_txs.snapshot().await?;
        for (tx_hash, first_seen) in unmatched {
            let age = unix_seconds_now() - first_seen;

            let Ok(hash) = B256::from_str(&tx_hash) else {
                tracing::warn!(tx_hash = %tx_hash, "dropping malformed pending transaction hash");
                self.pending_txs.remove(&tx_hash).await?;
                continue;
            };

            let tx = match self.eth.transaction_by_hash(hash).await {
                Ok(tx) => tx,
                Err(err) => {
                    tracing::warn!(?err, tx_hash = %tx_hash, "error getting transaction");
                    None
                }
            };

            match tx {
                None => {
                    // never accepted into a block and no longer in the
                    // mempool: assume it was dropped from the network
                    if age >= PENDING_TX_EXPIRY.as_secs() as i64 {
                        self.pending_txs.remove(&tx_hash).await?;
                    }
                }
                Some(tx) => {
                    self.pending_txs.remove(&tx_hash).await?;

                    // already included in a block: the block check will
                    // notify about it, skip to avoid a duplicate
                    if tx.block_number.is_some() {
                        continue;
                    }

                    if let Err(err) = classify::process_transaction(
                        &self.store,
                        &self.dispatcher,
                        &self.weth_address,
                        &tx,
                        &[],
                        false,
                    )
                    .await
                    {
                        tracing::error!(?err, tx_hash = %tx_hash, "failed processing pending transaction");
                    }
                }
            }

            if self.shutdown.is_cancelled() {
                break;
            }
        }
        Ok(())
    }
}
