use super::{unix_seconds_now, MonitorInner};
use crate::client::EthereumRpc;
use crate::constants::{DEFAULT_POLL_DELAY, FILTER_TIMEOUT, TOKEN_REGISTRATION_PAGE};
use crate::error::MonitorError;
use crate::kv::PendingTxStore;
use crate::storage::{filter::hex_hash, MonitorStore};
use std::sync::Arc;
use std::time::Duration;

impl<N, S, K> MonitorInner<N, S, K>
where
    N: EthereumRpc + 'static,
    S: MonitorStore + 'static,
    K: PendingTxStore + 'static,
{
    /// One filter poll iteration: reconcile freshly added tokens, drain the
    /// pending transaction filter, kick the block check when the node moved
    /// ahead, and reschedule.
    pub(crate) async fn filter_poll(self: Arc<Self>) -> Result<(), MonitorError> {
        if self.shutdown.is_cancelled() {
            return Ok(());
        }
        self.reconcile_token_readiness().await?;

        if !self.shutdown.is_cancelled() {
            if let Some(filter_id) = self.filter_id() {
                let new_pending = match self.filter_eth.filter_changes(&filter_id).await {
                    Ok(tx_hashes) => Some(tx_hashes),
                    Err(err) => {
                        tracing::warn!(?err, "unable to reach the node polling the pending filter");
                        None
                    }
                };

                match new_pending {
                    None => {
                        self.register_filters().await;
                    }
                    Some(tx_hashes) if !tx_hashes.is_empty() => {
                        let now = unix_seconds_now();
                        for tx_hash in tx_hashes {
                            self.pending_txs.add_if_absent(&hex_hash(tx_hash), now).await?;
                        }
                        self.mark_saw_new_pending_transactions();
                    }
                    Some(_) => {
                        // an empty drain is fine for a while, but past the
                        // timeout the filter has probably silently died
                        let since = self
                            .last_saw_new_pending_transactions
                            .lock()
                            .expect("last pending lock poisoned")
                            .elapsed();
                        if since > FILTER_TIMEOUT {
                            tracing::warn!(
                                seconds = since.as_secs(),
                                "haven't seen any new pending transactions"
                            );
                            self.register_new_pending_transaction_filter().await;
                        }
                    }
                }

                if self.pending_txs.size().await? > 0 {
                    self.run_process_unconfirmed_transactions();
                }
            }
        }

        if !self.shutdown.is_cancelled() {
            // no need to ask for the block number while a check is running
            let block_check_running = self
                .block_check_task
                .lock()
                .expect("task lock poisoned")
                .as_ref()
                .is_some_and(|handle| !handle.is_finished());
            if !block_check_running {
                let block_number = match self.filter_eth.block_number().await {
                    Ok(number) => number,
                    Err(err) => {
                        tracing::warn!(?err, "error getting current block number");
                        0
                    }
                };
                if block_number > self.last_block_number() && !self.shutdown.is_cancelled() {
                    self.schedule_block_check();
                }
            }
        }

        if !self.shutdown.is_cancelled() {
            let delay =
                if self.pending_txs.size().await? > 0 { Duration::from_secs(1) } else { DEFAULT_POLL_DELAY };
            self.schedule_filter_poll(delay);
        }
        Ok(())
    }

    /// Pushes existing address registrations into the token cache for tokens
    /// that appeared in the registry since the last pass, then marks them
    /// ready. Safe to repeat after a crash mid-way.
    async fn reconcile_token_readiness(&self) -> Result<(), MonitorError> {
        let tokens = self.store.non_ready_tokens().await?;
        if tokens.is_empty() {
            return Ok(());
        }

        let total_registrations = self.store.count_token_registrations().await?;
        for contract_address in &tokens {
            tracing::info!(
                contract_address = %contract_address,
                registrations = total_registrations,
                "got new erc20 token, updating registrations"
            );
        }

        let mut offset = 0;
        while offset < total_registrations {
            let page = self.store.token_registration_page(offset, TOKEN_REGISTRATION_PAGE).await?;
            for contract_address in &tokens {
                self.dispatcher.update_token_cache(contract_address.clone(), page.clone());
            }
            offset += TOKEN_REGISTRATION_PAGE;
        }

        self.store.mark_tokens_ready(&tokens).await?;
        Ok(())
    }
}
