mod block_check;
mod classify;
mod filter_poll;
mod pending;
mod reorg;
mod transfers;

#[cfg(test)]
pub(crate) mod mock;

use crate::client::EthereumRpc;
use crate::constants::{
    BLOCK_TIME_SAMPLES, DEFAULT_BLOCK_CHECK_DELAY, DEFAULT_POLL_DELAY, FILTER_REGISTRATION_MAX_BACKOFF,
    NEW_BLOCK_TIMEOUT, SANITY_CHECK_CALLBACK_TIME, SANITY_HEARTBEAT_TTL,
};
use crate::dispatch::Dispatcher;
use crate::error::MonitorError;
use crate::kv::PendingTxStore;
use crate::storage::{filter::hex_address, MonitorStore};
use alloy_primitives::Address;
use std::{
    collections::VecDeque,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::{task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;

/// Unix timestamp in seconds, used to age entries in the pending tracker.
pub(crate) fn unix_seconds_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// A pending timer for one of the monitor loops. The due instant is retained
/// so the sanity check can notice a schedule that should already have fired.
#[derive(Debug)]
struct Schedule {
    handle: JoinHandle<()>,
    due: Instant,
}

/// The block monitor: tracks an Ethereum node, ingests mined blocks and
/// observed pending transactions, reconciles them with the store, detects
/// chain reorganizations and hands enriched transaction events off to the
/// downstream dispatchers.
pub struct BlockMonitor<N, S, K> {
    inner: Arc<MonitorInner<N, S, K>>,
}

impl<N, S, K> Clone for BlockMonitor<N, S, K> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<N, S, K> fmt::Debug for BlockMonitor<N, S, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockMonitor")
            .field("last_block_number", &self.inner.last_block_number.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

pub(crate) struct MonitorInner<N, S, K> {
    /// Short-timeout client for block, transaction and log queries.
    eth: N,
    /// Long-timeout client for filter registration and polling.
    filter_eth: N,
    store: S,
    pending_txs: K,
    dispatcher: Dispatcher,
    /// Canonical lowercase hex of the WETH contract address.
    weth_address: String,

    last_block_number: AtomicU64,
    filter_id: Mutex<Option<String>>,
    last_saw_new_pending_transactions: Mutex<Instant>,
    last_saw_new_block: Mutex<Instant>,
    block_times: Mutex<VecDeque<Duration>>,
    last_progress_log: Mutex<Option<Instant>>,

    poll_schedule: Mutex<Option<Schedule>>,
    check_schedule: Mutex<Option<Schedule>>,
    sanity_schedule: Mutex<Option<Schedule>>,

    filter_poll_task: Mutex<Option<JoinHandle<()>>>,
    block_check_task: Mutex<Option<JoinHandle<()>>>,
    pending_task: Mutex<Option<JoinHandle<()>>>,
    sanity_task: Mutex<Option<JoinHandle<()>>>,

    shutdown: CancellationToken,
}

impl<N, S, K> BlockMonitor<N, S, K>
where
    N: EthereumRpc + 'static,
    S: MonitorStore + 'static,
    K: PendingTxStore + 'static,
{
    /// Builds a monitor from its collaborators. `eth` is the query client,
    /// `filter_eth` the long-timeout filter client.
    pub fn new(eth: N, filter_eth: N, store: S, pending_txs: K, dispatcher: Dispatcher, weth_address: Address) -> Self {
        let now = Instant::now();
        Self {
            inner: Arc::new(MonitorInner {
                eth,
                filter_eth,
                store,
                pending_txs,
                dispatcher,
                weth_address: hex_address(weth_address),
                last_block_number: AtomicU64::new(0),
                filter_id: Mutex::new(None),
                last_saw_new_pending_transactions: Mutex::new(now),
                last_saw_new_block: Mutex::new(now),
                block_times: Mutex::new(VecDeque::with_capacity(BLOCK_TIME_SAMPLES)),
                last_progress_log: Mutex::new(None),
                poll_schedule: Mutex::new(None),
                check_schedule: Mutex::new(None),
                sanity_schedule: Mutex::new(None),
                filter_poll_task: Mutex::new(None),
                block_check_task: Mutex::new(None),
                pending_task: Mutex::new(None),
                sanity_task: Mutex::new(None),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Bootstraps the high-water mark, registers the pending transaction
    /// filter and schedules the polling and sanity loops.
    ///
    /// Fails only when the store cannot be reached; everything else is
    /// retried from within the loops.
    pub async fn start(&self) -> Result<(), MonitorError> {
        let inner = &self.inner;

        let last_block_number = match inner.store.latest_non_stale_block().await? {
            Some(block) => block.blocknumber as u64,
            None => match inner.store.load_high_water().await? {
                Some(number) => number as u64,
                None => {
                    // first start: begin from the node's current tip
                    let number = inner.eth.block_number().await?;
                    inner.store.seed_high_water(number as i64).await?;
                    number
                }
            },
        };
        inner.last_block_number.store(last_block_number, Ordering::Relaxed);
        tracing::info!(last_block_number, "starting block monitor");

        inner.schedule_sanity_check();
        inner.register_filters().await;
        inner.schedule_filter_poll(DEFAULT_POLL_DELAY);
        Ok(())
    }

    /// Stops the loops, letting any in-flight iteration finish.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();

        for schedule in [&self.inner.poll_schedule, &self.inner.check_schedule, &self.inner.sanity_schedule] {
            if let Some(schedule) = schedule.lock().expect("schedule lock poisoned").take() {
                schedule.handle.abort();
            }
        }

        let tasks = [
            &self.inner.block_check_task,
            &self.inner.filter_poll_task,
            &self.inner.sanity_task,
            &self.inner.pending_task,
        ];
        for task in tasks {
            let handle = task.lock().expect("task lock poisoned").take();
            if let Some(handle) = handle {
                let _ = handle.await;
            }
        }
        tracing::info!("block monitor stopped");
    }

    /// The highest block number whose transactions have been processed.
    pub fn last_block_number(&self) -> u64 {
        self.inner.last_block_number()
    }
}

impl<N, S, K> MonitorInner<N, S, K>
where
    N: EthereumRpc + 'static,
    S: MonitorStore + 'static,
    K: PendingTxStore + 'static,
{
    pub(crate) fn last_block_number(&self) -> u64 {
        self.last_block_number.load(Ordering::Relaxed)
    }

    pub(crate) fn set_last_block_number(&self, number: u64) {
        self.last_block_number.store(number, Ordering::Relaxed);
    }

    pub(crate) fn record_block_time(&self, duration: Duration) {
        let mut times = self.block_times.lock().expect("block times lock poisoned");
        if times.len() == BLOCK_TIME_SAMPLES {
            times.pop_front();
        }
        times.push_back(duration);
    }

    pub(crate) fn average_block_time(&self) -> Option<Duration> {
        let times = self.block_times.lock().expect("block times lock poisoned");
        if times.is_empty() {
            return None;
        }
        Some(times.iter().sum::<Duration>() / times.len() as u32)
    }

    pub(crate) fn mark_saw_new_block(&self) {
        *self.last_saw_new_block.lock().expect("last block lock poisoned") = Instant::now();
    }

    pub(crate) fn mark_saw_new_pending_transactions(&self) {
        *self.last_saw_new_pending_transactions.lock().expect("last pending lock poisoned") = Instant::now();
    }

    pub(crate) fn filter_id(&self) -> Option<String> {
        self.filter_id.lock().expect("filter id lock poisoned").clone()
    }

    pub(crate) async fn register_filters(self: &Arc<Self>) {
        if !self.shutdown.is_cancelled() {
            self.register_new_pending_transaction_filter().await;
        }
    }

    /// Installs a new pending transaction filter, retrying under linear
    /// backoff capped at ten seconds until it succeeds or shutdown.
    pub(crate) async fn register_new_pending_transaction_filter(self: &Arc<Self>) -> Option<String> {
        let mut backoff = 0u64;
        while !self.shutdown.is_cancelled() {
            match self.filter_eth.new_pending_transaction_filter().await {
                Ok(filter_id) => {
                    tracing::info!(filter_id, "listening for new pending transactions");
                    *self.filter_id.lock().expect("filter id lock poisoned") = Some(filter_id.clone());
                    self.mark_saw_new_pending_transactions();
                    return Some(filter_id);
                }
                Err(err) => {
                    tracing::error!(?err, "error registering for new pending transactions");
                    backoff = (backoff + 1).min(FILTER_REGISTRATION_MAX_BACKOFF);
                    tokio::select! {
                        () = self.shutdown.cancelled() => return None,
                        () = tokio::time::sleep(Duration::from_secs(backoff)) => {}
                    }
                }
            }
        }
        None
    }

    pub(crate) fn schedule_filter_poll(self: &Arc<Self>, delay: Duration) {
        if self.shutdown.is_cancelled() {
            return;
        }
        let monitor = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            monitor.run_filter_poll();
        });
        *self.poll_schedule.lock().expect("schedule lock poisoned") =
            Some(Schedule { handle, due: Instant::now() + delay });
    }

    pub(crate) fn schedule_block_check(self: &Arc<Self>) {
        if self.shutdown.is_cancelled() {
            return;
        }
        let monitor = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(DEFAULT_BLOCK_CHECK_DELAY).await;
            monitor.run_block_check();
        });
        *self.check_schedule.lock().expect("schedule lock poisoned") =
            Some(Schedule { handle, due: Instant::now() + DEFAULT_BLOCK_CHECK_DELAY });
    }

    pub(crate) fn schedule_sanity_check(self: &Arc<Self>) {
        if self.shutdown.is_cancelled() {
            return;
        }
        let monitor = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(SANITY_CHECK_CALLBACK_TIME).await;
            monitor.run_sanity_check();
        });
        *self.sanity_schedule.lock().expect("schedule lock poisoned") =
            Some(Schedule { handle, due: Instant::now() + SANITY_CHECK_CALLBACK_TIME });
    }

    pub(crate) fn run_filter_poll(self: &Arc<Self>) {
        if self.shutdown.is_cancelled() {
            return;
        }
        let mut task = self.filter_poll_task.lock().expect("task lock poisoned");
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            tracing::debug!("filter polling is already running");
            return;
        }
        let monitor = Arc::clone(self);
        *task = Some(tokio::spawn(async move {
            if let Err(err) = monitor.filter_poll().await {
                tracing::error!(?err, "filter poll failed");
            }
        }));
    }

    pub(crate) fn run_block_check(self: &Arc<Self>) {
        if self.shutdown.is_cancelled() {
            return;
        }
        let mut task = self.block_check_task.lock().expect("task lock poisoned");
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            tracing::debug!("block check is already running");
            return;
        }
        let monitor = Arc::clone(self);
        *task = Some(tokio::spawn(async move {
            if let Err(err) = monitor.block_check().await {
                tracing::error!(?err, "block check failed");
            }
        }));
    }

    pub(crate) fn run_process_unconfirmed_transactions(self: &Arc<Self>) {
        if self.shutdown.is_cancelled() {
            return;
        }
        let mut task = self.pending_task.lock().expect("task lock poisoned");
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            tracing::debug!("process unconfirmed transactions is already running");
            return;
        }
        let monitor = Arc::clone(self);
        *task = Some(tokio::spawn(async move {
            if let Err(err) = monitor.process_unconfirmed_transactions().await {
                tracing::error!(?err, "processing unconfirmed transactions failed");
            }
        }));
    }

    pub(crate) fn run_sanity_check(self: &Arc<Self>) {
        if self.shutdown.is_cancelled() {
            return;
        }
        let mut task = self.sanity_task.lock().expect("task lock poisoned");
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            tracing::debug!("sanity check is already running");
            return;
        }
        let monitor = Arc::clone(self);
        *task = Some(tokio::spawn(async move {
            monitor.sanity_check().await;
        }));
    }

    /// Independent watchdog: repairs the filter and the poll schedule, and
    /// publishes the health heartbeat while blocks keep arriving.
    pub(crate) async fn sanity_check(self: Arc<Self>) {
        if self.shutdown.is_cancelled() {
            return;
        }

        if self.filter_id().is_none() {
            self.register_new_pending_transaction_filter().await;
        }

        let poll_state = {
            let schedule = self.poll_schedule.lock().expect("schedule lock poisoned");
            schedule.as_ref().map(|s| s.due)
        };
        let poll_running = self
            .filter_poll_task
            .lock()
            .expect("task lock poisoned")
            .as_ref()
            .is_some_and(|handle| !handle.is_finished());
        match poll_state {
            None => {
                tracing::warn!("filter poll schedule is missing");
                self.schedule_filter_poll(DEFAULT_POLL_DELAY);
            }
            Some(due) if !poll_running && due < Instant::now() => {
                tracing::warn!("filter poll schedule is in the past");
                self.schedule_filter_poll(DEFAULT_POLL_DELAY);
            }
            Some(_) => {}
        }

        let mut ok = true;
        let since_last_block = self.last_saw_new_block.lock().expect("last block lock poisoned").elapsed();
        if since_last_block > NEW_BLOCK_TIMEOUT {
            tracing::warn!(seconds = since_last_block.as_secs(), "haven't seen any new blocks");
            ok = false;
        }

        self.schedule_sanity_check();

        if ok {
            if let Err(err) = self.pending_txs.set_sanity_ok(SANITY_HEARTBEAT_TTL).await {
                tracing::error!(?err, "failed writing sanity heartbeat");
            }
        }
    }
}
