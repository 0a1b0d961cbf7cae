use crate::error::RpcError;
use alloy_primitives::{B256, U64};
use alloy_rpc_types::{Block, BlockNumberOrTag, Filter, Log, Transaction};
use async_trait::async_trait;
use auto_impl::auto_impl;
use jsonrpsee::{
    core::{client::ClientT, params::BatchRequestBuilder},
    http_client::{HttpClient, HttpClientBuilder},
    rpc_params,
};
use std::time::Duration;
use url::Url;

/// Request timeout of the query client.
const QUERY_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Request timeout of the filter client. Filter calls may legitimately block
/// for a long time on a quiet node.
const FILTER_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// The subset of the Ethereum JSON-RPC surface the monitor drives.
#[async_trait]
#[auto_impl(Arc, &)]
pub trait EthereumRpc: Send + Sync {
    /// Returns the number of the most recent block.
    async fn block_number(&self) -> Result<u64, RpcError>;

    /// Returns the block with the given number. `full` requests complete
    /// transaction objects instead of hashes.
    async fn block_by_number(&self, number: u64, full: bool) -> Result<Option<Block>, RpcError>;

    /// Fetches several blocks with full transactions in one pipelined batch.
    /// Results come back in the order of `numbers`.
    async fn blocks_by_number_bulk(&self, numbers: &[u64]) -> Result<Vec<Option<Block>>, RpcError>;

    /// Returns the transaction with the given hash, if the node knows it.
    async fn transaction_by_hash(&self, hash: B256) -> Result<Option<Transaction>, RpcError>;

    /// Returns all logs emitted in the given block.
    async fn logs_for_block(&self, number: u64) -> Result<Vec<Log>, RpcError>;

    /// Installs a new pending-transaction filter on the node and returns its id.
    async fn new_pending_transaction_filter(&self) -> Result<String, RpcError>;

    /// Drains the pending-transaction hashes accumulated by the filter since
    /// the last poll.
    async fn filter_changes(&self, filter_id: &str) -> Result<Vec<B256>, RpcError>;
}

/// JSON-RPC client for an Ethereum node.
#[derive(Clone, Debug)]
pub struct EthRpcClient {
    inner: HttpClient,
}

impl EthRpcClient {
    /// Builds a client for the given node URL with the given request timeout.
    pub fn new(url: &Url, request_timeout: Duration) -> Result<Self, RpcError> {
        let inner = HttpClientBuilder::default().request_timeout(request_timeout).build(url.as_str())?;
        Ok(Self { inner })
    }
}

#[async_trait]
impl EthereumRpc for EthRpcClient {
    async fn block_number(&self) -> Result<u64, RpcError> {
        let number: U64 = self.inner.request("eth_blockNumber", rpc_params![]).await?;
        Ok(number.to())
    }

    async fn block_by_number(&self, number: u64, full: bool) -> Result<Option<Block>, RpcError> {
        Ok(self.inner.request("eth_getBlockByNumber", rpc_params![BlockNumberOrTag::Number(number), full]).await?)
    }

    async fn blocks_by_number_bulk(&self, numbers: &[u64]) -> Result<Vec<Option<Block>>, RpcError> {
        if numbers.is_empty() {
            return Ok(Vec::new());
        }
        let mut batch = BatchRequestBuilder::new();
        for number in numbers {
            batch
                .insert("eth_getBlockByNumber", rpc_params![BlockNumberOrTag::Number(*number), true])
                .map_err(jsonrpsee::core::ClientError::ParseError)?;
        }
        let responses = self.inner.batch_request::<Option<Block>>(batch).await?;
        let mut blocks = Vec::with_capacity(numbers.len());
        for response in responses {
            blocks.push(response.map_err(|err| jsonrpsee::core::ClientError::Call(err.into_owned()))?);
        }
        if blocks.len() != numbers.len() {
            return Err(RpcError::IncompleteBatch);
        }
        Ok(blocks)
    }

    async fn transaction_by_hash(&self, hash: B256) -> Result<Option<Transaction>, RpcError> {
        Ok(self.inner.request("eth_getTransactionByHash", rpc_params![hash]).await?)
    }

    async fn logs_for_block(&self, number: u64) -> Result<Vec<Log>, RpcError> {
        let filter = Filter::new().from_block(number).to_block(number);
        Ok(self.inner.request("eth_getLogs", rpc_params![filter]).await?)
    }

    async fn new_pending_transaction_filter(&self) -> Result<String, RpcError> {
        Ok(self.inner.request("eth_newPendingTransactionFilter", rpc_params![]).await?)
    }

    async fn filter_changes(&self, filter_id: &str) -> Result<Vec<B256>, RpcError> {
        Ok(self.inner.request("eth_getFilterChanges", rpc_params![filter_id]).await?)
    }
}

/// The pair of clients the monitor runs on.
///
/// Filter calls can stall until the node side times out; giving them their own
/// client keeps them from head-of-line-blocking block and transaction queries.
#[derive(Clone, Debug)]
pub struct EthClientPair {
    /// Short-timeout client for block, transaction and log queries.
    pub query: EthRpcClient,
    /// Long-timeout client for filter registration and polling.
    pub filter: EthRpcClient,
}

impl EthClientPair {
    /// Builds the query/filter client pair over the same node URL.
    pub fn connect(url: &Url) -> Result<Self, RpcError> {
        Ok(Self {
            query: EthRpcClient::new(url, QUERY_REQUEST_TIMEOUT)?,
            filter: EthRpcClient::new(url, FILTER_REQUEST_TIMEOUT)?,
        })
    }
}
