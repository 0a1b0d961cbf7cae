use alloy_primitives::{address, b256, Address, B256};
use std::time::Duration;

/// First topic of a standard ERC-20 `Transfer(address,address,uint256)` event.
pub const TRANSFER_TOPIC: B256 = b256!("ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef");
/// First topic of a WETH `Deposit(address,uint256)` event.
pub const DEPOSIT_TOPIC: B256 = b256!("e1fffcc4923d04b559f4d29a8bfc6cda04eb5b0d3c460751c2402c5c5cc9109c");
/// First topic of a WETH `Withdrawal(address,uint256)` event.
pub const WITHDRAWAL_TOPIC: B256 = b256!("7fcf532c15f0a6db0bd6d0e038bea71d30d808c7d98cb3bf7268a95bf5081b65");
/// The canonical mainnet WETH contract.
pub const WETH_CONTRACT_ADDRESS: Address = address!("c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2");
/// The zero address, used as the synthetic counterparty of WETH deposits and withdrawals.
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Delay between filter poll iterations.
pub const DEFAULT_POLL_DELAY: Duration = Duration::from_secs(1);
/// Delay before an opportunistic block check runs.
pub const DEFAULT_BLOCK_CHECK_DELAY: Duration = Duration::ZERO;
/// Node-side pending transaction filters expire after roughly a minute of not
/// being polled. New blocks can take longer than that, so a minute of missing
/// filter info is acceptable before assuming the filter has died.
pub const FILTER_TIMEOUT: Duration = Duration::from_secs(120);
/// Interval between sanity check runs.
pub const SANITY_CHECK_CALLBACK_TIME: Duration = Duration::from_secs(10);
/// Delay until the sanity check reports errors when no new blocks are seen.
pub const NEW_BLOCK_TIMEOUT: Duration = Duration::from_secs(300);
/// How long an unconfirmed transaction hash may stay unknown to the node
/// before it is assumed dropped from the network.
pub const PENDING_TX_EXPIRY: Duration = Duration::from_secs(60);
/// Time-to-live of the sanity heartbeat key.
pub const SANITY_HEARTBEAT_TTL: Duration = Duration::from_secs(20);
/// Interval between throttled block-processing progress logs.
pub const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(300);

/// Number of blocks fetched per iteration when walking back to find a fork point.
pub const REORG_BATCH: u64 = 10;
/// Maximum number of blocks to walk back before giving up on finding a fork point.
pub const REORG_MAX_DEPTH: u64 = 1000;
/// Page size used when pushing token registrations into the token cache.
pub const TOKEN_REGISTRATION_PAGE: u64 = 1000;
/// Number of per-block processing durations kept for the rolling average.
pub const BLOCK_TIME_SAMPLES: usize = 100;
/// Maximum backoff, in seconds, between pending transaction filter registration attempts.
pub const FILTER_REGISTRATION_MAX_BACKOFF: u64 = 10;

/// Key-value store hash holding `{tx hash -> first seen, unix seconds}` for
/// transactions observed in the mempool but not yet mined.
pub const UNCONFIRMED_TXS_KEY: &str = "toshieth.monitor:unconfirmed_txs";
/// Key-value store key signalling monitor health to external monitors.
pub const SANITY_CHECK_OK_KEY: &str = "monitor_sanity_check_ok";

/// Number of characters for representing a hash in a hex string form. Used for padding hashes
pub const HASH_HEX_STRING_LEN: usize = 64;
/// Number of characters for representing an address in a hex string form. Used for padding addresses
pub const ADDRESS_HEX_STRING_LEN: usize = 40;
/// Number of characters for representing a u64 in a hex string form. Used for padding numbers
pub const U64_HEX_STRING_LEN: usize = 16;
