use crate::constants::WETH_CONTRACT_ADDRESS;
use alloy_primitives::Address;
use eyre::eyre;
use std::env::var;
use std::str::FromStr;
use url::Url;

/// Configuration for the block monitor.
#[derive(Clone, Debug)]
pub struct MonitorConfig {
    /// Ethereum node URL the monitor talks to.
    pub node_url: Url,
    /// MongoDB connection string.
    pub mongo_connection_string: String,
    /// MongoDB database name.
    pub mongo_database_name: String,
    /// Redis connection URL.
    pub redis_url: String,
    /// WETH contract address whose Deposit/Withdrawal events are tracked.
    pub weth_contract_address: Address,
}

impl MonitorConfig {
    /// Create a new `MonitorConfig` from environment variables.
    ///
    /// `MONITOR_ETHEREUM_URL` points the monitor at a dedicated node and takes
    /// precedence; `ETHEREUM_URL` is the shared fallback.
    pub fn from_env() -> eyre::Result<Self> {
        let node_url = match var("MONITOR_ETHEREUM_URL") {
            Ok(url) => url,
            Err(_) => {
                tracing::warn!("MONITOR_ETHEREUM_URL not set, monitor using ETHEREUM_URL node");
                var("ETHEREUM_URL").map_err(|_| eyre!("Missing environment variable ETHEREUM_URL"))?
            }
        };

        let weth_contract_address = match var("WETH_CONTRACT_ADDRESS") {
            Ok(addr) => Address::from_str(&addr).map_err(|err| eyre!("Invalid WETH_CONTRACT_ADDRESS: {err}"))?,
            Err(_) => WETH_CONTRACT_ADDRESS,
        };

        Ok(Self {
            node_url: Url::parse(&node_url)?,
            mongo_connection_string: var("MONGO_CONNECTION_STRING")
                .map_err(|_| eyre!("Missing environment variable MONGO_CONNECTION_STRING"))?,
            mongo_database_name: var("MONGO_DATABASE_NAME")
                .map_err(|_| eyre!("Missing environment variable MONGO_DATABASE_NAME"))?,
            redis_url: var("REDIS_URL").map_err(|_| eyre!("Missing environment variable REDIS_URL"))?,
            weth_contract_address,
        })
    }
}
