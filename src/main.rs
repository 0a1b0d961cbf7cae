use eth_monitor::{
    client::EthClientPair,
    config::MonitorConfig,
    dispatch::{DispatchReceivers, Dispatcher},
    kv::RedisKv,
    monitor::BlockMonitor,
    storage::Database,
};
use eyre::Result;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    // Environment variables are safe to use after this

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::FmtSubscriber::builder().with_env_filter(filter).finish().try_init()?;

    let config = MonitorConfig::from_env()?;

    let mongo = mongodb::Client::with_uri_str(&config.mongo_connection_string).await?;
    let database = Database::new(mongo.database(&config.mongo_database_name));

    let redis = redis::Client::open(config.redis_url.as_str())?;
    let kv = RedisKv::new(redis.get_connection_manager().await?);

    let clients = EthClientPair::connect(&config.node_url)?;

    let (dispatcher, receivers) = Dispatcher::channel();
    forward_dispatches(receivers);

    let monitor =
        BlockMonitor::new(clients.query, clients.filter, database, kv, dispatcher, config.weth_contract_address);
    monitor.start().await?;

    wait_for_shutdown_signal().await?;
    monitor.shutdown().await;
    Ok(())
}

/// Drains the dispatch bus towards the downstream services. The dispatchers
/// run as separate processes fed off the task queue; this end of the bridge
/// only traces what leaves the monitor.
fn forward_dispatches(receivers: DispatchReceivers) {
    let DispatchReceivers { mut manager, mut erc20, mut eth, mut collectibles } = receivers;
    tokio::spawn(async move {
        while let Some(message) = manager.recv().await {
            tracing::debug!(?message, "manager dispatch");
        }
    });
    tokio::spawn(async move {
        while let Some(message) = erc20.recv().await {
            tracing::debug!(?message, "erc20 dispatch");
        }
    });
    tokio::spawn(async move {
        while let Some(message) = eth.recv().await {
            tracing::debug!(?message, "eth dispatch");
        }
    });
    tokio::spawn(async move {
        while let Some(message) = collectibles.recv().await {
            tracing::debug!(?message, "collectibles dispatch");
        }
    });
}

async fn wait_for_shutdown_signal() -> Result<()> {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
    tracing::info!("shutdown signal received");
    Ok(())
}
