use crate::storage::types::transaction::TransactionStatus;
use mongodb::bson::oid::ObjectId;
use tokio::sync::mpsc;

/// Messages for the transaction manager dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerMessage {
    /// A new block arrived; refresh the default gas price.
    UpdateDefaultGasPrice {
        /// Number of the block that triggered the refresh.
        blocknumber: u64,
    },
    /// A tracked transaction changed state.
    UpdateTransaction {
        /// Surrogate id of the transaction row.
        transaction_id: ObjectId,
        /// The state the transaction moved to.
        status: TransactionStatus,
    },
}

/// Messages for the ERC-20 dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Erc20Message {
    /// Prime the token balance cache for a set of registered addresses.
    UpdateTokenCache {
        /// Token contract address, canonical lowercase hex.
        contract_address: String,
        /// Registered addresses to cache balances for.
        eth_addresses: Vec<String>,
    },
}

/// Messages for the eth service dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EthMessage {
    /// A watched contract emitted an event a registrant subscribed to.
    SendFilterNotification {
        /// Id of the matching filter registration.
        filter_id: String,
        /// Topic the registrant subscribed with.
        topic: String,
        /// Raw event data, hex.
        data: String,
    },
}

/// Messages for the collectibles dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectiblesMessage {
    /// A block finished processing.
    NotifyNewBlock {
        /// Number of the processed block.
        blocknumber: u64,
    },
}

/// Receiving ends of the dispatch bus, consumed by the downstream services.
#[derive(Debug)]
pub struct DispatchReceivers {
    pub manager: mpsc::UnboundedReceiver<ManagerMessage>,
    pub erc20: mpsc::UnboundedReceiver<Erc20Message>,
    pub eth: mpsc::UnboundedReceiver<EthMessage>,
    pub collectibles: mpsc::UnboundedReceiver<CollectiblesMessage>,
}

/// Fire-and-forget handles to the four downstream dispatchers.
///
/// Sends never block and never fail the caller; a closed channel is logged
/// and the message dropped.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    manager: mpsc::UnboundedSender<ManagerMessage>,
    erc20: mpsc::UnboundedSender<Erc20Message>,
    eth: mpsc::UnboundedSender<EthMessage>,
    collectibles: mpsc::UnboundedSender<CollectiblesMessage>,
}

impl Dispatcher {
    /// Creates the dispatcher and the matching receiving ends.
    pub fn channel() -> (Self, DispatchReceivers) {
        let (manager_tx, manager_rx) = mpsc::unbounded_channel();
        let (erc20_tx, erc20_rx) = mpsc::unbounded_channel();
        let (eth_tx, eth_rx) = mpsc::unbounded_channel();
        let (collectibles_tx, collectibles_rx) = mpsc::unbounded_channel();
        (
            Self { manager: manager_tx, erc20: erc20_tx, eth: eth_tx, collectibles: collectibles_tx },
            DispatchReceivers { manager: manager_rx, erc20: erc20_rx, eth: eth_rx, collectibles: collectibles_rx },
        )
    }

    pub fn update_default_gas_price(&self, blocknumber: u64) {
        if self.manager.send(ManagerMessage::UpdateDefaultGasPrice { blocknumber }).is_err() {
            tracing::warn!(blocknumber, "manager dispatcher is closed, dropping gas price update");
        }
    }

    pub fn update_transaction(&self, transaction_id: ObjectId, status: TransactionStatus) {
        if self.manager.send(ManagerMessage::UpdateTransaction { transaction_id, status }).is_err() {
            tracing::warn!(%transaction_id, %status, "manager dispatcher is closed, dropping transaction update");
        }
    }

    pub fn update_token_cache(&self, contract_address: String, eth_addresses: Vec<String>) {
        if self.erc20.send(Erc20Message::UpdateTokenCache { contract_address, eth_addresses }).is_err() {
            tracing::warn!("erc20 dispatcher is closed, dropping token cache update");
        }
    }

    pub fn send_filter_notification(&self, filter_id: String, topic: String, data: String) {
        if self.eth.send(EthMessage::SendFilterNotification { filter_id, topic, data }).is_err() {
            tracing::warn!("eth dispatcher is closed, dropping filter notification");
        }
    }

    pub fn notify_new_block(&self, blocknumber: u64) {
        if self.collectibles.send(CollectiblesMessage::NotifyNewBlock { blocknumber }).is_err() {
            tracing::warn!(blocknumber, "collectibles dispatcher is closed, dropping new block notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_messages_arrive_in_send_order() {
        let (dispatcher, mut receivers) = Dispatcher::channel();

        dispatcher.update_default_gas_price(101);
        let id = ObjectId::new();
        dispatcher.update_transaction(id, TransactionStatus::Confirmed);
        dispatcher.notify_new_block(101);

        assert_eq!(receivers.manager.recv().await, Some(ManagerMessage::UpdateDefaultGasPrice { blocknumber: 101 }));
        assert_eq!(
            receivers.manager.recv().await,
            Some(ManagerMessage::UpdateTransaction { transaction_id: id, status: TransactionStatus::Confirmed })
        );
        assert_eq!(receivers.collectibles.recv().await, Some(CollectiblesMessage::NotifyNewBlock { blocknumber: 101 }));
    }

    #[test]
    fn test_send_on_closed_channel_is_dropped() {
        let (dispatcher, receivers) = Dispatcher::channel();
        drop(receivers);

        // must not panic or error out
        dispatcher.update_default_gas_price(1);
        dispatcher.notify_new_block(1);
    }
}
