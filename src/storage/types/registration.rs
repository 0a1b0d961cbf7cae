use serde::{Deserialize, Serialize};

/// A push-notification registration. A transaction is interesting when one of
/// its endpoints appears in this set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredNotificationRegistration {
    /// Owning user id.
    pub token_id: String,
    /// Push service identifier.
    pub service: String,
    /// Device registration id within the service.
    pub registration_id: String,
    /// Watched Ethereum address, canonical lowercase hex.
    pub eth_address: String,
}

/// An address registered for ERC-20 balance tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTokenRegistration {
    /// Owning user id.
    pub token_id: String,
    /// Watched Ethereum address, canonical lowercase hex.
    pub eth_address: String,
}

/// A log filter registration: `(contract_address, topic_id)` pairs whose
/// events are forwarded to the eth dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFilterRegistration {
    /// Opaque filter id handed back to the registrant.
    pub filter_id: String,
    /// Contract whose logs are watched, canonical lowercase hex.
    pub contract_address: String,
    /// Topic hash being matched, canonical lowercase hex.
    pub topic_id: String,
    /// Human readable topic the registrant subscribed with.
    pub topic: String,
}

/// Collectibles indexer cursor; rewound when a reorg invalidates blocks it
/// already scanned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCollectible {
    /// Collectible contract address, canonical lowercase hex.
    pub contract_address: String,
    /// Last block the collectibles indexer processed.
    pub last_block: i64,
}
