use super::{
    types::registration::{StoredCollectible, StoredFilterRegistration, StoredNotificationRegistration, StoredTokenRegistration},
    types::token::StoredToken,
    Database, FindOpts,
};
use crate::error::StorageError;
use async_trait::async_trait;
use auto_impl::auto_impl;
use mongodb::bson::doc;

/// Interest lookups against the registration tables, plus the token registry
/// and the collectibles cursor.
#[async_trait]
#[auto_impl(Arc, &)]
pub trait RegistrationStore: Send + Sync {
    /// Returns true if the contract is a token tracked by the service.
    async fn is_known_token(&self, contract_address: &str) -> Result<bool, StorageError>;

    /// Returns true if any of the addresses has a push-notification registration.
    async fn has_notification_registration(&self, addresses: &[&str]) -> Result<bool, StorageError>;

    /// Returns true if any of the addresses is registered for token tracking.
    async fn has_token_registration(&self, addresses: &[&str]) -> Result<bool, StorageError>;

    /// Returns the contract addresses of tokens that still need their
    /// registrations pushed into the token cache.
    async fn non_ready_tokens(&self) -> Result<Vec<String>, StorageError>;

    /// Returns the total number of token registrations.
    async fn count_token_registrations(&self) -> Result<u64, StorageError>;

    /// Returns one page of token registration addresses.
    async fn token_registration_page(&self, skip: u64, limit: u64) -> Result<Vec<String>, StorageError>;

    /// Marks the given tokens as pushed into the token cache.
    async fn mark_tokens_ready(&self, contract_addresses: &[String]) -> Result<(), StorageError>;

    /// Returns the filter registrations matching a `(contract, topic)` pair.
    async fn filter_registrations_for(
        &self,
        contract_address: &str,
        topic_id: &str,
    ) -> Result<Vec<StoredFilterRegistration>, StorageError>;

    /// Lowers every collectibles cursor above the given block down to it.
    async fn clamp_collectibles_last_block(&self, last_block: i64) -> Result<(), StorageError>;
}

#[async_trait]
impl RegistrationStore for Database {
    async fn is_known_token(&self, contract_address: &str) -> Result<bool, StorageError> {
        self.exists::<StoredToken>(doc! {"contract_address": contract_address}).await
    }

    async fn has_notification_registration(&self, addresses: &[&str]) -> Result<bool, StorageError> {
        let addresses: Vec<_> = addresses.to_vec();
        self.exists::<StoredNotificationRegistration>(doc! {"eth_address": {"$in": addresses}}).await
    }

    async fn has_token_registration(&self, addresses: &[&str]) -> Result<bool, StorageError> {
        let addresses: Vec<_> = addresses.to_vec();
        self.exists::<StoredTokenRegistration>(doc! {"eth_address": {"$in": addresses}}).await
    }

    async fn non_ready_tokens(&self) -> Result<Vec<String>, StorageError> {
        Ok(self
            .find::<StoredToken>(doc! {"ready": false, "custom": false}, FindOpts::default())
            .await?
            .into_iter()
            .map(|token| token.contract_address)
            .collect())
    }

    async fn count_token_registrations(&self) -> Result<u64, StorageError> {
        self.count::<StoredTokenRegistration>(doc! {}).await
    }

    async fn token_registration_page(&self, skip: u64, limit: u64) -> Result<Vec<String>, StorageError> {
        Ok(self
            .find::<StoredTokenRegistration>(doc! {}, FindOpts::default().skip(skip).limit(limit))
            .await?
            .into_iter()
            .map(|registration| registration.eth_address)
            .collect())
    }

    async fn mark_tokens_ready(&self, contract_addresses: &[String]) -> Result<(), StorageError> {
        let contract_addresses: Vec<_> = contract_addresses.to_vec();
        self.modify_many::<StoredToken>(
            doc! {"contract_address": {"$in": contract_addresses}},
            doc! {"$set": {"ready": true}},
        )
        .await
    }

    async fn filter_registrations_for(
        &self,
        contract_address: &str,
        topic_id: &str,
    ) -> Result<Vec<StoredFilterRegistration>, StorageError> {
        self.find(doc! {"contract_address": contract_address, "topic_id": topic_id}, FindOpts::default()).await
    }

    async fn clamp_collectibles_last_block(&self, last_block: i64) -> Result<(), StorageError> {
        self.modify_many::<StoredCollectible>(
            doc! {"last_block": {"$gt": last_block}},
            doc! {"$set": {"last_block": last_block}},
        )
        .await
    }
}
