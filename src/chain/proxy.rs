//! Network account source interface
//!
//! The proxy is supplied by the embedding client and hides the HTTP
//! transport, entity encoding and signing behind an async trait.
//! Implementations map their transport failures into
//! [`RelayError::Network`](crate::error::RelayError::Network).

use crate::error::RelayResult;
use crate::tx::{Address, Transaction};

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};

/// On-chain account state, reduced to the fields nonce management reads
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Canonical encoded address
    pub address: String,
    /// Next-expected nonce as the network reports it
    pub nonce: u64,
    /// Balance as a decimal string
    #[serde(default)]
    pub balance: String,
}

/// Gateway to the network's account and transaction endpoints
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NetworkProxy: Send + Sync {
    /// Fetch the current account state for `address`
    async fn get_account(&self, address: &Address) -> RelayResult<Account>;

    /// Submit a single signed transaction, returning its hash
    async fn send_transaction(&self, tx: &Transaction) -> RelayResult<String>;

    /// Submit a batch of signed transactions, returning their hashes in order
    async fn send_transactions(&self, txs: &[Transaction]) -> RelayResult<Vec<String>>;
}
