//! Address and transaction data model

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonically encoded account address
///
/// Equality and hashing use the encoded form, which is also the key of
/// the handler's tracker registry. Validating the encoding itself is the
/// embedding client's concern; an empty encoding marks an absent or
/// unusable address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Create an address from its canonical encoded form
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    /// The canonical encoded form
    pub fn as_encoded(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(encoded: &str) -> Self {
        Self(encoded.to_string())
    }
}

impl From<String> for Address {
    fn from(encoded: String) -> Self {
        Self(encoded)
    }
}

/// Signed transaction as the network accepts it
///
/// Only `sender` and `nonce` are interpreted here; the remaining fields
/// are carried opaquely to the proxy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub nonce: u64,
    pub value: String,
    pub receiver: String,
    pub sender: String,
    pub gas_price: u64,
    pub gas_limit: u64,
    /// Already-encoded call payload, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    pub signature: String,
    #[serde(rename = "chainID")]
    pub chain_id: String,
    pub version: u32,
}

impl Transaction {
    /// The sender as a tracker-registry address
    pub fn sender_address(&self) -> Address {
        Address::new(self.sender.clone())
    }
}
