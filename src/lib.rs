//! Nonce allocation and transaction resubmission for blockchain clients
//!
//! A client submitting signed transactions can only observe the network's
//! account nonce by polling. This crate keeps that round trip off the hot
//! path: nonces are handed out from a per-address cache, submitted
//! transactions are tracked, and a background sweep periodically compares
//! the tracked set against the network's confirmed nonce, dropping what
//! has executed and resubmitting what appears stuck.
//!
//! The network is reached through the [`NetworkProxy`] trait supplied by
//! the embedding client; everything transport-shaped stays outside this
//! crate. Resubmission is a best-effort liveness aid, not a delivery
//! guarantee: the network's own nonce rules reject stale duplicates, so
//! replaying an already-executed transaction is harmless.

pub mod chain;
pub mod error;
pub mod tx;

pub use chain::{Account, NetworkProxy};
pub use error::{RelayError, RelayResult};
pub use tx::{Address, NonceTransactionHandler, Transaction, MIN_RESEND_INTERVAL};
