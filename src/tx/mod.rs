//! Transaction submission module with nonce management and resubmission
//!
//! This module provides:
//! - Per-address nonce allocation backed by a local cache
//! - Pending-transaction tracking with periodic resubmission
//! - The public handler tying both to the network proxy

mod handler;
mod tracker;
mod types;

pub use handler::{NonceTransactionHandler, MIN_RESEND_INTERVAL};
pub use types::{Address, Transaction};
