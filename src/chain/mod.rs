//! Network-facing collaborator interface
//!
//! Defines the account source the handler polls and submits through.
//! Transport, entity encoding and signing live behind it, outside this
//! crate.

mod proxy;

pub use proxy::{Account, NetworkProxy};

#[cfg(test)]
pub use proxy::MockNetworkProxy;
