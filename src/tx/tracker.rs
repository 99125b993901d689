//! Per-address nonce state machine
//!
//! Each tracked address owns:
//! - the next nonce to hand out, cached so allocation stays local
//! - the set of transactions submitted but not yet observed as confirmed
//!
//! The network's account state is the source of truth for confirmation;
//! the tracker reconciles against it on every resend sweep.

use crate::chain::NetworkProxy;
use crate::error::RelayResult;
use crate::tx::types::{Address, Transaction};

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Mutable tracker state, guarded by the tracker's mutex
#[derive(Default)]
struct TrackerState {
    /// Next nonce to assign; `None` until first use or after a forced refetch
    computed_nonce: Option<u64>,
    /// Last network-confirmed nonce observed for this address
    lowest_unconfirmed: Option<u64>,
    /// Submitted transactions awaiting confirmation, keyed by nonce
    pending: BTreeMap<u64, Transaction>,
}

/// Nonce allocation and resend bookkeeping for a single address
pub(crate) struct AddressNonceTracker {
    address: Address,
    proxy: Arc<dyn NetworkProxy>,
    state: Mutex<TrackerState>,
}

impl AddressNonceTracker {
    pub(crate) fn new(address: Address, proxy: Arc<dyn NetworkProxy>) -> Self {
        Self {
            address,
            proxy,
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// Allocate the next nonce for this address
    ///
    /// The first call, and the first call after a forced refetch, seeds the
    /// cache from the network; later calls are answered locally. A fetch
    /// failure leaves the state untouched, so no nonce is half-reserved.
    pub(crate) async fn get_nonce(&self) -> RelayResult<u64> {
        let mut state = self.state.lock().await;

        let next = match state.computed_nonce {
            Some(nonce) => nonce,
            None => {
                let account = self.proxy.get_account(&self.address).await?;
                debug!("Seeded nonce for {} at {}", self.address, account.nonce);
                state.lowest_unconfirmed = Some(account.nonce);
                account.nonce
            }
        };

        state.computed_nonce = Some(next + 1);
        debug!("Allocated nonce {} for {}", next, self.address);
        Ok(next)
    }

    /// Drop the cached nonce so the next allocation re-queries the network
    ///
    /// Pending transactions are kept; only allocation is affected.
    pub(crate) async fn force_refetch(&self) {
        let mut state = self.state.lock().await;
        state.computed_nonce = None;
        debug!("Cleared cached nonce for {}", self.address);
    }

    /// Record a submitted transaction as awaiting confirmation
    ///
    /// A second record under the same nonce replaces the first.
    pub(crate) async fn add_pending(&self, tx: Transaction) {
        let mut state = self.state.lock().await;
        state.pending.insert(tx.nonce, tx);
    }

    /// Reconcile pending transactions against the network's confirmed nonce
    ///
    /// Entries below the confirmed nonce are dropped as executed or
    /// superseded; the remainder is resubmitted in ascending-nonce order,
    /// batched when more than one is left. Any failure leaves the pending
    /// set unchanged so the next sweep retries.
    pub(crate) async fn reconcile(&self) -> RelayResult<()> {
        let mut state = self.state.lock().await;

        if state.pending.is_empty() {
            return Ok(());
        }

        let account = self.proxy.get_account(&self.address).await?;
        let confirmed = account.nonce;

        // Keys at or above the confirmed nonce stay pending, everything
        // below has executed or been superseded.
        let still_pending = state.pending.split_off(&confirmed);
        let dropped = state.pending.len();
        state.pending = still_pending;

        if let Some(previous) = state.lowest_unconfirmed {
            if confirmed > previous {
                debug!(
                    "Confirmed nonce for {} advanced from {} to {}",
                    self.address, previous, confirmed
                );
            }
        }
        state.lowest_unconfirmed = Some(confirmed);

        if dropped > 0 {
            debug!(
                "Dropped {} confirmed transaction(s) for {}",
                dropped, self.address
            );
        }

        if let Some(computed) = state.computed_nonce {
            if confirmed > computed {
                warn!(
                    "Nonce gap for {}: computed {}, network reports {}",
                    self.address, computed, confirmed
                );
            }
        }

        if state.pending.is_empty() {
            return Ok(());
        }

        let resendable: Vec<Transaction> = state.pending.values().cloned().collect();
        if resendable.len() == 1 {
            let hash = self.proxy.send_transaction(&resendable[0]).await?;
            debug!(
                "Resent transaction with nonce {} for {}: {}",
                resendable[0].nonce, self.address, hash
            );
        } else {
            let hashes = self.proxy.send_transactions(&resendable).await?;
            debug!(
                "Resent {} transactions for {}, got {} hashes",
                resendable.len(),
                self.address,
                hashes.len()
            );
        }

        Ok(())
    }
}

#[cfg(test)]
impl AddressNonceTracker {
    async fn pending_snapshot(&self) -> Vec<Transaction> {
        self.state.lock().await.pending.values().cloned().collect()
    }

    async fn lowest_unconfirmed(&self) -> Option<u64> {
        self.state.lock().await.lowest_unconfirmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{Account, MockNetworkProxy};
    use crate::error::RelayError;

    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio_test::{assert_err, assert_ok};

    const TEST_ADDRESS: &str = "addr1zptg3eu7uw0qvzhnu009lwxupcn6ntjx";

    fn account_with_nonce(nonce: u64) -> Account {
        Account {
            address: TEST_ADDRESS.to_string(),
            nonce,
            ..Default::default()
        }
    }

    fn mock_tx(nonce: u64) -> Transaction {
        Transaction {
            nonce,
            value: "1".to_string(),
            receiver: TEST_ADDRESS.to_string(),
            sender: TEST_ADDRESS.to_string(),
            gas_price: 100_000,
            gas_limit: 50_000,
            data: None,
            signature: "sig".to_string(),
            chain_id: "3".to_string(),
            version: 1,
        }
    }

    fn tracker_with(proxy: MockNetworkProxy) -> AddressNonceTracker {
        AddressNonceTracker::new(Address::from(TEST_ADDRESS), Arc::new(proxy))
    }

    #[tokio::test]
    async fn get_nonce_seeds_from_network_then_counts_locally() {
        let mut proxy = MockNetworkProxy::new();
        proxy
            .expect_get_account()
            .withf(|address| address.as_encoded() == TEST_ADDRESS)
            .times(1)
            .returning(|_| Ok(account_with_nonce(664)));

        let tracker = tracker_with(proxy);
        assert_eq!(assert_ok!(tracker.get_nonce().await), 664);
        assert_eq!(assert_ok!(tracker.get_nonce().await), 665);
        assert_eq!(assert_ok!(tracker.get_nonce().await), 666);
        assert_eq!(tracker.lowest_unconfirmed().await, Some(664));
    }

    #[tokio::test]
    async fn failed_seed_reserves_nothing() {
        let mut proxy = MockNetworkProxy::new();
        proxy
            .expect_get_account()
            .times(1)
            .returning(|_| Err(RelayError::Network("account fetch failed".to_string())));
        proxy
            .expect_get_account()
            .times(1)
            .returning(|_| Ok(account_with_nonce(664)));

        let tracker = tracker_with(proxy);
        let err = assert_err!(tracker.get_nonce().await);
        assert!(err.is_transient());

        // The failed call must not have reserved a nonce.
        assert_eq!(assert_ok!(tracker.get_nonce().await), 664);
    }

    #[tokio::test]
    async fn force_refetch_requeries_the_network() {
        let current = Arc::new(AtomicU64::new(664));
        let nonce = current.clone();
        let mut proxy = MockNetworkProxy::new();
        proxy
            .expect_get_account()
            .times(2)
            .returning(move |_| Ok(account_with_nonce(nonce.load(Ordering::SeqCst))));

        let tracker = tracker_with(proxy);
        assert_eq!(assert_ok!(tracker.get_nonce().await), 664);
        assert_eq!(assert_ok!(tracker.get_nonce().await), 665);
        assert_eq!(assert_ok!(tracker.get_nonce().await), 666);

        tracker.force_refetch().await;
        assert_eq!(assert_ok!(tracker.get_nonce().await), 664);
    }

    #[tokio::test]
    async fn reconcile_without_pending_issues_no_network_call() {
        let mut proxy = MockNetworkProxy::new();
        proxy.expect_get_account().never();

        let tracker = tracker_with(proxy);
        assert_ok!(tracker.reconcile().await);
    }

    #[tokio::test]
    async fn reconcile_drops_confirmed_and_batches_the_rest() {
        let mut proxy = MockNetworkProxy::new();
        proxy
            .expect_get_account()
            .times(1)
            .returning(|_| Ok(account_with_nonce(666)));
        proxy
            .expect_send_transactions()
            .withf(|txs| txs.iter().map(|tx| tx.nonce).collect::<Vec<_>>() == [666, 667, 668])
            .times(1)
            .returning(|txs| Ok(vec![String::new(); txs.len()]));

        let tracker = tracker_with(proxy);
        for nonce in 664..669 {
            tracker.add_pending(mock_tx(nonce)).await;
        }

        assert_ok!(tracker.reconcile().await);

        let pending = tracker.pending_snapshot().await;
        assert_eq!(
            pending.iter().map(|tx| tx.nonce).collect::<Vec<_>>(),
            vec![666, 667, 668]
        );
        assert_eq!(tracker.lowest_unconfirmed().await, Some(666));
    }

    #[tokio::test]
    async fn reconcile_with_one_remainder_uses_the_single_send() {
        let mut proxy = MockNetworkProxy::new();
        proxy
            .expect_get_account()
            .times(1)
            .returning(|_| Ok(account_with_nonce(665)));
        proxy
            .expect_send_transaction()
            .withf(|tx| tx.nonce == 665)
            .times(1)
            .returning(|_| Ok("hash".to_string()));
        proxy.expect_send_transactions().never();

        let tracker = tracker_with(proxy);
        tracker.add_pending(mock_tx(664)).await;
        tracker.add_pending(mock_tx(665)).await;

        assert_ok!(tracker.reconcile().await);
        assert_eq!(tracker.pending_snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn reconcile_resends_nothing_once_everything_confirmed() {
        let mut proxy = MockNetworkProxy::new();
        proxy
            .expect_get_account()
            .times(1)
            .returning(|_| Ok(account_with_nonce(669)));
        proxy.expect_send_transaction().never();
        proxy.expect_send_transactions().never();

        let tracker = tracker_with(proxy);
        for nonce in 664..669 {
            tracker.add_pending(mock_tx(nonce)).await;
        }

        assert_ok!(tracker.reconcile().await);
        assert!(tracker.pending_snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn reconcile_fetch_failure_keeps_pending_for_next_cycle() {
        let mut proxy = MockNetworkProxy::new();
        proxy
            .expect_get_account()
            .times(1)
            .returning(|_| Err(RelayError::Network("unreachable".to_string())));
        proxy.expect_send_transactions().never();

        let tracker = tracker_with(proxy);
        for nonce in 664..669 {
            tracker.add_pending(mock_tx(nonce)).await;
        }

        assert_err!(tracker.reconcile().await);
        assert_eq!(tracker.pending_snapshot().await.len(), 5);
    }

    #[tokio::test]
    async fn failed_resend_is_retried_on_the_next_cycle() {
        let mut proxy = MockNetworkProxy::new();
        proxy
            .expect_get_account()
            .times(2)
            .returning(|_| Ok(account_with_nonce(664)));
        proxy
            .expect_send_transactions()
            .times(1)
            .returning(|_| Err(RelayError::Network("relay rejected batch".to_string())));
        proxy
            .expect_send_transactions()
            .withf(|txs| txs.len() == 5)
            .times(1)
            .returning(|txs| Ok(vec![String::new(); txs.len()]));

        let tracker = tracker_with(proxy);
        for nonce in 664..669 {
            tracker.add_pending(mock_tx(nonce)).await;
        }

        assert_err!(tracker.reconcile().await);
        assert_eq!(tracker.pending_snapshot().await.len(), 5);

        assert_ok!(tracker.reconcile().await);
        assert_eq!(tracker.pending_snapshot().await.len(), 5);
    }

    #[tokio::test]
    async fn add_pending_replaces_an_entry_with_the_same_nonce() {
        let proxy = MockNetworkProxy::new();
        let tracker = tracker_with(proxy);

        let first = mock_tx(664);
        let mut second = mock_tx(664);
        second.signature = "resigned".to_string();

        tracker.add_pending(first).await;
        tracker.add_pending(second).await;

        let pending = tracker.pending_snapshot().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].signature, "resigned");
    }
}
