//! Public nonce-transactions handler and its resend sweep
//!
//! Orchestrates one [`AddressNonceTracker`] per address, creating trackers
//! lazily on first use, and runs the periodic background sweep that
//! resubmits transactions the network has not confirmed yet.

use crate::chain::NetworkProxy;
use crate::error::{RelayError, RelayResult};
use crate::tx::tracker::AddressNonceTracker;
use crate::tx::types::{Address, Transaction};

use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Lowest accepted resend interval; bounds how aggressively the network
/// is polled
pub const MIN_RESEND_INTERVAL: Duration = Duration::from_secs(1);

/// State shared between the public surface and the sweep task
struct HandlerInner {
    proxy: Arc<dyn NetworkProxy>,
    /// Trackers indexed by canonical address
    trackers: DashMap<Address, Arc<AddressNonceTracker>>,
    /// One-way lifecycle flag, set by the first `close`
    closed: AtomicBool,
}

impl HandlerInner {
    fn tracker_for(&self, address: &Address) -> Arc<AddressNonceTracker> {
        self.trackers
            .entry(address.clone())
            .or_insert_with(|| {
                Arc::new(AddressNonceTracker::new(address.clone(), self.proxy.clone()))
            })
            .clone()
    }

    /// One sweep cycle: reconcile every tracked address
    async fn resend_pending(&self, shutdown: &watch::Receiver<bool>) {
        // Snapshot the registry so no map shard stays locked across the
        // network calls below.
        let trackers: Vec<(Address, Arc<AddressNonceTracker>)> = self
            .trackers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        for (address, tracker) in trackers {
            if *shutdown.borrow() || self.closed.load(Ordering::SeqCst) {
                break;
            }

            if let Err(e) = tracker.reconcile().await {
                if e.is_transient() {
                    warn!(
                        "Resend sweep failed for {}, retrying next cycle: {}",
                        address, e
                    );
                } else {
                    error!("Resend sweep failed for {}: {}", address, e);
                }
            }
        }
    }
}

/// Hands out per-account nonces and resubmits unconfirmed transactions on
/// a fixed interval until the network acknowledges them
pub struct NonceTransactionHandler {
    inner: Arc<HandlerInner>,
    shutdown_tx: watch::Sender<bool>,
    sweep_handle: Mutex<Option<JoinHandle<()>>>,
}

impl NonceTransactionHandler {
    /// Create a handler and start its background resend sweep
    ///
    /// Must be called from within a Tokio runtime. Fails when no proxy is
    /// supplied or when `resend_interval` undercuts
    /// [`MIN_RESEND_INTERVAL`].
    pub fn new(
        proxy: Option<Arc<dyn NetworkProxy>>,
        resend_interval: Duration,
    ) -> RelayResult<Self> {
        let proxy = proxy.ok_or(RelayError::MissingProxy)?;
        if resend_interval < MIN_RESEND_INTERVAL {
            return Err(RelayError::InvalidResendInterval {
                got: resend_interval,
                min: MIN_RESEND_INTERVAL,
            });
        }

        let inner = Arc::new(HandlerInner {
            proxy,
            trackers: DashMap::new(),
            closed: AtomicBool::new(false),
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sweep_handle = tokio::spawn(Self::run_sweep(
            inner.clone(),
            resend_interval,
            shutdown_rx,
        ));

        Ok(Self {
            inner,
            shutdown_tx,
            sweep_handle: Mutex::new(Some(sweep_handle)),
        })
    }

    /// Background sweep loop; exactly one per handler
    async fn run_sweep(
        inner: Arc<HandlerInner>,
        resend_interval: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        // First sweep fires one full interval after construction.
        let mut ticker = time::interval_at(Instant::now() + resend_interval, resend_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Resend sweep started, interval {:?}", resend_interval);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                _ = ticker.tick() => {}
            }

            inner.resend_pending(&shutdown_rx).await;
        }

        info!("Resend sweep stopped");
    }

    /// Allocate the next nonce for `address`
    ///
    /// The first allocation for an address queries the network once;
    /// subsequent allocations are answered locally until a forced refetch.
    pub async fn get_nonce(&self, address: &Address) -> RelayResult<u64> {
        self.ensure_open()?;
        if address.is_empty() {
            return Err(RelayError::EmptyAddress);
        }

        self.inner.tracker_for(address).get_nonce().await
    }

    /// Submit a signed transaction and track it for resending
    ///
    /// The transaction is recorded as pending even when the submission
    /// errors: a client-observed failure does not prove the network never
    /// received it, and the sweep drops the record as soon as the
    /// confirmed nonce passes it.
    pub async fn send_transaction(&self, tx: &Transaction) -> RelayResult<String> {
        self.ensure_open()?;
        if tx.sender.is_empty() {
            return Err(RelayError::MissingSender);
        }

        let tracker = self.inner.tracker_for(&tx.sender_address());
        let result = self.inner.proxy.send_transaction(tx).await;
        tracker.add_pending(tx.clone()).await;

        match result {
            Ok(hash) => {
                debug!(
                    "Sent transaction with nonce {} for {}: {}",
                    tx.nonce, tx.sender, hash
                );
                Ok(hash)
            }
            Err(e) => {
                warn!(
                    "Send failed for {} (nonce {}), kept for resend: {}",
                    tx.sender, tx.nonce, e
                );
                Err(e)
            }
        }
    }

    /// Drop the cached nonce for `address` so the next allocation
    /// re-queries the network; pending transactions are unaffected
    pub async fn force_nonce_refetch(&self, address: &Address) -> RelayResult<()> {
        self.ensure_open()?;
        if address.is_empty() {
            return Err(RelayError::EmptyAddress);
        }

        self.inner.tracker_for(address).force_refetch().await;
        Ok(())
    }

    /// Stop the resend sweep and wait for it to exit
    ///
    /// After `close` returns, the handler issues no further network calls
    /// and every public operation fails with [`RelayError::Closed`].
    /// Idempotent: later calls are no-ops.
    pub async fn close(&self) -> RelayResult<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let _ = self.shutdown_tx.send(true);

        let handle = self.sweep_handle.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Resend sweep task ended abnormally: {}", e);
            }
        }

        Ok(())
    }

    fn ensure_open(&self) -> RelayResult<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(RelayError::Closed);
        }
        Ok(())
    }
}

impl Drop for NonceTransactionHandler {
    fn drop(&mut self) {
        // A handler dropped without close must not leave the sweep running.
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.sweep_handle.get_mut().take() {
            handle.abort();
        }
    }
}
