//! Proxy endpoint pool
//!
//! The pool owns the working set of endpoints. Two parties touch it:
//! - [`ProxyPool::get_endpoint`] is the only path that removes endpoints
//! - the background refill task is the only path that adds them
//!
//! Both go through a single read/write lock; selection holds the read lock
//! except while evicting a near-expiry endpoint.

use crate::config::ProxyConfig;
use crate::proxy::accounting::acquire_endpoints;
use crate::proxy::traits::{ProxyError, ProxyProvider, ProxyResult};
use crate::proxy::{Balance, Endpoint};
use chrono::{Duration, Utc};
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify, RwLock};
use tokio_util::sync::CancellationToken;

struct Shared {
    provider: Arc<dyn ProxyProvider>,
    endpoints: RwLock<Vec<Endpoint>>,
    margin: Duration,
    /// Endpoints evicted and not yet replaced
    deficit: AtomicUsize,
    /// Holds at most one pending wakeup, so signals coalesce
    refill: Notify,
    /// Set when the provider account is exhausted
    halted: AtomicBool,
    errors_tx: mpsc::Sender<ProxyError>,
    errors_rx: Mutex<mpsc::Receiver<ProxyError>>,
}

impl Shared {
    fn signal_refill(&self) {
        if !self.halted.load(Ordering::SeqCst) {
            self.refill.notify_one();
        }
    }

    fn take_refill_error(&self) -> Option<ProxyError> {
        self.errors_rx.lock().ok()?.try_recv().ok()
    }

    fn report(&self, err: ProxyError) {
        // A full channel already holds an error for the next caller
        let _ = self.errors_tx.try_send(err);
    }
}

/// Pool of short-lived proxy endpoints with background refill
pub struct ProxyPool {
    shared: Arc<Shared>,
    shutdown: CancellationToken,
}

impl ProxyPool {
    /// Initializes the provider and fills the pool
    ///
    /// # Arguments
    ///
    /// * `provider` - Provider to buy endpoints from
    /// * `config` - Pool size and expiry margin
    /// * `shutdown` - Lifetime token; cancelling it stops the refill task
    ///
    /// # Returns
    ///
    /// * `Ok(ProxyPool)` - Pool with its initial batch
    /// * `Err(ProxyError)` - Provider initialisation or the first batch failed
    pub async fn init(
        provider: Arc<dyn ProxyProvider>,
        config: &ProxyConfig,
        shutdown: CancellationToken,
    ) -> ProxyResult<Self> {
        provider.init().await?;

        let margin = Duration::seconds(config.expiry_margin_secs as i64);
        let now = Utc::now();
        let batch: Vec<Endpoint> = acquire_endpoints(provider.as_ref(), config.size)
            .await?
            .into_iter()
            .filter(|e| e.is_fresh(now, margin))
            .collect();

        tracing::info!(
            "Proxy pool initialized with {} of {} endpoints from {}",
            batch.len(),
            config.size,
            provider.name()
        );

        let missing = config.size.saturating_sub(batch.len());
        let pool = Self::from_endpoints(provider, batch, margin, shutdown);
        if missing > 0 {
            pool.shared.deficit.fetch_add(missing, Ordering::SeqCst);
            pool.shared.signal_refill();
        }

        Ok(pool)
    }

    /// Creates a pool over an existing working set and starts the refill
    /// task, without contacting the provider
    pub fn from_endpoints(
        provider: Arc<dyn ProxyProvider>,
        endpoints: Vec<Endpoint>,
        margin: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        let (errors_tx, errors_rx) = mpsc::channel(1);
        let shared = Arc::new(Shared {
            provider,
            endpoints: RwLock::new(endpoints),
            margin,
            deficit: AtomicUsize::new(0),
            refill: Notify::new(),
            halted: AtomicBool::new(false),
            errors_tx,
            errors_rx: Mutex::new(errors_rx),
        });

        let shutdown = shutdown.child_token();
        tokio::spawn(refill_loop(shared.clone(), shutdown.clone()));

        Self { shared, shutdown }
    }

    /// Returns a random endpoint with more than the expiry margin left
    ///
    /// Near-expiry endpoints met along the way are evicted and a refill is
    /// signalled. Never waits on the provider.
    ///
    /// # Errors
    ///
    /// * [`ProxyError::Canceled`] - `cancel` fired
    /// * [`ProxyError::NoEndpointAvailable`] - the working set is empty
    /// * any error the refill task reported since the last call
    pub async fn get_endpoint(&self, cancel: &CancellationToken) -> ProxyResult<Endpoint> {
        // A refill pass that stopped on a provider error left slots unfilled
        if self.shared.deficit.load(Ordering::SeqCst) > 0 {
            self.shared.signal_refill();
        }

        loop {
            if cancel.is_cancelled() {
                return Err(ProxyError::Canceled);
            }

            if let Some(err) = self.shared.take_refill_error() {
                return Err(err);
            }

            let candidate = {
                let endpoints = self.shared.endpoints.read().await;
                if endpoints.is_empty() {
                    None
                } else {
                    let index = rand::thread_rng().gen_range(0..endpoints.len());
                    Some(endpoints[index].clone())
                }
            };

            let candidate = match candidate {
                Some(candidate) => candidate,
                None => {
                    if self.shared.deficit.load(Ordering::SeqCst) > 0 {
                        self.shared.signal_refill();
                    }
                    return Err(ProxyError::NoEndpointAvailable);
                }
            };

            if candidate.is_fresh(Utc::now(), self.shared.margin) {
                return Ok(candidate);
            }

            self.evict(&candidate).await;
        }
    }

    async fn evict(&self, stale: &Endpoint) {
        let removed = {
            let mut endpoints = self.shared.endpoints.write().await;
            let before = endpoints.len();
            endpoints.retain(|e| !e.same_proxy(stale));
            before - endpoints.len()
        };

        // Another caller may have evicted it first
        if removed > 0 {
            tracing::info!("Proxy endpoint {} expiring, evicted", stale.addr());
            self.shared.deficit.fetch_add(removed, Ordering::SeqCst);
            self.shared.signal_refill();
        }
    }

    /// Point-in-time copy of the working set
    pub async fn endpoints(&self) -> Vec<Endpoint> {
        self.shared.endpoints.read().await.clone()
    }

    /// Number of evicted endpoints awaiting replacement
    pub fn deficit(&self) -> usize {
        self.shared.deficit.load(Ordering::SeqCst)
    }

    /// Returns true if refill stopped on an exhausted provider account
    pub fn is_refill_halted(&self) -> bool {
        self.shared.halted.load(Ordering::SeqCst)
    }

    /// Restarts a refill loop halted by an exhausted account
    pub fn resume_refill(&self) {
        if self.shared.halted.swap(false, Ordering::SeqCst) {
            tracing::info!("Proxy refill resumed");
        }
        if self.deficit() > 0 {
            self.shared.signal_refill();
        }
    }

    /// Queries the provider's paid balance
    pub async fn balance(&self) -> ProxyResult<Balance> {
        self.shared.provider.balance().await
    }

    /// Provider name for display
    pub fn provider_name(&self) -> &str {
        self.shared.provider.name()
    }

    /// Stops the refill task; idempotent
    pub fn close(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for ProxyPool {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn refill_loop(shared: Arc<Shared>, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = shared.refill.notified() => {}
        }

        while shared.deficit.load(Ordering::SeqCst) > 0 && !shared.halted.load(Ordering::SeqCst) {
            let fetched = tokio::select! {
                _ = shutdown.cancelled() => return,
                result = acquire_endpoints(shared.provider.as_ref(), 1) => result,
            };

            let now = Utc::now();
            let fresh = fetched.and_then(|batch| {
                batch
                    .into_iter()
                    .find(|e| e.is_fresh(now, shared.margin))
                    .ok_or_else(|| {
                        ProxyError::Provider("provider returned no usable endpoint".to_string())
                    })
            });

            match fresh {
                Ok(endpoint) => {
                    tracing::debug!("Proxy endpoint {} added", endpoint.addr());
                    let mut endpoints = shared.endpoints.write().await;
                    if !endpoints.iter().any(|e| e.same_proxy(&endpoint)) {
                        endpoints.push(endpoint);
                    }
                    drop(endpoints);
                    let _ = shared
                        .deficit
                        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |d| d.checked_sub(1));
                }
                Err(e) => {
                    if e.is_account_exhausted() {
                        tracing::error!("Proxy refill halted: {}", e);
                        shared.halted.store(true, Ordering::SeqCst);
                    } else {
                        tracing::warn!("Proxy refill failed: {}", e);
                    }
                    shared.report(e);
                    // Wait for the next signal before trying again
                    break;
                }
            }
        }
    }

    tracing::debug!("Proxy refill task stopped");
}
