//! Crawl daemon
//!
//! The daemon owns the scheduling loop and the in-flight budget. Every poll
//! interval it pops paths from the frontier while the budget allows and
//! hands each one to a task on a `JoinSet`. Tasks never report failure to
//! the loop: a failed task pushes its path back and the frontier re-delivers
//! it on a later pop.
//!
//! # Task flow
//!
//! 1. Re-classify the popped path; an `Unknown` path is persisted and dropped
//! 2. Acquire a proxy endpoint (when a pool is configured)
//! 3. Render the page
//! 4. Parse, harvest links and apply the match rule
//! 5. Persist the path as visited
//!
//! Any failure in steps 2-5, the task timeout, shutdown, or a panic pushes
//! the path back exactly once. A push-back the frontier refuses as
//! unavailable is held by the daemon and retried on every tick, so an outage
//! never drops a claimed path.

use crate::config::{ClientConfig, Config};
use crate::crawler::processor::PageProcessor;
use crate::crawler::renderer::Renderer;
use crate::crawler::rule::MatchRule;
use crate::crawler::state::{DaemonState, TaskView};
use crate::frontier::{Frontier, FrontierError};
use crate::proxy::ProxyPool;
use crate::store::ProductStore;
use crate::url::{Classified, Classifier, Kind};
use crate::CirrusError;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::{Id, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

/// Scheduling parameters of the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaemonOptions {
    /// Maximum number of tasks in flight
    pub connections: usize,
    pub poll_interval: Duration,
    /// Upper bound on one task, win or lose
    pub task_timeout: Duration,
}

impl From<&ClientConfig> for DaemonOptions {
    fn from(config: &ClientConfig) -> Self {
        Self {
            connections: config.connections as usize,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            task_timeout: Duration::from_secs(config.task_timeout_secs),
        }
    }
}

#[derive(Debug)]
struct Status {
    state: DaemonState,
    root: Option<String>,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Counters {
    succeeded: AtomicU64,
    pushed_back: AtomicU64,
    matched: AtomicU64,
}

struct Shared {
    options: DaemonOptions,
    classifier: Classifier,
    frontier: Arc<dyn Frontier>,
    renderer: Arc<dyn Renderer>,
    proxies: Option<Arc<ProxyPool>>,
    processor: PageProcessor,
    in_flight: Arc<AtomicUsize>,
    /// Claimed paths the frontier could not take back yet
    stranded: Mutex<Vec<String>>,
    status: Mutex<Status>,
    counters: Counters,
    shutdown: CancellationToken,
}

/// Running tasks and the path each one claimed
#[derive(Default)]
struct Workers {
    tasks: JoinSet<()>,
    claimed: HashMap<Id, String>,
}

impl Workers {
    fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Releases one in-flight slot when dropped, including during a panic
struct InFlightSlot(Arc<AtomicUsize>);

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The crawl orchestrator
///
/// Cheap to clone; clones share the same crawl.
#[derive(Clone)]
pub struct Daemon {
    shared: Arc<Shared>,
}

impl Daemon {
    /// Creates a daemon in the `Idle` state
    ///
    /// # Arguments
    ///
    /// * `config` - Site, client and rule configuration
    /// * `frontier` - Shared URL frontier
    /// * `renderer` - Page renderer
    /// * `proxies` - Proxy pool, or `None` to fetch directly
    /// * `store` - Result store for matched products
    /// * `shutdown` - Lifetime token; cancelling it drains and stops the daemon
    pub fn new(
        config: &Config,
        frontier: Arc<dyn Frontier>,
        renderer: Arc<dyn Renderer>,
        proxies: Option<Arc<ProxyPool>>,
        store: Arc<dyn ProductStore>,
        shutdown: CancellationToken,
    ) -> Result<Self, CirrusError> {
        let classifier = Classifier::new(&config.site)?;
        let rule = MatchRule::compile(&config.rule)?;
        let processor = PageProcessor::new(classifier.clone(), rule, frontier.clone(), store)?;

        Ok(Self::with_options(
            DaemonOptions::from(&config.client),
            classifier,
            processor,
            frontier,
            renderer,
            proxies,
            shutdown,
        ))
    }

    /// Creates a daemon from already-built parts
    pub fn with_options(
        options: DaemonOptions,
        classifier: Classifier,
        processor: PageProcessor,
        frontier: Arc<dyn Frontier>,
        renderer: Arc<dyn Renderer>,
        proxies: Option<Arc<ProxyPool>>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                options,
                classifier,
                frontier,
                renderer,
                proxies,
                processor,
                in_flight: Arc::new(AtomicUsize::new(0)),
                stranded: Mutex::new(Vec::new()),
                status: Mutex::new(Status {
                    state: DaemonState::Idle,
                    root: None,
                    start_time: None,
                    end_time: None,
                }),
                counters: Counters::default(),
                shutdown,
            }),
        }
    }

    fn status(&self) -> MutexGuard<'_, Status> {
        self.shared
            .status
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn stranded(&self) -> MutexGuard<'_, Vec<String>> {
        self.shared
            .stranded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current lifecycle state
    pub fn state(&self) -> DaemonState {
        self.status().state
    }

    /// Number of tasks currently running
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::SeqCst)
    }

    /// Starts a fresh crawl from `root`
    ///
    /// Clears the frontier, seeds it with the canonical root path and moves
    /// to `Running`.
    ///
    /// # Errors
    ///
    /// * [`CirrusError::InvalidTransition`] - the daemon is not idle
    /// * [`CirrusError::InvalidRoot`] - `root` classifies as unknown
    /// * [`CirrusError::Frontier`] - the frontier could not be reset or seeded
    pub async fn start(&self, root: &str) -> Result<(), CirrusError> {
        let page = self.shared.classifier.classify(root);
        if page.kind == Kind::Unknown {
            return Err(CirrusError::InvalidRoot(root.to_string()));
        }

        // Claimed before any await so a concurrent start cannot interleave
        {
            let mut status = self.status();
            if !status.state.can_start() {
                return Err(CirrusError::InvalidTransition(format!(
                    "cannot start while {}",
                    status.state
                )));
            }
            status.state = DaemonState::Starting;
        }

        if let Err(e) = self.seed(&page.path).await {
            self.status().state = DaemonState::Idle;
            return Err(e);
        }

        let mut status = self.status();
        status.state = DaemonState::Running;
        status.root = Some(page.path.clone());
        status.start_time = Some(Utc::now());
        status.end_time = None;
        drop(status);

        tracing::info!("Crawl started from {}", page.path);
        Ok(())
    }

    async fn seed(&self, root: &str) -> Result<(), CirrusError> {
        self.shared.frontier.reset().await?;
        // Leftovers belong to the previous crawl
        self.stranded().clear();
        self.shared.frontier.push(root).await?;
        Ok(())
    }

    /// Stops dispatching; the daemon returns to `Idle` once in-flight tasks
    /// settle. The pending set is kept for [`Daemon::resume`].
    pub fn pause(&self) -> Result<(), CirrusError> {
        let mut status = self.status();
        if status.state != DaemonState::Running {
            return Err(CirrusError::InvalidTransition(format!(
                "cannot pause while {}",
                status.state
            )));
        }
        status.state = DaemonState::Draining;
        drop(status);

        tracing::info!("Crawl pausing, {} tasks in flight", self.in_flight());
        Ok(())
    }

    /// Continues crawling from the current pending set without a reset
    pub fn resume(&self) -> Result<(), CirrusError> {
        let mut status = self.status();
        match status.state {
            DaemonState::Idle => {
                status.start_time.get_or_insert_with(Utc::now);
                status.end_time = None;
            }
            // Pausing had not finished yet
            DaemonState::Draining => {}
            other => {
                return Err(CirrusError::InvalidTransition(format!(
                    "cannot resume while {}",
                    other
                )));
            }
        }
        status.state = DaemonState::Running;
        drop(status);

        tracing::info!("Crawl resumed");
        Ok(())
    }

    /// Returns a snapshot of the crawl
    pub async fn view(&self) -> TaskView {
        let pending = self.shared.frontier.pending_len().await.ok();
        let stranded = self.stranded().len();
        let status = self.status();
        let counters = &self.shared.counters;

        TaskView {
            root: status.root.clone(),
            state: status.state,
            start_time: status.start_time,
            end_time: status.end_time,
            in_flight: self.in_flight(),
            connections: self.shared.options.connections,
            pending,
            stranded,
            succeeded: counters.succeeded.load(Ordering::Relaxed),
            pushed_back: counters.pushed_back.load(Ordering::Relaxed),
            matched: counters.matched.load(Ordering::Relaxed),
        }
    }

    /// Runs the scheduling loop until the shutdown token fires, then waits
    /// for every in-flight task to settle
    pub async fn run(&self) {
        let shutdown = self.shared.shutdown.clone();
        let mut ticker = tokio::time::interval(self.shared.options.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut workers = Workers::default();

        tracing::info!(
            "Daemon polling every {:?} with {} connections",
            self.shared.options.poll_interval,
            self.shared.options.connections
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => self.tick(&mut workers).await,
            }
        }

        self.status().state = DaemonState::Draining;
        tracing::info!("Daemon draining {} tasks", self.in_flight());

        while let Some(result) = workers.tasks.join_next_with_id().await {
            self.settle(&mut workers, result).await;
        }
        self.restore_stranded().await;

        let left = self.stranded().len();
        if left > 0 {
            tracing::error!("Frontier unavailable at shutdown, {} claimed paths dropped", left);
        }

        let mut status = self.status();
        status.state = DaemonState::Stopped;
        status.end_time.get_or_insert_with(Utc::now);
        drop(status);

        tracing::info!("Daemon stopped");
    }

    async fn tick(&self, workers: &mut Workers) {
        while let Some(result) = workers.tasks.try_join_next_with_id() {
            self.settle(workers, result).await;
        }
        self.restore_stranded().await;

        match self.state() {
            DaemonState::Running => self.dispatch(workers).await,
            DaemonState::Draining if workers.is_empty() => {
                self.finish(DaemonState::Draining, "Crawl paused");
            }
            _ => {}
        }
    }

    /// Pops and dispatches until the budget is full or nothing is pending
    async fn dispatch(&self, workers: &mut Workers) {
        while self.in_flight() < self.shared.options.connections {
            let path = match self.shared.frontier.pop().await {
                Ok(path) => path,
                Err(FrontierError::Empty) => {
                    if workers.is_empty() && self.stranded().is_empty() {
                        self.finish(DaemonState::Running, "Crawl finished, frontier empty");
                    }
                    return;
                }
                Err(e) => {
                    tracing::warn!("Frontier pop failed, retrying next tick: {}", e);
                    return;
                }
            };

            self.shared.in_flight.fetch_add(1, Ordering::SeqCst);
            let slot = InFlightSlot(self.shared.in_flight.clone());
            let daemon = self.clone();

            tracing::debug!("Dispatching {}", path);
            let task = {
                let path = path.clone();
                workers.tasks.spawn(async move {
                    let _slot = slot;
                    daemon.run_task(path).await;
                })
            };
            workers.claimed.insert(task.id(), path);
        }
    }

    /// Releases a finished task's claim; a panicked task's path goes back
    async fn settle(&self, workers: &mut Workers, result: Result<(Id, ()), JoinError>) {
        match result {
            Ok((id, ())) => {
                workers.claimed.remove(&id);
            }
            Err(e) => {
                let path = workers.claimed.remove(&e.id());
                if e.is_panic() {
                    tracing::error!("Crawl task panicked: {}", e);
                    if let Some(path) = path {
                        self.push_back(&path).await;
                    }
                }
            }
        }
    }

    /// Returns a claimed path to the frontier, or holds it while the
    /// frontier is unavailable
    async fn push_back(&self, path: &str) {
        self.shared.counters.pushed_back.fetch_add(1, Ordering::Relaxed);
        match self.shared.frontier.push(path).await {
            Ok(()) | Err(FrontierError::AlreadyVisited(_)) => {}
            Err(e) => {
                tracing::warn!("Holding {} until the frontier recovers: {}", path, e);
                self.stranded().push(path.to_string());
            }
        }
    }

    /// Retries held push-backs, stopping at the first refusal
    async fn restore_stranded(&self) {
        let held = std::mem::take(&mut *self.stranded());
        if held.is_empty() {
            return;
        }

        let mut remaining = held.into_iter();
        while let Some(path) = remaining.next() {
            match self.shared.frontier.push(&path).await {
                Ok(()) | Err(FrontierError::AlreadyVisited(_)) => {}
                Err(_) => {
                    let mut stranded = self.stranded();
                    stranded.push(path);
                    stranded.extend(remaining);
                    return;
                }
            }
        }

        tracing::info!("Frontier recovered, held paths returned");
    }

    /// Moves to `Idle` if the daemon is still in `expected`
    fn finish(&self, expected: DaemonState, message: &str) {
        let mut status = self.status();
        if status.state == expected {
            status.state = DaemonState::Idle;
            status.end_time = Some(Utc::now());
            drop(status);
            tracing::info!("{}", message);
        }
    }

    async fn run_task(&self, path: String) {
        let token = self.shared.shutdown.child_token();
        let limit = self.shared.options.task_timeout;

        let result = tokio::select! {
            _ = token.cancelled() => Err(CirrusError::Canceled),
            outcome = tokio::time::timeout(limit, self.execute(&path, &token)) => {
                outcome.unwrap_or(Err(CirrusError::TaskTimeout(limit)))
            }
        };

        match result {
            Ok(()) => {
                self.shared.counters.succeeded.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::warn!("Task for {} failed, pushing back: {}", path, e);
                self.push_back(&path).await;
            }
        }
    }

    async fn execute(&self, path: &str, token: &CancellationToken) -> Result<(), CirrusError> {
        let page: Classified = self.shared.classifier.classify(path);
        if page.kind == Kind::Unknown {
            tracing::info!("Dropping unknown path {}", path);
            self.shared.frontier.persist(path).await?;
            return Ok(());
        }

        let proxy = match &self.shared.proxies {
            Some(pool) => {
                let endpoint = pool.get_endpoint(token).await?;
                tracing::debug!("Using proxy {} for {}", endpoint.addr(), page.path);
                Some(endpoint.addr())
            }
            None => None,
        };

        let body = self
            .shared
            .renderer
            .render(&page.path, proxy.as_deref())
            .await?;

        let outcome = self.shared.processor.process(&page, &body).await?;
        if outcome.matched.is_some() {
            self.shared.counters.matched.fetch_add(1, Ordering::Relaxed);
        }

        // The popped path is what the frontier knows about
        self.shared.frontier.persist(path).await?;
        if page.path != path {
            self.shared.frontier.persist(&page.path).await?;
        }

        tracing::debug!("Completed {} ({})", page.path, page.kind);
        Ok(())
    }
}
