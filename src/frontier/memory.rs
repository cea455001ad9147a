//! In-memory frontier
//!
//! Used by tests and by single-process crawls that do not need to survive a
//! restart. Supports simulating a backend outage.

use crate::frontier::traits::{Frontier, FrontierError, FrontierResult};
use async_trait::async_trait;
use rand::seq::IteratorRandom;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct Sets {
    pending: HashSet<String>,
    visited: HashSet<String>,
}

/// Frontier backed by two in-process hash sets
#[derive(Debug)]
pub struct MemoryFrontier {
    sets: Mutex<Sets>,
    ready: AtomicBool,
}

impl MemoryFrontier {
    pub fn new() -> Self {
        Self {
            sets: Mutex::new(Sets::default()),
            ready: AtomicBool::new(true),
        }
    }

    /// Marks the frontier as reachable or not
    ///
    /// While unavailable, every operation fails with
    /// [`FrontierError::StorageUnavailable`].
    pub fn set_available(&self, available: bool) {
        self.ready.store(available, Ordering::SeqCst);
    }

    /// Returns true if the path is currently pending
    pub async fn is_pending(&self, path: &str) -> bool {
        self.sets.lock().await.pending.contains(path)
    }

    /// Returns true if the path has been persisted
    pub async fn is_visited(&self, path: &str) -> bool {
        self.sets.lock().await.visited.contains(path)
    }

    fn check_ready(&self) -> FrontierResult<()> {
        if self.ready.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(FrontierError::StorageUnavailable(
                "memory frontier marked unavailable".to_string(),
            ))
        }
    }
}

impl Default for MemoryFrontier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Frontier for MemoryFrontier {
    async fn reset(&self) -> FrontierResult<()> {
        self.check_ready()?;
        let mut sets = self.sets.lock().await;
        sets.pending.clear();
        sets.visited.clear();
        Ok(())
    }

    async fn push(&self, path: &str) -> FrontierResult<()> {
        self.check_ready()?;
        let mut sets = self.sets.lock().await;
        if sets.visited.contains(path) {
            return Err(FrontierError::AlreadyVisited(path.to_string()));
        }
        sets.pending.insert(path.to_string());
        Ok(())
    }

    async fn pop(&self) -> FrontierResult<String> {
        self.check_ready()?;
        let mut sets = self.sets.lock().await;
        let chosen = sets
            .pending
            .iter()
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or(FrontierError::Empty)?;
        sets.pending.remove(&chosen);
        Ok(chosen)
    }

    async fn persist(&self, path: &str) -> FrontierResult<()> {
        self.check_ready()?;
        let mut sets = self.sets.lock().await;
        sets.pending.remove(path);
        sets.visited.insert(path.to_string());
        Ok(())
    }

    async fn pending_len(&self) -> FrontierResult<u64> {
        self.check_ready()?;
        Ok(self.sets.lock().await.pending.len() as u64)
    }

    async fn visited_len(&self) -> FrontierResult<u64> {
        self.check_ready()?;
        Ok(self.sets.lock().await.visited.len() as u64)
    }
}
