use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Lifecycle of the crawl daemon
///
/// ```text
/// Idle --start--> Starting --seeded--> Running
/// Idle --resume--> Running --pause--> Draining --in-flight = 0--> Idle
///   Running --frontier empty, in-flight = 0--> Idle
///   any --shutdown, in-flight = 0--> Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DaemonState {
    /// Loop running, nothing dispatched
    Idle,
    /// A start call is resetting and seeding the frontier
    Starting,
    /// Popping and dispatching tasks
    Running,
    /// No new dispatch; waiting for in-flight tasks to settle
    Draining,
    /// Loop exited after shutdown
    Stopped,
}

impl DaemonState {
    /// Returns true if the daemon accepts start or resume
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

impl fmt::Display for DaemonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        };
        write!(f, "{}", s)
    }
}

/// Snapshot of the crawl for the control API
#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    pub root: Option<String>,
    pub state: DaemonState,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub in_flight: usize,
    pub connections: usize,
    /// `None` while the frontier is unreachable
    pub pending: Option<u64>,
    /// Paths held by the daemon because the frontier refused their push-back
    pub stranded: usize,
    pub succeeded: u64,
    pub pushed_back: u64,
    pub matched: u64,
}
