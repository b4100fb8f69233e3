//! Periodic health refresh
//!
//! ```text
//! start ──▶ Probing ──(every node probed once)──▶ Idle
//!              ▲                                    │
//!              └──────────(interval elapsed)────────┘
//!
//! cancel (from either state) ──▶ Stopped
//! ```
//!
//! Nodes are probed one after another in list order. The first finished
//! pass flips the readiness signal. Cancellation is checked between nodes,
//! never in the middle of a probe.

use crate::metrics;
use crate::node::Node;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Refresh loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshState {
    Probing,
    Idle,
    Stopped,
}

/// Progress of a refresh loop, shared with the handle that owns it
pub struct RefreshStatus {
    state: RwLock<RefreshState>,
    passes: AtomicU64,
    ready: watch::Sender<bool>,
    pass_lock: tokio::sync::Mutex<()>,
}

impl RefreshStatus {
    fn new() -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            state: RwLock::new(RefreshState::Idle),
            passes: AtomicU64::new(0),
            ready,
            pass_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Probe every node once, in list order.
    ///
    /// Passes never overlap: a caller waits for the one in progress. Once
    /// `cancel` fires no further node is probed, but a probe already in
    /// flight runs to completion so its connection gets closed. Returns
    /// false if the pass was cut short.
    pub async fn probe_pass(&self, nodes: &[Arc<Node>], cancel: &CancellationToken) -> bool {
        let _pass = self.pass_lock.lock().await;
        for node in nodes {
            if cancel.is_cancelled() {
                return false;
            }
            node.probe().await;
        }
        true
    }

    pub fn state(&self) -> RefreshState {
        *self.state.read()
    }

    /// Completed passes since start
    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::SeqCst)
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Receiver that turns `true` after the first completed pass
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.ready.subscribe()
    }

    fn set_state(&self, state: RefreshState) {
        *self.state.write() = state;
    }

    fn pass_completed(&self) -> u64 {
        let passes = self.passes.fetch_add(1, Ordering::SeqCst) + 1;
        self.ready.send_if_modified(|ready| {
            if *ready {
                false
            } else {
                *ready = true;
                true
            }
        });
        passes
    }
}

/// Recurring probe of every node until cancelled
pub struct HealthRefreshLoop {
    nodes: Arc<[Arc<Node>]>,
    interval: Duration,
    cancel: CancellationToken,
    status: Arc<RefreshStatus>,
}

impl HealthRefreshLoop {
    pub fn new(nodes: Arc<[Arc<Node>]>, interval: Duration, cancel: CancellationToken) -> Self {
        Self {
            nodes,
            interval,
            cancel,
            status: Arc::new(RefreshStatus::new()),
        }
    }

    pub fn status(&self) -> Arc<RefreshStatus> {
        Arc::clone(&self.status)
    }

    /// Start the loop on the current runtime
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(self) {
        let interval_ms = self.interval.as_millis() as u64;
        info!(nodes = self.nodes.len(), interval_ms, "Health refresh loop started");

        loop {
            self.status.set_state(RefreshState::Probing);
            let start = Instant::now();

            if !self.status.probe_pass(&self.nodes, &self.cancel).await {
                break;
            }

            let passes = self.status.pass_completed();
            let elapsed = start.elapsed();
            let elapsed_ms = elapsed.as_millis() as u64;
            metrics::record_refresh_pass(elapsed);
            debug!(pass = passes, elapsed_ms, "Refresh pass completed");

            self.status.set_state(RefreshState::Idle);
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        self.status.set_state(RefreshState::Stopped);
        info!("Health refresh loop stopped");
    }
}
