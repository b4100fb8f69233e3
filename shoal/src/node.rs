//! Replica-set members and the ismaster probe
//!
//! A [`Node`] owns the connection pool for one member and the last known
//! result of probing it. Only [`Node::probe`] changes role or availability.
//!
//! ```text
//! probe ok, ismaster: true            → Primary,   available
//! probe ok, secondary: true           → Secondary, available
//! probe ok, neither                   → Unknown,   available
//! connect/send/receive/parse failure  → Unknown,   unavailable
//! ```

use crate::address::ClusterAddress;
use crate::connection::{Connection, Connector, Pool, QueryMessage};
use crate::document::{is_truthy, CommandDocument, Document};
use crate::error::{Result, ShoalError};
use crate::metrics;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Role a member reported in its last successful probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Unknown,
    Primary,
    Secondary,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Unknown => "unknown",
            Role::Primary => "primary",
            Role::Secondary => "secondary",
        }
    }

    /// Interpret an ismaster reply
    pub fn from_ismaster(reply: &Document) -> Result<Self> {
        let ismaster = reply
            .get("ismaster")
            .ok_or_else(|| ShoalError::Protocol("ismaster reply without 'ismaster' field".into()))?;

        if is_truthy(ismaster) {
            Ok(Role::Primary)
        } else if reply.get("secondary").map(is_truthy).unwrap_or(false) {
            Ok(Role::Secondary)
        } else {
            Ok(Role::Unknown)
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default)]
struct ProbeState {
    role: Role,
    available: bool,
    initialized: bool,
    last_round_trip: Option<Duration>,
    last_error: Option<String>,
}

/// Point-in-time view of a node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeStatus {
    pub address: ClusterAddress,
    pub role: Role,
    pub available: bool,
    /// Probed at least once
    pub initialized: bool,
    pub last_round_trip_ms: Option<u64>,
    pub last_error: Option<String>,
}

/// One replica-set member
pub struct Node {
    address: ClusterAddress,
    db_name: String,
    connector: Arc<dyn Connector>,
    pool: Arc<dyn Pool>,
    probe_timeout: Duration,
    state: RwLock<ProbeState>,
}

impl Node {
    pub fn new(
        address: ClusterAddress,
        db_name: impl Into<String>,
        connector: Arc<dyn Connector>,
        pool: Arc<dyn Pool>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            address,
            db_name: db_name.into(),
            connector,
            pool,
            probe_timeout,
            state: RwLock::new(ProbeState::default()),
        }
    }

    pub fn address(&self) -> &ClusterAddress {
        &self.address
    }

    pub fn pool(&self) -> &Arc<dyn Pool> {
        &self.pool
    }

    pub fn role(&self) -> Role {
        self.state.read().role
    }

    pub fn is_available(&self) -> bool {
        self.state.read().available
    }

    pub fn is_initialized(&self) -> bool {
        self.state.read().initialized
    }

    /// Available and last seen in `role`, read under one lock
    pub fn serves(&self, role: Role) -> bool {
        let state = self.state.read();
        state.available && state.role == role
    }

    pub fn status(&self) -> NodeStatus {
        let state = self.state.read();
        NodeStatus {
            address: self.address.clone(),
            role: state.role,
            available: state.available,
            initialized: state.initialized,
            last_round_trip_ms: state.last_round_trip.map(|d| d.as_millis() as u64),
            last_error: state.last_error.clone(),
        }
    }

    /// Probe the member over a dedicated connection and record the result.
    ///
    /// Never fails: errors mark the node unavailable and are logged.
    pub async fn probe(&self) {
        let start = Instant::now();
        let outcome = self.run_probe().await;
        let elapsed = start.elapsed();

        let address = self.address.to_string();
        metrics::record_probe(&address, outcome.is_ok(), elapsed);

        match outcome {
            Ok(role) => {
                let latency_ms = elapsed.as_millis() as u64;
                debug!(address = %self.address, role = %role, latency_ms, "Probe succeeded");
                self.record(Ok(role), Some(elapsed));
            }
            Err(e) => {
                warn!(address = %self.address, error = %e, "Probe failed, marking node unavailable");
                self.record(Err(e), None);
            }
        }

        let state = self.state.read();
        metrics::update_node_role(&address, state.role, state.available);
    }

    async fn run_probe(&self) -> Result<Role> {
        let message = QueryMessage::command(&self.db_name, CommandDocument::from_verb("ismaster", 1));

        let mut connection = tokio::time::timeout(self.probe_timeout, self.connector.connect(&self.address))
            .await
            .map_err(|_| self.timeout_error("connect"))??;

        let exchanged = tokio::time::timeout(
            self.probe_timeout,
            Self::exchange(connection.as_mut(), &message),
        )
        .await
        .unwrap_or_else(|_| Err(self.timeout_error("ismaster")));

        connection.close().await;
        Role::from_ismaster(&exchanged?)
    }

    async fn exchange(connection: &mut dyn Connection, message: &QueryMessage) -> Result<Document> {
        connection.send(message).await?;
        connection.receive().await?.first_document()
    }

    fn timeout_error(&self, stage: &str) -> ShoalError {
        ShoalError::Timeout(format!(
            "{} to {} exceeded {}ms",
            stage,
            self.address,
            self.probe_timeout.as_millis()
        ))
    }

    fn record(&self, outcome: Result<Role>, round_trip: Option<Duration>) {
        let mut state = self.state.write();
        state.initialized = true;
        state.last_round_trip = round_trip;

        match outcome {
            Ok(role) => {
                state.role = role;
                state.available = true;
                state.last_error = None;
            }
            Err(e) => {
                state.role = Role::Unknown;
                state.available = false;
                state.last_error = Some(e.to_string());
            }
        }
    }

    /// Close the owned pool; later checkouts fail with `PoolClosed`
    pub async fn disconnect(&self) {
        self.pool.close().await;
    }

    #[cfg(test)]
    pub(crate) fn set_state(&self, role: Role, available: bool) {
        let mut state = self.state.write();
        state.role = role;
        state.available = available;
        state.initialized = true;
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Node")
            .field("address", &self.address)
            .field("role", &state.role)
            .field("available", &state.available)
            .finish()
    }
}
