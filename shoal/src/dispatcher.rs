//! Command routing: node selection, connection checkout and send

use crate::connection::{PooledConnection, QueryMessage};
use crate::cursor::Cursor;
use crate::document::{CommandDocument, Document};
use crate::error::{Result, ShoalError};
use crate::metrics::{self, CommandTimer};
use crate::node::Node;
use crate::selector::{select_for_read, ReadPreference};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Routes commands to the node matching their read preference
pub struct CommandDispatcher {
    db_name: String,
    nodes: Arc<[Arc<Node>]>,
    selection_timeout: Duration,
    retry_interval: Duration,
    cancel: CancellationToken,
}

impl CommandDispatcher {
    pub fn new(
        db_name: impl Into<String>,
        nodes: Arc<[Arc<Node>]>,
        selection_timeout: Duration,
        retry_interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            db_name: db_name.into(),
            nodes,
            selection_timeout,
            retry_interval,
            cancel,
        }
    }

    /// Wait for a node that satisfies `preference`.
    ///
    /// Re-reads the topology every retry interval until the selection
    /// timeout passes (`NodeUnavailable`) or the handle is disconnected
    /// (`Cancelled`).
    pub async fn select(&self, preference: ReadPreference) -> Result<Arc<Node>> {
        let deadline = Instant::now() + self.selection_timeout;
        let mut attempts = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return Err(ShoalError::Cancelled("node selection".into()));
            }

            attempts += 1;
            if let Some(node) = select_for_read(&self.nodes, preference) {
                debug!(address = %node.address(), read_preference = %preference, attempts, "Selected node");
                return Ok(node);
            }

            let now = Instant::now();
            if now >= deadline {
                metrics::record_selection_failure(preference.as_str());
                return Err(ShoalError::NodeUnavailable(format!(
                    "no {} node available after {}ms",
                    preference,
                    self.selection_timeout.as_millis()
                )));
            }

            let wait = self.retry_interval.min(deadline - now);
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    return Err(ShoalError::Cancelled("node selection".into()));
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Check out a connection from `node` and write `message` on it.
    ///
    /// A connection whose write fails is evicted and the error returned.
    pub async fn send(&self, message: &QueryMessage, node: &Node) -> Result<PooledConnection> {
        let mut connection = node.pool().acquire().await?;

        if let Err(e) = connection.send(message).await {
            warn!(address = %node.address(), error = %e, "Send failed, evicting connection");
            node.pool().evict(connection).await;
            return Err(e);
        }

        Ok(connection)
    }

    /// Route a finalized command and return the first document of its reply
    pub async fn command(&self, command: CommandDocument, preference: ReadPreference) -> Result<Document> {
        let verb = command.verb().unwrap_or("<empty>").to_string();
        let timer = CommandTimer::new(&verb, preference.as_str());

        let result = self.route(command, preference).await;
        match &result {
            Ok(_) => timer.success(),
            Err(e) => {
                debug!(command = %verb, error = %e, "Command failed");
                timer.error(e.error_type());
            }
        }
        result
    }

    async fn route(&self, command: CommandDocument, preference: ReadPreference) -> Result<Document> {
        let node = self.select(preference).await?;
        let cursor = Cursor::command(&self.db_name, command);
        cursor.find_one(self, &node).await
    }
}
