//! Topology registry and database handle
//!
//! The [`TopologyRegistry`] owns at most one connected [`Database`] at a
//! time. `connect` is idempotent: while a handle is live, further calls
//! return it unchanged. `disconnect` stops the health refresh loop, closes
//! every node's pool and clears the slot so the next `connect` starts from
//! scratch.

use crate::address::Seeds;
use crate::config::{ClientConfig, PoolConfig};
use crate::connection::{Connector, PoolFactory};
use crate::dispatcher::CommandDispatcher;
use crate::document::{is_truthy, Command, CommandDocument, CommandOptions, Document};
use crate::error::{Result, ShoalError};
use crate::node::{Node, NodeStatus};
use crate::pool::DefaultPoolFactory;
use crate::refresh::{HealthRefreshLoop, RefreshState, RefreshStatus};
use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Owner of the connect/disconnect lifecycle
pub struct TopologyRegistry {
    connector: Arc<dyn Connector>,
    pool_factory: Arc<dyn PoolFactory>,
    config: ClientConfig,
    current: Mutex<Option<Arc<Database>>>,
}

impl TopologyRegistry {
    /// Registry whose nodes use the default bounded pool over `connector`
    pub fn new(connector: Arc<dyn Connector>, config: ClientConfig) -> Self {
        let pool_factory = Arc::new(DefaultPoolFactory::new(Arc::clone(&connector)));
        Self::with_pool_factory(connector, pool_factory, config)
    }

    pub fn with_pool_factory(
        connector: Arc<dyn Connector>,
        pool_factory: Arc<dyn PoolFactory>,
        config: ClientConfig,
    ) -> Self {
        Self {
            connector,
            pool_factory,
            config,
            current: Mutex::new(None),
        }
    }

    /// Connect using the seeds, database name and pool settings from config
    pub fn connect_with_config(&self) -> Result<Arc<Database>> {
        self.connect(
            self.config.seeds.clone(),
            &self.config.db_name,
            self.config.pool.clone(),
        )
    }

    /// Build the topology for `seeds` and start probing it.
    ///
    /// The registry config and `pool_config` are validated first; invalid
    /// settings fail with `Config` before any node is created.
    /// Returns as soon as the nodes exist; probing runs in the background.
    /// Use [`Database::ready`] to wait for the first probe pass. Must be
    /// called from within a Tokio runtime.
    pub fn connect(
        &self,
        seeds: impl Into<Seeds>,
        db_name: &str,
        pool_config: PoolConfig,
    ) -> Result<Arc<Database>> {
        let mut current = self.current.lock();
        if let Some(database) = current.as_ref() {
            if database.db_name() != db_name {
                warn!(
                    connected = %database.db_name(),
                    requested = %db_name,
                    "Already connected, returning existing handle"
                );
            } else {
                debug!(db = %db_name, "Already connected, returning existing handle");
            }
            return Ok(Arc::clone(database));
        }

        self.config.validate()?;
        pool_config.validate()?;

        let addresses = seeds.into().parse()?;
        if addresses.is_empty() {
            return Err(ShoalError::Config("at least one seed address is required".into()));
        }
        if db_name.is_empty() {
            return Err(ShoalError::Config("database name must not be empty".into()));
        }
        tokio::runtime::Handle::try_current().map_err(|_| {
            ShoalError::Config("connect must be called from within a Tokio runtime".into())
        })?;

        let nodes: Vec<Arc<Node>> = addresses
            .into_iter()
            .map(|address| {
                let pool = self.pool_factory.create(&address, &pool_config);
                Arc::new(Node::new(
                    address,
                    db_name,
                    Arc::clone(&self.connector),
                    pool,
                    self.config.probe_timeout(),
                ))
            })
            .collect();
        let nodes: Arc<[Arc<Node>]> = nodes.into();

        let cancel = CancellationToken::new();
        let dispatcher = CommandDispatcher::new(
            db_name,
            Arc::clone(&nodes),
            self.config.selection_timeout(),
            self.config.selection_retry_interval(),
            cancel.clone(),
        );
        let refresh = HealthRefreshLoop::new(
            Arc::clone(&nodes),
            self.config.refresh_interval(),
            cancel.clone(),
        );
        let status = refresh.status();
        let task = refresh.spawn();

        info!(
            db = %db_name,
            nodes = nodes.len(),
            "Connected to replica set"
        );

        let database = Arc::new(Database {
            db_name: db_name.to_string(),
            nodes,
            dispatcher,
            refresh: status,
            cancel,
            task: Mutex::new(Some(task)),
        });
        *current = Some(Arc::clone(&database));
        Ok(database)
    }

    /// Tear down the connected handle.
    ///
    /// Fails with `NotConnected` if nothing is connected. Pool closing is
    /// best-effort and never fails.
    pub async fn disconnect(&self) -> Result<()> {
        let database = self.current.lock().take().ok_or(ShoalError::NotConnected)?;
        database.shutdown().await;
        Ok(())
    }

    /// The live handle, if connected
    pub fn database(&self) -> Option<Arc<Database>> {
        self.current.lock().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.current.lock().is_some()
    }
}

/// Handle to a connected replica set and one logical database
pub struct Database {
    db_name: String,
    nodes: Arc<[Arc<Node>]>,
    dispatcher: CommandDispatcher,
    refresh: Arc<RefreshStatus>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Database {
    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    /// Fully qualified collection name, `"{db}.{name}"`
    pub fn collection_name(&self, name: &str) -> String {
        format!("{}.{}", self.db_name, name)
    }

    /// Status of every node, in seed order
    pub fn nodes(&self) -> Vec<NodeStatus> {
        self.nodes.iter().map(|n| n.status()).collect()
    }

    /// False once the handle has been disconnected
    pub fn is_connected(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    pub fn refresh_state(&self) -> RefreshState {
        self.refresh.state()
    }

    /// Whether the first probe pass has finished
    pub fn is_ready(&self) -> bool {
        self.refresh.is_ready()
    }

    /// Wait until the first probe pass has finished
    pub async fn ready(&self, timeout: Duration) -> Result<()> {
        let mut ready = self.refresh.subscribe();
        let wait = async {
            tokio::select! {
                _ = self.cancel.cancelled() => Err(ShoalError::NotConnected),
                changed = ready.wait_for(|r| *r) => changed
                    .map(|_| ())
                    .map_err(|_| ShoalError::NotConnected),
            }
        };

        tokio::time::timeout(timeout, wait).await.map_err(|_| {
            ShoalError::Timeout(format!(
                "topology not ready after {}ms",
                timeout.as_millis()
            ))
        })?
    }

    /// Probe every node now instead of waiting for the next interval.
    ///
    /// Waits for a background pass in progress to finish first.
    pub async fn refresh_now(&self) -> Result<()> {
        self.ensure_connected()?;
        if self.refresh.probe_pass(&self.nodes, &self.cancel).await {
            Ok(())
        } else {
            Err(ShoalError::NotConnected)
        }
    }

    /// Run a command on the node selected by `options.read_preference`.
    ///
    /// A name becomes `{name: options.value}`; a document is sent as is.
    /// `options.extra` fields follow the verb.
    pub async fn command(
        &self,
        command: impl Into<Command>,
        options: CommandOptions,
    ) -> Result<Document> {
        self.ensure_connected()?;

        let CommandOptions {
            value,
            read_preference,
            extra,
            check,
            allowable_errors,
        } = options;
        let document = CommandDocument::build(command.into(), value, extra);

        let reply = self.dispatcher.command(document, read_preference).await?;
        if check {
            check_reply(reply, &allowable_errors)
        } else {
            Ok(reply)
        }
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(ShoalError::NotConnected)
        }
    }

    async fn shutdown(&self) {
        self.cancel.cancel();

        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "Health refresh task ended abnormally");
            }
        }

        join_all(self.nodes.iter().map(|node| node.disconnect())).await;
        info!(db = %self.db_name, "Disconnected from replica set");
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("db_name", &self.db_name)
            .field("nodes", &self.nodes)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn check_reply(reply: Document, allowable_errors: &[String]) -> Result<Document> {
    let failed = reply.get("ok").map(|ok| !is_truthy(ok)).unwrap_or(false);
    if !failed {
        return Ok(reply);
    }

    let message = reply
        .get("errmsg")
        .and_then(|v| v.as_str())
        .unwrap_or("command failed")
        .to_string();
    if allowable_errors.iter().any(|allowed| *allowed == message) {
        return Ok(reply);
    }

    let code = reply.get("code").and_then(|v| v.as_i64()).unwrap_or(0);
    Err(ShoalError::CommandFailed { code, message })
}
