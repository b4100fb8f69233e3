//! Shoal - replica-set topology tracking and command routing
//!
//! This crate is the client-side routing layer of an async database driver.
//! It keeps track of the members of a replica set, probes their role and
//! reachability in the background, and sends each command to a member
//! chosen by read preference over a pooled connection.
//!
//! # Architecture
//!
//! - **Registry**: owns the connect/disconnect lifecycle and the live handle
//! - **Node**: one member, its connection pool and its last probe result
//! - **Selector**: stateless read-preference choice over a node snapshot
//! - **Refresh**: background loop re-probing every node on an interval
//! - **Dispatcher**: node selection with bounded retry, checkout and send
//!
//! Wire encoding and sockets are provided by the caller through the
//! [`Connector`] and [`Connection`] traits.
//!
//! # Example
//!
//! ```rust,ignore
//! let registry = TopologyRegistry::new(connector, ClientConfig::default());
//! let db = registry.connect(["db1:27017", "db2:27017"], "shop", PoolConfig::default())?;
//! db.ready(Duration::from_secs(5)).await?;
//!
//! let stats = db
//!     .command("collstats", CommandOptions::default().value("items"))
//!     .await?;
//! registry.disconnect().await?;
//! ```

pub mod address;
pub mod config;
pub mod connection;
pub mod cursor;
pub mod dispatcher;
pub mod document;
pub mod error;
pub mod metrics;
pub mod node;
pub mod pool;
pub mod refresh;
pub mod registry;
pub mod selector;

#[cfg(test)]
mod test_support;

pub use address::{ClusterAddress, Seeds};
pub use config::{ClientConfig, PoolConfig};
pub use connection::{
    Connection, Connector, Pool, PoolFactory, PooledConnection, QueryMessage, Reply,
    COMMAND_COLLECTION,
};
pub use cursor::Cursor;
pub use dispatcher::CommandDispatcher;
pub use document::{Command, CommandDocument, CommandOptions, Document};
pub use error::{Result, ShoalError};
pub use node::{Node, NodeStatus, Role};
pub use pool::{ConnectionPool, DefaultPoolFactory};
pub use refresh::{HealthRefreshLoop, RefreshState, RefreshStatus};
pub use registry::{Database, TopologyRegistry};
pub use selector::{select_for_read, ReadPreference};
