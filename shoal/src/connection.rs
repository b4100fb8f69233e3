//! Connection-level collaborator interfaces
//!
//! The wire encoding and the socket itself live outside this crate. The
//! topology layer talks to them through these traits: a [`Connector`] opens
//! connections to an address, a [`Connection`] writes one query and reads
//! replies, and a [`Pool`] hands out reusable connections for one node.

use crate::address::ClusterAddress;
use crate::config::PoolConfig;
use crate::document::{CommandDocument, Document};
use crate::error::{Result, ShoalError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tokio::sync::OwnedSemaphorePermit;

/// Pseudo-collection every command is addressed to
pub const COMMAND_COLLECTION: &str = "$cmd";

/// A single-document query against a namespace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMessage {
    /// `"{db}.{collection}"`
    pub namespace: String,
    pub document: Document,
    pub number_to_skip: i32,
    /// Negative values ask for a single batch and no cursor
    pub number_to_return: i32,
}

impl QueryMessage {
    /// Command query against `"{db}.$cmd"` that reads exactly one reply
    pub fn command(db_name: &str, command: CommandDocument) -> Self {
        Self {
            namespace: format!("{}.{}", db_name, COMMAND_COLLECTION),
            document: command.into_document(),
            number_to_skip: 0,
            number_to_return: -1,
        }
    }
}

/// Decoded server reply
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub documents: Vec<Document>,
    pub cursor_id: i64,
    pub query_failure: bool,
}

impl Reply {
    pub fn single(document: Document) -> Self {
        Self {
            documents: vec![document],
            ..Default::default()
        }
    }

    /// First document of the reply, or a protocol error for failed or
    /// empty replies
    pub fn first_document(self) -> Result<Document> {
        if self.query_failure {
            let message = self
                .documents
                .first()
                .and_then(|d| d.get("$err"))
                .and_then(|v| v.as_str())
                .unwrap_or("query failure")
                .to_string();
            return Err(ShoalError::Protocol(message));
        }

        self.documents
            .into_iter()
            .next()
            .ok_or_else(|| ShoalError::Protocol("empty reply".into()))
    }
}

/// One network connection to a cluster member
#[async_trait]
pub trait Connection: Send {
    /// Write a query message
    async fn send(&mut self, message: &QueryMessage) -> Result<()>;

    /// Read the next reply
    async fn receive(&mut self) -> Result<Reply>;

    /// Close the underlying socket. Must not fail.
    async fn close(&mut self);
}

/// Opens connections to cluster members
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, address: &ClusterAddress) -> Result<Box<dyn Connection>>;
}

/// A connection checked out of a [`Pool`]
///
/// Holds the pool capacity it was granted until released or evicted.
pub struct PooledConnection {
    connection: Box<dyn Connection>,
    permit: Option<OwnedSemaphorePermit>,
}

impl PooledConnection {
    pub fn new(connection: Box<dyn Connection>) -> Self {
        Self {
            connection,
            permit: None,
        }
    }

    pub(crate) fn with_permit(connection: Box<dyn Connection>, permit: OwnedSemaphorePermit) -> Self {
        Self {
            connection,
            permit: Some(permit),
        }
    }

    /// Give up the pool slot and take the raw connection
    pub fn into_inner(self) -> Box<dyn Connection> {
        drop(self.permit);
        self.connection
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("pooled", &self.permit.is_some())
            .finish_non_exhaustive()
    }
}

impl Deref for PooledConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.connection.as_ref()
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.connection.as_mut()
    }
}

/// Connection pool owned by a single node
#[async_trait]
pub trait Pool: Send + Sync {
    /// Check out a connection, waiting for capacity if needed
    async fn acquire(&self) -> Result<PooledConnection>;

    /// Return a healthy connection for reuse
    async fn release(&self, connection: PooledConnection);

    /// Close a connection instead of returning it
    async fn evict(&self, connection: PooledConnection);

    /// Close idle connections and refuse further checkouts
    async fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Builds the pool for each node at connect time
pub trait PoolFactory: Send + Sync {
    fn create(&self, address: &ClusterAddress, config: &PoolConfig) -> Arc<dyn Pool>;
}
