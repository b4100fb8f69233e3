//! Scripted in-memory connector for unit tests

use crate::address::ClusterAddress;
use crate::config::PoolConfig;
use crate::connection::{Connection, Connector, QueryMessage, Reply};
use crate::document::Document;
use crate::error::{Result, ShoalError};
use crate::node::{Node, Role};
use crate::pool::ConnectionPool;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub(crate) fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {}", other),
    }
}

#[derive(Clone)]
pub(crate) enum Behavior {
    /// Answer every query with this document
    Respond(Document),
    /// Refuse to connect
    Refuse,
    /// Accept the connection but fail writes
    FailSend,
    /// Answer after a delay, tracking how many replies are pending at once
    Slow(Document, Duration),
    /// Accept writes and never answer
    Hang,
}

#[derive(Default)]
struct Shared {
    behaviors: Mutex<HashMap<String, Behavior>>,
    connects: AtomicUsize,
    closes: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    sent: Mutex<Vec<(String, QueryMessage)>>,
}

pub(crate) struct ScriptedConnector {
    shared: Arc<Shared>,
}

impl ScriptedConnector {
    pub(crate) fn new() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
        }
    }

    pub(crate) fn set(&self, address: &str, behavior: Behavior) {
        self.shared
            .behaviors
            .lock()
            .insert(address.to_string(), behavior);
    }

    pub(crate) fn connect_count(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn close_count(&self) -> usize {
        self.shared.closes.load(Ordering::SeqCst)
    }

    /// Most replies ever pending at the same time
    pub(crate) fn max_in_flight(&self) -> usize {
        self.shared.max_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn sent(&self) -> Vec<(String, QueryMessage)> {
        self.shared.sent.lock().clone()
    }

    fn behavior(&self, address: &str) -> Behavior {
        self.shared
            .behaviors
            .lock()
            .get(address)
            .cloned()
            .unwrap_or_else(|| Behavior::Respond(doc(json!({"ok": 1}))))
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, address: &ClusterAddress) -> Result<Box<dyn Connection>> {
        let address = address.to_string();
        if let Behavior::Refuse = self.behavior(&address) {
            return Err(ShoalError::Connection(format!("{}: connection refused", address)));
        }

        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedConnection {
            behavior: self.behavior(&address),
            address,
            pending: None,
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct ScriptedConnection {
    address: String,
    behavior: Behavior,
    pending: Option<QueryMessage>,
    shared: Arc<Shared>,
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn send(&mut self, message: &QueryMessage) -> Result<()> {
        if let Behavior::FailSend = self.behavior {
            return Err(ShoalError::Connection("broken pipe".into()));
        }
        self.shared
            .sent
            .lock()
            .push((self.address.clone(), message.clone()));
        self.pending = Some(message.clone());
        Ok(())
    }

    async fn receive(&mut self) -> Result<Reply> {
        if self.pending.take().is_none() {
            return Err(ShoalError::Protocol("receive without send".into()));
        }
        match self.behavior.clone() {
            Behavior::Respond(doc) => Ok(Reply::single(doc)),
            Behavior::Slow(doc, delay) => {
                let pending = self.shared.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.shared.max_in_flight.fetch_max(pending, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                self.shared.in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(Reply::single(doc))
            }
            Behavior::Hang => std::future::pending().await,
            Behavior::Refuse | Behavior::FailSend => {
                Err(ShoalError::Connection("connection reset".into()))
            }
        }
    }

    async fn close(&mut self) {
        self.shared.closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) fn make_node(connector: &Arc<ScriptedConnector>, address: &str) -> Arc<Node> {
    let address = ClusterAddress::parse(address).unwrap();
    let pool_config = PoolConfig {
        max_connections: 2,
        acquire_timeout_ms: 100,
    };
    let pool = Arc::new(ConnectionPool::new(
        address.clone(),
        pool_config,
        connector.clone(),
    ));
    Arc::new(Node::new(
        address,
        "test",
        connector.clone(),
        pool,
        Duration::from_millis(200),
    ))
}

/// Node with a fixed role, no probing involved
pub(crate) fn node_with(address: &str, role: Role, available: bool) -> Arc<Node> {
    let connector = Arc::new(ScriptedConnector::new());
    let node = make_node(&connector, address);
    node.set_state(role, available);
    node
}
