//! In-memory replica set for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use shoal::{
    ClusterAddress, Connection, Connector, ConnectionPool, Document, Pool, PoolConfig,
    PoolFactory, PooledConnection, QueryMessage, Reply, Result, ShoalError,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shoal=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

pub fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {}", other),
    }
}

/// Behavior of one simulated member
#[derive(Clone, Debug)]
pub struct Member {
    pub ismaster: Document,
    pub reachable: bool,
    pub reply_delay: Duration,
}

impl Member {
    pub fn primary() -> Self {
        Self::with(json!({"ismaster": true, "ok": 1}))
    }

    pub fn secondary() -> Self {
        Self::with(json!({"ismaster": false, "secondary": true, "ok": 1}))
    }

    pub fn down() -> Self {
        Self {
            reachable: false,
            ..Self::primary()
        }
    }

    fn with(ismaster: Value) -> Self {
        Self {
            ismaster: doc(ismaster),
            reachable: true,
            reply_delay: Duration::ZERO,
        }
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.reply_delay = delay;
        self
    }
}

#[derive(Default)]
struct ClusterState {
    members: Mutex<HashMap<String, Member>>,
    probes: Mutex<Vec<String>>,
}

/// Connector over a set of simulated members
#[derive(Clone, Default)]
pub struct MockCluster {
    state: Arc<ClusterState>,
}

impl MockCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, address: &str, member: Member) {
        self.state
            .members
            .lock()
            .insert(address.to_string(), member);
    }

    /// Addresses probed so far, in order
    pub fn probes(&self) -> Vec<String> {
        self.state.probes.lock().clone()
    }

    fn member(&self, address: &str) -> Option<Member> {
        self.state.members.lock().get(address).cloned()
    }
}

#[async_trait]
impl Connector for MockCluster {
    async fn connect(&self, address: &ClusterAddress) -> Result<Box<dyn Connection>> {
        let address = address.to_string();
        match self.member(&address) {
            Some(member) if member.reachable => Ok(Box::new(MockConnection {
                address,
                cluster: self.clone(),
                pending: None,
            })),
            _ => Err(ShoalError::Connection(format!("{}: connection refused", address))),
        }
    }
}

struct MockConnection {
    address: String,
    cluster: MockCluster,
    pending: Option<QueryMessage>,
}

#[async_trait]
impl Connection for MockConnection {
    async fn send(&mut self, message: &QueryMessage) -> Result<()> {
        match self.cluster.member(&self.address) {
            Some(member) if member.reachable => {
                self.pending = Some(message.clone());
                Ok(())
            }
            _ => Err(ShoalError::Connection("broken pipe".into())),
        }
    }

    async fn receive(&mut self) -> Result<Reply> {
        let message = self
            .pending
            .take()
            .ok_or_else(|| ShoalError::Protocol("receive without send".into()))?;
        let member = self
            .cluster
            .member(&self.address)
            .ok_or_else(|| ShoalError::Connection("connection reset".into()))?;

        if message.document.contains_key("ismaster") {
            self.cluster.state.probes.lock().push(self.address.clone());
            return Ok(Reply::single(member.ismaster));
        }

        tokio::time::sleep(member.reply_delay).await;
        let verb = message.document.keys().next().cloned().unwrap_or_default();
        Ok(Reply::single(doc(json!({
            "ok": 1,
            "command": verb,
            "served_by": self.address,
        }))))
    }

    async fn close(&mut self) {}
}

/// Pool factory that counts how often each node's pool is closed
pub struct CountingPoolFactory {
    connector: Arc<dyn Connector>,
    closes: Arc<Mutex<HashMap<String, usize>>>,
}

impl CountingPoolFactory {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            closes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn closes(&self) -> HashMap<String, usize> {
        self.closes.lock().clone()
    }
}

impl PoolFactory for CountingPoolFactory {
    fn create(&self, address: &ClusterAddress, config: &PoolConfig) -> Arc<dyn Pool> {
        Arc::new(CountingPool {
            address: address.to_string(),
            inner: ConnectionPool::new(address.clone(), config.clone(), Arc::clone(&self.connector)),
            closes: Arc::clone(&self.closes),
        })
    }
}

struct CountingPool {
    address: String,
    inner: ConnectionPool,
    closes: Arc<Mutex<HashMap<String, usize>>>,
}

#[async_trait]
impl Pool for CountingPool {
    async fn acquire(&self) -> Result<PooledConnection> {
        self.inner.acquire().await
    }

    async fn release(&self, connection: PooledConnection) {
        self.inner.release(connection).await
    }

    async fn evict(&self, connection: PooledConnection) {
        self.inner.evict(connection).await
    }

    async fn close(&self) {
        *self.closes.lock().entry(self.address.clone()).or_insert(0) += 1;
        self.inner.close().await
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}
