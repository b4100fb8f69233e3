//! Bounded per-node connection pool
//!
//! Checked-out connections are limited by a semaphore sized from
//! [`PoolConfig::max_connections`]. Released connections are kept in a LIFO
//! idle list; evicted ones are closed.

use crate::address::ClusterAddress;
use crate::config::PoolConfig;
use crate::connection::{Connection, Connector, Pool, PoolFactory, PooledConnection};
use crate::error::{Result, ShoalError};
use crate::metrics::{record_connection_established, record_connection_evicted, record_idle_connections};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info};

/// Default [`Pool`] implementation
pub struct ConnectionPool {
    address: ClusterAddress,
    config: PoolConfig,
    connector: Arc<dyn Connector>,
    idle: Mutex<Vec<Box<dyn Connection>>>,
    permits: Arc<Semaphore>,
    closed: AtomicBool,
}

impl ConnectionPool {
    pub fn new(address: ClusterAddress, config: PoolConfig, connector: Arc<dyn Connector>) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_connections));
        Self {
            address,
            config,
            connector,
            idle: Mutex::new(Vec::new()),
            permits,
            closed: AtomicBool::new(false),
        }
    }

    pub fn address(&self) -> &ClusterAddress {
        &self.address
    }

    /// Number of connections currently parked in the pool
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// Number of connections that can still be checked out without waiting
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    fn closed_error(&self) -> ShoalError {
        ShoalError::PoolClosed(self.address.to_string())
    }
}

#[async_trait]
impl Pool for ConnectionPool {
    async fn acquire(&self) -> Result<PooledConnection> {
        if self.is_closed() {
            return Err(self.closed_error());
        }

        let permit = tokio::time::timeout(
            self.config.acquire_timeout(),
            Arc::clone(&self.permits).acquire_owned(),
        )
        .await
        .map_err(|_| {
            ShoalError::Timeout(format!(
                "No connection to {} available within {}ms",
                self.address, self.config.acquire_timeout_ms
            ))
        })?
        .map_err(|_| self.closed_error())?;

        let reused = self.idle.lock().pop();
        if let Some(connection) = reused {
            return Ok(PooledConnection::with_permit(connection, permit));
        }

        debug!(address = %self.address, "Opening pooled connection");
        let connection = self.connector.connect(&self.address).await?;
        record_connection_established(&self.address.to_string());
        Ok(PooledConnection::with_permit(connection, permit))
    }

    async fn release(&self, connection: PooledConnection) {
        let mut connection = connection.into_inner();

        if self.is_closed() {
            connection.close().await;
            return;
        }

        let overflow = {
            let mut idle = self.idle.lock();
            if idle.len() < self.config.max_connections {
                idle.push(connection);
                record_idle_connections(&self.address.to_string(), idle.len());
                None
            } else {
                Some(connection)
            }
        };

        if let Some(mut connection) = overflow {
            connection.close().await;
        }
    }

    async fn evict(&self, connection: PooledConnection) {
        let mut connection = connection.into_inner();
        debug!(address = %self.address, "Evicting pooled connection");
        record_connection_evicted(&self.address.to_string());
        connection.close().await;
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.permits.close();

        let idle: Vec<Box<dyn Connection>> = std::mem::take(&mut *self.idle.lock());
        let count = idle.len();
        for mut connection in idle {
            connection.close().await;
        }

        record_idle_connections(&self.address.to_string(), 0);
        info!(address = %self.address, closed = count, "Connection pool closed");
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Creates a [`ConnectionPool`] per node over a shared connector
pub struct DefaultPoolFactory {
    connector: Arc<dyn Connector>,
}

impl DefaultPoolFactory {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self { connector }
    }
}

impl PoolFactory for DefaultPoolFactory {
    fn create(&self, address: &ClusterAddress, config: &PoolConfig) -> Arc<dyn Pool> {
        Arc::new(ConnectionPool::new(
            address.clone(),
            config.clone(),
            Arc::clone(&self.connector),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedConnector;
    use std::time::Duration;

    fn pool(max_connections: usize) -> (ConnectionPool, Arc<ScriptedConnector>) {
        let connector = Arc::new(ScriptedConnector::new());
        let config = PoolConfig {
            max_connections,
            acquire_timeout_ms: 50,
        };
        let pool = ConnectionPool::new(
            ClusterAddress::new("db1", 27017),
            config,
            connector.clone(),
        );
        (pool, connector)
    }

    #[tokio::test]
    async fn test_released_connection_is_reused() {
        let (pool, connector) = pool(2);

        let conn = pool.acquire().await.unwrap();
        pool.release(conn).await;
        assert_eq!(pool.idle_count(), 1);

        let _conn = pool.acquire().await.unwrap();
        assert_eq!(connector.connect_count(), 1);
        assert_eq!(pool.idle_count(), 0);
    }

    #[tokio::test]
    async fn test_evicted_connection_is_not_reused() {
        let (pool, connector) = pool(2);

        let conn = pool.acquire().await.unwrap();
        pool.evict(conn).await;
        assert_eq!(pool.idle_count(), 0);
        assert_eq!(connector.close_count(), 1);

        let _conn = pool.acquire().await.unwrap();
        assert_eq!(connector.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_acquire_times_out_when_exhausted() {
        let (pool, _) = pool(1);

        let _held = pool.acquire().await.unwrap();
        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, ShoalError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_waiter_gets_released_capacity() {
        let (pool, _) = pool(1);
        let pool = Arc::new(pool);

        let held = pool.acquire().await.unwrap();
        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire().await.map(|_| ()) })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        pool.release(held).await;
        assert!(waiter.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_acquire_after_close_fails() {
        let (pool, connector) = pool(2);

        let conn = pool.acquire().await.unwrap();
        pool.release(conn).await;
        pool.close().await;

        assert!(pool.is_closed());
        assert_eq!(connector.close_count(), 1);
        assert!(matches!(
            pool.acquire().await.unwrap_err(),
            ShoalError::PoolClosed(_)
        ));
    }
}
