//! # Connection Pool
//!
//! Bounded pool of authenticated bus connections for publishing.
//!
//! Each send acquires its own connection and the [`PooledConnection`] guard
//! returns it on drop, so release happens on every exit path. A connection
//! that failed mid-operation should be marked broken; it is discarded
//! instead of returned.
//!
//! ## Limits
//! - At most `pool_size` connections are checked out at once
//! - Waiting longer than `acquire_timeout` for a slot yields a transport error
//!
//! ## Usage
//! ```rust,no_run
//! use packet_node::config::TransportConfig;
//! use packet_node::transport::memory::MemoryBus;
//! use packet_node::transport::pool::ConnectionPool;
//! use packet_node::transport::Connection;
//! use std::sync::Arc;
//!
//! # async fn demo() -> packet_node::error::Result<()> {
//! let pool = ConnectionPool::new(Arc::new(MemoryBus::new()), &TransportConfig::default());
//! let mut conn = pool.acquire().await?;
//! conn.publish("game", "1;{}").await?;
//! // Connection returned to pool on drop
//! # Ok(())
//! # }
//! ```

use crate::config::TransportConfig;
use crate::error::{constants, NodeError, Result};
use crate::transport::{Connection, Transport};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, instrument};

struct PoolInner<T: Transport> {
    transport: Arc<T>,
    host: String,
    port: u16,
    credential: Option<String>,
    idle: Mutex<Vec<T::Connection>>,
    permits: Arc<Semaphore>,
    max_size: usize,
    acquire_timeout: Duration,
}

/// A pooled connection that returns itself to the pool when dropped
pub struct PooledConnection<T: Transport> {
    conn: Option<T::Connection>,
    pool: Arc<PoolInner<T>>,
    broken: bool,
    _permit: OwnedSemaphorePermit,
}

impl<T: Transport> PooledConnection<T> {
    /// Discard this connection instead of returning it to the pool
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }
}

impl<T: Transport> Drop for PooledConnection<T> {
    fn drop(&mut self) {
        if self.broken {
            debug!("Discarding broken connection");
            return;
        }
        if self.pool.permits.is_closed() {
            debug!("Pool closed, dropping returned connection");
            return;
        }
        if let (Some(conn), Ok(mut idle)) = (self.conn.take(), self.pool.idle.lock()) {
            idle.push(conn);
        }
    }
}

impl<T: Transport> std::ops::Deref for PooledConnection<T> {
    type Target = T::Connection;

    #[allow(clippy::expect_used)]
    fn deref(&self) -> &Self::Target {
        // Only taken in Drop.
        self.conn.as_ref().expect("pooled connection present until drop")
    }
}

impl<T: Transport> std::ops::DerefMut for PooledConnection<T> {
    #[allow(clippy::expect_used)]
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("pooled connection present until drop")
    }
}

/// Thread-safe pool of bus connections
pub struct ConnectionPool<T: Transport> {
    inner: Arc<PoolInner<T>>,
}

impl<T: Transport> Clone for ConnectionPool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Transport> ConnectionPool<T> {
    /// Create a pool for the bus described by `config`. No connection is opened yet.
    pub fn new(transport: Arc<T>, config: &TransportConfig) -> Self {
        let max_size = config.pool_size.max(1);
        Self {
            inner: Arc::new(PoolInner {
                transport,
                host: config.host.clone(),
                port: config.port,
                credential: config.credential().map(str::to_string),
                idle: Mutex::new(Vec::with_capacity(max_size)),
                permits: Arc::new(Semaphore::new(max_size)),
                max_size,
                acquire_timeout: config.acquire_timeout,
            }),
        }
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.inner.transport
    }

    /// Acquire a connection, reusing an idle one or opening a new one.
    #[instrument(skip(self), level = "debug")]
    pub async fn acquire(&self) -> Result<PooledConnection<T>> {
        let permit = tokio::time::timeout(
            self.inner.acquire_timeout,
            self.inner.permits.clone().acquire_owned(),
        )
        .await
        .map_err(|_| NodeError::Transport(constants::ERR_POOL_EXHAUSTED.to_string()))?
        .map_err(|_| NodeError::Transport(constants::ERR_POOL_CLOSED.to_string()))?;

        let reused = self.inner.idle.lock().ok().and_then(|mut idle| idle.pop());
        let conn = match reused {
            Some(conn) => conn,
            None => self.open().await?,
        };

        Ok(PooledConnection {
            conn: Some(conn),
            pool: self.inner.clone(),
            broken: false,
            _permit: permit,
        })
    }

    /// Open a fresh connection outside the pool, authenticated when a credential is set.
    pub async fn open(&self) -> Result<T::Connection> {
        let mut conn = self
            .inner
            .transport
            .connect(&self.inner.host, self.inner.port)
            .await?;

        if let Some(credential) = &self.inner.credential {
            debug!("Authenticating connection");
            conn.authenticate(credential).await?;
        }
        Ok(conn)
    }

    /// Idle connections ready for reuse
    pub fn idle(&self) -> usize {
        self.inner.idle.lock().map(|i| i.len()).unwrap_or(0)
    }

    /// Connections that can still be checked out without waiting
    pub fn available(&self) -> usize {
        self.inner.permits.available_permits()
    }

    pub fn max_size(&self) -> usize {
        self.inner.max_size
    }

    /// Refuse all future acquires
    pub fn close(&self) {
        self.inner.permits.close();
        if let Ok(mut idle) = self.inner.idle.lock() {
            idle.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::MemoryBus;

    fn config(pool_size: usize) -> TransportConfig {
        TransportConfig {
            pool_size,
            acquire_timeout: Duration::from_millis(50),
            ..TransportConfig::default()
        }
    }

    #[tokio::test]
    async fn test_connection_reuse() {
        let bus = MemoryBus::new();
        let pool = ConnectionPool::new(Arc::new(bus.clone()), &config(2));
        assert_eq!(pool.available(), 2);

        {
            let mut conn = pool.acquire().await.unwrap();
            conn.publish("c", "x").await.unwrap();
            assert_eq!(pool.available(), 1);
        }
        assert_eq!(pool.idle(), 1);
        assert_eq!(pool.available(), 2);

        let _conn = pool.acquire().await.unwrap();
        assert_eq!(bus.connections_opened(), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_is_transport_error() {
        let pool = ConnectionPool::new(Arc::new(MemoryBus::new()), &config(1));
        let _held = pool.acquire().await.unwrap();

        match pool.acquire().await {
            Err(NodeError::Transport(msg)) => assert_eq!(msg, constants::ERR_POOL_EXHAUSTED),
            other => panic!("expected exhaustion, got ok={}", other.is_ok()),
        }
    }

    #[tokio::test]
    async fn test_broken_connection_discarded() {
        let bus = MemoryBus::new();
        let pool = ConnectionPool::new(Arc::new(bus.clone()), &config(1));
        {
            let mut conn = pool.acquire().await.unwrap();
            conn.mark_broken();
        }
        assert_eq!(pool.idle(), 0);
        assert_eq!(pool.available(), 1);

        let _conn = pool.acquire().await.unwrap();
        assert_eq!(bus.connections_opened(), 2);
    }

    #[tokio::test]
    async fn test_authenticates_new_connections() {
        let bus = MemoryBus::with_password("pw");
        let mut cfg = config(1);
        cfg.password = Some("pw".into());
        let pool = ConnectionPool::new(Arc::new(bus), &cfg);

        let conn = pool.acquire().await.unwrap();
        assert!(conn.is_authenticated());
    }

    #[tokio::test]
    async fn test_failed_open_releases_slot() {
        let bus = MemoryBus::new();
        bus.set_fail_connects(true);
        let pool = ConnectionPool::new(Arc::new(bus.clone()), &config(1));

        assert!(pool.acquire().await.is_err());
        assert_eq!(pool.available(), 1);

        bus.set_fail_connects(false);
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_closed_pool() {
        let pool = ConnectionPool::new(Arc::new(MemoryBus::new()), &config(1));
        pool.close();
        assert!(matches!(
            pool.acquire().await,
            Err(NodeError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_connection_checked_out_during_close_is_dropped() {
        let pool = ConnectionPool::new(Arc::new(MemoryBus::new()), &config(2));
        let conn = pool.acquire().await.unwrap();
        pool.close();
        drop(conn);
        assert_eq!(pool.idle(), 0);
    }
}
