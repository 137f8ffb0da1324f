//! Bounded connection listener on top of an affix stack.
//!
//! # Responsibilities
//! - Bind through the configured stack
//! - Accept connections, each on its own copy of the stack
//! - Enforce max_connections via semaphore (backpressure)

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::affix::{AffixError, AffixStack};
use crate::config::ListenerConfig;
use crate::net::{BoxSocket, BoxTcpServer};

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("Invalid bind address '{0}'")]
    InvalidAddress(String),

    #[error("Failed to bind: {0}")]
    Bind(#[source] AffixError),

    #[error("Failed to accept: {0}")]
    Accept(#[source] AffixError),

    #[error("Listener closed")]
    Closed,
}

/// A listener that limits concurrent connections.
///
/// When the limit is reached, `accept` waits for a slot before taking the
/// next connection off the stack.
pub struct Listener {
    inner: BoxTcpServer,
    connection_limit: Arc<Semaphore>,
    max_connections: usize,
}

impl Listener {
    pub async fn bind(stack: &AffixStack, config: &ListenerConfig) -> Result<Self, ListenerError> {
        let addr: SocketAddr = config
            .bind_address
            .parse()
            .map_err(|_| ListenerError::InvalidAddress(config.bind_address.clone()))?;

        let inner = stack
            .listen_for_connection(addr)
            .await
            .map_err(ListenerError::Bind)?;
        let local_addr = inner.local_addr().map_err(ListenerError::Bind)?;

        tracing::info!(
            address = %local_addr,
            max_connections = config.max_connections,
            stack = %stack,
            "Listener bound"
        );

        Ok(Self {
            inner,
            connection_limit: Arc::new(Semaphore::new(config.max_connections)),
            max_connections: config.max_connections,
        })
    }

    /// Accept a connection once a slot is free.
    ///
    /// The permit must be held for the connection's lifetime.
    pub async fn accept(&self) -> Result<(BoxSocket, SocketAddr, ConnectionPermit), ListenerError> {
        let permit = Arc::clone(&self.connection_limit)
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;

        let (remote, socket) = self.inner.accept().await.map_err(|e| match e {
            AffixError::SocketClosed => ListenerError::Closed,
            other => ListenerError::Accept(other),
        })?;

        tracing::debug!(
            peer_addr = %remote,
            available_permits = self.connection_limit.available_permits(),
            "Connection accepted"
        );

        Ok((socket, remote, ConnectionPermit { _permit: permit }))
    }

    /// Stop accepting. Pending and future `accept` calls return `Closed`.
    pub async fn close(&self) -> Result<bool, ListenerError> {
        self.connection_limit.close();
        self.inner.close().await.map_err(ListenerError::Accept)
    }

    pub fn local_addr(&self) -> Result<SocketAddr, AffixError> {
        self.inner.local_addr()
    }

    pub fn available_permits(&self) -> usize {
        self.connection_limit.available_permits()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

/// A connection slot, released on drop.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: OwnedSemaphorePermit,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::TokioNetwork;

    fn config(max_connections: usize) -> ListenerConfig {
        ListenerConfig {
            bind_address: "127.0.0.1:0".to_string(),
            max_connections,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn rejects_bad_address() {
        let stack = AffixStack::new(Arc::new(TokioNetwork::new()));
        let mut cfg = config(1);
        cfg.bind_address = "not-an-address".into();
        assert!(matches!(
            Listener::bind(&stack, &cfg).await,
            Err(ListenerError::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn permits_are_released_on_drop() {
        let net = Arc::new(TokioNetwork::new());
        let stack = AffixStack::new(net.clone());
        let listener = Listener::bind(&stack, &config(2)).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let _client = stack.open_connection(addr, None).await.unwrap();
        let (_socket, _, permit) = listener.accept().await.unwrap();
        assert_eq!(listener.available_permits(), 1);

        drop(permit);
        assert_eq!(listener.available_permits(), 2);
    }

    #[tokio::test]
    async fn close_ends_accept() {
        let stack = AffixStack::new(Arc::new(TokioNetwork::new()));
        let listener = Listener::bind(&stack, &config(1)).await.unwrap();
        assert!(listener.close().await.unwrap());
        assert!(matches!(listener.accept().await, Err(ListenerError::Closed)));
    }
}
