//! Echo server: returns every byte and datagram it receives.
//!
//! # Responsibilities
//! - Bind stream and datagram listeners through the configured stack
//! - One task per connection, bounded by the listener's permits
//! - Graceful shutdown with a drain deadline

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast;

use crate::affix::{AffixError, AffixStack, AffixUdpServer};
use crate::config::AffixConfig;
use crate::lifecycle::Shutdown;
use crate::net::connection::{ConnectionGuard, ConnectionTracker};
use crate::net::listener::{ConnectionPermit, Listener, ListenerError};
use crate::net::{BoxSocket, BoxUdpServer, UdpServer};

/// Pause after a failed accept so a persistent error does not spin.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(50);

/// How long forcibly closed connections get to wind down.
const FORCE_CLOSE_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("Invalid datagram bind address '{0}'")]
    InvalidAddress(String),

    #[error("Datagram listener failed: {0}")]
    Datagram(#[from] AffixError),
}

/// Datagram side of the server.
///
/// With at least one affix configured, messages arrive bound to a private
/// copy of the stack and replies go back through it. With no affixes the
/// sentinel's listener is used directly.
enum DatagramListener {
    Bound(AffixUdpServer),
    Raw { server: BoxUdpServer, stack: AffixStack },
}

impl DatagramListener {
    async fn bind(stack: &AffixStack, addr: SocketAddr) -> Result<Self, AffixError> {
        match stack.top() {
            Some(top) => Ok(Self::Bound(top.listen_for_messages(addr).await?)),
            None => Ok(Self::Raw {
                server: stack.listen_for_messages(addr).await?,
                stack: stack.clone(),
            }),
        }
    }

    fn local_addr(&self) -> Result<SocketAddr, AffixError> {
        match self {
            Self::Bound(server) => server.local_addr(),
            Self::Raw { server, .. } => server.local_addr(),
        }
    }

    /// Receive one datagram and echo it. Returns the sender.
    async fn echo_one(&self) -> Result<SocketAddr, AffixError> {
        match self {
            Self::Bound(server) => {
                let message = server.recv_bound().await?;
                message.reply(message.payload()).await?;
                Ok(message.remote())
            }
            Self::Raw { server, stack } => {
                let datagram = server.recv_message().await?;
                let local = server.local_addr().ok();
                stack
                    .send_message(datagram.remote, local, &datagram.payload)
                    .await?;
                Ok(datagram.remote)
            }
        }
    }

    async fn close(&self) -> Result<bool, AffixError> {
        match self {
            Self::Bound(server) => server.close().await,
            Self::Raw { server, .. } => server.close().await,
        }
    }
}

/// Echo server bound to its listeners, ready to run.
pub struct EchoServer {
    config: AffixConfig,
    listener: Listener,
    datagrams: Option<Arc<DatagramListener>>,
    tracker: ConnectionTracker,
}

impl EchoServer {
    /// Bind every configured listener through `stack`.
    pub async fn bind(config: AffixConfig, stack: &AffixStack) -> Result<Self, ServerError> {
        let listener = Listener::bind(stack, &config.listener).await?;

        let datagrams = match &config.listener.udp_bind_address {
            Some(addr) => {
                let addr: SocketAddr = addr
                    .parse()
                    .map_err(|_| ServerError::InvalidAddress(addr.clone()))?;
                let datagrams = DatagramListener::bind(stack, addr).await?;
                tracing::info!(address = %datagrams.local_addr()?, "Datagram listener bound");
                Some(Arc::new(datagrams))
            }
            None => None,
        };

        Ok(Self {
            config,
            listener,
            datagrams,
            tracker: ConnectionTracker::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, AffixError> {
        self.listener.local_addr()
    }

    pub fn udp_local_addr(&self) -> Option<SocketAddr> {
        self.datagrams.as_ref().and_then(|d| d.local_addr().ok())
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Serve until `shutdown` fires, then drain.
    ///
    /// Open connections keep echoing after shutdown until their peers close
    /// them or `drain_timeout_secs` passes, whichever comes first.
    pub async fn run(self, shutdown: Shutdown) -> Result<(), ServerError> {
        let mut stop = shutdown.subscribe();
        let recv_buffer = self.config.listener.recv_buffer_bytes;
        let (force_close, _) = broadcast::channel::<()>(1);

        let datagram_task = self.datagrams.clone().map(|datagrams| {
            let stop = shutdown.subscribe();
            tokio::spawn(serve_datagrams(datagrams, stop))
        });

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((socket, peer, permit)) => {
                        let guard = self.tracker.track();
                        tracing::debug!(connection_id = %guard.id(), peer_addr = %peer, "Serving connection");
                        tokio::spawn(serve_connection(
                            socket,
                            peer,
                            recv_buffer,
                            guard,
                            permit,
                            force_close.subscribe(),
                        ));
                    }
                    Err(ListenerError::Closed) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                    }
                },
                _ = stop.recv() => break,
            }
        }

        tracing::info!(active = self.tracker.active_count(), "No longer accepting connections");
        self.listener.close().await?;
        if let Some(datagrams) = &self.datagrams {
            datagrams.close().await?;
        }
        if let Some(task) = datagram_task {
            let _ = task.await;
        }

        let deadline = Duration::from_secs(self.config.lifecycle.drain_timeout_secs);
        if self.tracker.wait_idle(deadline).await {
            tracing::info!("All connections drained");
        } else {
            tracing::warn!(
                remaining = self.tracker.active_count(),
                "Drain deadline passed, closing remaining connections"
            );
            let _ = force_close.send(());
            if !self.tracker.wait_idle(FORCE_CLOSE_GRACE).await {
                tracing::warn!(
                    remaining = self.tracker.active_count(),
                    "Connections still open after forced close"
                );
            }
        }
        Ok(())
    }
}

async fn serve_connection(
    socket: BoxSocket,
    peer: SocketAddr,
    recv_buffer: usize,
    guard: ConnectionGuard,
    _permit: ConnectionPermit,
    mut force_close: broadcast::Receiver<()>,
) {
    let connection_id = guard.id();
    let mut echoed: u64 = 0;

    loop {
        let received = tokio::select! {
            received = socket.recv(recv_buffer) => received,
            _ = force_close.recv() => break,
        };
        match received {
            Ok(data) if data.is_empty() => break,
            Ok(data) => {
                if let Err(e) = socket.send(&data).await {
                    tracing::warn!(%connection_id, peer_addr = %peer, error = %e, "Send failed");
                    break;
                }
                echoed += data.len() as u64;
            }
            Err(e) => {
                tracing::warn!(%connection_id, peer_addr = %peer, error = %e, "Receive failed");
                break;
            }
        }
    }

    if let Err(e) = socket.close().await {
        tracing::debug!(%connection_id, error = %e, "Close failed");
    }
    tracing::debug!(%connection_id, peer_addr = %peer, bytes = echoed, "Connection finished");
}

async fn serve_datagrams(datagrams: Arc<DatagramListener>, mut stop: broadcast::Receiver<()>) {
    loop {
        tokio::select! {
            result = datagrams.echo_one() => match result {
                Ok(remote) => tracing::trace!(peer_addr = %remote, "Datagram echoed"),
                Err(AffixError::SocketClosed) => break,
                Err(e) => tracing::warn!(error = %e, "Datagram echo failed"),
            },
            _ = stop.recv() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::affix::AffixResult;
    use crate::net::{BoxTcpServer, NetworkApi, TcpServer};

    /// A listener whose every accept fails, like a process out of descriptors.
    #[derive(Debug)]
    struct ExhaustedServer {
        attempts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TcpServer for ExhaustedServer {
        async fn accept(&self) -> AffixResult<(SocketAddr, BoxSocket)> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(AffixError::Io(std::io::Error::other("too many open files")))
        }

        async fn close(&self) -> AffixResult<bool> {
            Ok(true)
        }

        fn local_addr(&self) -> AffixResult<SocketAddr> {
            Ok(SocketAddr::from(([127, 0, 0, 1], 7070)))
        }
    }

    #[derive(Debug, Default)]
    struct ExhaustedNetwork {
        attempts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl NetworkApi for ExhaustedNetwork {
        fn name(&self) -> &str {
            "ExhaustedNetwork"
        }

        async fn listen_for_connection(&self, _local: SocketAddr) -> AffixResult<BoxTcpServer> {
            Ok(Box::new(ExhaustedServer {
                attempts: Arc::clone(&self.attempts),
            }))
        }
    }

    #[tokio::test]
    async fn failing_accepts_are_retried_with_a_pause() {
        let network = Arc::new(ExhaustedNetwork::default());
        let attempts = Arc::clone(&network.attempts);
        let stack = AffixStack::new(network);

        let mut config = AffixConfig::default();
        config.listener.bind_address = "127.0.0.1:0".into();
        let server = EchoServer::bind(config, &stack).await.unwrap();

        let shutdown = Shutdown::new();
        let handle = tokio::spawn(server.run(shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();

        let attempts = attempts.load(Ordering::SeqCst);
        assert!(attempts >= 1);
        assert!(attempts <= 10, "accept retried {attempts} times in 200ms");
    }
}
