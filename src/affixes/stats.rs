//! Traffic-counting affix.
//!
//! Counters live in the affix instance. Accepted connections and received
//! messages run through a copy of the chain, so each connection ends up
//! with its own counters, seeded from the listener's values at accept time.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::affix::{Affix, AffixError, AffixResult, Link};
use crate::net::{BoxSocket, Datagram, Socket, TcpServer, UdpServer};

/// Point-in-time view of a `StatsAffix`'s counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub connections_opened: u64,
    pub connections_accepted: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
}

#[derive(Debug, Default)]
struct Counters {
    connections_opened: AtomicU64,
    connections_accepted: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
}

impl Counters {
    fn from_snapshot(s: StatsSnapshot) -> Self {
        Self {
            connections_opened: AtomicU64::new(s.connections_opened),
            connections_accepted: AtomicU64::new(s.connections_accepted),
            bytes_sent: AtomicU64::new(s.bytes_sent),
            bytes_received: AtomicU64::new(s.bytes_received),
            messages_sent: AtomicU64::new(s.messages_sent),
            messages_received: AtomicU64::new(s.messages_received),
        }
    }

    fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
        }
    }
}

/// Counts connections, bytes and datagrams passing through.
#[derive(Debug, Default)]
pub struct StatsAffix {
    counters: Counters,
}

impl StatsAffix {
    pub const NAME: &'static str = "StatsAffix";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(args: Option<&str>) -> AffixResult<Box<dyn Affix>> {
        if let Some(args) = args {
            return Err(AffixError::InvalidArguments {
                affix: Self::NAME.to_string(),
                reason: format!("takes no arguments, got '{args}'"),
            });
        }
        Ok(Box::new(Self::new()))
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.counters.snapshot()
    }
}

#[async_trait]
impl Affix for StatsAffix {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn copy(&self) -> Box<dyn Affix> {
        Box::new(Self {
            counters: Counters::from_snapshot(self.counters.snapshot()),
        })
    }

    fn advertisement(&self) -> String {
        self.describe()
    }

    async fn open_connection(
        &self,
        below: &Link,
        remote: SocketAddr,
        local: Option<SocketAddr>,
    ) -> AffixResult<BoxSocket> {
        let socket = below.open_connection(remote, local).await?;
        self.counters.connections_opened.fetch_add(1, Ordering::Relaxed);
        Ok(socket)
    }

    async fn send_message(
        &self,
        below: &Link,
        remote: SocketAddr,
        local: Option<SocketAddr>,
        payload: &[u8],
    ) -> AffixResult<usize> {
        let sent = below.send_message(remote, local, payload).await?;
        self.counters.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.counters.bytes_sent.fetch_add(sent as u64, Ordering::Relaxed);
        Ok(sent)
    }

    async fn accept(&self, server: &dyn TcpServer) -> AffixResult<(SocketAddr, BoxSocket)> {
        let accepted = server.accept().await?;
        self.counters.connections_accepted.fetch_add(1, Ordering::Relaxed);
        Ok(accepted)
    }

    async fn recv_message(&self, server: &dyn UdpServer) -> AffixResult<Datagram> {
        let datagram = server.recv_message().await?;
        self.counters.messages_received.fetch_add(1, Ordering::Relaxed);
        self.counters
            .bytes_received
            .fetch_add(datagram.payload.len() as u64, Ordering::Relaxed);
        Ok(datagram)
    }

    async fn socket_send(&self, socket: &dyn Socket, data: &[u8]) -> AffixResult<usize> {
        let sent = socket.send(data).await?;
        self.counters.bytes_sent.fetch_add(sent as u64, Ordering::Relaxed);
        Ok(sent)
    }

    async fn socket_recv(&self, socket: &dyn Socket, max_len: usize) -> AffixResult<Vec<u8>> {
        let data = socket.recv(max_len).await?;
        self.counters
            .bytes_received
            .fetch_add(data.len() as u64, Ordering::Relaxed);
        Ok(data)
    }

    async fn socket_close(&self, socket: &dyn Socket) -> AffixResult<bool> {
        let closed = socket.close().await?;
        if closed {
            let stats = self.snapshot();
            tracing::debug!(
                bytes_sent = stats.bytes_sent,
                bytes_received = stats.bytes_received,
                "Connection stats"
            );
        }
        Ok(closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_carries_values_into_fresh_counters() {
        let original = StatsAffix::new();
        original.counters.bytes_sent.store(10, Ordering::Relaxed);

        let copy = original.copy();
        let copy = crate::affix::AsAny::as_any(copy.as_ref())
            .downcast_ref::<StatsAffix>()
            .unwrap();
        assert_eq!(copy.snapshot().bytes_sent, 10);

        copy.counters.bytes_sent.fetch_add(5, Ordering::Relaxed);
        assert_eq!(copy.snapshot().bytes_sent, 15);
        assert_eq!(original.snapshot().bytes_sent, 10);
    }
}
