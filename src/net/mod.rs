//! Primitive network layer.
//!
//! # Data Flow
//! ```text
//! Affix stack operation
//!     → each AffixNode (intercept / forward)
//!     → NetworkApi sentinel (tokio_net.rs: real sockets)
//!     → raw handle (Socket / TcpServer / UdpServer)
//!     → wrapped by every node on the way back up
//! ```
//!
//! # Design Decisions
//! - Handles are trait objects so any layer can wrap any other layer's handle
//! - The sentinel is shared by every copy of a stack and holds no per-connection state
//! - Operations a backend does not provide fail with `Unimplemented` at call time

pub mod connection;
pub mod listener;
pub mod tokio_net;

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use async_trait::async_trait;

use crate::affix::{AffixError, AffixResult, AffixTcpServer, AffixUdpServer};

pub use tokio_net::TokioNetwork;

/// Boxed connected handle.
pub type BoxSocket = Box<dyn Socket>;
/// Boxed connection-oriented listening handle.
pub type BoxTcpServer = Box<dyn TcpServer>;
/// Boxed connectionless listening handle.
pub type BoxUdpServer = Box<dyn UdpServer>;

/// A single datagram drained from a connectionless listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    /// Sender of the datagram.
    pub remote: SocketAddr,
    /// Datagram contents.
    pub payload: Vec<u8>,
}

/// A connected, stream-oriented handle.
#[async_trait]
pub trait Socket: Send + Sync + fmt::Debug {
    /// Send bytes, returning how many were accepted.
    async fn send(&self, data: &[u8]) -> AffixResult<usize>;

    /// Receive up to `max_len` bytes. An empty result means the peer closed.
    async fn recv(&self, max_len: usize) -> AffixResult<Vec<u8>>;

    /// Close the handle. Returns false if it was already closed.
    async fn close(&self) -> AffixResult<bool>;
}

/// A connection-oriented listening handle.
#[async_trait]
pub trait TcpServer: Send + Sync + fmt::Debug {
    /// Wait for the next inbound connection.
    async fn accept(&self) -> AffixResult<(SocketAddr, BoxSocket)>;

    /// Stop listening. Returns false if it was already closed.
    async fn close(&self) -> AffixResult<bool>;

    /// Address the listener is bound to.
    fn local_addr(&self) -> AffixResult<SocketAddr>;

    /// The affix wrapper this handle is, if it is one.
    fn as_affix(&self) -> Option<&AffixTcpServer> {
        None
    }
}

/// A connectionless listening handle.
#[async_trait]
pub trait UdpServer: Send + Sync + fmt::Debug {
    /// Wait for the next inbound datagram.
    async fn recv_message(&self) -> AffixResult<Datagram>;

    /// Stop listening. Returns false if it was already closed.
    async fn close(&self) -> AffixResult<bool>;

    /// Address the listener is bound to.
    fn local_addr(&self) -> AffixResult<SocketAddr>;

    /// The affix wrapper this handle is, if it is one.
    fn as_affix(&self) -> Option<&AffixUdpServer> {
        None
    }
}

/// The primitive network API that terminates every affix stack.
///
/// Every method has a default that reports `Unimplemented`, so restricted
/// backends only provide what they support.
#[async_trait]
pub trait NetworkApi: Send + Sync + fmt::Debug {
    /// Name used in diagnostic output.
    fn name(&self) -> &str;

    /// Open an outbound connection.
    async fn open_connection(
        &self,
        _remote: SocketAddr,
        _local: Option<SocketAddr>,
    ) -> AffixResult<BoxSocket> {
        Err(AffixError::unimplemented(self.name(), "open_connection"))
    }

    /// Send a single best-effort datagram.
    async fn send_message(
        &self,
        _remote: SocketAddr,
        _local: Option<SocketAddr>,
        _payload: &[u8],
    ) -> AffixResult<usize> {
        Err(AffixError::unimplemented(self.name(), "send_message"))
    }

    /// Listen for inbound connections.
    async fn listen_for_connection(&self, _local: SocketAddr) -> AffixResult<BoxTcpServer> {
        Err(AffixError::unimplemented(self.name(), "listen_for_connection"))
    }

    /// Listen for inbound datagrams.
    async fn listen_for_messages(&self, _local: SocketAddr) -> AffixResult<BoxUdpServer> {
        Err(AffixError::unimplemented(self.name(), "listen_for_messages"))
    }

    /// The address other hosts would see this host as.
    async fn local_ip(&self) -> AffixResult<IpAddr> {
        Err(AffixError::unimplemented(self.name(), "local_ip"))
    }

    /// Resolve a host name to an address.
    async fn resolve_name(&self, _name: &str) -> AffixResult<IpAddr> {
        Err(AffixError::unimplemented(self.name(), "resolve_name"))
    }
}

/// A network that provides no operations.
///
/// Useful for assembling a stack only to inspect its shape or advertisement.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNetwork;

impl NetworkApi for NullNetwork {
    fn name(&self) -> &str {
        "NullNetwork"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_network_reports_unimplemented() {
        let net = NullNetwork;
        let err = net
            .open_connection("127.0.0.1:1".parse().unwrap(), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AffixError::Unimplemented { operation: "open_connection", .. }
        ));

        let err = net.resolve_name("localhost").await.unwrap_err();
        assert_eq!(err.to_string(), "NullNetwork does not implement resolve_name");
    }
}
