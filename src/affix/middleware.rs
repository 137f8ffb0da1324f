//! The middleware contract every affix implements.

use std::any::Any;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use async_trait::async_trait;

use crate::affix::error::AffixResult;
use crate::affix::node::Link;
use crate::net::{BoxSocket, BoxTcpServer, BoxUdpServer, Datagram, Socket, TcpServer, UdpServer};

/// Access to the concrete type behind a `dyn Affix`.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A network middleware layer.
///
/// `name`, `copy` and `advertisement` are required. Every network operation
/// has a pass-through default, so an affix overrides only what it intercepts.
///
/// Operations that go down the stack receive `below`, the link beneath the
/// node this affix sits in. Operations on an existing handle receive the
/// handle produced by the layer beneath; forwarding means calling it directly.
///
/// Handles returned from here are wrapped by the owning [`AffixNode`] so that
/// later operations on them re-enter this affix. Implementations must not
/// wrap them again.
///
/// [`AffixNode`]: crate::affix::AffixNode
#[async_trait]
pub trait Affix: AsAny + Send + Sync + fmt::Debug {
    /// Name used in advertisements and diagnostics.
    fn name(&self) -> &str;

    /// Build an independent instance of the same concrete affix.
    ///
    /// Configuration is carried over. Any mutable state must be cloned into
    /// fresh storage: the copy and the original must never observe each
    /// other's changes.
    fn copy(&self) -> Box<dyn Affix>;

    /// This layer's own contribution to the stack advertisement.
    ///
    /// Layers that should not be announced to a remote party return an
    /// empty string.
    fn advertisement(&self) -> String;

    /// This layer's own part of the diagnostic string.
    fn describe(&self) -> String {
        format!("({})", self.name())
    }

    async fn open_connection(
        &self,
        below: &Link,
        remote: SocketAddr,
        local: Option<SocketAddr>,
    ) -> AffixResult<BoxSocket> {
        below.open_connection(remote, local).await
    }

    async fn send_message(
        &self,
        below: &Link,
        remote: SocketAddr,
        local: Option<SocketAddr>,
        payload: &[u8],
    ) -> AffixResult<usize> {
        below.send_message(remote, local, payload).await
    }

    async fn listen_for_connection(
        &self,
        below: &Link,
        local: SocketAddr,
    ) -> AffixResult<BoxTcpServer> {
        below.listen_for_connection(local).await
    }

    async fn listen_for_messages(
        &self,
        below: &Link,
        local: SocketAddr,
    ) -> AffixResult<BoxUdpServer> {
        below.listen_for_messages(local).await
    }

    async fn accept(&self, server: &dyn TcpServer) -> AffixResult<(SocketAddr, BoxSocket)> {
        server.accept().await
    }

    async fn recv_message(&self, server: &dyn UdpServer) -> AffixResult<Datagram> {
        server.recv_message().await
    }

    async fn socket_send(&self, socket: &dyn Socket, data: &[u8]) -> AffixResult<usize> {
        socket.send(data).await
    }

    async fn socket_recv(&self, socket: &dyn Socket, max_len: usize) -> AffixResult<Vec<u8>> {
        socket.recv(max_len).await
    }

    async fn socket_close(&self, socket: &dyn Socket) -> AffixResult<bool> {
        socket.close().await
    }

    async fn tcp_server_close(&self, server: &dyn TcpServer) -> AffixResult<bool> {
        server.close().await
    }

    async fn udp_server_close(&self, server: &dyn UdpServer) -> AffixResult<bool> {
        server.close().await
    }

    async fn local_ip(&self, below: &Link) -> AffixResult<IpAddr> {
        below.local_ip().await
    }

    async fn resolve_name(&self, below: &Link, name: &str) -> AffixResult<IpAddr> {
        below.resolve_name(name).await
    }
}
