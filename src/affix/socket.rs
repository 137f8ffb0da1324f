//! Handle wrappers that route operations back through their owning node.
//!
//! Every handle produced by a node is wrapped here. The wrapper keeps the
//! handle from the layer beneath plus the node that produced it, and sends
//! every operation to that node's affix rather than to the raw handle.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::affix::error::AffixResult;
use crate::affix::node::AffixNode;
use crate::net::{BoxSocket, BoxTcpServer, BoxUdpServer, Datagram, Socket, TcpServer, UdpServer};

/// Connected handle bound to an affix node.
#[derive(Debug)]
pub struct AffixSocket {
    inner: BoxSocket,
    owner: Arc<AffixNode>,
}

impl AffixSocket {
    pub fn new(inner: BoxSocket, owner: Arc<AffixNode>) -> Self {
        Self { inner, owner }
    }

    /// The node every operation on this handle re-enters.
    pub fn owner(&self) -> &Arc<AffixNode> {
        &self.owner
    }

    /// The handle produced by the layer beneath the owner.
    pub fn inner(&self) -> &dyn Socket {
        self.inner.as_ref()
    }
}

#[async_trait]
impl Socket for AffixSocket {
    async fn send(&self, data: &[u8]) -> AffixResult<usize> {
        self.owner.socket_send(self.inner.as_ref(), data).await
    }

    async fn recv(&self, max_len: usize) -> AffixResult<Vec<u8>> {
        self.owner.socket_recv(self.inner.as_ref(), max_len).await
    }

    async fn close(&self) -> AffixResult<bool> {
        self.owner.socket_close(self.inner.as_ref()).await
    }
}

/// Connection-oriented listening handle bound to an affix node.
#[derive(Debug)]
pub struct AffixTcpServer {
    inner: BoxTcpServer,
    owner: Arc<AffixNode>,
}

impl AffixTcpServer {
    pub fn new(inner: BoxTcpServer, owner: Arc<AffixNode>) -> Self {
        Self { inner, owner }
    }

    pub fn owner(&self) -> &Arc<AffixNode> {
        &self.owner
    }

    /// The listening handle produced by the layer beneath the owner.
    pub fn inner(&self) -> &dyn TcpServer {
        self.inner.as_ref()
    }

    /// Accept the next connection, keeping the concrete wrapper type.
    ///
    /// The returned socket is bound to a fresh copy of the owner's chain,
    /// and so is every socket beneath it.
    pub async fn accept_bound(&self) -> AffixResult<(SocketAddr, AffixSocket)> {
        self.owner.accept(self.inner.as_ref()).await
    }
}

#[async_trait]
impl TcpServer for AffixTcpServer {
    async fn accept(&self) -> AffixResult<(SocketAddr, BoxSocket)> {
        let (remote, socket) = self.accept_bound().await?;
        Ok((remote, Box::new(socket)))
    }

    async fn close(&self) -> AffixResult<bool> {
        self.owner.tcp_server_close(self.inner.as_ref()).await
    }

    fn local_addr(&self) -> AffixResult<SocketAddr> {
        self.inner.local_addr()
    }

    fn as_affix(&self) -> Option<&AffixTcpServer> {
        Some(self)
    }
}

/// Connectionless listening handle bound to an affix node.
#[derive(Debug)]
pub struct AffixUdpServer {
    inner: BoxUdpServer,
    owner: Arc<AffixNode>,
}

impl AffixUdpServer {
    pub fn new(inner: BoxUdpServer, owner: Arc<AffixNode>) -> Self {
        Self { inner, owner }
    }

    pub fn owner(&self) -> &Arc<AffixNode> {
        &self.owner
    }

    /// The listening handle produced by the layer beneath the owner.
    pub fn inner(&self) -> &dyn UdpServer {
        self.inner.as_ref()
    }

    /// Receive the next datagram along with the private chain it came through.
    pub async fn recv_bound(&self) -> AffixResult<AffixMessage> {
        self.owner.recv_message(self.inner.as_ref()).await
    }
}

#[async_trait]
impl UdpServer for AffixUdpServer {
    async fn recv_message(&self) -> AffixResult<Datagram> {
        Ok(self.recv_bound().await?.into_datagram())
    }

    async fn close(&self) -> AffixResult<bool> {
        self.owner.udp_server_close(self.inner.as_ref()).await
    }

    fn local_addr(&self) -> AffixResult<SocketAddr> {
        self.inner.local_addr()
    }

    fn as_affix(&self) -> Option<&AffixUdpServer> {
        Some(self)
    }
}

/// A listening handle seen through one node of an already copied chain.
///
/// Accepting through it binds the socket to that node without copying
/// again, so every level of an accepted connection shares one copy.
#[derive(Debug)]
pub(crate) struct PinnedTcpServer<'a> {
    pub(crate) inner: &'a dyn TcpServer,
    pub(crate) owner: Arc<AffixNode>,
}

#[async_trait]
impl<'a> TcpServer for PinnedTcpServer<'a> {
    async fn accept(&self) -> AffixResult<(SocketAddr, BoxSocket)> {
        let (remote, socket) = self.owner.accept_pinned(self.inner).await?;
        Ok((remote, Box::new(socket)))
    }

    async fn close(&self) -> AffixResult<bool> {
        self.owner.tcp_server_close(self.inner).await
    }

    fn local_addr(&self) -> AffixResult<SocketAddr> {
        self.inner.local_addr()
    }
}

/// Datagram counterpart of [`PinnedTcpServer`].
#[derive(Debug)]
pub(crate) struct PinnedUdpServer<'a> {
    pub(crate) inner: &'a dyn UdpServer,
    pub(crate) owner: Arc<AffixNode>,
}

#[async_trait]
impl<'a> UdpServer for PinnedUdpServer<'a> {
    async fn recv_message(&self) -> AffixResult<Datagram> {
        self.owner.recv_pinned(self.inner).await
    }

    async fn close(&self) -> AffixResult<bool> {
        self.owner.udp_server_close(self.inner).await
    }

    fn local_addr(&self) -> AffixResult<SocketAddr> {
        self.inner.local_addr()
    }
}

/// A datagram plus the private chain copy it was received through.
#[derive(Debug)]
pub struct AffixMessage {
    datagram: Datagram,
    local: Option<SocketAddr>,
    via: Arc<AffixNode>,
}

impl AffixMessage {
    pub fn new(datagram: Datagram, local: Option<SocketAddr>, via: Arc<AffixNode>) -> Self {
        Self { datagram, local, via }
    }

    pub fn remote(&self) -> SocketAddr {
        self.datagram.remote
    }

    pub fn payload(&self) -> &[u8] {
        &self.datagram.payload
    }

    /// Head of the chain copy this message was received through.
    pub fn via(&self) -> &Arc<AffixNode> {
        &self.via
    }

    /// Address of the listener the message arrived on.
    pub fn local(&self) -> Option<SocketAddr> {
        self.local
    }

    /// Send a datagram back to the sender through the same chain copy,
    /// from the address the message arrived on.
    pub async fn reply(&self, payload: &[u8]) -> AffixResult<usize> {
        self.via
            .send_message(self.datagram.remote, self.local, payload)
            .await
    }

    pub fn into_datagram(self) -> Datagram {
        self.datagram
    }
}
