//! Stack nodes and the links between them.
//!
//! # Responsibilities
//! - Own the link from one node to the layer beneath it
//! - Stack manipulation: peek, pop, push, copy
//! - Dispatch each network operation into the node's affix and wrap the
//!   returned handles so later operations re-enter this node
//! - Copy the whole suffix before accept / receive-message
//!
//! # Design Decisions
//! - `next` sits behind an `RwLock`, but shape changes are meant for the
//!   single-threaded assembly phase; traffic only ever reads it
//! - The sentinel is shared between copies; it holds no per-connection state
//! - Shape walks (depth, advertisement, copy) are iterative; network
//!   operations descend one call per layer

use std::any::Any;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, PoisonError, RwLock};

use crate::affix::error::{AffixError, AffixResult};
use crate::affix::middleware::{Affix, AsAny};
use crate::affix::socket::{
    AffixMessage, AffixSocket, AffixTcpServer, AffixUdpServer, PinnedTcpServer, PinnedUdpServer,
};
use crate::net::{
    BoxSocket, BoxTcpServer, BoxUdpServer, Datagram, NetworkApi, Socket, TcpServer, UdpServer,
};

/// What lies beneath a node.
#[derive(Clone)]
pub enum Link {
    /// Another affix.
    Affix(Arc<AffixNode>),
    /// The real network. Terminates the chain.
    Network(Arc<dyn NetworkApi>),
    /// The node was popped off its chain.
    Detached,
}

impl Link {
    /// Wrap a network implementation as a chain terminator.
    pub fn network(net: impl NetworkApi + 'static) -> Self {
        Link::Network(Arc::new(net))
    }

    /// The node this link points at, if it points at one.
    pub fn node(&self) -> Option<&Arc<AffixNode>> {
        match self {
            Link::Affix(node) => Some(node),
            _ => None,
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, Link::Network(_))
    }

    pub fn is_detached(&self) -> bool {
        matches!(self, Link::Detached)
    }

    /// Identity comparison: same node, same sentinel, or both detached.
    pub fn ptr_eq(&self, other: &Link) -> bool {
        match (self, other) {
            (Link::Affix(a), Link::Affix(b)) => Arc::ptr_eq(a, b),
            (Link::Network(a), Link::Network(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            (Link::Detached, Link::Detached) => true,
            _ => false,
        }
    }

    /// Independent copy of everything from this link down.
    ///
    /// The sentinel is returned as-is.
    pub fn copy(&self) -> Link {
        match self {
            Link::Affix(node) => Link::Affix(node.copy()),
            Link::Network(net) => Link::Network(Arc::clone(net)),
            Link::Detached => Link::Detached,
        }
    }

    /// Number of affix nodes from this link down to the sentinel.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut cursor = self.clone();
        while let Link::Affix(node) = cursor {
            depth += 1;
            cursor = node.peek();
        }
        depth
    }

    /// Advertisement of every layer from this link down, top to bottom.
    pub fn advertisement(&self) -> String {
        let mut out = String::new();
        let mut cursor = self.clone();
        while let Link::Affix(node) = cursor {
            out.push_str(&node.affix.advertisement());
            cursor = node.peek();
        }
        out
    }

    fn detached() -> AffixError {
        AffixError::Detached("operation reached an empty link".into())
    }

    pub async fn open_connection(
        &self,
        remote: SocketAddr,
        local: Option<SocketAddr>,
    ) -> AffixResult<BoxSocket> {
        match self {
            Link::Affix(node) => Ok(Box::new(node.open_connection(remote, local).await?)),
            Link::Network(net) => net.open_connection(remote, local).await,
            Link::Detached => Err(Self::detached()),
        }
    }

    pub async fn send_message(
        &self,
        remote: SocketAddr,
        local: Option<SocketAddr>,
        payload: &[u8],
    ) -> AffixResult<usize> {
        match self {
            Link::Affix(node) => node.send_message(remote, local, payload).await,
            Link::Network(net) => net.send_message(remote, local, payload).await,
            Link::Detached => Err(Self::detached()),
        }
    }

    pub async fn listen_for_connection(&self, local: SocketAddr) -> AffixResult<BoxTcpServer> {
        match self {
            Link::Affix(node) => Ok(Box::new(node.listen_for_connection(local).await?)),
            Link::Network(net) => net.listen_for_connection(local).await,
            Link::Detached => Err(Self::detached()),
        }
    }

    pub async fn listen_for_messages(&self, local: SocketAddr) -> AffixResult<BoxUdpServer> {
        match self {
            Link::Affix(node) => Ok(Box::new(node.listen_for_messages(local).await?)),
            Link::Network(net) => net.listen_for_messages(local).await,
            Link::Detached => Err(Self::detached()),
        }
    }

    pub async fn local_ip(&self) -> AffixResult<IpAddr> {
        match self {
            Link::Affix(node) => node.local_ip().await,
            Link::Network(net) => net.local_ip().await,
            Link::Detached => Err(Self::detached()),
        }
    }

    pub async fn resolve_name(&self, name: &str) -> AffixResult<IpAddr> {
        match self {
            Link::Affix(node) => node.resolve_name(name).await,
            Link::Network(net) => net.resolve_name(name).await,
            Link::Detached => Err(Self::detached()),
        }
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut cursor = self.clone();
        loop {
            match cursor {
                Link::Affix(node) => {
                    write!(f, "{}", node.affix.describe())?;
                    cursor = node.peek();
                }
                Link::Network(net) => return write!(f, "{}", net.name()),
                Link::Detached => return write!(f, "<detached>"),
            }
        }
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Link::Affix(node) => f.debug_tuple("Affix").field(&node.affix).finish(),
            Link::Network(net) => f.debug_tuple("Network").field(&net.name()).finish(),
            Link::Detached => f.write_str("Detached"),
        }
    }
}

/// One element of an affix stack.
pub struct AffixNode {
    affix: Box<dyn Affix>,
    next: RwLock<Link>,
}

impl AffixNode {
    /// Place `affix` on top of `next`.
    pub fn new(affix: impl Affix + 'static, next: Link) -> Arc<Self> {
        Self::from_boxed(Box::new(affix), next)
    }

    pub fn from_boxed(affix: Box<dyn Affix>, next: Link) -> Arc<Self> {
        Arc::new(Self {
            affix,
            next: RwLock::new(next),
        })
    }

    /// The middleware held by this node.
    pub fn affix(&self) -> &dyn Affix {
        self.affix.as_ref()
    }

    /// The middleware held by this node, if it is a `T`.
    pub fn downcast_ref<T: Affix + Any>(&self) -> Option<&T> {
        AsAny::as_any(self.affix.as_ref()).downcast_ref::<T>()
    }

    /// The layer directly beneath this node.
    pub fn peek(&self) -> Link {
        self.next.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn replace_next(&self, link: Link) -> Link {
        let mut next = self.next.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *next, link)
    }

    /// Cut this node loose, returning what used to be beneath it.
    pub(crate) fn detach(&self) -> Link {
        self.replace_next(Link::Detached)
    }

    /// Remove the node directly beneath this one.
    ///
    /// The removed node is detached before it is returned.
    pub fn pop(&self) -> AffixResult<Arc<AffixNode>> {
        let mut next = self.next.write().unwrap_or_else(PoisonError::into_inner);
        let popped = match &*next {
            Link::Affix(node) => Arc::clone(node),
            Link::Network(_) => return Err(AffixError::StackUnderflow(self.affix.describe())),
            Link::Detached => return Err(AffixError::Detached(self.affix.describe())),
        };
        *next = popped.detach();

        tracing::debug!(
            affix = %self.affix.describe(),
            popped = %popped.affix.describe(),
            "Affix popped"
        );
        Ok(popped)
    }

    /// Insert `node` directly beneath this one.
    ///
    /// Whatever `node` pointed at before is discarded. Fails if `node` is
    /// this node or already part of the chain beneath it.
    pub fn push(&self, node: Arc<AffixNode>) -> AffixResult<()> {
        if std::ptr::eq(self, Arc::as_ptr(&node)) || self.reaches(&node) {
            return Err(AffixError::Cycle {
                pushed: node.affix.describe(),
                target: self.affix.describe(),
            });
        }

        let mut next = self.next.write().unwrap_or_else(PoisonError::into_inner);
        let former = std::mem::replace(&mut *next, Link::Affix(Arc::clone(&node)));
        node.replace_next(former);

        tracing::debug!(
            affix = %self.affix.describe(),
            pushed = %node.affix.describe(),
            "Affix pushed"
        );
        Ok(())
    }

    /// True if `node` lies somewhere beneath this one.
    pub fn reaches(&self, node: &Arc<AffixNode>) -> bool {
        let mut cursor = self.peek();
        while let Link::Affix(current) = cursor {
            if Arc::ptr_eq(&current, node) {
                return true;
            }
            cursor = current.peek();
        }
        false
    }

    /// Independent copy of this node and everything beneath it.
    pub fn copy(&self) -> Arc<AffixNode> {
        let mut below = Vec::new();
        let mut cursor = self.peek();
        while let Link::Affix(node) = cursor {
            below.push(node.affix.copy());
            cursor = node.peek();
        }

        // `cursor` is now the sentinel or the detached marker.
        let mut link = cursor.copy();
        for affix in below.into_iter().rev() {
            link = Link::Affix(Self::from_boxed(affix, link));
        }
        Self::from_boxed(self.affix.copy(), link)
    }

    /// Number of affix nodes from this one down, this one included.
    pub fn depth(&self) -> usize {
        1 + self.peek().depth()
    }

    /// Advertisement of this node and every layer beneath it.
    pub fn advertisement(&self) -> String {
        let mut out = self.affix.advertisement();
        out.push_str(&self.peek().advertisement());
        out
    }

    pub async fn open_connection(
        self: &Arc<Self>,
        remote: SocketAddr,
        local: Option<SocketAddr>,
    ) -> AffixResult<AffixSocket> {
        let below = self.peek();
        let socket = self.affix.open_connection(&below, remote, local).await?;
        Ok(AffixSocket::new(socket, Arc::clone(self)))
    }

    pub async fn send_message(
        &self,
        remote: SocketAddr,
        local: Option<SocketAddr>,
        payload: &[u8],
    ) -> AffixResult<usize> {
        let below = self.peek();
        self.affix.send_message(&below, remote, local, payload).await
    }

    pub async fn listen_for_connection(
        self: &Arc<Self>,
        local: SocketAddr,
    ) -> AffixResult<AffixTcpServer> {
        let below = self.peek();
        let server = self.affix.listen_for_connection(&below, local).await?;
        Ok(AffixTcpServer::new(server, Arc::clone(self)))
    }

    pub async fn listen_for_messages(
        self: &Arc<Self>,
        local: SocketAddr,
    ) -> AffixResult<AffixUdpServer> {
        let below = self.peek();
        let server = self.affix.listen_for_messages(&below, local).await?;
        Ok(AffixUdpServer::new(server, Arc::clone(self)))
    }

    /// Accept through a private copy of this node's chain.
    ///
    /// `server` is the handle the layer beneath produced. The chain is
    /// copied once; the accepted socket and every socket beneath it are
    /// bound to the matching node of that copy, so per-connection state
    /// never leaks between connections or back into the listener.
    pub async fn accept(&self, server: &dyn TcpServer) -> AffixResult<(SocketAddr, AffixSocket)> {
        let copy = self.copy();
        let (remote, socket) = copy.accept_pinned(server).await?;
        tracing::trace!(peer_addr = %remote, stack = %Link::Affix(Arc::clone(&copy)), "Connection accepted");
        Ok((remote, socket))
    }

    /// Accept through this node as it is, without copying.
    ///
    /// When the handle beneath is itself an affix listener, the layer below
    /// sees it through the next node of this chain instead of its own.
    pub(crate) async fn accept_pinned(
        self: &Arc<Self>,
        server: &dyn TcpServer,
    ) -> AffixResult<(SocketAddr, AffixSocket)> {
        let (remote, socket) = match (server.as_affix(), self.peek()) {
            (Some(below), Link::Affix(next)) => {
                let pinned = PinnedTcpServer {
                    inner: below.inner(),
                    owner: next,
                };
                self.affix.accept(&pinned).await?
            }
            _ => self.affix.accept(server).await?,
        };
        Ok((remote, AffixSocket::new(socket, Arc::clone(self))))
    }

    /// Receive through a private copy of this node's chain.
    ///
    /// The message keeps the copy so a reply travels the same private chain
    /// the message came up through.
    pub async fn recv_message(&self, server: &dyn UdpServer) -> AffixResult<AffixMessage> {
        let copy = self.copy();
        let datagram = copy.recv_pinned(server).await?;
        Ok(AffixMessage::new(datagram, server.local_addr().ok(), copy))
    }

    pub(crate) async fn recv_pinned(self: &Arc<Self>, server: &dyn UdpServer) -> AffixResult<Datagram> {
        match (server.as_affix(), self.peek()) {
            (Some(below), Link::Affix(next)) => {
                let pinned = PinnedUdpServer {
                    inner: below.inner(),
                    owner: next,
                };
                self.affix.recv_message(&pinned).await
            }
            _ => self.affix.recv_message(server).await,
        }
    }

    pub async fn socket_send(&self, socket: &dyn Socket, data: &[u8]) -> AffixResult<usize> {
        self.affix.socket_send(socket, data).await
    }

    pub async fn socket_recv(&self, socket: &dyn Socket, max_len: usize) -> AffixResult<Vec<u8>> {
        self.affix.socket_recv(socket, max_len).await
    }

    pub async fn socket_close(&self, socket: &dyn Socket) -> AffixResult<bool> {
        self.affix.socket_close(socket).await
    }

    pub async fn tcp_server_close(&self, server: &dyn TcpServer) -> AffixResult<bool> {
        self.affix.tcp_server_close(server).await
    }

    pub async fn udp_server_close(&self, server: &dyn UdpServer) -> AffixResult<bool> {
        self.affix.udp_server_close(server).await
    }

    pub async fn local_ip(&self) -> AffixResult<IpAddr> {
        let below = self.peek();
        self.affix.local_ip(&below).await
    }

    pub async fn resolve_name(&self, name: &str) -> AffixResult<IpAddr> {
        let below = self.peek();
        self.affix.resolve_name(&below, name).await
    }
}

impl fmt::Display for AffixNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.affix.describe(), self.peek())
    }
}

impl fmt::Debug for AffixNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AffixNode")
            .field("affix", &self.affix)
            .field("next", &self.peek())
            .finish()
    }
}
