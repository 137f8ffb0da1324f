//! Owning handle over a whole chain.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::affix::error::{AffixError, AffixResult};
use crate::affix::middleware::Affix;
use crate::affix::node::{AffixNode, Link};
use crate::net::{BoxSocket, BoxTcpServer, BoxUdpServer, NetworkApi};

/// A chain of affixes ending at a network sentinel.
///
/// The stack may be empty, in which case every operation goes straight to
/// the sentinel. Shape changes take `&mut self` and belong to setup; traffic
/// only needs `&self`.
#[derive(Debug, Clone)]
pub struct AffixStack {
    head: Link,
}

impl AffixStack {
    /// An empty stack over `network`.
    pub fn new(network: Arc<dyn NetworkApi>) -> Self {
        Self {
            head: Link::Network(network),
        }
    }

    /// A stack whose top is `head`.
    pub fn from_link(head: Link) -> Self {
        Self { head }
    }

    pub fn head(&self) -> &Link {
        &self.head
    }

    /// The topmost affix node, if any.
    pub fn top(&self) -> Option<&Arc<AffixNode>> {
        self.head.node()
    }

    pub fn depth(&self) -> usize {
        self.head.depth()
    }

    pub fn is_empty(&self) -> bool {
        self.depth() == 0
    }

    /// Put `affix` on top of the stack and return its node.
    pub fn push(&mut self, affix: Box<dyn Affix>) -> Arc<AffixNode> {
        let below = std::mem::replace(&mut self.head, Link::Detached);
        let node = AffixNode::from_boxed(affix, below);
        self.head = Link::Affix(Arc::clone(&node));
        node
    }

    /// Remove the topmost affix. Fails on an empty stack.
    pub fn pop(&mut self) -> AffixResult<Arc<AffixNode>> {
        match &self.head {
            Link::Affix(node) => {
                let node = Arc::clone(node);
                self.head = node.detach();
                Ok(node)
            }
            Link::Network(net) => Err(AffixError::StackUnderflow(net.name().to_string())),
            Link::Detached => Err(AffixError::Detached("stack".into())),
        }
    }

    /// Independent copy of the whole stack. The sentinel stays shared.
    pub fn copy(&self) -> AffixStack {
        Self {
            head: self.head.copy(),
        }
    }

    /// Advertisement of every layer, top to bottom.
    pub fn advertisement(&self) -> String {
        self.head.advertisement()
    }

    pub async fn open_connection(
        &self,
        remote: SocketAddr,
        local: Option<SocketAddr>,
    ) -> AffixResult<BoxSocket> {
        self.head.open_connection(remote, local).await
    }

    pub async fn send_message(
        &self,
        remote: SocketAddr,
        local: Option<SocketAddr>,
        payload: &[u8],
    ) -> AffixResult<usize> {
        self.head.send_message(remote, local, payload).await
    }

    pub async fn listen_for_connection(&self, local: SocketAddr) -> AffixResult<BoxTcpServer> {
        self.head.listen_for_connection(local).await
    }

    pub async fn listen_for_messages(&self, local: SocketAddr) -> AffixResult<BoxUdpServer> {
        self.head.listen_for_messages(local).await
    }

    pub async fn local_ip(&self) -> AffixResult<IpAddr> {
        self.head.local_ip().await
    }

    pub async fn resolve_name(&self, name: &str) -> AffixResult<IpAddr> {
        self.head.resolve_name(name).await
    }
}

impl fmt::Display for AffixStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.head)
    }
}
