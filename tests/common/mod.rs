//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use affix_stack::affix::{Affix, AffixNode, AffixResult, Link};
use affix_stack::net::{NetworkApi, Socket};

/// Test affix with a fixed tag (its config) and a per-connection send count
/// (its mutable state). Appends its tag to everything sent through it.
#[derive(Debug)]
pub struct TagAffix {
    tag: String,
    sends: AtomicU64,
}

impl TagAffix {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            sends: AtomicU64::new(0),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn sends(&self) -> u64 {
        self.sends.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Affix for TagAffix {
    fn name(&self) -> &str {
        "TagAffix"
    }

    fn copy(&self) -> Box<dyn Affix> {
        Box::new(Self {
            tag: self.tag.clone(),
            sends: AtomicU64::new(self.sends()),
        })
    }

    fn advertisement(&self) -> String {
        self.describe()
    }

    fn describe(&self) -> String {
        format!("(TagAffix,{})", self.tag)
    }

    async fn socket_send(&self, socket: &dyn Socket, data: &[u8]) -> AffixResult<usize> {
        let mut tagged = data.to_vec();
        tagged.extend_from_slice(self.tag.as_bytes());
        self.sends.fetch_add(1, Ordering::SeqCst);
        socket.send(&tagged).await
    }
}

/// Build A(tag "a") → B(tag "b") → `network`.
pub fn tagged_chain(network: Arc<dyn NetworkApi>) -> (Arc<AffixNode>, Arc<AffixNode>) {
    let b = AffixNode::new(TagAffix::new("b"), Link::Network(network));
    let a = AffixNode::new(TagAffix::new("a"), Link::Affix(Arc::clone(&b)));
    (a, b)
}

pub fn tag_of(node: &AffixNode) -> Option<&str> {
    node.downcast_ref::<TagAffix>().map(TagAffix::tag)
}

pub fn sends_of(node: &AffixNode) -> u64 {
    node.downcast_ref::<TagAffix>().map(TagAffix::sends).unwrap_or(0)
}

pub fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

/// Read from `socket` until `len` bytes arrived or the peer closed.
pub async fn recv_exact(socket: &dyn Socket, len: usize) -> Vec<u8> {
    let mut out = Vec::new();
    while out.len() < len {
        let chunk = tokio::time::timeout(Duration::from_secs(5), socket.recv(4096))
            .await
            .expect("recv timed out")
            .expect("recv failed");
        if chunk.is_empty() {
            break;
        }
        out.extend_from_slice(&chunk);
    }
    out
}
