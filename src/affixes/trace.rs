//! Logging affix.
//!
//! Emits a debug event for every operation that passes through, then
//! forwards it. Local diagnostics only, so it is never advertised.

use std::net::{IpAddr, SocketAddr};

use async_trait::async_trait;

use crate::affix::{Affix, AffixResult, Link};
use crate::net::{BoxSocket, BoxTcpServer, BoxUdpServer, Datagram, Socket, TcpServer, UdpServer};

#[derive(Debug, Clone)]
pub struct TraceAffix {
    label: String,
}

impl TraceAffix {
    pub const NAME: &'static str = "TraceAffix";

    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }

    pub fn build(args: Option<&str>) -> AffixResult<Box<dyn Affix>> {
        let label = args.map(str::trim).filter(|s| !s.is_empty()).unwrap_or("trace");
        Ok(Box::new(Self::new(label)))
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

#[async_trait]
impl Affix for TraceAffix {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn copy(&self) -> Box<dyn Affix> {
        Box::new(self.clone())
    }

    fn advertisement(&self) -> String {
        String::new()
    }

    fn describe(&self) -> String {
        format!("({},{})", Self::NAME, self.label)
    }

    async fn open_connection(
        &self,
        below: &Link,
        remote: SocketAddr,
        local: Option<SocketAddr>,
    ) -> AffixResult<BoxSocket> {
        tracing::debug!(label = %self.label, %remote, ?local, "open_connection");
        below.open_connection(remote, local).await
    }

    async fn send_message(
        &self,
        below: &Link,
        remote: SocketAddr,
        local: Option<SocketAddr>,
        payload: &[u8],
    ) -> AffixResult<usize> {
        tracing::debug!(label = %self.label, %remote, len = payload.len(), "send_message");
        below.send_message(remote, local, payload).await
    }

    async fn listen_for_connection(
        &self,
        below: &Link,
        local: SocketAddr,
    ) -> AffixResult<BoxTcpServer> {
        tracing::debug!(label = %self.label, %local, "listen_for_connection");
        below.listen_for_connection(local).await
    }

    async fn listen_for_messages(
        &self,
        below: &Link,
        local: SocketAddr,
    ) -> AffixResult<BoxUdpServer> {
        tracing::debug!(label = %self.label, %local, "listen_for_messages");
        below.listen_for_messages(local).await
    }

    async fn accept(&self, server: &dyn TcpServer) -> AffixResult<(SocketAddr, BoxSocket)> {
        let (remote, socket) = server.accept().await?;
        tracing::debug!(label = %self.label, %remote, "accept");
        Ok((remote, socket))
    }

    async fn recv_message(&self, server: &dyn UdpServer) -> AffixResult<Datagram> {
        let datagram = server.recv_message().await?;
        tracing::debug!(
            label = %self.label,
            remote = %datagram.remote,
            len = datagram.payload.len(),
            "recv_message"
        );
        Ok(datagram)
    }

    async fn socket_send(&self, socket: &dyn Socket, data: &[u8]) -> AffixResult<usize> {
        tracing::debug!(label = %self.label, len = data.len(), "socket_send");
        socket.send(data).await
    }

    async fn socket_recv(&self, socket: &dyn Socket, max_len: usize) -> AffixResult<Vec<u8>> {
        let data = socket.recv(max_len).await?;
        tracing::debug!(label = %self.label, len = data.len(), "socket_recv");
        Ok(data)
    }

    async fn socket_close(&self, socket: &dyn Socket) -> AffixResult<bool> {
        tracing::debug!(label = %self.label, "socket_close");
        socket.close().await
    }

    async fn tcp_server_close(&self, server: &dyn TcpServer) -> AffixResult<bool> {
        tracing::debug!(label = %self.label, "tcp_server_close");
        server.close().await
    }

    async fn udp_server_close(&self, server: &dyn UdpServer) -> AffixResult<bool> {
        tracing::debug!(label = %self.label, "udp_server_close");
        server.close().await
    }

    async fn local_ip(&self, below: &Link) -> AffixResult<IpAddr> {
        tracing::debug!(label = %self.label, "local_ip");
        below.local_ip().await
    }

    async fn resolve_name(&self, below: &Link, name: &str) -> AffixResult<IpAddr> {
        tracing::debug!(label = %self.label, name, "resolve_name");
        below.resolve_name(name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_from_advertisement() {
        let affix = TraceAffix::new("edge");
        assert!(affix.advertisement().is_empty());
        assert_eq!(affix.describe(), "(TraceAffix,edge)");
    }

    #[test]
    fn default_label() {
        let affix = TraceAffix::build(None).unwrap();
        assert_eq!(affix.describe(), "(TraceAffix,trace)");
    }
}
