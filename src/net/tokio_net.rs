//! Sentinel network backed by `tokio::net`.
//!
//! # Responsibilities
//! - Perform the real bind / connect / send / recv for the bottom of every stack
//! - Allow send and recv to run concurrently on one connected handle
//! - Make `close` interrupt pending accepts and receives
//! - Send datagrams from a listening port when asked to, so replies come
//!   back to that listener

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, PoisonError, Weak};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpSocket, TcpStream, UdpSocket};
use tokio::sync::{watch, Mutex};

use crate::affix::{AffixError, AffixResult};
use crate::net::{
    BoxSocket, BoxTcpServer, BoxUdpServer, Datagram, NetworkApi, Socket, TcpServer, UdpServer,
};

/// Largest datagram a UDP listener will hand back.
pub const MAX_DATAGRAM_LEN: usize = 65_507;

/// Address connected to (never contacted) to learn the outbound interface.
const ROUTE_TARGET: &str = "8.8.8.8:80";

/// The real network.
///
/// Clones share the table of open UDP listeners.
#[derive(Debug, Default, Clone)]
pub struct TokioNetwork {
    udp_listeners: Arc<std::sync::Mutex<HashMap<SocketAddr, Weak<UdpSocket>>>>,
}

impl TokioNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// The open listener bound to `local`, if there is one.
    fn udp_listener(&self, local: &SocketAddr) -> Option<Arc<UdpSocket>> {
        let mut listeners = self
            .udp_listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        listeners.retain(|_, socket| socket.strong_count() > 0);
        listeners.get(local).and_then(Weak::upgrade)
    }
}

fn unspecified_for(remote: &SocketAddr) -> SocketAddr {
    match remote {
        SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    }
}

#[async_trait]
impl NetworkApi for TokioNetwork {
    fn name(&self) -> &str {
        "TokioNetwork"
    }

    async fn open_connection(
        &self,
        remote: SocketAddr,
        local: Option<SocketAddr>,
    ) -> AffixResult<BoxSocket> {
        let stream = match local {
            Some(local) => {
                let socket = if local.is_ipv4() {
                    TcpSocket::new_v4()?
                } else {
                    TcpSocket::new_v6()?
                };
                socket.set_reuseaddr(true)?;
                socket.bind(local)?;
                socket.connect(remote).await?
            }
            None => TcpStream::connect(remote).await?,
        };

        tracing::trace!(peer_addr = %remote, "Connection opened");
        Ok(Box::new(TokioSocket::new(stream)))
    }

    async fn send_message(
        &self,
        remote: SocketAddr,
        local: Option<SocketAddr>,
        payload: &[u8],
    ) -> AffixResult<usize> {
        if let Some(listener) = local.as_ref().and_then(|addr| self.udp_listener(addr)) {
            return Ok(listener.send_to(payload, remote).await?);
        }
        let socket = UdpSocket::bind(local.unwrap_or_else(|| unspecified_for(&remote))).await?;
        let sent = socket.send_to(payload, remote).await?;
        Ok(sent)
    }

    async fn listen_for_connection(&self, local: SocketAddr) -> AffixResult<BoxTcpServer> {
        let listener = TcpListener::bind(local).await?;
        tracing::debug!(address = %listener.local_addr()?, "TCP listener bound");
        Ok(Box::new(TokioTcpServer {
            listener,
            closed: CloseSignal::new(),
        }))
    }

    async fn listen_for_messages(&self, local: SocketAddr) -> AffixResult<BoxUdpServer> {
        let socket = Arc::new(UdpSocket::bind(local).await?);
        let bound = socket.local_addr()?;
        self.udp_listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(bound, Arc::downgrade(&socket));

        tracing::debug!(address = %bound, "UDP listener bound");
        Ok(Box::new(TokioUdpServer {
            socket,
            closed: CloseSignal::new(),
        }))
    }

    async fn local_ip(&self) -> AffixResult<IpAddr> {
        // Connecting a UDP socket only selects a route; nothing is sent.
        let socket = UdpSocket::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)).await?;
        socket.connect(ROUTE_TARGET).await?;
        Ok(socket.local_addr()?.ip())
    }

    async fn resolve_name(&self, name: &str) -> AffixResult<IpAddr> {
        let mut addrs = tokio::net::lookup_host((name, 0)).await?;
        addrs.next().map(|addr| addr.ip()).ok_or_else(|| {
            AffixError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no address found for {name}"),
            ))
        })
    }
}

/// One-shot close flag that pending operations can wait on.
#[derive(Debug)]
struct CloseSignal {
    tx: watch::Sender<bool>,
}

impl CloseSignal {
    fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    fn is_closed(&self) -> bool {
        *self.tx.borrow()
    }

    /// Mark closed. Returns true only for the call that actually closed it.
    fn close(&self) -> bool {
        !self.tx.send_replace(true)
    }

    async fn closed(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

/// Connected TCP handle.
#[derive(Debug)]
pub struct TokioSocket {
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
    closed: CloseSignal,
}

impl TokioSocket {
    pub fn new(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            closed: CloseSignal::new(),
        }
    }
}

#[async_trait]
impl Socket for TokioSocket {
    async fn send(&self, data: &[u8]) -> AffixResult<usize> {
        if self.closed.is_closed() {
            return Err(AffixError::SocketClosed);
        }
        let mut writer = self.writer.lock().await;
        writer.write_all(data).await?;
        Ok(data.len())
    }

    async fn recv(&self, max_len: usize) -> AffixResult<Vec<u8>> {
        if self.closed.is_closed() {
            return Err(AffixError::SocketClosed);
        }
        let mut reader = self.reader.lock().await;
        let mut buf = vec![0u8; max_len];
        tokio::select! {
            read = reader.read(&mut buf) => {
                buf.truncate(read?);
                Ok(buf)
            }
            _ = self.closed.closed() => Err(AffixError::SocketClosed),
        }
    }

    async fn close(&self) -> AffixResult<bool> {
        if !self.closed.close() {
            return Ok(false);
        }
        let mut writer = self.writer.lock().await;
        match writer.shutdown().await {
            Ok(()) => Ok(true),
            // The peer may already have torn the connection down.
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(true),
            Err(e) => Err(e.into()),
        }
    }
}

/// Listening TCP handle.
#[derive(Debug)]
pub struct TokioTcpServer {
    listener: TcpListener,
    closed: CloseSignal,
}

#[async_trait]
impl TcpServer for TokioTcpServer {
    async fn accept(&self) -> AffixResult<(SocketAddr, BoxSocket)> {
        if self.closed.is_closed() {
            return Err(AffixError::SocketClosed);
        }
        tokio::select! {
            accepted = self.listener.accept() => {
                let (stream, addr) = accepted?;
                Ok((addr, Box::new(TokioSocket::new(stream)) as BoxSocket))
            }
            _ = self.closed.closed() => Err(AffixError::SocketClosed),
        }
    }

    async fn close(&self) -> AffixResult<bool> {
        Ok(self.closed.close())
    }

    fn local_addr(&self) -> AffixResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

/// Listening UDP handle.
#[derive(Debug)]
pub struct TokioUdpServer {
    socket: Arc<UdpSocket>,
    closed: CloseSignal,
}

#[async_trait]
impl UdpServer for TokioUdpServer {
    async fn recv_message(&self) -> AffixResult<Datagram> {
        if self.closed.is_closed() {
            return Err(AffixError::SocketClosed);
        }
        let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
        tokio::select! {
            received = self.socket.recv_from(&mut buf) => {
                let (len, remote) = received?;
                buf.truncate(len);
                Ok(Datagram { remote, payload: buf })
            }
            _ = self.closed.closed() => Err(AffixError::SocketClosed),
        }
    }

    async fn close(&self) -> AffixResult<bool> {
        Ok(self.closed.close())
    }

    fn local_addr(&self) -> AffixResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}
