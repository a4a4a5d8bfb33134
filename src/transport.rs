//! The datagram channel abstraction and its default UDP backing.
//!
//! [`Session`](crate::session::Session) is generic over [`DatagramChannel`]
//! so the UDP binding stays a true external collaborator, the way
//! `turn-server/src/server/udp.rs` wraps a `tokio::net::UdpSocket` around
//! the TURN relay loop without the protocol core knowing the socket type.

use std::net::SocketAddr;

use tokio::net::UdpSocket;

/// Anything that can send and receive datagrams to/from a remote peer.
///
/// `bind` is async because real sockets require a syscall; `recv_from` is
/// the single suspension point a session's receive task blocks on.
#[async_trait::async_trait]
pub trait DatagramChannel: Send + Sync + Sized {
    async fn bind(local_addr: SocketAddr) -> std::io::Result<Self>;
    async fn send_to(&self, bytes: &[u8], remote_addr: SocketAddr) -> std::io::Result<usize>;
    async fn recv_from(&self, buf: &mut [u8]) -> std::io::Result<(usize, SocketAddr)>;
    fn close(&self);
}

/// The default [`DatagramChannel`], a thin wrapper over `tokio::net::UdpSocket`.
pub struct UdpChannel {
    socket: UdpSocket,
}

impl UdpChannel {
    /// The address the OS actually bound, useful when `bind` was given
    /// port 0. Not part of the [`DatagramChannel`] contract since not every
    /// backing transport has a queryable local address.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

#[async_trait::async_trait]
impl DatagramChannel for UdpChannel {
    async fn bind(local_addr: SocketAddr) -> std::io::Result<Self> {
        Ok(Self {
            socket: UdpSocket::bind(local_addr).await?,
        })
    }

    async fn send_to(&self, bytes: &[u8], remote_addr: SocketAddr) -> std::io::Result<usize> {
        self.socket.send_to(bytes, remote_addr).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> std::io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).await
    }

    fn close(&self) {
        // UdpSocket has no explicit close; dropping releases the fd. Nothing
        // to do here beyond documenting the contract for other channels.
    }
}
