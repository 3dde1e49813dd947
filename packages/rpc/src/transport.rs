use std::{io, net::SocketAddr};

mod udp;
mod vnet;

pub use udp::UdpTransport;
pub use vnet::{DatagramFilter, VnetEarth, VnetSocket};

/// Raw datagram access used by the sender and receiver loops.
///
/// Both loops share one transport, so all methods take `&self`.
#[mockall::automock]
pub trait DatagramTransport: Send + Sync {
    fn local_addr(&self) -> io::Result<SocketAddr>;
    fn send_to(&self, buf: &[u8], dest: SocketAddr) -> io::Result<usize>;
    /// Blocks until a datagram arrives or the read timeout elapses.
    ///
    /// # Returns
    ///
    /// * `Ok(Some((len, from)))`: a datagram of `len` bytes was written into `buf`.
    /// * `Ok(None)`: the read timeout elapsed, nothing was received.
    fn recv_from(&self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>>;
}
