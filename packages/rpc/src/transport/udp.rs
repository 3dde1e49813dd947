use std::{
    io,
    net::{SocketAddr, UdpSocket},
    time::Duration,
};

use super::DatagramTransport;

pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    pub fn bind(addr: SocketAddr, read_timeout: Duration) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(read_timeout))?;
        log::info!("[UdpTransport] bound to {}", socket.local_addr()?);
        Ok(Self { socket })
    }
}

impl DatagramTransport for UdpTransport {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    fn send_to(&self, buf: &[u8], dest: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(buf, dest)
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        match self.socket.recv_from(buf) {
            Ok(res) => Ok(Some(res)),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        log::info!("[UdpTransport] close {:?}", self.socket.local_addr());
    }
}
