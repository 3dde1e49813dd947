use std::{
    collections::HashMap,
    io,
    net::SocketAddr,
    sync::{
        atomic::{AtomicU16, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use async_std::channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};

use super::DatagramTransport;

/// Decides per datagram whether it is delivered: `(from, to, datagram) -> deliver`.
pub type DatagramFilter = Box<dyn FnMut(SocketAddr, SocketAddr, &[u8]) -> bool + Send>;

/// In-process datagram network, lets a test run several services and lose datagrams on purpose.
pub struct VnetEarth {
    port_seed: AtomicU16,
    sockets: RwLock<HashMap<SocketAddr, Sender<(SocketAddr, Vec<u8>)>>>,
    filter: Mutex<Option<DatagramFilter>>,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl Default for VnetEarth {
    fn default() -> Self {
        Self {
            port_seed: AtomicU16::new(10000),
            sockets: Default::default(),
            filter: Mutex::new(None),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }
}

impl VnetEarth {
    /// Binds a socket on a fresh 127.0.0.1 port.
    pub fn create_socket(self: &Arc<Self>, read_timeout: Duration) -> VnetSocket {
        let addr = SocketAddr::from(([127, 0, 0, 1], self.port_seed.fetch_add(1, Ordering::Relaxed)));
        let (tx, rx) = unbounded();
        self.sockets.write().insert(addr, tx);
        VnetSocket {
            addr,
            earth: self.clone(),
            rx,
            read_timeout,
        }
    }

    pub fn set_filter(&self, filter: DatagramFilter) {
        self.filter.lock().replace(filter);
    }

    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn deliver(&self, from: SocketAddr, to: SocketAddr, buf: &[u8]) {
        if let Some(filter) = self.filter.lock().as_mut() {
            if !filter(from, to, buf) {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        // like udp, a datagram to an unbound port is silently lost
        match self.sockets.read().get(&to) {
            Some(tx) if tx.try_send((from, buf.to_vec())).is_ok() => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
            }
            _ => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn unbind(&self, addr: &SocketAddr) {
        self.sockets.write().remove(addr);
    }
}

pub struct VnetSocket {
    addr: SocketAddr,
    earth: Arc<VnetEarth>,
    rx: Receiver<(SocketAddr, Vec<u8>)>,
    read_timeout: Duration,
}

impl DatagramTransport for VnetSocket {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.addr)
    }

    fn send_to(&self, buf: &[u8], dest: SocketAddr) -> io::Result<usize> {
        self.earth.deliver(self.addr, dest, buf);
        Ok(buf.len())
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        let res = async_std::task::block_on(async_std::future::timeout(self.read_timeout, self.rx.recv()));
        match res {
            Ok(Ok((from, data))) => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                Ok(Some((len, from)))
            }
            Ok(Err(_)) => Err(io::Error::new(io::ErrorKind::NotConnected, "vnet socket closed")),
            Err(_) => Ok(None),
        }
    }
}

impl Drop for VnetSocket {
    fn drop(&mut self) {
        self.earth.unbind(&self.addr);
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use crate::transport::DatagramTransport;

    use super::VnetEarth;

    #[test]
    fn deliver_between_sockets() {
        let earth = Arc::new(VnetEarth::default());
        let sock1 = earth.create_socket(Duration::from_millis(10));
        let sock2 = earth.create_socket(Duration::from_millis(10));
        assert_ne!(sock1.local_addr().unwrap(), sock2.local_addr().unwrap());

        sock1.send_to(&[1, 2, 3], sock2.local_addr().unwrap()).unwrap();
        let mut buf = [0; 16];
        let (len, from) = sock2.recv_from(&mut buf).unwrap().expect("Should receive");
        assert_eq!(&buf[..len], &[1, 2, 3]);
        assert_eq!(from, sock1.local_addr().unwrap());
        assert!(sock2.recv_from(&mut buf).unwrap().is_none());
        assert_eq!(earth.delivered_count(), 1);
    }

    #[test]
    fn filter_drops_datagrams() {
        let earth = Arc::new(VnetEarth::default());
        let sock1 = earth.create_socket(Duration::from_millis(10));
        let sock2 = earth.create_socket(Duration::from_millis(10));
        let mut remain_drop = 2;
        earth.set_filter(Box::new(move |_, _, _| {
            if remain_drop > 0 {
                remain_drop -= 1;
                false
            } else {
                true
            }
        }));

        for i in 0..3u8 {
            sock1.send_to(&[i], sock2.local_addr().unwrap()).unwrap();
        }
        let mut buf = [0; 16];
        let (len, _) = sock2.recv_from(&mut buf).unwrap().expect("Should receive");
        assert_eq!(&buf[..len], &[2]);
        assert_eq!(earth.dropped_count(), 2);
    }

    #[test]
    fn unbound_destination_is_lost() {
        let earth = Arc::new(VnetEarth::default());
        let sock1 = earth.create_socket(Duration::from_millis(10));
        let addr2 = {
            let sock2 = earth.create_socket(Duration::from_millis(10));
            sock2.local_addr().unwrap()
        };
        assert_eq!(sock1.send_to(&[1], addr2).unwrap(), 1);
        assert_eq!(earth.dropped_count(), 1);
    }
}
