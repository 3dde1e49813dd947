use std::{net::SocketAddr, sync::Arc};

use crate::{codec, msg::RpcMsg, packetizer::Reassembler, service::ServiceCore, transport::DatagramTransport};

/// Largest datagram udp can carry.
const RECV_BUF_LEN: usize = 65_536;

/// Reads the socket, rebuilds messages and hands them to the service core.
/// Checks the shutdown flag after every read, so it stops within one read timeout.
pub(crate) struct ReceiverLoop {
    core: Arc<ServiceCore>,
    transport: Arc<dyn DatagramTransport>,
    reassembler: Reassembler,
}

impl ReceiverLoop {
    pub fn new(core: Arc<ServiceCore>, transport: Arc<dyn DatagramTransport>) -> Self {
        let reassembler = Reassembler::new(core.config().reassembly_timeout_ms);
        Self { core, transport, reassembler }
    }

    pub fn run(mut self) {
        log::info!("[ReceiverLoop] started");
        let mut buf = vec![0; RECV_BUF_LEN];
        while !self.core.is_shutdown() {
            self.reassembler.on_tick(self.core.now_ms());
            match self.transport.recv_from(&mut buf) {
                Ok(Some((len, from))) => self.on_packet(from, &buf[..len]),
                Ok(None) => {}
                Err(e) => {
                    log::error!("[ReceiverLoop] receive error {:?}", e);
                    std::thread::sleep(self.core.config().read_timeout());
                }
            }
        }
        log::info!("[ReceiverLoop] shutdown flag set, stopped");
    }

    fn on_packet(&mut self, from: SocketAddr, packet: &[u8]) {
        let payload = match self.reassembler.on_packet(self.core.now_ms(), from, packet) {
            Ok(Some(payload)) => payload,
            Ok(None) => return,
            Err(e) => {
                log::warn!("[ReceiverLoop] drop invalid packet from {}: {}", from, e);
                self.core.on_dropped_message();
                return;
            }
        };

        match codec::decode(&payload) {
            Ok(msg) => {
                log::debug!("[ReceiverLoop] received {:?} {} from {}", msg.kind(), msg.id(), from);
                match msg {
                    RpcMsg::Request(req) => self.core.handle_incoming_request(from, req),
                    RpcMsg::Response(res) => self.core.handle_incoming_response(from, res),
                    RpcMsg::Cleanup(cleanup) => self.core.handle_incoming_cleanup(from, cleanup),
                }
            }
            Err(e) => {
                log::warn!("[ReceiverLoop] drop undecodable message of {} bytes from {}: {}", payload.len(), from, e);
                self.core.on_dropped_message();
            }
        }
    }
}
