use std::{net::SocketAddr, sync::Arc};

use async_std::channel::Receiver;
use memngt_utils::error_handle::ErrorUtils;

use crate::{codec, msg::RpcMsg, packetizer::Packetizer, transport::DatagramTransport};

/// One message waiting in the outbound queue, with its destination.
pub(crate) type Outbound = (SocketAddr, RpcMsg);

/// Drains the outbound queue onto the socket. Runs on its own thread until the queue is closed and empty.
pub(crate) struct SenderLoop {
    rx: Receiver<Outbound>,
    transport: Arc<dyn DatagramTransport>,
    packetizer: Packetizer,
}

impl SenderLoop {
    pub fn new(rx: Receiver<Outbound>, transport: Arc<dyn DatagramTransport>, packetizer: Packetizer) -> Self {
        Self { rx, transport, packetizer }
    }

    pub fn run(mut self) {
        log::info!("[SenderLoop] started");
        while let Ok((dest, msg)) = async_std::task::block_on(self.rx.recv()) {
            self.send(dest, &msg);
        }
        log::info!("[SenderLoop] outbound queue closed, stopped");
    }

    fn send(&mut self, dest: SocketAddr, msg: &RpcMsg) {
        let buf = match codec::encode(msg) {
            Ok(buf) => buf,
            Err(e) => {
                log::error!("[SenderLoop] cannot encode {:?} {} to {}: {}", msg.kind(), msg.id(), dest, e);
                return;
            }
        };
        let packets = match self.packetizer.split(&buf) {
            Ok(packets) => packets,
            Err(e) => {
                log::error!("[SenderLoop] cannot split {:?} {} to {}: {}", msg.kind(), msg.id(), dest, e);
                return;
            }
        };
        log::debug!("[SenderLoop] send {:?} {} to {} in {} packets", msg.kind(), msg.id(), dest, packets.len());
        for packet in packets {
            self.transport.send_to(&packet, dest).print_error("Should send packet");
        }
    }
}
