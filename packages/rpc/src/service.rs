use std::{
    io,
    net::SocketAddr,
    sync::Arc,
    thread::{self, JoinHandle},
};

use async_std::channel::{bounded, unbounded, Sender};
use memngt_utils::{SystemTimer, Timer};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;

use crate::{
    config::RpcConfig,
    error::RpcError,
    msg::Arguments,
    packetizer::Packetizer,
    proxy::{CallOptions, Proxy},
    receiver::ReceiverLoop,
    registry::ContractHandler,
    sender::SenderLoop,
    transport::{DatagramTransport, UdpTransport},
};

mod cache;
mod pending;
mod state;
mod stats;

pub(crate) use state::ServiceCore;
pub use stats::RpcStats;

struct Workers {
    sender: JoinHandle<()>,
    receiver: JoinHandle<()>,
    sweeper: JoinHandle<()>,
    sweeper_stop: Sender<()>,
}

/// One RPC endpoint: a bound socket, the contracts it serves and the calls it makes.
///
/// Runs three threads: the sender loop, the receiver loop and the cache sweeper. Contract handlers run on the
/// receiver thread, one at a time, so a handler must not block on a call which needs this same service to answer.
pub struct RpcService {
    core: Arc<ServiceCore>,
    local_addr: SocketAddr,
    workers: Mutex<Option<Workers>>,
}

impl RpcService {
    /// Binds a udp socket on `config.bind_addr` and starts the service on it.
    pub fn new(config: RpcConfig) -> Result<Self, RpcError> {
        config.validate()?;
        let transport = UdpTransport::bind(config.bind_addr, config.read_timeout())?;
        Self::with_transport(config, Arc::new(transport), Arc::new(SystemTimer()))
    }

    pub fn with_transport(config: RpcConfig, transport: Arc<dyn DatagramTransport>, timer: Arc<dyn Timer>) -> Result<Self, RpcError> {
        Self::start(config, transport, timer, &spawn_thread)
    }

    fn start(config: RpcConfig, transport: Arc<dyn DatagramTransport>, timer: Arc<dyn Timer>, spawner: &Spawner) -> Result<Self, RpcError> {
        config.validate()?;
        let local_addr = transport.local_addr()?;
        let (outbound_tx, outbound_rx) = unbounded();
        let packetizer = Packetizer::new(config.max_chunk_len, rand::random());
        let sweep_interval = config.cache_sweep_interval();
        let core = Arc::new(ServiceCore::new(config, timer, outbound_tx, rand::random()));

        let sender_loop = SenderLoop::new(outbound_rx, transport.clone(), packetizer);
        let sender = spawn(spawner, &core, "memngt-rpc-sender", Box::new(move || sender_loop.run()))?;

        let receiver_loop = ReceiverLoop::new(core.clone(), transport);
        let receiver = match spawn(spawner, &core, "memngt-rpc-receiver", Box::new(move || receiver_loop.run())) {
            Ok(receiver) => receiver,
            Err(e) => {
                join("sender", sender);
                return Err(e);
            }
        };

        let (sweeper_stop, stop_rx) = bounded::<()>(1);
        let sweeper_core = core.clone();
        let sweeper_loop = move || {
            log::info!("[CacheSweeper] started, period {:?}", sweep_interval);
            // any outcome other than a timeout means the stop channel was closed
            while async_std::task::block_on(async_std::future::timeout(sweep_interval, stop_rx.recv())).is_err() {
                sweeper_core.sweep_cache();
            }
            log::info!("[CacheSweeper] stopped");
        };
        let sweeper = match spawn(spawner, &core, "memngt-rpc-sweeper", Box::new(sweeper_loop)) {
            Ok(sweeper) => sweeper,
            Err(e) => {
                join("sender", sender);
                join("receiver", receiver);
                return Err(e);
            }
        };

        log::info!("[RpcService] started on {}", local_addr);
        Ok(Self {
            core,
            local_addr,
            workers: Mutex::new(Some(Workers {
                sender,
                receiver,
                sweeper,
                sweeper_stop,
            })),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves `contract` with `handler`. A contract has at most one handler, a second registration fails and keeps
    /// the first one.
    pub fn register_handler(&self, contract: &str, handler: Arc<dyn ContractHandler>) -> Result<(), RpcError> {
        self.core.register_handler(contract, handler)
    }

    pub fn unregister_handler(&self, contract: &str) -> bool {
        self.core.unregister_handler(contract)
    }

    pub fn create_proxy(&self, remote: SocketAddr, contract: &str) -> Proxy {
        Proxy::new(self.core.clone(), remote, contract)
    }

    /// Calls `operation` of `contract` on `remote` and decodes its return value.
    pub fn invoke<R: DeserializeOwned>(&self, remote: SocketAddr, contract: &str, operation: &str, args: Arguments, options: &CallOptions) -> Result<R, RpcError> {
        let raw = self.core.invoke(remote, contract, operation, args, options)?;
        crate::proxy::decode_return(&raw)
    }

    pub fn stats(&self) -> RpcStats {
        self.core.stats()
    }

    /// Runs one cache sweep now, in addition to the periodic one.
    pub fn sweep_cache(&self) -> usize {
        self.core.sweep_cache()
    }

    /// Stops the service: pending calls fail with `ShuttingDown`, queued messages are still sent, then every worker
    /// thread is joined. Calling it again does nothing.
    pub fn shutdown(&self) {
        let workers = match self.workers.lock().take() {
            Some(workers) => workers,
            None => return,
        };
        log::info!("[RpcService] shutdown {}", self.local_addr);
        self.core.begin_shutdown();
        join("sender", workers.sender);
        join("receiver", workers.receiver);
        workers.sweeper_stop.close();
        join("sweeper", workers.sweeper);
        log::info!("[RpcService] shutdown {} done", self.local_addr);
    }
}

impl Drop for RpcService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

type Worker = Box<dyn FnOnce() + Send>;
type Spawner = dyn Fn(&str, Worker) -> io::Result<JoinHandle<()>>;

fn spawn_thread(name: &str, worker: Worker) -> io::Result<JoinHandle<()>> {
    thread::Builder::new().name(name.to_string()).spawn(worker)
}

/// Spawns a worker thread. On failure the service is shut down, so the workers already running stop and can be
/// joined by the caller.
fn spawn(spawner: &Spawner, core: &ServiceCore, name: &str, worker: Worker) -> Result<JoinHandle<()>, RpcError> {
    spawner(name, worker).map_err(|e| {
        log::error!("[RpcService] cannot spawn {} thread: {}", name, e);
        core.begin_shutdown();
        RpcError::Io(e)
    })
}

fn join(name: &str, handle: JoinHandle<()>) {
    if handle.join().is_err() {
        log::error!("[RpcService] {} thread panicked", name);
    }
}
