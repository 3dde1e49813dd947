use std::{
    collections::HashMap,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
    thread::JoinHandle,
};

use async_std::channel::{unbounded, Receiver, Sender};
use memngt_protocols::{daemon_to_client, ClientToDaemon, DaemonToClient, DaemonToClientProxy, NegotiationError};
use memngt_rpc::{CallOptions, RpcService};
use parking_lot::Mutex;

enum Notification {
    ShareChanged { pid: u32 },
    /// Memory given back by `from_pid`, offered to the other clients.
    Offer { from_pid: u32, amount_kb: u32 },
}

struct ClientEntry {
    name: String,
    addr: SocketAddr,
    granted_kb: u32,
    wants_offers: bool,
}

struct DaemonState {
    free_kb: u32,
    clients: HashMap<u32, ClientEntry>,
}

/// Demo daemon: a fixed pool shared between registered clients.
///
/// Calls back to clients happen on a separate notifier thread, since a contract handler runs on the receiver thread
/// of the service and cannot wait there for a client response.
pub struct InMemoryDaemon {
    client_share_kb: u32,
    notify_options: CallOptions,
    state: Mutex<DaemonState>,
    notify_tx: Sender<Notification>,
    notifier: Mutex<Option<JoinHandle<()>>>,
}

impl InMemoryDaemon {
    /// `notify_options` applies to every call back to a client, a client which went away must not stall the others.
    pub fn start(service: Arc<RpcService>, total_kb: u32, client_share_kb: u32, notify_options: CallOptions) -> std::io::Result<Arc<Self>> {
        let (notify_tx, notify_rx) = unbounded();
        let daemon = Arc::new(Self {
            client_share_kb,
            notify_options,
            state: Mutex::new(DaemonState {
                free_kb: total_kb,
                clients: HashMap::new(),
            }),
            notify_tx,
            notifier: Mutex::new(None),
        });
        let daemon_c = daemon.clone();
        let handle = std::thread::Builder::new().name("memngt-daemon-notifier".to_string()).spawn(move || daemon_c.run_notifier(service, notify_rx))?;
        daemon.notifier.lock().replace(handle);
        Ok(daemon)
    }

    pub fn stop(&self) {
        self.notify_tx.close();
        if let Some(handle) = self.notifier.lock().take() {
            if handle.join().is_err() {
                log::error!("[Daemon] notifier thread panicked");
            }
        }
    }

    pub fn free_kb(&self) -> u32 {
        self.state.lock().free_kb
    }

    #[cfg(test)]
    pub fn granted_kb(&self, pid: u32) -> Option<u32> {
        self.state.lock().clients.get(&pid).map(|c| c.granted_kb)
    }

    fn notify(&self, notification: Notification) {
        if self.notify_tx.try_send(notification).is_err() {
            log::warn!("[Daemon] notifier stopped, drop notification");
        }
    }

    fn run_notifier(&self, service: Arc<RpcService>, notify_rx: Receiver<Notification>) {
        log::info!("[Daemon] notifier started");
        while let Ok(notification) = async_std::task::block_on(notify_rx.recv()) {
            match notification {
                Notification::ShareChanged { pid } => self.send_share(&service, pid),
                Notification::Offer { from_pid, amount_kb } => self.offer(&service, from_pid, amount_kb),
            }
        }
        log::info!("[Daemon] notifier stopped");
    }

    fn client_proxy(&self, service: &RpcService, addr: SocketAddr) -> DaemonToClientProxy {
        DaemonToClientProxy::new(service.create_proxy(addr, daemon_to_client::CONTRACT_NAME).with_options(self.notify_options))
    }

    fn send_share(&self, service: &RpcService, pid: u32) {
        let (addr, share) = match self.state.lock().clients.get(&pid) {
            Some(client) => (client.addr, client.granted_kb),
            None => return,
        };
        if let Err(e) = self.client_proxy(service, addr).granted_memory_share_changed(share) {
            log::warn!("[Daemon] cannot notify pid {} of share {} kb: {}", pid, share, e);
        }
    }

    fn offer(&self, service: &RpcService, from_pid: u32, amount_kb: u32) {
        let candidates: Vec<(u32, SocketAddr)> = self
            .state
            .lock()
            .clients
            .iter()
            .filter(|(pid, client)| **pid != from_pid && client.wants_offers)
            .map(|(pid, client)| (*pid, client.addr))
            .collect();

        for (pid, addr) in candidates {
            let available = self.free_kb().min(amount_kb);
            if available == 0 {
                return;
            }
            match self.client_proxy(service, addr).additional_memory_offered(available) {
                Ok(taken) if taken < 0 => {
                    if let Some(client) = self.state.lock().clients.get_mut(&pid) {
                        client.wants_offers = false;
                    }
                }
                Ok(0) => {}
                Ok(taken) => {
                    let granted = {
                        let mut state = self.state.lock();
                        let taken = (taken as u32).min(state.free_kb);
                        state.free_kb -= taken;
                        if let Some(client) = state.clients.get_mut(&pid) {
                            client.granted_kb += taken;
                        }
                        taken
                    };
                    log::info!("[Daemon] pid {} took {} kb of the offer", pid, granted);
                    self.send_share(service, pid);
                    return;
                }
                Err(e) => log::warn!("[Daemon] offer to pid {} failed: {}", pid, e),
            }
        }
    }
}

impl ClientToDaemon for InMemoryDaemon {
    fn register_client(&self, client_name: String, pid: u32, rpc_port: u16) -> Result<u32, NegotiationError> {
        let mut state = self.state.lock();
        if let Some(existing) = state.clients.get(&pid) {
            return Err(NegotiationError::Rejected(format!("pid {} already registered as {}", pid, existing.name)));
        }
        let granted_kb = self.client_share_kb.min(state.free_kb);
        state.free_kb -= granted_kb;
        state.clients.insert(
            pid,
            ClientEntry {
                name: client_name.clone(),
                // clients run on the same host as the daemon
                addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), rpc_port),
                granted_kb,
                wants_offers: true,
            },
        );
        log::info!("[Daemon] registered {} pid {} port {}, share {} kb, free {} kb", client_name, pid, rpc_port, granted_kb, state.free_kb);
        Ok(granted_kb)
    }

    fn request_additional_memory(&self, pid: u32, amount_kb: u32) -> Result<bool, NegotiationError> {
        let mut state = self.state.lock();
        let free_kb = state.free_kb;
        let client = state.clients.get_mut(&pid).ok_or_else(|| NegotiationError::Rejected(format!("pid {} is not registered", pid)))?;
        if free_kb < amount_kb {
            log::info!("[Daemon] pid {} asks {} kb, only {} kb free", pid, amount_kb, free_kb);
            return Ok(false);
        }
        client.granted_kb += amount_kb;
        state.free_kb -= amount_kb;
        drop(state);
        self.notify(Notification::ShareChanged { pid });
        Ok(true)
    }

    fn relinquish_memory(&self, pid: u32, amount_kb: u32) -> Result<(), NegotiationError> {
        let mut state = self.state.lock();
        let client = state.clients.get_mut(&pid).ok_or_else(|| NegotiationError::Rejected(format!("pid {} is not registered", pid)))?;
        if client.granted_kb < amount_kb {
            return Err(NegotiationError::Rejected(format!("pid {} holds only {} kb", pid, client.granted_kb)));
        }
        client.granted_kb -= amount_kb;
        state.free_kb += amount_kb;
        drop(state);
        self.notify(Notification::ShareChanged { pid });
        self.notify(Notification::Offer { from_pid: pid, amount_kb });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        net::SocketAddr,
        sync::Arc,
        time::{Duration, Instant},
    };

    use memngt_protocols::{client_to_daemon, daemon_to_client, ClientToDaemon, ClientToDaemonHandler, ClientToDaemonProxy, DaemonToClientHandler, NegotiationError};
    use memngt_rpc::{CallOptions, RpcConfig, RpcService};

    use crate::client::InMemoryClient;

    use super::InMemoryDaemon;

    fn service() -> Arc<RpcService> {
        let config = RpcConfig::default().with_bind_addr(SocketAddr::from(([127, 0, 0, 1], 0)));
        Arc::new(RpcService::new(config).expect("Should bind"))
    }

    fn notify_options() -> CallOptions {
        CallOptions::default().with_deadline(Duration::from_millis(200))
    }

    fn wait_until(cond: impl Fn() -> bool) -> bool {
        let started = Instant::now();
        while started.elapsed() < Duration::from_secs(3) {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn pool_accounting() {
        let daemon_service = service();
        let daemon = InMemoryDaemon::start(daemon_service.clone(), 1000, 400, notify_options()).unwrap();
        // nobody listens on these ports, notifications just fail
        assert_eq!(daemon.register_client("a".to_string(), 1, 9), Ok(400));
        assert!(matches!(daemon.register_client("a".to_string(), 1, 9), Err(NegotiationError::Rejected(_))));
        assert_eq!(daemon.register_client("b".to_string(), 2, 9), Ok(400));
        assert_eq!(daemon.register_client("c".to_string(), 3, 9), Ok(200));
        assert_eq!(daemon.free_kb(), 0);

        assert_eq!(daemon.request_additional_memory(1, 10), Ok(false));
        assert!(matches!(daemon.request_additional_memory(9, 10), Err(NegotiationError::Rejected(_))));
        assert!(matches!(daemon.relinquish_memory(3, 300), Err(NegotiationError::Rejected(_))));
        assert_eq!(daemon.relinquish_memory(3, 200), Ok(()));
        assert_eq!(daemon.granted_kb(3), Some(0));
        assert_eq!(daemon.free_kb(), 200);

        daemon_service.shutdown();
        daemon.stop();
    }

    #[test]
    fn client_takes_released_memory() {
        let daemon_service = service();
        let daemon = InMemoryDaemon::start(daemon_service.clone(), 1000, 500, notify_options()).unwrap();
        daemon_service.register_handler(client_to_daemon::CONTRACT_NAME, Arc::new(ClientToDaemonHandler::new(daemon.clone()))).unwrap();

        let client_service = service();
        let client = Arc::new(InMemoryClient::new(300));
        client_service.register_handler(daemon_to_client::CONTRACT_NAME, Arc::new(DaemonToClientHandler::new(client.clone()))).unwrap();
        let to_daemon = ClientToDaemonProxy::new(client_service.create_proxy(daemon_service.local_addr(), client_to_daemon::CONTRACT_NAME));

        // a first client holds the other half of the pool
        assert_eq!(daemon.register_client("holder".to_string(), 1, 9), Ok(500));
        // pool is empty, the request is refused and the client waits for offers
        client.negotiate(&to_daemon, "demo", 2, client_service.local_addr().port()).unwrap();
        assert_eq!(client.share_kb(), 500);

        daemon.relinquish_memory(1, 200).unwrap();
        assert!(wait_until(|| client.share_kb() == 700));
        assert_eq!(daemon.granted_kb(2), Some(700));
        assert_eq!(daemon.free_kb(), 0);

        client_service.shutdown();
        daemon_service.shutdown();
        daemon.stop();
    }
}
