use std::sync::atomic::{AtomicU32, Ordering};

use memngt_protocols::{ClientToDaemon, DaemonToClient, NegotiationError};

/// Demo client: remembers its granted share and takes offered memory until it has what it asked for.
pub struct InMemoryClient {
    request_kb: u32,
    share_kb: AtomicU32,
    wanted_kb: AtomicU32,
}

impl InMemoryClient {
    pub fn new(request_kb: u32) -> Self {
        Self {
            request_kb,
            share_kb: AtomicU32::new(0),
            wanted_kb: AtomicU32::new(request_kb),
        }
    }

    pub fn share_kb(&self) -> u32 {
        self.share_kb.load(Ordering::SeqCst)
    }

    /// Registers with the daemon, asks for extra memory, and hands half of it back when granted.
    pub fn negotiate(&self, to_daemon: &dyn ClientToDaemon, client_name: &str, pid: u32, rpc_port: u16) -> Result<(), NegotiationError> {
        let share = to_daemon.register_client(client_name.to_string(), pid, rpc_port)?;
        self.share_kb.store(share, Ordering::SeqCst);
        log::info!("[Client] registered as {} pid {}, share {} kb", client_name, pid, share);

        if self.request_kb == 0 {
            return Ok(());
        }
        if to_daemon.request_additional_memory(pid, self.request_kb)? {
            self.wanted_kb.store(0, Ordering::SeqCst);
            log::info!("[Client] granted additional {} kb", self.request_kb);
            to_daemon.relinquish_memory(pid, self.request_kb / 2)?;
            log::info!("[Client] relinquished {} kb", self.request_kb / 2);
        } else {
            log::info!("[Client] additional {} kb refused, waiting for offers", self.request_kb);
        }
        Ok(())
    }
}

impl DaemonToClient for InMemoryClient {
    fn granted_memory_share_changed(&self, new_share_kb: u32) -> Result<(), NegotiationError> {
        let old = self.share_kb.swap(new_share_kb, Ordering::SeqCst);
        log::info!("[Client] share changed {} kb -> {} kb", old, new_share_kb);
        Ok(())
    }

    fn additional_memory_offered(&self, amount_kb: u32) -> Result<i32, NegotiationError> {
        let wanted = self.wanted_kb.load(Ordering::SeqCst);
        if wanted == 0 {
            return Ok(-1);
        }
        let take = wanted.min(amount_kb).min(i32::MAX as u32);
        self.wanted_kb.fetch_sub(take, Ordering::SeqCst);
        log::info!("[Client] offered {} kb, take {} kb", amount_kb, take);
        Ok(take as i32)
    }
}
