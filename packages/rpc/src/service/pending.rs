use std::{
    net::SocketAddr,
    sync::atomic::{AtomicU32, Ordering},
};

use async_std::channel::{bounded, Receiver, Sender};
use dashmap::{mapref::entry::Entry, DashMap};

use crate::msg::{MsgId, RpcResponse};

struct PendingCall {
    remote: SocketAddr,
    reply_tx: Sender<RpcResponse>,
}

/// Calls waiting for their response, keyed by message id.
///
/// Ids come from a counter, an id still pending is skipped, so two outstanding calls never share one.
pub(crate) struct PendingCalls {
    id_seed: AtomicU32,
    calls: DashMap<MsgId, PendingCall>,
}

impl PendingCalls {
    pub fn new(id_seed: u32) -> Self {
        Self {
            id_seed: AtomicU32::new(id_seed),
            calls: Default::default(),
        }
    }

    pub fn register(&self, remote: SocketAddr) -> (MsgId, Receiver<RpcResponse>) {
        let (reply_tx, reply_rx) = bounded(1);
        loop {
            let id = MsgId(self.id_seed.fetch_add(1, Ordering::Relaxed));
            if let Entry::Vacant(entry) = self.calls.entry(id) {
                entry.insert(PendingCall { remote, reply_tx });
                return (id, reply_rx);
            }
            log::debug!("[PendingCalls] id {} still pending, skip", id);
        }
    }

    /// Hands a response to its waiting caller. Only the first response for an id wins, returns false for the others.
    pub fn resolve(&self, from: SocketAddr, response: RpcResponse) -> bool {
        match self.calls.remove(&response.id) {
            Some((id, call)) => {
                if call.remote != from {
                    log::debug!("[PendingCalls] response {} came from {}, call was sent to {}", id, from, call.remote);
                }
                call.reply_tx.try_send(response).is_ok()
            }
            None => false,
        }
    }

    pub fn remove(&self, id: MsgId) {
        self.calls.remove(&id);
    }

    /// Drops every reply slot, waking their callers with a closed channel.
    pub fn clear(&self) {
        self.calls.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.calls.len()
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use crate::msg::{MsgId, RpcResponse};

    use super::PendingCalls;

    fn addr() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 1000))
    }

    fn response(id: MsgId, value: u8) -> RpcResponse {
        RpcResponse { id, result: Ok(vec![value]) }
    }

    #[test]
    fn first_response_wins() {
        let pending = PendingCalls::new(0);
        let (id, rx) = pending.register(addr());
        assert_eq!(pending.len(), 1);

        assert!(pending.resolve(addr(), response(id, 1)));
        assert!(!pending.resolve(addr(), response(id, 2)));
        assert_eq!(pending.len(), 0);
        assert_eq!(rx.try_recv(), Ok(response(id, 1)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn unknown_response_is_ignored() {
        let pending = PendingCalls::new(0);
        assert!(!pending.resolve(addr(), response(MsgId(5), 1)));
    }

    #[test]
    fn ids_skip_pending_ones() {
        let pending = PendingCalls::new(u32::MAX);
        let (first, _rx1) = pending.register(addr());
        assert_eq!(first, MsgId(u32::MAX));
        let (second, _rx2) = pending.register(addr());
        assert_eq!(second, MsgId(0));

        // force the counter back onto a pending id
        pending.id_seed.store(u32::MAX, std::sync::atomic::Ordering::Relaxed);
        let (third, _rx3) = pending.register(addr());
        assert_eq!(third, MsgId(1));
    }

    #[test]
    fn clear_wakes_callers() {
        let pending = PendingCalls::new(0);
        let (_, rx) = pending.register(addr());
        pending.clear();
        assert!(async_std::task::block_on(rx.recv()).is_err());
    }
}
