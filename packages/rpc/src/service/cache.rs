use std::net::SocketAddr;

use dashmap::{mapref::entry::Entry, DashMap};

use crate::msg::{MsgId, RpcResponse};

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub(crate) struct CacheKey(pub SocketAddr, pub MsgId);

enum CacheSlot {
    /// The request is being executed right now.
    Running,
    Ready { created_at: u64, response: RpcResponse },
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Claim {
    /// Caller owns the id now and must either `complete` or `release` it.
    Claimed,
    Running,
    Cached(RpcResponse),
}

/// Serving side record of executed requests, keyed by caller address and message id.
/// Once a response is stored for a key it is never replaced until removed.
#[derive(Default)]
pub(crate) struct ResponseCache {
    slots: DashMap<CacheKey, CacheSlot>,
}

impl ResponseCache {
    pub fn claim(&self, key: CacheKey) -> Claim {
        match self.slots.entry(key) {
            Entry::Occupied(entry) => match entry.get() {
                CacheSlot::Running => Claim::Running,
                CacheSlot::Ready { response, .. } => Claim::Cached(response.clone()),
            },
            Entry::Vacant(entry) => {
                entry.insert(CacheSlot::Running);
                Claim::Claimed
            }
        }
    }

    pub fn complete(&self, key: CacheKey, now_ms: u64, response: RpcResponse) {
        self.slots.insert(key, CacheSlot::Ready { created_at: now_ms, response });
    }

    /// Drops a claim without a response, so a later retransmission executes again.
    pub fn release(&self, key: &CacheKey) {
        self.slots.remove_if(key, |_, slot| matches!(slot, CacheSlot::Running));
    }

    pub fn remove(&self, key: &CacheKey) -> bool {
        self.slots.remove_if(key, |_, slot| matches!(slot, CacheSlot::Ready { .. })).is_some()
    }

    /// Removes every response created more than `max_age_ms` before `now_ms`, returns how many.
    pub fn sweep(&self, now_ms: u64, max_age_ms: u64) -> usize {
        let before = self.slots.len();
        self.slots.retain(|_, slot| match slot {
            CacheSlot::Running => true,
            CacheSlot::Ready { created_at, .. } => *created_at + max_age_ms >= now_ms,
        });
        before.saturating_sub(self.slots.len())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }
}
