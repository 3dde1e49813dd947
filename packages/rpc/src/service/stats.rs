use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Snapshot of the service counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcStats {
    pub requests_executed: u64,
    pub responses_resent_from_cache: u64,
    pub retransmissions: u64,
    pub dropped_messages: u64,
    pub dispatch_errors: u64,
}

#[derive(Default)]
pub(crate) struct StatsCounters {
    pub requests_executed: AtomicU64,
    pub responses_resent_from_cache: AtomicU64,
    pub retransmissions: AtomicU64,
    pub dropped_messages: AtomicU64,
    pub dispatch_errors: AtomicU64,
}

impl StatsCounters {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RpcStats {
        RpcStats {
            requests_executed: self.requests_executed.load(Ordering::Relaxed),
            responses_resent_from_cache: self.responses_resent_from_cache.load(Ordering::Relaxed),
            retransmissions: self.retransmissions.load(Ordering::Relaxed),
            dropped_messages: self.dropped_messages.load(Ordering::Relaxed),
            dispatch_errors: self.dispatch_errors.load(Ordering::Relaxed),
        }
    }
}
