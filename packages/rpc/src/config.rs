use std::{net::SocketAddr, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    error::RpcError,
    packetizer::{DEFAULT_MAX_CHUNK_LEN, METADATA_LEN},
};

/// Largest udp payload over ipv4.
pub const MAX_DATAGRAM_LEN: usize = 65_507;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcConfig {
    pub bind_addr: SocketAddr,
    /// How long a caller waits for a response before sending the request again.
    pub retransmit_interval_ms: u64,
    /// Period of the cache sweep, also the age after which a cached response is dropped.
    pub cache_sweep_interval_ms: u64,
    /// Socket read timeout, bounds how long the receiver loop takes to notice shutdown.
    pub read_timeout_ms: u64,
    pub max_chunk_len: usize,
    /// Incomplete multi-packet messages are dropped after this long.
    pub reassembly_timeout_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            retransmit_interval_ms: 100,
            cache_sweep_interval_ms: 10_000,
            read_timeout_ms: 100,
            max_chunk_len: DEFAULT_MAX_CHUNK_LEN,
            reassembly_timeout_ms: 3_000,
        }
    }
}

impl RpcConfig {
    pub fn with_bind_addr(mut self, bind_addr: SocketAddr) -> Self {
        self.bind_addr = bind_addr;
        self
    }

    /// Checks the values the service cannot run with.
    pub fn validate(&self) -> Result<(), RpcError> {
        if self.max_chunk_len == 0 {
            return Err(RpcError::InvalidConfig("max_chunk_len must not be zero".to_string()));
        }
        if self.max_chunk_len > MAX_DATAGRAM_LEN - METADATA_LEN {
            return Err(RpcError::InvalidConfig(format!(
                "max_chunk_len {} plus {} bytes of metadata does not fit in a {} bytes datagram",
                self.max_chunk_len, METADATA_LEN, MAX_DATAGRAM_LEN
            )));
        }
        Ok(())
    }

    pub fn retransmit_interval(&self) -> Duration {
        Duration::from_millis(self.retransmit_interval_ms.max(1))
    }

    pub fn cache_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.cache_sweep_interval_ms.max(1))
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.max(1))
    }
}
