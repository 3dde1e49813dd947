use std::{net::SocketAddr, sync::Arc, time::Duration};

use serde::de::DeserializeOwned;

use crate::{error::RpcError, msg::Arguments, service::ServiceCore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Give up with `DeadlineExceeded` after this long. `None` retransmits until a response or shutdown.
    pub deadline: Option<Duration>,
}

impl CallOptions {
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Caller side handle of one remote contract. Typed per-contract proxies wrap this.
#[derive(Clone)]
pub struct Proxy {
    core: Arc<ServiceCore>,
    remote: SocketAddr,
    contract: String,
    options: CallOptions,
}

impl Proxy {
    pub(crate) fn new(core: Arc<ServiceCore>, remote: SocketAddr, contract: &str) -> Self {
        Self {
            core,
            remote,
            contract: contract.to_string(),
            options: CallOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CallOptions) -> Self {
        self.options = options;
        self
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    pub fn contract(&self) -> &str {
        &self.contract
    }

    /// Blocks until the remote answers. A failure raised by the operation comes back as `RpcError::Remote`.
    pub fn call<R: DeserializeOwned>(&self, operation: &str, args: Arguments) -> Result<R, RpcError> {
        let raw = self.core.invoke(self.remote, &self.contract, operation, args, &self.options)?;
        decode_return(&raw)
    }
}

pub(crate) fn decode_return<R: DeserializeOwned>(raw: &[u8]) -> Result<R, RpcError> {
    bincode::deserialize(raw).map_err(|e| RpcError::UnexpectedReturn(format!("{} bytes as {}: {}", raw.len(), std::any::type_name::<R>(), e)))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::error::RpcError;

    use super::{decode_return, CallOptions};

    #[test]
    fn options_default_has_no_deadline() {
        assert_eq!(CallOptions::default().deadline, None);
        let options = CallOptions::default().with_deadline(Duration::from_secs(1));
        assert_eq!(options.deadline, Some(Duration::from_secs(1)));
    }

    #[test]
    fn return_value_type_mismatch() {
        let raw = bincode::serialize(&1u8).unwrap();
        assert_eq!(decode_return::<u8>(&raw).unwrap(), 1);
        assert!(matches!(decode_return::<u64>(&raw), Err(RpcError::UnexpectedReturn(_))));
    }
}
