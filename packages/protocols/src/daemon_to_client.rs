use std::sync::Arc;

use memngt_rpc::{ArgumentReader, Arguments, ContractHandler, HandlerError, Proxy};

use crate::{reply, NegotiationError};

pub const CONTRACT_NAME: &str = "memngt.DaemonToClient";

const GRANTED_MEMORY_SHARE_CHANGED: &str = "granted_memory_share_changed";
const ADDITIONAL_MEMORY_OFFERED: &str = "additional_memory_offered";

/// Notifications the daemon sends to a registered client. Amounts are in kilobytes.
#[mockall::automock]
pub trait DaemonToClient: Send + Sync {
    fn granted_memory_share_changed(&self, new_share_kb: u32) -> Result<(), NegotiationError>;
    /// Returns how much of the offer the client takes, negative when it wants no more offers.
    fn additional_memory_offered(&self, amount_kb: u32) -> Result<i32, NegotiationError>;
}

pub struct DaemonToClientHandler {
    inner: Arc<dyn DaemonToClient>,
}

impl DaemonToClientHandler {
    pub fn new(inner: Arc<dyn DaemonToClient>) -> Self {
        Self { inner }
    }
}

impl ContractHandler for DaemonToClientHandler {
    fn handle(&self, operation: &str, args: &mut ArgumentReader<'_>) -> Result<Vec<u8>, HandlerError> {
        match operation {
            GRANTED_MEMORY_SHARE_CHANGED => {
                let new_share_kb: u32 = args.next()?;
                args.finish()?;
                reply(self.inner.granted_memory_share_changed(new_share_kb))
            }
            ADDITIONAL_MEMORY_OFFERED => {
                let amount_kb: u32 = args.next()?;
                args.finish()?;
                reply(self.inner.additional_memory_offered(amount_kb))
            }
            _ => Err(HandlerError::UnknownOperation(operation.to_string())),
        }
    }
}

#[derive(Clone)]
pub struct DaemonToClientProxy {
    proxy: Proxy,
}

impl DaemonToClientProxy {
    pub fn new(proxy: Proxy) -> Self {
        Self { proxy }
    }
}

impl DaemonToClient for DaemonToClientProxy {
    fn granted_memory_share_changed(&self, new_share_kb: u32) -> Result<(), NegotiationError> {
        Ok(self.proxy.call(GRANTED_MEMORY_SHARE_CHANGED, Arguments::new().with(&new_share_kb)?)?)
    }

    fn additional_memory_offered(&self, amount_kb: u32) -> Result<i32, NegotiationError> {
        Ok(self.proxy.call(ADDITIONAL_MEMORY_OFFERED, Arguments::new().with(&amount_kb)?)?)
    }
}
