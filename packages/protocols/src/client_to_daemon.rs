use std::sync::Arc;

use memngt_rpc::{ArgumentReader, Arguments, ContractHandler, HandlerError, Proxy};

use crate::{reply, NegotiationError};

pub const CONTRACT_NAME: &str = "memngt.ClientToDaemon";

const REGISTER_CLIENT: &str = "register_client";
const REQUEST_ADDITIONAL_MEMORY: &str = "request_additional_memory";
const RELINQUISH_MEMORY: &str = "relinquish_memory";

/// Operations a client process calls on the daemon. Amounts are in kilobytes.
#[mockall::automock]
pub trait ClientToDaemon: Send + Sync {
    /// Announces a client and the port its own rpc service listens on. Returns the granted memory share.
    fn register_client(&self, client_name: String, pid: u32, rpc_port: u16) -> Result<u32, NegotiationError>;
    /// Returns whether the daemon granted the extra memory.
    fn request_additional_memory(&self, pid: u32, amount_kb: u32) -> Result<bool, NegotiationError>;
    fn relinquish_memory(&self, pid: u32, amount_kb: u32) -> Result<(), NegotiationError>;
}

/// Serves a [`ClientToDaemon`] implementation, register it under [`CONTRACT_NAME`].
pub struct ClientToDaemonHandler {
    inner: Arc<dyn ClientToDaemon>,
}

impl ClientToDaemonHandler {
    pub fn new(inner: Arc<dyn ClientToDaemon>) -> Self {
        Self { inner }
    }
}

impl ContractHandler for ClientToDaemonHandler {
    fn handle(&self, operation: &str, args: &mut ArgumentReader<'_>) -> Result<Vec<u8>, HandlerError> {
        match operation {
            REGISTER_CLIENT => {
                let client_name: String = args.next()?;
                let pid: u32 = args.next()?;
                let rpc_port: u16 = args.next()?;
                args.finish()?;
                reply(self.inner.register_client(client_name, pid, rpc_port))
            }
            REQUEST_ADDITIONAL_MEMORY => {
                let pid: u32 = args.next()?;
                let amount_kb: u32 = args.next()?;
                args.finish()?;
                reply(self.inner.request_additional_memory(pid, amount_kb))
            }
            RELINQUISH_MEMORY => {
                let pid: u32 = args.next()?;
                let amount_kb: u32 = args.next()?;
                args.finish()?;
                reply(self.inner.relinquish_memory(pid, amount_kb))
            }
            _ => Err(HandlerError::UnknownOperation(operation.to_string())),
        }
    }
}

/// Calls the daemon. Each method blocks until the daemon answers.
#[derive(Clone)]
pub struct ClientToDaemonProxy {
    proxy: Proxy,
}

impl ClientToDaemonProxy {
    /// `proxy` must point at the [`CONTRACT_NAME`] contract of the daemon.
    pub fn new(proxy: Proxy) -> Self {
        Self { proxy }
    }
}

impl ClientToDaemon for ClientToDaemonProxy {
    fn register_client(&self, client_name: String, pid: u32, rpc_port: u16) -> Result<u32, NegotiationError> {
        let args = Arguments::new().with(&client_name)?.with(&pid)?.with(&rpc_port)?;
        Ok(self.proxy.call(REGISTER_CLIENT, args)?)
    }

    fn request_additional_memory(&self, pid: u32, amount_kb: u32) -> Result<bool, NegotiationError> {
        let args = Arguments::new().with(&pid)?.with(&amount_kb)?;
        Ok(self.proxy.call(REQUEST_ADDITIONAL_MEMORY, args)?)
    }

    fn relinquish_memory(&self, pid: u32, amount_kb: u32) -> Result<(), NegotiationError> {
        let args = Arguments::new().with(&pid)?.with(&amount_kb)?;
        Ok(self.proxy.call(RELINQUISH_MEMORY, args)?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use memngt_rpc::{msg::RpcRequest, Arguments, ContractHandler, HandlerError, MsgId};

    use crate::NegotiationError;

    use super::{ClientToDaemonHandler, MockClientToDaemon, CONTRACT_NAME};

    fn request(operation: &str, args: Arguments) -> RpcRequest {
        RpcRequest::new(MsgId(1), CONTRACT_NAME, operation, args)
    }

    #[test]
    fn handler_decodes_arguments() {
        let mut daemon = MockClientToDaemon::new();
        daemon
            .expect_register_client()
            .withf(|name, pid, port| name == "client-a" && *pid == 42 && *port == 7000)
            .times(1)
            .returning(|_, _, _| Ok(8192));
        let handler = ClientToDaemonHandler::new(Arc::new(daemon));

        let req = request("register_client", Arguments::new().with(&"client-a".to_string()).unwrap().with(&42u32).unwrap().with(&7000u16).unwrap());
        assert_eq!(handler.handle(&req.operation, &mut req.reader()), Ok(bincode::serialize(&8192u32).unwrap()));
    }

    #[test]
    fn declared_error_becomes_failure() {
        let mut daemon = MockClientToDaemon::new();
        daemon.expect_relinquish_memory().returning(|_, _| Err(NegotiationError::Rejected("unknown pid".to_string())));
        let handler = ClientToDaemonHandler::new(Arc::new(daemon));

        let req = request("relinquish_memory", Arguments::new().with(&1u32).unwrap().with(&2u32).unwrap());
        match handler.handle(&req.operation, &mut req.reader()) {
            Err(HandlerError::Failed(failure)) => {
                assert_eq!(failure.decode::<NegotiationError>(), Some(NegotiationError::Rejected("unknown pid".to_string())));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn wrong_arguments_are_rejected() {
        let handler = ClientToDaemonHandler::new(Arc::new(MockClientToDaemon::new()));
        let req = request("request_additional_memory", Arguments::new().with(&1u64).unwrap());
        assert!(matches!(handler.handle(&req.operation, &mut req.reader()), Err(HandlerError::InvalidArguments(_))));
        let req = request("shrink", Arguments::new());
        assert!(matches!(handler.handle(&req.operation, &mut req.reader()), Err(HandlerError::UnknownOperation(_))));
    }
}
