use std::sync::Arc;

use dashmap::{mapref::entry::Entry, DashMap};

use crate::{error::HandlerError, msg::ArgumentReader};

/// Serves the operations of one contract.
///
/// `handle` runs on the receiver loop, so it should not block on a call back into the same service.
pub trait ContractHandler: Send + Sync {
    /// Runs `operation` and returns its encoded return value, see [`crate::return_value`].
    fn handle(&self, operation: &str, args: &mut ArgumentReader<'_>) -> Result<Vec<u8>, HandlerError>;
}

impl<F> ContractHandler for F
where
    F: Fn(&str, &mut ArgumentReader<'_>) -> Result<Vec<u8>, HandlerError> + Send + Sync,
{
    fn handle(&self, operation: &str, args: &mut ArgumentReader<'_>) -> Result<Vec<u8>, HandlerError> {
        self(operation, args)
    }
}

#[derive(Default)]
pub struct ContractRegistry {
    handlers: DashMap<String, Arc<dyn ContractHandler>>,
}

impl ContractRegistry {
    /// Returns false and keeps the existing handler if the contract is already registered.
    pub fn register(&self, contract: &str, handler: Arc<dyn ContractHandler>) -> bool {
        match self.handlers.entry(contract.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(handler);
                true
            }
        }
    }

    pub fn unregister(&self, contract: &str) -> bool {
        self.handlers.remove(contract).is_some()
    }

    pub fn get(&self, contract: &str) -> Option<Arc<dyn ContractHandler>> {
        self.handlers.get(contract).map(|h| h.value().clone())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::{
        error::HandlerError,
        msg::{return_value, ArgumentReader, Arguments, MsgId, RpcRequest},
    };

    use super::{ContractHandler, ContractRegistry};

    fn echo(operation: &str, args: &mut ArgumentReader<'_>) -> Result<Vec<u8>, HandlerError> {
        match operation {
            "echo" => {
                let value: u32 = args.next()?;
                args.finish()?;
                return_value(&value)
            }
            _ => Err(HandlerError::UnknownOperation(operation.to_string())),
        }
    }

    #[test]
    fn register_once_per_contract() {
        let registry = ContractRegistry::default();
        assert!(registry.register("echo", Arc::new(echo)));
        assert!(!registry.register("echo", Arc::new(echo)));
        assert_eq!(registry.len(), 1);
        assert!(registry.get("echo").is_some());
        assert!(registry.get("other").is_none());

        assert!(registry.unregister("echo"));
        assert!(!registry.unregister("echo"));
        assert!(registry.is_empty());
    }

    #[test]
    fn closure_handler_dispatch() {
        let registry = ContractRegistry::default();
        registry.register("echo", Arc::new(echo));
        let handler = registry.get("echo").unwrap();

        let req = RpcRequest::new(MsgId(1), "echo", "echo", Arguments::new().with(&5u32).unwrap());
        assert_eq!(handler.handle(&req.operation, &mut req.reader()), Ok(bincode::serialize(&5u32).unwrap()));

        let req = RpcRequest::new(MsgId(2), "echo", "missing", Arguments::new());
        assert_eq!(handler.handle(&req.operation, &mut req.reader()), Err(HandlerError::UnknownOperation("missing".to_string())));
    }
}
