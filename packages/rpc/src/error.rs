use thiserror::Error;

use crate::{codec::CodecError, msg::RemoteFailure};

/// What a contract handler may report back to the dispatcher.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// No handler is registered for the contract. The request is dropped.
    #[error("unknown contract {0}")]
    UnknownContract(String),
    /// The contract has no operation with this name. The request is dropped.
    #[error("unknown operation {0}")]
    UnknownOperation(String),
    /// Arguments did not match the operation signature. The request is dropped.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    /// The operation ran and raised an error, which is sent back to the caller.
    #[error("operation failed: {0}")]
    Failed(RemoteFailure),
}

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("rpc service is shutting down")]
    ShuttingDown,
    #[error("no response before the call deadline")]
    DeadlineExceeded,
    #[error(transparent)]
    Remote(#[from] RemoteFailure),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("unexpected return value: {0}")]
    UnexpectedReturn(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("handler for contract {0} already registered")]
    DuplicateHandler(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
