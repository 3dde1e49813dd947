use memngt_rpc::RpcError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NegotiationError {
    /// Raised by the remote implementation.
    #[error("rejected: {0}")]
    Rejected(String),
    /// The call itself failed, never sent over the wire.
    #[error("rpc failed: {0}")]
    Rpc(String),
}

impl From<RpcError> for NegotiationError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Remote(failure) => failure.decode::<NegotiationError>().unwrap_or_else(|| NegotiationError::Rpc(failure.to_string())),
            other => NegotiationError::Rpc(other.to_string()),
        }
    }
}

impl From<bincode::Error> for NegotiationError {
    fn from(err: bincode::Error) -> Self {
        NegotiationError::Rpc(format!("cannot encode arguments: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use memngt_rpc::{RemoteFailure, RpcError};

    use super::NegotiationError;

    #[test]
    fn remote_failure_keeps_declared_error() {
        let failure = RemoteFailure::from_error(&NegotiationError::Rejected("pool empty".to_string()));
        assert_eq!(NegotiationError::from(RpcError::Remote(failure)), NegotiationError::Rejected("pool empty".to_string()));
    }

    #[test]
    fn foreign_failure_becomes_rpc_error() {
        let failure = RemoteFailure::from_message("panic", "handler panicked");
        assert!(matches!(NegotiationError::from(RpcError::Remote(failure)), NegotiationError::Rpc(_)));
        assert_eq!(NegotiationError::from(RpcError::ShuttingDown), NegotiationError::Rpc("rpc service is shutting down".to_string()));
    }
}
