use std::{any::type_name, fmt::Display};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::HandlerError;

/// Identifies one logical call: a Request, its Response and the Cleanup which follows.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MsgId(pub u32);

impl Display for MsgId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcMsgKind {
    Request,
    Response,
    Exception,
    Cleanup,
}

/// Error raised by a remote operation, carried back to the caller.
///
/// `payload` is the bincode body of the declared error type, `type_name` tells which type it is,
/// so the caller can get the typed error back with [`RemoteFailure::decode`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("remote failure {type_name}: {message}")]
pub struct RemoteFailure {
    pub type_name: String,
    pub message: String,
    pub payload: Vec<u8>,
}

impl RemoteFailure {
    pub fn from_error<E: Serialize + Display>(err: &E) -> Self {
        Self {
            type_name: type_name::<E>().to_string(),
            message: err.to_string(),
            payload: bincode::serialize(err).unwrap_or_default(),
        }
    }

    /// Failure without a typed body, for errors which only have a text form.
    pub fn from_message(type_name: &str, message: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            message: message.to_string(),
            payload: vec![],
        }
    }

    pub fn is<E>(&self) -> bool {
        self.type_name == type_name::<E>()
    }

    pub fn decode<E: DeserializeOwned>(&self) -> Option<E> {
        if !self.is::<E>() {
            return None;
        }
        bincode::deserialize(&self.payload).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub id: MsgId,
    pub contract: String,
    pub operation: String,
    pub signature: Vec<String>,
    pub args: Vec<Vec<u8>>,
}

impl RpcRequest {
    pub fn new(id: MsgId, contract: &str, operation: &str, args: Arguments) -> Self {
        Self {
            id,
            contract: contract.to_string(),
            operation: operation.to_string(),
            signature: args.signature,
            args: args.values,
        }
    }

    pub fn reader(&self) -> ArgumentReader<'_> {
        ArgumentReader { request: self, pos: 0 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: MsgId,
    pub result: Result<Vec<u8>, RemoteFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcCleanup {
    pub id: MsgId,
}

/// Everything which travels between two service instances.
/// The variant tag is the first field on the wire, so the kind is known before the body is decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcMsg {
    Request(RpcRequest),
    Response(RpcResponse),
    Cleanup(RpcCleanup),
}

impl RpcMsg {
    pub fn id(&self) -> MsgId {
        match self {
            RpcMsg::Request(req) => req.id,
            RpcMsg::Response(res) => res.id,
            RpcMsg::Cleanup(cleanup) => cleanup.id,
        }
    }

    pub fn kind(&self) -> RpcMsgKind {
        match self {
            RpcMsg::Request(_) => RpcMsgKind::Request,
            RpcMsg::Response(RpcResponse { result: Ok(_), .. }) => RpcMsgKind::Response,
            RpcMsg::Response(RpcResponse { result: Err(_), .. }) => RpcMsgKind::Exception,
            RpcMsg::Cleanup(_) => RpcMsgKind::Cleanup,
        }
    }
}

/// Ordered call arguments, each with the type descriptor it was encoded from.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Arguments {
    signature: Vec<String>,
    values: Vec<Vec<u8>>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T: Serialize>(mut self, value: &T) -> Result<Self, bincode::Error> {
        self.values.push(bincode::serialize(value)?);
        self.signature.push(type_name::<T>().to_string());
        Ok(self)
    }
}

/// Reads the arguments of an incoming request in order, checking each one against the expected type.
pub struct ArgumentReader<'a> {
    request: &'a RpcRequest,
    pos: usize,
}

impl<'a> ArgumentReader<'a> {
    pub fn operation(&self) -> &str {
        &self.request.operation
    }

    pub fn next<T: DeserializeOwned>(&mut self) -> Result<T, HandlerError> {
        let pos = self.pos;
        let (descriptor, value) = match (self.request.signature.get(pos), self.request.args.get(pos)) {
            (Some(descriptor), Some(value)) => (descriptor, value),
            _ => return Err(HandlerError::InvalidArguments(format!("missing argument {}", pos))),
        };
        if descriptor != type_name::<T>() {
            return Err(HandlerError::InvalidArguments(format!("argument {} is {}, expected {}", pos, descriptor, type_name::<T>())));
        }
        let value = bincode::deserialize(value).map_err(|e| HandlerError::InvalidArguments(format!("argument {}: {}", pos, e)))?;
        self.pos += 1;
        Ok(value)
    }

    /// Fails if the caller sent more arguments than the operation consumed.
    pub fn finish(&self) -> Result<(), HandlerError> {
        if self.pos != self.request.args.len() || self.request.signature.len() != self.request.args.len() {
            return Err(HandlerError::InvalidArguments(format!(
                "operation {} takes {} arguments, got {}",
                self.request.operation,
                self.pos,
                self.request.args.len()
            )));
        }
        Ok(())
    }
}

/// Encodes the value an operation returns.
pub fn return_value<T: Serialize>(value: &T) -> Result<Vec<u8>, HandlerError> {
    bincode::serialize(value).map_err(|e| HandlerError::Failed(RemoteFailure::from_message("bincode::Error", &e.to_string())))
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use crate::error::HandlerError;

    use super::{Arguments, MsgId, RemoteFailure, RpcCleanup, RpcMsg, RpcMsgKind, RpcRequest, RpcResponse};

    #[derive(Debug, PartialEq, Serialize, Deserialize, thiserror::Error)]
    enum SampleError {
        #[error("not enough memory: {0}")]
        NotEnough(u32),
    }

    #[test]
    fn kind_follows_variant_and_result() {
        let req = RpcMsg::Request(RpcRequest::new(MsgId(1), "c", "op", Arguments::new()));
        assert_eq!(req.kind(), RpcMsgKind::Request);
        assert_eq!(req.id(), MsgId(1));

        let ok = RpcMsg::Response(RpcResponse { id: MsgId(2), result: Ok(vec![]) });
        assert_eq!(ok.kind(), RpcMsgKind::Response);

        let err = RpcMsg::Response(RpcResponse {
            id: MsgId(3),
            result: Err(RemoteFailure::from_message("x", "y")),
        });
        assert_eq!(err.kind(), RpcMsgKind::Exception);

        let cleanup = RpcMsg::Cleanup(RpcCleanup { id: MsgId(4) });
        assert_eq!(cleanup.kind(), RpcMsgKind::Cleanup);
        assert_eq!(cleanup.id(), MsgId(4));
    }

    #[test]
    fn arguments_are_read_back_in_order() {
        let args = Arguments::new().with(&"daemon".to_string()).unwrap().with(&42u32).unwrap().with(&-7i64).unwrap();
        let req = RpcRequest::new(MsgId(10), "contract", "op", args);
        assert_eq!(req.signature.len(), 3);
        assert_eq!(req.args.len(), 3);

        let mut reader = req.reader();
        assert_eq!(reader.operation(), "op");
        assert_eq!(reader.next::<String>().unwrap(), "daemon");
        assert_eq!(reader.next::<u32>().unwrap(), 42);
        assert_eq!(reader.next::<i64>().unwrap(), -7);
        assert!(reader.finish().is_ok());
        assert!(matches!(reader.next::<u8>(), Err(HandlerError::InvalidArguments(_))));
    }

    #[test]
    fn argument_type_mismatch_is_rejected() {
        let args = Arguments::new().with(&42u32).unwrap();
        let req = RpcRequest::new(MsgId(10), "contract", "op", args);
        let mut reader = req.reader();
        assert!(matches!(reader.next::<u64>(), Err(HandlerError::InvalidArguments(_))));
    }

    #[test]
    fn unread_arguments_fail_finish() {
        let args = Arguments::new().with(&1u8).unwrap().with(&2u8).unwrap();
        let req = RpcRequest::new(MsgId(10), "contract", "op", args);
        let mut reader = req.reader();
        assert_eq!(reader.next::<u8>().unwrap(), 1);
        assert!(reader.finish().is_err());
    }

    #[test]
    fn remote_failure_decodes_declared_type_only() {
        let failure = RemoteFailure::from_error(&SampleError::NotEnough(512));
        assert_eq!(failure.message, "not enough memory: 512");
        assert!(failure.is::<SampleError>());
        assert_eq!(failure.decode::<SampleError>(), Some(SampleError::NotEnough(512)));
        assert_eq!(failure.decode::<String>(), None);
    }
}
