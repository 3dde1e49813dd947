use bincode::Options;
use thiserror::Error;

use crate::msg::RpcMsg;

/// Upper bound of one encoded message, keeps a corrupt length prefix from allocating wildly.
pub const MAX_MESSAGE_LEN: u64 = 16 * 1024 * 1024;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    #[error("cannot encode message: {0}")]
    Encode(String),
    #[error("message of {0} bytes needs more than 65535 packets")]
    TooManyPackets(u64),
}

fn options() -> impl Options {
    bincode::DefaultOptions::new().with_limit(MAX_MESSAGE_LEN).reject_trailing_bytes()
}

pub fn encode(msg: &RpcMsg) -> Result<Vec<u8>, CodecError> {
    options().serialize(msg).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Size of `msg` once encoded, fails the same way [`encode`] would.
pub fn encoded_len(msg: &RpcMsg) -> Result<u64, CodecError> {
    options().serialized_size(msg).map_err(|e| CodecError::Encode(e.to_string()))
}

pub fn decode(buf: &[u8]) -> Result<RpcMsg, CodecError> {
    options().deserialize(buf).map_err(|e| CodecError::MalformedMessage(e.to_string()))
}
