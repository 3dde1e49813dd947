//! Contracts spoken between the memory negotiation daemon and its clients.
//!
//! Each contract is a plain trait. `*Handler` serves an implementation through a [`memngt_rpc::RpcService`], and
//! `*Proxy` implements the same trait by calling a remote service.

pub mod client_to_daemon;
pub mod daemon_to_client;
mod error;

pub use client_to_daemon::{ClientToDaemon, ClientToDaemonHandler, ClientToDaemonProxy};
pub use daemon_to_client::{DaemonToClient, DaemonToClientHandler, DaemonToClientProxy};
pub use error::NegotiationError;

use memngt_rpc::{return_value, HandlerError, RemoteFailure};
use serde::Serialize;

/// Encodes what an implementation returned, declared errors travel back as a remote failure.
pub(crate) fn reply<T: Serialize>(res: Result<T, NegotiationError>) -> Result<Vec<u8>, HandlerError> {
    match res {
        Ok(value) => return_value(&value),
        Err(err) => {
            log::debug!("[Protocols] operation returned {}", err);
            Err(HandlerError::Failed(RemoteFailure::from_error(&err)))
        }
    }
}
