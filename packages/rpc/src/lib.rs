//! Request/response RPC over udp datagrams.
//!
//! A [`RpcService`] owns one socket. Local code serves a named contract by registering a [`ContractHandler`], and
//! calls a remote contract through a [`Proxy`]. Calls are retransmitted until answered, and the serving side caches
//! each response until the caller confirms it with a cleanup message, so an operation runs at most once per call
//! even when datagrams are lost or duplicated. Messages bigger than one datagram are split by the packetizer.

pub mod codec;
pub mod config;
pub mod error;
pub mod msg;
pub mod packetizer;
mod proxy;
mod receiver;
pub mod registry;
mod sender;
mod service;
pub mod transport;

pub use config::RpcConfig;
pub use error::{HandlerError, RpcError};
pub use msg::{return_value, ArgumentReader, Arguments, MsgId, RemoteFailure, RpcMsg, RpcMsgKind};
pub use proxy::{CallOptions, Proxy};
pub use registry::ContractHandler;
pub use service::{RpcService, RpcStats};
pub use transport::{DatagramTransport, UdpTransport, VnetEarth, VnetSocket};
