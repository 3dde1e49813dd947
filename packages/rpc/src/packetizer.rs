//! Packetizer maps one encoded message onto a sequence of datagrams and back.
//!
//! - Each transmission is assigned a u32 message id on the sending side, so pair (source addr, message id) identifies
//! which datagrams belong together. A retransmitted RPC request is a new transmission with a new message id.
//! - Payload is split into chunks of at most `max_chunk_len` bytes (1016 by default), and a metadata block is appended
//! after each chunk:
//!
//! ```text
//!    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!    |                  payload chunk (0..max_chunk_len)             |
//!    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!    |          PacketIndex          |          PacketCount          |
//!    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!    |                           MessageId                           |
//!    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! All metadata fields are big-endian.

use std::net::SocketAddr;

use thiserror::Error;

pub(crate) mod meta;
pub(crate) mod reassembly;
pub(crate) mod split;

pub use meta::{PacketMeta, DEFAULT_MAX_CHUNK_LEN, METADATA_LEN};
pub use reassembly::Reassembler;
pub(crate) use split::calc_packet_count;
pub use split::Packetizer;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("packet of {0} bytes is too short for metadata")]
    TooShort(usize),
    #[error("payload of {0} bytes needs more than 65535 packets")]
    TooLarge(usize),
    #[error("packet index {index} out of range for count {count}")]
    InvalidIndex { index: u16, count: u16 },
    #[error("packet count {got} does not match {expected} of earlier packets")]
    CountMismatch { expected: u16, got: u16 },
    #[error("{0} already has the maximum number of incomplete messages")]
    TooManySlots(SocketAddr),
}
