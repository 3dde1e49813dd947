use super::PacketError;

pub const METADATA_LEN: usize = 8;
pub const DEFAULT_MAX_CHUNK_LEN: usize = 1016;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketMeta {
    pub index: u16,
    pub count: u16,
    pub msg_id: u32,
}

impl PacketMeta {
    pub fn write_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.index.to_be_bytes());
        buf.extend_from_slice(&self.count.to_be_bytes());
        buf.extend_from_slice(&self.msg_id.to_be_bytes());
    }

    /// Splits a received packet into its metadata and payload chunk.
    pub fn parse(packet: &[u8]) -> Result<(Self, &[u8]), PacketError> {
        if packet.len() < METADATA_LEN {
            return Err(PacketError::TooShort(packet.len()));
        }
        let (chunk, meta) = packet.split_at(packet.len() - METADATA_LEN);
        let index = u16::from_be_bytes([meta[0], meta[1]]);
        let count = u16::from_be_bytes([meta[2], meta[3]]);
        let msg_id = u32::from_be_bytes([meta[4], meta[5], meta[6], meta[7]]);
        if index >= count {
            return Err(PacketError::InvalidIndex { index, count });
        }
        Ok((Self { index, count, msg_id }, chunk))
    }
}
