use super::{PacketError, PacketMeta, METADATA_LEN};

/// Sending half of the packetizer. Owned by the sender loop, which is its only user.
pub struct Packetizer {
    max_chunk_len: usize,
    msg_id_seed: u32,
}

impl Packetizer {
    pub fn new(max_chunk_len: usize, msg_id_seed: u32) -> Self {
        assert!(max_chunk_len > 0, "max_chunk_len must not be zero");
        Self { max_chunk_len, msg_id_seed }
    }

    /// Splits a payload into packets ready to send, all tagged with a fresh message id.
    ///
    /// # Returns
    ///
    /// * `Ok(packets)`: at least one packet, an empty payload gives one packet with an empty chunk.
    /// * `Err(PacketError::TooLarge)`: the payload needs more packets than the u16 count can express.
    pub fn split(&mut self, payload: &[u8]) -> Result<Vec<Vec<u8>>, PacketError> {
        let count = calc_packet_count(payload.len(), self.max_chunk_len).ok_or(PacketError::TooLarge(payload.len()))?;
        let msg_id = self.msg_id_seed;
        self.msg_id_seed = self.msg_id_seed.wrapping_add(1);

        let mut packets = Vec::with_capacity(count as usize);
        for index in 0..count {
            let start = index as usize * self.max_chunk_len;
            let end = payload.len().min(start + self.max_chunk_len);
            let mut packet = Vec::with_capacity(end - start + METADATA_LEN);
            packet.extend_from_slice(&payload[start..end]);
            PacketMeta { index, count, msg_id }.write_to(&mut packet);
            packets.push(packet);
        }
        log::debug!("[Packetizer] msg {} split {} bytes into {} packets", msg_id, payload.len(), count);
        Ok(packets)
    }
}

/// Number of packets needed for a payload, `None` if it exceeds u16::MAX packets.
pub(crate) fn calc_packet_count(len: usize, max_chunk_len: usize) -> Option<u16> {
    if len == 0 {
        return Some(1);
    }
    let count = (len + max_chunk_len - 1) / max_chunk_len;
    u16::try_from(count).ok()
}
