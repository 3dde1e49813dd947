use std::{collections::HashMap, net::SocketAddr};

use super::{PacketError, PacketMeta};

/// Incomplete messages one source may have open at a time, bounds what a single peer can make us buffer.
pub const MAX_SLOTS_PER_SOURCE: usize = 32;

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
struct MsgKey(SocketAddr, u32);

struct MsgSlot {
    timeout_at: u64,
    part_count: u16,
    part_received: usize,
    parts: Vec<Option<Vec<u8>>>,
}

impl MsgSlot {
    fn build(now_ms: u64, timeout_ms: u64, part_count: u16) -> Self {
        MsgSlot {
            timeout_at: now_ms + timeout_ms,
            part_count,
            part_received: 0,
            parts: vec![None; part_count as usize],
        }
    }

    /// Returns false if this part was already received.
    fn append_part(&mut self, index: u16, chunk: &[u8]) -> bool {
        let container = &mut self.parts[index as usize];
        if container.is_some() {
            return false;
        }
        container.replace(chunk.to_vec());
        self.part_received += 1;
        true
    }

    fn is_finish(&self) -> bool {
        self.part_received == self.part_count as usize
    }

    fn finalize(self) -> Vec<u8> {
        let len = self.parts.iter().map(|p| p.as_ref().map_or(0, |p| p.len())).sum();
        let mut payload = Vec::with_capacity(len);
        for part in self.parts.into_iter().flatten() {
            payload.extend_from_slice(&part);
        }
        payload
    }
}

/// Receiving half of the packetizer. Owned by the receiver loop.
///
/// Incomplete messages are dropped `timeout_ms` after their first packet. Completed message ids are remembered for
/// the same window so late duplicates of their packets are discarded instead of starting a new slot.
pub struct Reassembler {
    timeout_ms: u64,
    slots: HashMap<MsgKey, MsgSlot>,
    open_per_source: HashMap<SocketAddr, usize>,
    completed: HashMap<MsgKey, u64>,
}

impl Reassembler {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            timeout_ms,
            slots: Default::default(),
            open_per_source: Default::default(),
            completed: Default::default(),
        }
    }

    /// Feeds one received packet.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(payload))`: this packet completed its message.
    /// * `Ok(None)`: more packets are needed, or the packet was a duplicate.
    /// * `Err(_)`: the packet is malformed, or its source has too many incomplete messages, and was dropped.
    pub fn on_packet(&mut self, now_ms: u64, from: SocketAddr, packet: &[u8]) -> Result<Option<Vec<u8>>, PacketError> {
        let (meta, chunk) = PacketMeta::parse(packet)?;
        let key = MsgKey(from, meta.msg_id);
        if self.completed.contains_key(&key) {
            log::debug!("[Reassembler] duplicate packet {}/{} of completed msg {} from {}", meta.index, meta.count, meta.msg_id, from);
            return Ok(None);
        }

        if meta.count == 1 {
            //just single packet msg dont need a slot
            self.completed.insert(key, now_ms + self.timeout_ms);
            return Ok(Some(chunk.to_vec()));
        }

        if !self.slots.contains_key(&key) {
            let open = self.open_per_source.entry(from).or_default();
            if *open >= MAX_SLOTS_PER_SOURCE {
                return Err(PacketError::TooManySlots(from));
            }
            *open += 1;
            self.slots.insert(key, MsgSlot::build(now_ms, self.timeout_ms, meta.count));
        }
        let slot = match self.slots.get_mut(&key) {
            Some(slot) => slot,
            None => return Ok(None),
        };
        if slot.part_count != meta.count {
            return Err(PacketError::CountMismatch {
                expected: slot.part_count,
                got: meta.count,
            });
        }
        if !slot.append_part(meta.index, chunk) {
            log::debug!("[Reassembler] duplicate packet {}/{} of msg {} from {}", meta.index, meta.count, meta.msg_id, from);
            return Ok(None);
        }
        if !slot.is_finish() {
            return Ok(None);
        }

        match self.slots.remove(&key) {
            Some(slot) => {
                release_source(&mut self.open_per_source, from);
                self.completed.insert(key, now_ms + self.timeout_ms);
                log::debug!("[Reassembler] msg {} from {} finish with {} packets, pending {}", meta.msg_id, from, meta.count, self.slots.len());
                Ok(Some(slot.finalize()))
            }
            None => Ok(None),
        }
    }

    pub fn on_tick(&mut self, now_ms: u64) {
        let before = self.slots.len();
        let open_per_source = &mut self.open_per_source;
        self.slots.retain(|key, s| {
            let keep = s.timeout_at > now_ms;
            if !keep {
                release_source(open_per_source, key.0);
            }
            keep
        });
        if self.slots.len() != before {
            log::warn!("[Reassembler] evicted {} incomplete msgs", before - self.slots.len());
        }
        self.completed.retain(|_, expire_at| *expire_at > now_ms);
    }

    pub fn pending_count(&self) -> usize {
        self.slots.len()
    }
}

fn release_source(open_per_source: &mut HashMap<SocketAddr, usize>, from: SocketAddr) {
    if let Some(open) = open_per_source.get_mut(&from) {
        *open = open.saturating_sub(1);
        if *open == 0 {
            open_per_source.remove(&from);
        }
    }
}
