//! Packets held by the switch while the controller decides about them

use openflow::messages::OFP_NO_BUFFER;

use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, PartialEq)]
pub struct BufferedPacket {
    pub in_port: u16,
    pub data: Vec<u8>,
}

/// A bounded packet store. When full, the oldest packet is evicted.
#[derive(Debug)]
pub struct PacketBuffers {
    capacity: usize,
    next_id: u32,
    order: VecDeque<u32>,
    packets: HashMap<u32, BufferedPacket>,
}

impl PacketBuffers {
    pub fn new(capacity: usize) -> PacketBuffers {
        PacketBuffers {
            capacity,
            next_id: 0,
            order: VecDeque::new(),
            packets: HashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Stores a packet and returns its buffer id,
    /// or OFP_NO_BUFFER if the switch does not buffer at all
    pub fn store(&mut self, in_port: u16, data: Vec<u8>) -> u32 {
        if self.capacity == 0 {
            return OFP_NO_BUFFER;
        }
        while self.packets.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    if self.packets.remove(&oldest).is_some() {
                        debug!("Evicting buffered packet {}", oldest);
                    }
                }
                None => break,
            }
        }
        let id = self.next_id;
        self.next_id = if self.next_id == OFP_NO_BUFFER - 1 { 0 } else { self.next_id + 1 };
        self.order.push_back(id);
        self.packets.insert(id, BufferedPacket { in_port, data });
        id
    }

    /// Takes a packet out of its buffer
    pub fn take(&mut self, id: u32) -> Option<BufferedPacket> {
        let packet = self.packets.remove(&id)?;
        self.order.retain(|&o| o != id);
        Some(packet)
    }
}
