//! # Packet queue
//!
//! FIFO of payloads pulled from the module. Packets of different sockets share one queue, so the
//! global arrival order is kept. Consumers only take packets of their own socket and skip the others.
use alloc::collections::VecDeque;
use alloc::vec::Vec;
use log::{trace, warn};

/// Default max. number of buffered payload bytes
pub const DEFAULT_PACKET_BUDGET: usize = 16 * 1024;

/// Buffer allocation failed or the byte budget is exhausted
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OutOfMemory;

/// Received payload of a single socket
#[derive(Clone, Debug, PartialEq)]
pub struct Packet {
    /// Module socket id which received the data
    pub module_id: u8,

    /// Remaining (not yet consumed) payload
    pub data: Vec<u8>,
}

impl Packet {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Ordered queue of received packets
#[derive(Debug)]
pub struct PacketQueue {
    packets: VecDeque<Packet>,

    /// Sum of all buffered payload bytes
    buffered: usize,

    /// Max. number of buffered payload bytes
    budget: usize,
}

impl Default for PacketQueue {
    fn default() -> Self {
        Self::new(DEFAULT_PACKET_BUDGET)
    }
}

impl PacketQueue {
    pub fn new(budget: usize) -> Self {
        Self {
            packets: VecDeque::new(),
            buffered: 0,
            budget,
        }
    }

    /// Allocates a zeroed buffer for a payload of the given length
    pub fn allocate(&self, length: usize) -> Result<Vec<u8>, OutOfMemory> {
        if self.buffered + length > self.budget {
            warn!(
                "Packet budget exhausted ({} buffered, {} requested, {} budget)",
                self.buffered, length, self.budget
            );
            return Err(OutOfMemory);
        }

        let mut buffer = Vec::new();
        buffer.try_reserve_exact(length).map_err(|_| {
            warn!("Out of memory while allocating {} bytes", length);
            OutOfMemory
        })?;

        buffer.resize(length, 0x0);
        Ok(buffer)
    }

    /// Appends a payload buffer at the tail
    pub fn push(&mut self, module_id: u8, data: Vec<u8>) -> Result<(), OutOfMemory> {
        self.packets.try_reserve(1).map_err(|_| OutOfMemory)?;

        trace!("Queued {} bytes of socket {}", data.len(), module_id);
        self.buffered += data.len();
        self.packets.push_back(Packet { module_id, data });
        Ok(())
    }

    /// Copies the given payload into a new packet at the tail
    pub fn enqueue(&mut self, module_id: u8, bytes: &[u8]) -> Result<(), OutOfMemory> {
        let mut buffer = self.allocate(bytes.len())?;
        buffer.copy_from_slice(bytes);
        self.push(module_id, buffer)
    }

    /// Copies data of the first packet of the given socket into the buffer and returns the length.
    ///
    /// Packets fitting into the buffer are removed, otherwise the buffer gets filled and the remaining
    /// bytes are kept in place for the next call. Returns None if no packet of the socket is queued.
    pub fn dequeue_for(&mut self, module_id: u8, buffer: &mut [u8]) -> Option<usize> {
        let index = self.packets.iter().position(|packet| packet.module_id == module_id)?;

        if self.packets[index].len() <= buffer.len() {
            let packet = self.packets.remove(index)?;
            let length = packet.len();

            buffer[..length].copy_from_slice(&packet.data);
            self.buffered -= length;
            return Some(length);
        }

        let length = buffer.len();
        let packet = &mut self.packets[index];

        buffer.copy_from_slice(&packet.data[..length]);
        packet.data.drain(..length);
        self.buffered -= length;
        Some(length)
    }

    /// Drops all packets of the given socket
    pub fn purge(&mut self, module_id: u8) {
        let mut purged = 0;

        self.packets.retain(|packet| {
            if packet.module_id != module_id {
                return true;
            }

            purged += packet.len();
            false
        });

        if purged > 0 {
            trace!("Purged {} bytes of socket {}", purged, module_id);
        }

        self.buffered -= purged;
    }

    /// Drops all packets
    pub fn clear(&mut self) {
        self.packets.clear();
        self.buffered = 0;
    }

    /// True if a packet of the given socket is queued
    pub fn has_packet(&self, module_id: u8) -> bool {
        self.packets.iter().any(|packet| packet.module_id == module_id)
    }

    /// Number of queued packets
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Sum of all buffered payload bytes
    pub fn buffered(&self) -> usize {
        self.buffered
    }

    /// Number of payload bytes which may still be buffered
    pub fn available(&self) -> usize {
        self.budget.saturating_sub(self.buffered)
    }

    pub fn set_budget(&mut self, budget: usize) {
        self.budget = budget;
    }
}
