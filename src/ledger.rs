//! # Pending data ledger
//!
//! Tracks per socket how many bytes the module has reported as available, but not yet transferred.
//! The aggregate total always equals the sum of all entries.
use log::warn;

/// Max. number of parallel sockets supported by the module
pub const SOCKET_COUNT: usize = 8;

/// Internal connection state of a socket slot
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum ConnectionState {
    /// Slot is free and may be (re)used
    #[default]
    Closed,
    /// Slot was returned by socket() but is not connected yet
    Open,
    /// Connection is fully open
    Connected,
    /// Socket was closed by the peer, but the socket object still exists and needs to be closed by calling `close()`
    Closing,
}

/// Maps a socket slot to the module socket id and its pending byte count
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct SocketEntry {
    /// Connection state of the slot
    pub state: ConnectionState,

    /// Socket id assigned by the module. None = free.
    pub module_id: Option<u8>,

    /// Bytes reported as available by the module
    pub pending: u32,
}

/// Socket entries + aggregated pending byte count
#[derive(Clone, Debug, Default)]
pub struct Ledger {
    entries: [SocketEntry; SOCKET_COUNT],

    /// Sum of all pending counts
    total: u64,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the pending byte count reported for the given module socket id.
    /// Returns false if no slot is bound to the id. Panics if ledger and module got desynchronized.
    pub fn set_pending_data(&mut self, module_id: u8, amount: u32) -> bool {
        let Some(slot) = self.resolve(module_id) else {
            warn!("Pending data for unknown socket {} ignored ({} bytes)", module_id, amount);
            return false;
        };

        self.set_slot_pending(slot, amount);
        true
    }

    /// Same as [Ledger::set_pending_data] but by slot index
    pub(crate) fn set_slot_pending(&mut self, slot: usize, amount: u32) {
        let previous = self.entries[slot].pending as u64;

        assert!(
            self.total >= previous,
            "pending data ledger desynchronized: total {} < socket {} pending {}",
            self.total,
            slot,
            previous
        );

        self.total = self.total - previous + amount as u64;
        self.entries[slot].pending = amount;
    }

    /// True if any socket has pending data
    pub fn has_pending_data(&self) -> bool {
        self.total > 0
    }

    /// Aggregated pending byte count of all sockets
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Pending byte count of the given slot
    pub fn pending(&self, slot: usize) -> u32 {
        self.entries[slot].pending
    }

    /// Returns the slot bound to the module socket id
    pub fn resolve(&self, module_id: u8) -> Option<usize> {
        self.entries.iter().position(|entry| entry.module_id == Some(module_id))
    }

    pub fn entry(&self, slot: usize) -> &SocketEntry {
        &self.entries[slot]
    }

    pub fn entries(&self) -> &[SocketEntry] {
        &self.entries
    }

    /// Reserves a free slot for a new socket
    pub(crate) fn allocate(&mut self) -> Option<usize> {
        let slot = self.entries.iter().position(|entry| entry.state == ConnectionState::Closed)?;
        self.entries[slot] = SocketEntry {
            state: ConnectionState::Open,
            module_id: None,
            pending: 0,
        };

        Some(slot)
    }

    /// Binds the slot to the id assigned by the module
    pub(crate) fn bind(&mut self, slot: usize, module_id: u8) {
        self.set_slot_pending(slot, 0);
        self.entries[slot].module_id = Some(module_id);
        self.entries[slot].state = ConnectionState::Connected;
    }

    /// Module id got closed by the peer. Keeps the slot reserved until the socket is closed locally.
    pub(crate) fn unbind(&mut self, slot: usize) {
        self.set_slot_pending(slot, 0);
        self.entries[slot].module_id = None;

        if self.entries[slot].state == ConnectionState::Connected {
            self.entries[slot].state = ConnectionState::Closing;
        }
    }

    /// Frees the slot, so that it may be reused
    pub(crate) fn release(&mut self, slot: usize) {
        self.set_slot_pending(slot, 0);
        self.entries[slot] = SocketEntry::default();
    }

    /// Module lost all sockets. Slots stay reserved until closed locally.
    pub(crate) fn unbind_all(&mut self) {
        for slot in 0..SOCKET_COUNT {
            self.unbind(slot);
        }
    }
}
