//! # Serial transport
//!
//! The adapter talks to the module through a buffered duplex byte channel, usually an UART driver
//! with interrupt driven RX/TX queues. Any type implementing the [embedded_io] traits can be used,
//! it just needs to report whether outbound bytes are still queued.
//!
//! The driver's "data arrived" interrupt should call [WakeSignal::notify](crate::signal::WakeSignal::notify).
use embedded_io::{Read, ReadReady, Write, WriteReady};

/// Duplex byte channel to the module
pub trait Transport: Read + Write + ReadReady + WriteReady {
    /// Returns true as long as written bytes are still queued and not yet transmitted
    fn tx_pending(&mut self) -> bool;
}
