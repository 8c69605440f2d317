//! # OOB dispatcher
//!
//! Maps literal line prefixes to handlers. The matcher checks every received line against this
//! table and runs the handler inline before it continues its own wait.
use crate::transport::Transport;
use crate::urc::{
    HardFaultReport, Indication, DISASSOCIATION_PREFIX, HARD_FAULT_PREFIX, PENDING_DATA_ERROR_PREFIX,
    PENDING_DATA_PREFIX, SOCKET_CLOSED_PREFIX,
};
use crate::wifi::Adapter;
use atat::AtatUrc;
use fugit_timer::Timer;
use heapless::Vec;
use log::{debug, error, warn};

/// Max. number of registered prefixes
pub const OOB_CAPACITY: usize = 8;

/// Handler receiving the full indication line
pub(crate) type OobHandler<A> = fn(&mut A, &str);

/// Fatal events signaled by the module, to be handled by the application
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FaultEvent {
    /// Module crashed. All socket and link state was dropped.
    HardFault(HardFaultReport),

    /// Module and driver disagree about in-flight data. Affected connections need to be torn down.
    PendingDataError,
}

/// Registration failed
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RegistrationError {
    /// Table is full
    Full,

    /// Prefix overlaps with an already registered one
    Ambiguous,
}

/// Prefix -> handler table
pub(crate) struct OobTable<A> {
    entries: Vec<(&'static str, OobHandler<A>), OOB_CAPACITY>,
}

impl<A> OobTable<A> {
    pub(crate) fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Registers a handler. Prefixes must not be a prefix of each other.
    pub(crate) fn register(&mut self, prefix: &'static str, handler: OobHandler<A>) -> Result<(), RegistrationError> {
        if self
            .entries
            .iter()
            .any(|(registered, _)| registered.starts_with(prefix) || prefix.starts_with(registered))
        {
            return Err(RegistrationError::Ambiguous);
        }

        self.entries.push((prefix, handler)).map_err(|_| RegistrationError::Full)
    }

    /// Returns the handler of the prefix matching the line
    pub(crate) fn lookup(&self, line: &str) -> Option<OobHandler<A>> {
        self.entries
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix))
            .map(|(_, handler)| *handler)
    }
}

impl<'a, T: Transport, C: Timer<TIMER_HZ>, const TIMER_HZ: u32, const TX_SIZE: usize>
    Adapter<'a, T, C, TIMER_HZ, TX_SIZE>
{
    pub(crate) fn register_indication_handlers(&mut self) {
        let handlers: [(&'static str, OobHandler<Self>); 5] = [
            (PENDING_DATA_PREFIX, Self::handle_pending_data),
            (DISASSOCIATION_PREFIX, Self::handle_disassociation),
            (HARD_FAULT_PREFIX, Self::handle_hard_fault),
            (SOCKET_CLOSED_PREFIX, Self::handle_socket_closed),
            (PENDING_DATA_ERROR_PREFIX, Self::handle_pending_data_error),
        ];

        for (prefix, handler) in handlers {
            if let Err(registration_error) = self.oob.register(prefix, handler) {
                error!("Registering indication {} failed: {:?}", prefix, registration_error);
            }
        }
    }

    /// Stores the reported amount and pulls the data right away
    fn handle_pending_data(&mut self, line: &str) {
        let Some(Indication::PendingData { module_id, amount }) = Indication::parse(line.as_bytes()) else {
            warn!("Malformed pending data indication: {}", line);
            return;
        };

        debug!("Socket {} has {} bytes pending", module_id, amount);
        // Nested reads are not possible while a blocked command awaits its reply
        if !self.session.ledger.set_pending_data(module_id, amount) || self.session.blocking {
            return;
        }

        if let Err(drain_error) = self.drain_pending() {
            warn!("Draining pending data failed: {:?}", drain_error);
        }
    }

    /// Records the crash and drops all state, as a restart is the only recovery
    fn handle_hard_fault(&mut self, line: &str) {
        let report = match Indication::parse(line.as_bytes()) {
            Some(Indication::HardFault(report)) => report,
            _ => HardFaultReport::default(),
        };

        error!(
            "Module hard fault (console {:?}): r0 {:08X}, r1 {:08X}, r2 {:08X}, r3 {:08X}, r12 {:08X}",
            report.console,
            report.registers[0],
            report.registers[1],
            report.registers[2],
            report.registers[3],
            report.registers[4]
        );

        self.session.reinitialize();
        self.session.fault = Some(FaultEvent::HardFault(report));
    }

    /// Drops queued data of the socket and frees its module id
    fn handle_socket_closed(&mut self, line: &str) {
        let Some(Indication::SocketClosed { module_id }) = Indication::parse(line.as_bytes()) else {
            warn!("Malformed socket closed indication: {}", line);
            return;
        };

        self.session.packets.purge(module_id);

        match self.session.ledger.resolve(module_id) {
            Some(slot) => {
                debug!("Socket {} closed by remote", module_id);
                self.session.ledger.unbind(slot);
            }
            None => warn!("Close indication for unknown socket {}", module_id),
        }
    }

    fn handle_pending_data_error(&mut self, line: &str) {
        error!("Pending data desynchronized: {}", line);
        self.session.fault = Some(FaultEvent::PendingDataError);
    }
}
