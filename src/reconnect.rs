//! # Disassociation handling
//!
//! A disassociation indication triggers a scan and a roam command. The outermost handler of a
//! previously associated link then waits for the module to signal link up again, while nested
//! handlers (disassociations seen during that wait) just issue their commands and return.
//!
//! Every handler invocation saves its context in a [ReassociationFrame], which gets restored on
//! all exit paths.
use crate::commands::{RoamCommand, ScanCommand};
use crate::responses::{Response, WifiUpResponse};
use crate::transport::Transport;
use crate::urc::Indication;
use crate::wifi::Adapter;
use atat::AtatUrc;
use atat::Error as AtError;
use fugit_timer::Timer;
use log::{debug, info, trace, warn};

/// Association state of the WIFI link
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LinkState {
    /// Connected to an access point
    Associated,

    /// Association lost, module is roaming
    Reassociating,

    /// Not connected
    Disassociated,
}

/// Result of a single disassociation handler invocation
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReassociationOutcome {
    /// Link up was signaled again
    Reassociated,

    /// Nested or previously unassociated handler, which did not wait for link up
    Skipped,

    /// Link up was not signaled within the connect timeout
    TimedOut,

    /// Indication was malformed or scan/roam command failed
    Failed,
}

/// Context saved on entry of a disassociation handler
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct ReassociationFrame {
    /// Response timeout active on entry
    pub(crate) saved_timeout_ms: u32,

    /// True if the link was associated on entry
    pub(crate) was_associated: bool,

    /// Nesting level of this handler, starting at 1
    pub(crate) depth: u8,
}

impl ReassociationFrame {
    /// Only the outermost handler of a previously associated link waits for link up
    pub(crate) fn awaits_link_up(&self) -> bool {
        self.depth == 1 && self.was_associated
    }
}

impl<'a, T: Transport, C: Timer<TIMER_HZ>, const TIMER_HZ: u32, const TX_SIZE: usize>
    Adapter<'a, T, C, TIMER_HZ, TX_SIZE>
{
    pub(crate) fn handle_disassociation(&mut self, line: &str) {
        let frame = self.enter_reassociation();
        let outcome = self.reassociate(line, &frame);
        self.leave_reassociation(frame, outcome);
    }

    /// Outcome of the last completed disassociation handler
    pub fn last_reassociation(&self) -> Option<ReassociationOutcome> {
        self.session.last_reassociation
    }

    /// Updates the link state on link up lines nobody is waiting for
    pub(crate) fn observe_unmatched(&mut self, line: &str) {
        if let Some(response) = WifiUpResponse::parse(line) {
            info!("Link up ({})", response.address);
            self.session.link = LinkState::Associated;
            self.session.address = Some(response.address);
            return;
        }

        trace!("Ignoring line: {}", line);
    }

    fn enter_reassociation(&mut self) -> ReassociationFrame {
        self.session.reassociation_depth = self.session.reassociation_depth.saturating_add(1);

        let frame = ReassociationFrame {
            saved_timeout_ms: self.session.timeout_ms,
            was_associated: self.session.link == LinkState::Associated,
            depth: self.session.reassociation_depth,
        };

        self.session.link = LinkState::Disassociated;
        self.session.timeout_ms = self.session.reassociation_timeout_ms;
        frame
    }

    fn reassociate(&mut self, line: &str, frame: &ReassociationFrame) -> ReassociationOutcome {
        let Some(Indication::Disassociation { reason }) = Indication::parse(line.as_bytes()) else {
            warn!("Malformed disassociation indication: {}", line);
            return ReassociationOutcome::Failed;
        };
        warn!("WIFI disassociated (reason {}, depth {})", reason, frame.depth);

        if let Err(error) = self.send_command(&ScanCommand) {
            warn!("Scan after disassociation failed: {:?}", error);
            return ReassociationOutcome::Failed;
        }

        if let Err(error) = self.send_command(&RoamCommand) {
            warn!("Roaming after disassociation failed: {:?}", error);
            return ReassociationOutcome::Failed;
        }

        self.session.timeout_ms = self.session.response_timeout_ms;

        // Link up may have been observed while awaiting the scan/roam acknowledgments
        if self.session.link != LinkState::Associated {
            self.session.link = LinkState::Reassociating;
        }

        if !frame.awaits_link_up() {
            debug!("Not waiting for reassociation (depth {})", frame.depth);
            return ReassociationOutcome::Skipped;
        }

        self.wake.request_release(true);
        let outcome = self.await_link_up();
        self.wake.request_release(false);

        outcome
    }

    /// Alternates between scanning for link up and waiting for new data
    fn await_link_up(&mut self) -> ReassociationOutcome {
        loop {
            if self.session.link == LinkState::Associated {
                return ReassociationOutcome::Reassociated;
            }

            match self.await_response::<WifiUpResponse>() {
                Ok(response) => {
                    info!("Reassociated ({})", response.address);
                    self.session.link = LinkState::Associated;
                    self.session.address = Some(response.address);
                    return ReassociationOutcome::Reassociated;
                }
                Err(AtError::Timeout) => {}
                Err(error) => {
                    warn!("Awaiting link up failed: {:?}", error);
                    return ReassociationOutcome::Failed;
                }
            }

            // A nested handler may have consumed the link up line
            if self.session.link == LinkState::Associated {
                return ReassociationOutcome::Reassociated;
            }

            if !self.wait_for_wake(self.session.connect_timeout_ms) {
                warn!("Reassociation timed out");
                return ReassociationOutcome::TimedOut;
            }
        }
    }

    /// Returns true if the wake signal got released or data is ready, false on timeout
    fn wait_for_wake(&mut self, timeout_ms: u32) -> bool {
        if self.start_timer(timeout_ms).is_err() {
            return false;
        }

        loop {
            if self.wake.take() || self.is_readable() {
                return true;
            }

            if self.timer_expired() {
                return false;
            }
        }
    }

    fn leave_reassociation(&mut self, frame: ReassociationFrame, outcome: ReassociationOutcome) {
        self.session.timeout_ms = frame.saved_timeout_ms;
        self.session.reassociation_depth = self.session.reassociation_depth.saturating_sub(1);

        let gave_up = matches!(outcome, ReassociationOutcome::Failed | ReassociationOutcome::TimedOut);
        if gave_up && self.session.link != LinkState::Associated {
            self.session.link = LinkState::Disassociated;
        }

        debug!("Leaving disassociation handler (depth {}): {:?}", frame.depth, outcome);
        self.session.last_reassociation = Some(outcome);
    }
}
