//! Command/Response matcher
//!
//! Reads CR/LF terminated lines from the transport and checks every line against the registered
//! indication prefixes before matching it against the awaited response. Indication handlers run
//! inline and may issue their own commands, so waits nest.
use crate::commands::{encode, CommandErrorHandler};
use crate::responses::{OkResponse, Response};
use crate::transport::Transport;
use crate::wifi::Adapter;
use alloc::collections::VecDeque;
use atat::Error as AtError;
use core::fmt::Display;
use fugit::TimerDurationU32;
use fugit_timer::Timer;
use heapless::{String, Vec};
use log::{debug, trace, warn};

/// Max. length of a received line. Longer lines get truncated.
pub const LINE_SIZE: usize = 128;

pub(crate) type Line = String<LINE_SIZE>;
/// Lines read while async indications are blocked, replayed by the next regular wait
pub(crate) type DeferredLines = VecDeque<Line>;

/// Command delimiter
const DELIMITER: &[u8] = b"\r";

/// Upper bound of spin iterations between two polls of the transmit queue
const MAX_BACKOFF_SPINS: u32 = 1024;

impl<'a, T: Transport, C: Timer<TIMER_HZ>, const TIMER_HZ: u32, const TX_SIZE: usize>
    Adapter<'a, T, C, TIMER_HZ, TX_SIZE>
{
    /// Sends a command, awaits the acknowledgment and maps the error
    pub(crate) fn send_command<Cmd: Display + CommandErrorHandler>(&mut self, command: &Cmd) -> Result<(), Cmd::Error> {
        self.write_command(command)
            .and_then(|_| self.await_ok())
            .map_err(|error| command.command_error(error))
    }

    /// Writes the command line followed by the delimiter. Success just means the transport accepted the bytes.
    pub(crate) fn write_command<Cmd: Display>(&mut self, command: &Cmd) -> Result<(), AtError> {
        let line = Self::encode_command(command)?;
        debug!("AT> {}", line.as_str());

        self.write_raw(line.as_bytes())?;
        self.write_raw(DELIMITER)
    }

    /// Writes the command line without `AT` prefix, as the prefix was already sent by the blocking probe
    pub(crate) fn write_blocked_command<Cmd: Display>(&mut self, command: &Cmd) -> Result<(), AtError> {
        let line = Self::encode_command(command)?;
        let line = line.strip_prefix("AT").unwrap_or(line.as_str());
        debug!("AT> (blocked) {}", line);

        self.write_raw(line.as_bytes())?;
        self.write_raw(DELIMITER)
    }

    /// Writes the command line without any delimiter
    pub(crate) fn write_partial<Cmd: Display>(&mut self, command: &Cmd) -> Result<(), AtError> {
        let line = Self::encode_command(command)?;
        self.write_raw(line.as_bytes())
    }

    /// Writes just the delimiter, which terminates any partially written command
    pub(crate) fn write_delimiter(&mut self) -> Result<(), AtError> {
        self.write_raw(DELIMITER)
    }

    pub(crate) fn write_raw(&mut self, data: &[u8]) -> Result<(), AtError> {
        self.transport.write_all(data).map_err(|_| AtError::Write)
    }

    /// Reads exactly the buffer length of raw bytes
    pub(crate) fn read_raw(&mut self, buffer: &mut [u8]) -> Result<(), AtError> {
        for byte in buffer.iter_mut() {
            *byte = self.read_byte()?;
        }

        Ok(())
    }

    /// Awaits the standard acknowledgment
    pub(crate) fn await_ok(&mut self) -> Result<(), AtError> {
        self.await_response::<OkResponse>().map(|_| ())
    }

    /// Scans incoming lines until the response matches. Registered indications are dispatched inline.
    ///
    /// Fails on timeout, on transport errors or if the module responds with an error line.
    pub(crate) fn await_response<R: Response>(&mut self) -> Result<R, AtError> {
        loop {
            let line = self.read_line()?;

            if let Some(handler) = self.oob.lookup(&line) {
                trace!("Dispatching indication: {}", line.as_str());
                handler(self, &line);
                continue;
            }

            if let Some(response) = R::parse(&line) {
                return Ok(response);
            }

            if line.starts_with("ERROR") {
                debug!("AT< {}", line.as_str());
                return Err(AtError::Error);
            }

            self.observe_unmatched(&line);
        }
    }

    /// Returns the next line. Deferred lines are returned first, unless indications are currently blocked.
    pub(crate) fn read_line(&mut self) -> Result<Line, AtError> {
        if !self.session.blocking {
            if let Some(line) = self.session.deferred.pop_front() {
                return Ok(line);
            }
        }

        self.read_transport_line()
    }

    /// Reads the next non-empty line from the transport
    pub(crate) fn read_transport_line(&mut self) -> Result<Line, AtError> {
        let mut buffer: Vec<u8, LINE_SIZE> = Vec::new();
        let mut truncated = false;

        loop {
            let byte = self.read_byte()?;

            if byte != b'\n' {
                if buffer.push(byte).is_err() {
                    truncated = true;
                }
                continue;
            }

            if buffer.last() == Some(&b'\r') {
                buffer.pop();
            }

            if buffer.is_empty() {
                continue;
            }

            if truncated {
                warn!("Received line exceeds {} bytes and got truncated", LINE_SIZE);
            }

            let Ok(text) = core::str::from_utf8(&buffer) else {
                warn!("Dropping non UTF-8 line of {} bytes", buffer.len());
                buffer.clear();
                truncated = false;
                continue;
            };

            let mut line = Line::new();
            // Capacity is equal, so this can not fail
            let _ = line.push_str(text);
            trace!("AT< {}", line.as_str());
            return Ok(line);
        }
    }

    /// Keeps a line for the next regular wait. The line is only dropped if allocation fails.
    pub(crate) fn defer_line(&mut self, line: Line) {
        if self.session.deferred.try_reserve(1).is_err() {
            warn!("Out of memory while deferring line, dropping: {}", line.as_str());
            return;
        }

        self.session.deferred.push_back(line);
    }

    /// Reads a single byte. The timeout restarts on every byte.
    fn read_byte(&mut self) -> Result<u8, AtError> {
        self.start_timer(self.session.timeout_ms)?;

        loop {
            if self.transport.read_ready().map_err(|_| AtError::Read)? {
                let mut byte = [0x0];
                if self.transport.read(&mut byte).map_err(|_| AtError::Read)? == 1 {
                    return Ok(byte[0]);
                }
            }

            if self.timer_expired() {
                return Err(AtError::Timeout);
            }
        }
    }

    /// Polls until all written bytes left the transport, bounded by the active timeout
    pub(crate) fn await_tx_flushed(&mut self) -> Result<(), AtError> {
        self.start_timer(self.session.timeout_ms)?;
        let mut spins = 1;

        while self.transport.tx_pending() {
            if self.timer_expired() {
                return Err(AtError::Timeout);
            }

            for _ in 0..spins {
                core::hint::spin_loop();
            }
            spins = (spins * 2).min(MAX_BACKOFF_SPINS);
        }

        Ok(())
    }

    pub(crate) fn start_timer(&mut self, timeout_ms: u32) -> Result<(), AtError> {
        self.timer
            .start(TimerDurationU32::<TIMER_HZ>::millis(timeout_ms))
            .map_err(|_| {
                warn!("Starting timer failed");
                AtError::Timeout
            })
    }

    /// Returns true if the timer expired. Timer errors count as expired.
    pub(crate) fn timer_expired(&mut self) -> bool {
        match self.timer.wait() {
            Ok(_) => true,
            Err(nb::Error::WouldBlock) => false,
            Err(nb::Error::Other(_)) => {
                warn!("Timer error");
                true
            }
        }
    }

    fn encode_command<Cmd: Display>(command: &Cmd) -> Result<String<{ crate::commands::COMMAND_SIZE }>, AtError> {
        encode(command).ok_or_else(|| {
            warn!("Command exceeds {} bytes", crate::commands::COMMAND_SIZE);
            AtError::Write
        })
    }
}
