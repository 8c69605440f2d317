//! # Socket data path
//!
//! Socket operations on module socket ids. Received data is pulled from the module as soon as it
//! is announced and buffered in the [PacketQueue](crate::queue::PacketQueue) until consumed.
//!
//! Length and read queries are sent with blocked async indications: A bare `AT` probe is written
//! first, all indications already in flight are consumed, and the real command follows without
//! its `AT` prefix.
use crate::commands::{
    CloseSocketCommand, CommandErrorHandler, OpenSocketCommand, ProbeCommand, QuerySocketCommand, ReadSocketCommand,
    SocketKind, WriteSocketCommand,
};
use crate::ledger::SOCKET_COUNT;
use crate::responses::{DataLengthResponse, SocketIdResponse};
use crate::stack::Error;
use crate::transport::Transport;
use crate::urc::{Indication, PENDING_DATA_PREFIX};
use crate::wifi::Adapter;
use atat::Error as AtError;
use fugit_timer::Timer;
use log::{debug, trace, warn};

impl<'a, T: Transport, C: Timer<TIMER_HZ>, const TIMER_HZ: u32, const TX_SIZE: usize>
    Adapter<'a, T, C, TIMER_HZ, TX_SIZE>
{
    /// Opens a socket to the given host and returns the id assigned by the module
    pub fn open(&mut self, kind: SocketKind, host: &str, port: u16) -> Result<u8, Error> {
        let response: SocketIdResponse = self.query(&OpenSocketCommand::new(kind, host, port))?;
        debug!("Opened socket {} to {}:{}", response.module_id, host, port);
        Ok(response.module_id)
    }

    /// Sends the data in chunks of max. TX_SIZE bytes. Any failed chunk aborts the transmission.
    pub fn send_data(&mut self, module_id: u8, data: &[u8]) -> Result<(), Error> {
        for chunk in data.chunks(TX_SIZE) {
            let command = WriteSocketCommand::new(module_id, chunk.len());

            self.write_command(&command)
                .and_then(|_| self.write_raw(chunk))
                .and_then(|_| self.await_ok())
                .map_err(|error| command.command_error(error))?;
        }

        Ok(())
    }

    /// Queries the number of bytes buffered by the module and updates the ledger
    pub fn query_pending_length(&mut self, module_id: u8) -> Result<u32, Error> {
        let command = QuerySocketCommand::new(module_id);

        let response = self.with_blocked_indications(
            |adapter| {
                adapter
                    .await_blocked::<_, DataLengthResponse>(&command)
                    .map_err(|error| command.command_error(error))
            },
            Error::BlockingFailed,
        )?;

        trace!("Socket {} reports {} bytes pending", module_id, response.length);
        self.session.ledger.set_pending_data(module_id, response.length);
        Ok(response.length)
    }

    /// Reads exactly the buffer length from the module and returns the refreshed pending byte count
    pub fn pull_bytes(&mut self, module_id: u8, buffer: &mut [u8]) -> Result<u32, Error> {
        self.read_pending(module_id, buffer)?;
        self.query_pending_length(module_id)
    }

    /// Pulls all pending data into the packet queue. Sockets are served round-robin, one packet per turn.
    ///
    /// Stops on the first failure. On allocation failure the remaining data stays pending for the
    /// next call and [Error::OutOfMemory] is returned. Nested calls are no-ops.
    pub fn drain_pending(&mut self) -> Result<(), Error> {
        if self.session.draining {
            return Ok(());
        }

        self.session.draining = true;
        let result = self.drain_cycle();
        self.session.draining = false;

        result
    }

    /// Blocks until data for the socket is available and returns the number of bytes written to the buffer.
    ///
    /// There is no upper bound besides the response timeout of each probe, s. [Adapter::poll_recv] for a
    /// non-blocking variant.
    pub fn recv(&mut self, module_id: u8, buffer: &mut [u8]) -> Result<usize, Error> {
        loop {
            if let Some(length) = self.poll_recv(module_id, buffer)? {
                return Ok(length);
            }
        }
    }

    /// Returns queued data of the socket. If none is queued, the module is probed once, so that announced
    /// data gets pulled. Returns None if still no data is available.
    pub fn poll_recv(&mut self, module_id: u8, buffer: &mut [u8]) -> Result<Option<usize>, Error> {
        if let Some(length) = self.session.packets.dequeue_for(module_id, buffer) {
            return Ok(Some(length));
        }

        if self.session.ledger.resolve(module_id).is_none() {
            return Err(Error::UnknownSocket);
        }

        self.drain_or_warn();
        self.send_command(&ProbeCommand)?;

        Ok(self.session.packets.dequeue_for(module_id, buffer))
    }

    /// Drains the socket and closes it. Queued data is dropped only if the module confirmed the close.
    pub fn close_socket(&mut self, module_id: u8) -> Result<(), Error> {
        let result = self
            .drain_socket(module_id)
            .and_then(|_| self.send_command(&CloseSocketCommand::new(module_id)));

        self.drain_or_warn();

        if result.is_ok() {
            self.session.packets.purge(module_id);
            debug!("Closed socket {}", module_id);
        }

        result
    }

    /// Runs the operation with blocked async indications. Fails with the mapped error if blocking failed.
    pub(crate) fn with_blocked_indications<R, E>(
        &mut self,
        operation: impl FnOnce(&mut Self) -> Result<R, E>,
        blocking_error: impl FnOnce(AtError) -> E,
    ) -> Result<R, E> {
        let was_blocking = self.session.blocking;
        self.session.blocking = true;

        let result = match self.block_async_indications() {
            Ok(_) => operation(self),
            Err(error) => Err(blocking_error(error)),
        };

        self.session.blocking = was_blocking;
        result
    }

    /// Consumes all indications in flight, so that the next command does not interleave with them.
    /// Tries to resynchronize the stream on failure.
    pub(crate) fn block_async_indications(&mut self) -> Result<(), AtError> {
        let result = self.consume_indications();

        if let Err(error) = &result {
            warn!("Blocking async indications failed: {:?}", error);
            self.resynchronize();
        }

        result
    }

    fn consume_indications(&mut self) -> Result<(), AtError> {
        self.write_partial(&ProbeCommand)?;
        self.await_tx_flushed()?;

        while self.transport.read_ready().map_err(|_| AtError::Read)? {
            let line = self.read_transport_line()?;

            if let Some(fields) = line.strip_prefix(PENDING_DATA_PREFIX) {
                let (module_id, amount) = Indication::parse_pending_data(fields).ok_or(AtError::InvalidResponse)?;
                trace!("Socket {} has {} bytes pending (blocked)", module_id, amount);

                self.session.ledger.set_pending_data(module_id, amount);
                continue;
            }

            self.defer_line(line);
        }

        Ok(())
    }

    /// Terminates the partial probe and awaits its acknowledgment
    fn resynchronize(&mut self) {
        if let Err(error) = self.write_delimiter().and_then(|_| self.await_ok()) {
            warn!("Resynchronization failed: {:?}", error);
        }
    }

    /// Sends the command (probe was already written) and awaits the given response + acknowledgment
    fn await_blocked<Cmd: core::fmt::Display, R: crate::responses::Response>(
        &mut self,
        command: &Cmd,
    ) -> Result<R, AtError> {
        self.write_blocked_command(command)?;
        let response = self.await_response::<R>()?;
        self.await_ok()?;
        Ok(response)
    }

    /// Reads exactly the buffer length of pending bytes without refreshing the pending count
    fn read_pending(&mut self, module_id: u8, buffer: &mut [u8]) -> Result<(), Error> {
        let command = ReadSocketCommand::new(module_id, buffer.len() as u32);

        self.with_blocked_indications(
            |adapter| {
                adapter
                    .write_blocked_command(&command)
                    .and_then(|_| adapter.read_raw(buffer))
                    .and_then(|_| adapter.await_ok())
                    .map_err(|error| command.command_error(error))
            },
            Error::BlockingFailed,
        )?;

        // Stays consistent until refreshed, even if the refresh fails
        if let Some(slot) = self.session.ledger.resolve(module_id) {
            let remaining = self.session.ledger.pending(slot).saturating_sub(buffer.len() as u32);
            self.session.ledger.set_slot_pending(slot, remaining);
        }

        Ok(())
    }

    fn drain_cycle(&mut self) -> Result<(), Error> {
        while let Some(slot) = self.next_pending_slot() {
            self.session.drain_cursor = (slot + 1) % SOCKET_COUNT;
            self.pull_packet(slot)?;
        }

        Ok(())
    }

    /// First slot with pending data, starting at the round-robin cursor
    fn next_pending_slot(&self) -> Option<usize> {
        if !self.session.ledger.has_pending_data() {
            return None;
        }

        (0..SOCKET_COUNT)
            .map(|offset| (self.session.drain_cursor + offset) % SOCKET_COUNT)
            .find(|slot| {
                let entry = self.session.ledger.entry(*slot);
                entry.pending > 0 && entry.module_id.is_some()
            })
    }

    /// Pulls the pending data of the slot as one packet, limited by the free packet budget
    fn pull_packet(&mut self, slot: usize) -> Result<(), Error> {
        let entry = *self.session.ledger.entry(slot);
        let Some(module_id) = entry.module_id else {
            return Ok(());
        };

        let length = (entry.pending as usize).min(self.session.packets.available());
        if length == 0 {
            warn!("Packet budget exhausted, {} bytes of socket {} stay pending", entry.pending, module_id);
            return Err(Error::OutOfMemory);
        }

        let mut buffer = self.session.packets.allocate(length).map_err(|_| Error::OutOfMemory)?;
        self.read_pending(module_id, &mut buffer)?;

        // Socket may have been closed by an indication received during the read
        if self.session.ledger.resolve(module_id) != Some(slot) {
            debug!("Dropping {} bytes of closed socket {}", length, module_id);
            return Ok(());
        }

        self.session.packets.push(module_id, buffer).map_err(|_| Error::OutOfMemory)?;

        self.query_pending_length(module_id)?;
        Ok(())
    }

    /// Pulls the socket's data until the module reports nothing pending
    fn drain_socket(&mut self, module_id: u8) -> Result<(), Error> {
        let Some(slot) = self.session.ledger.resolve(module_id) else {
            return Ok(());
        };

        let mut pending = self.query_pending_length(module_id)?;
        while pending > 0 {
            self.pull_packet(slot)?;
            pending = self.session.ledger.pending(slot);
        }

        Ok(())
    }

    fn drain_or_warn(&mut self) {
        if let Err(error) = self.drain_pending() {
            warn!("Reading pending data failed: {:?}", error);
        }
    }
}
