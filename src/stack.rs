//! # TCP client stack
//!
//! Implements [TcpClientStack] of [embedded_nal] on top of the socket data path.
//!
//! Payload chunk size is defined as const generic, s. [Adapter] for more details.
//!
//! ## Example
//!
//! ````ignore
//! use core::str::FromStr;
//! use embedded_nal::{SocketAddr, TcpClientStack};
//!
//! // Creating a TCP connection
//! let mut socket = adapter.socket().unwrap();
//! adapter.connect(&mut socket, SocketAddr::from_str("10.0.0.1:21").unwrap()).unwrap();
//!
//! // Sending some data
//! adapter.send(&mut socket, b"hallo!").unwrap();
//!
//! // Receiving some data, returns WouldBlock if nothing arrived yet
//! let mut rx_buffer = [0x0; 64];
//! let length = nb::block!(adapter.receive(&mut socket, &mut rx_buffer)).unwrap();
//!
//! // Closing socket
//! adapter.close(socket).unwrap();
//! ````
use crate::commands::SocketKind;
use crate::ledger::ConnectionState;
use crate::transport::Transport;
use crate::wifi::Adapter;
use atat::Error as AtError;
use core::fmt::Write;
use embedded_nal::{SocketAddr, TcpClientStack, TcpError, TcpErrorKind};
use fugit_timer::Timer;
use heapless::String;
use log::warn;

/// Unique socket for a network connection
#[derive(Debug)]
pub struct Socket {
    /// Ledger slot of the socket
    pub(crate) slot: usize,
}

impl Socket {
    pub(crate) fn new(slot: usize) -> Self {
        Self { slot }
    }
}

/// Network related errors
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// Socket open command failed (AT+S.SOCKON)
    OpenFailed(AtError),

    /// Socket write command or the payload transmission failed (AT+S.SOCKW)
    SendFailed(AtError),

    /// Pending length query failed (AT+S.SOCKQ)
    QueryFailed(AtError),

    /// Reading pending data failed (AT+S.SOCKR)
    ReadFailed(AtError),

    /// Socket close command failed (AT+S.SOCKC)
    CloseFailed(AtError),

    /// Bare AT probe was not acknowledged
    ProbeFailed(AtError),

    /// Scan command failed while handling a disassociation
    ScanFailed(AtError),

    /// Roam command failed while handling a disassociation
    RoamFailed(AtError),

    /// Async indications could not be blocked for sending a length or read query
    BlockingFailed(AtError),

    /// Packet buffer could not be allocated. Data stays pending on the module.
    OutOfMemory,

    /// No socket available, since the maximum number is in use.
    NoSocketAvailable,

    /// Given socket is already connected to another remote. Socket needs to be closed first.
    AlreadyConnected,

    /// Unable to send/receive data if socket is not connected
    SocketUnconnected,

    /// Socket was remotely closed and needs to either reconnected to fully closed by calling `close()` for [Adapter]
    ClosingSocket,

    /// Module socket id is not bound to any socket
    UnknownSocket,
}

impl TcpError for Error {
    fn kind(&self) -> TcpErrorKind {
        match self {
            Error::ClosingSocket | Error::SocketUnconnected => TcpErrorKind::PipeClosed,
            _ => TcpErrorKind::Other,
        }
    }
}

impl<'a, T: Transport, C: Timer<TIMER_HZ>, const TIMER_HZ: u32, const TX_SIZE: usize> TcpClientStack
    for Adapter<'a, T, C, TIMER_HZ, TX_SIZE>
{
    type TcpSocket = Socket;
    type Error = Error;

    /// Reserves and returns a new socket.
    /// Up to eight parallel sockets are supported. If no socket is available [Error::NoSocketAvailable] is returned.
    fn socket(&mut self) -> Result<Self::TcpSocket, Self::Error> {
        let slot = self.session.ledger.allocate().ok_or(Error::NoSocketAvailable)?;
        Ok(Socket::new(slot))
    }

    /// Opens a new TCP connection. Returns [Error::AlreadyConnected] if socket is already connected.
    /// Remotely closed sockets may be reconnected.
    fn connect(&mut self, socket: &mut Socket, remote: SocketAddr) -> nb::Result<(), Self::Error> {
        match self.session.ledger.entry(socket.slot).state {
            ConnectionState::Connected => return nb::Result::Err(nb::Error::Other(Error::AlreadyConnected)),
            ConnectionState::Closed => return nb::Result::Err(nb::Error::Other(Error::UnknownSocket)),
            ConnectionState::Open | ConnectionState::Closing => {}
        }

        let mut host: String<39> = String::new();
        write!(host, "{}", remote.ip()).map_err(|_| Error::OpenFailed(AtError::Write))?;

        let module_id = self.open(SocketKind::Tcp, &host, remote.port())?;
        self.session.ledger.bind(socket.slot, module_id);

        nb::Result::Ok(())
    }

    /// Sends the given buffer and returns the length (in bytes) sent.
    /// The data is divided into smaller blocks. The block size is determined by the generic constant TX_SIZE.
    fn send(&mut self, socket: &mut Socket, buffer: &[u8]) -> nb::Result<usize, Error> {
        let module_id = self.assert_socket_connected(socket)?;
        self.send_data(module_id, buffer)?;

        nb::Result::Ok(buffer.len())
    }

    /// Returns received data of the socket. Probes the module once, if no data is buffered yet.
    /// Returns WouldBlock if still no data is available.
    fn receive(&mut self, socket: &mut Self::TcpSocket, buffer: &mut [u8]) -> nb::Result<usize, Self::Error> {
        let module_id = self.assert_socket_connected(socket)?;

        match self.poll_recv(module_id, buffer)? {
            Some(length) => nb::Result::Ok(length),
            None => nb::Result::Err(nb::Error::WouldBlock),
        }
    }

    /// Closes a socket
    ///
    /// Pending data is drained before the close command is sent. If the socket has already been closed by
    /// the remote side or is not connected, no command is sent.
    /// In case of an error (which is returned) the socket is internally set to closed so that it is not lost
    /// and can be reused.
    fn close(&mut self, socket: Self::TcpSocket) -> Result<(), Self::Error> {
        let result = match self.session.ledger.entry(socket.slot).module_id {
            Some(module_id) => self.close_socket(module_id),
            None => Ok(()),
        };

        if let Err(error) = &result {
            warn!("Closing socket {} failed: {:?}", socket.slot, error);
        }

        // Releasing even on error. Otherwise socket can not be reused in future, as its consumed.
        self.session.ledger.release(socket.slot);
        result
    }
}

impl<'a, T: Transport, C: Timer<TIMER_HZ>, const TIMER_HZ: u32, const TX_SIZE: usize>
    Adapter<'a, T, C, TIMER_HZ, TX_SIZE>
{
    /// Returns true if the socket is currently connected. Connection aborts by the remote side are also taken into account.
    pub fn is_socket_connected(&self, socket: &Socket) -> bool {
        self.session.ledger.entry(socket.slot).state == ConnectionState::Connected
    }

    /// Asserts that the given socket is connected and returns its module id
    fn assert_socket_connected(&self, socket: &Socket) -> Result<u8, Error> {
        let entry = self.session.ledger.entry(socket.slot);

        match (entry.state, entry.module_id) {
            (ConnectionState::Connected, Some(module_id)) => Ok(module_id),
            (ConnectionState::Closing, _) => Err(Error::ClosingSocket),
            _ => Err(Error::SocketUnconnected),
        }
    }
}
