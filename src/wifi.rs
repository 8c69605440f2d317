//! # WIFI station client
//!
//! The [Adapter] owns the serial transport, the timer and the complete session state. All commands
//! get issued by the foreground. Only the [WakeSignal] is shared with the interrupt context.
//!
//! ## Example
//!
//! ````ignore
//! use spwf_at_nal::signal::WakeSignal;
//! use spwf_at_nal::wifi::{Adapter, Security, WifiAdapter, WifiMode};
//!
//! static WAKE: WakeSignal = WakeSignal::new();
//!
//! let mut adapter: Adapter<_, _, 1_000_000, 4096> = Adapter::new(serial, timer, &WAKE);
//! adapter.startup(WifiMode::Station).unwrap();
//!
//! let state = adapter.join("test_wifi", "secret", Security::WpaPersonal).unwrap();
//! assert!(state.connected);
//! ````
use crate::commands::{
    CommandErrorHandler, GetConfigCommand, RestartCommand, SetConfigCommand, SetSsidCommand, StatusCommand,
};
use crate::ledger::Ledger;
use crate::oob::{FaultEvent, OobTable};
use crate::parser::DeferredLines;
use crate::queue::{PacketQueue, DEFAULT_PACKET_BUDGET};
use crate::reconnect::{LinkState, ReassociationOutcome};
use crate::responses::{ConsoleActiveResponse, IpAddressResponse, MacAddressResponse, WifiUpResponse};
use crate::signal::WakeSignal;
use crate::transport::Transport;
use atat::Error as AtError;
use core::fmt::Debug;
use embedded_nal::Ipv4Addr;
use fugit_timer::Timer;
use heapless::String;
use log::{info, warn};

/// Default response timeout (inactivity window per received byte)
pub const DEFAULT_TIMEOUT_MS: u32 = 10_000;

/// Default timeout for scan/roam commands while handling a disassociation
pub const DEFAULT_REASSOCIATION_TIMEOUT_MS: u32 = 500;

/// Default timeout for joining a network and for waiting on reassociation
pub const DEFAULT_CONNECT_TIMEOUT_MS: u32 = 60_000;

/// Wifi network adapter trait
pub trait WifiAdapter {
    /// Error when joining a WIFI network
    type JoinError: Debug;

    /// Error when receiving local address information
    type AddressError: Debug;

    /// Errors for configuration commands
    type ConfigurationError: Debug;

    /// Errors when restarting the module
    type RestartError: Debug;

    /// Restarts and configures the module for the given mode
    fn startup(&mut self, mode: WifiMode) -> Result<(), Self::ConfigurationError>;

    /// Restarts the module and blocks until the console is active
    fn restart(&mut self) -> Result<(), Self::RestartError>;

    /// Connects to an WIFI access point and blocks until the link is up
    fn join(&mut self, ssid: &str, key: &str, security: Security) -> Result<JoinState, Self::JoinError>;

    /// Disconnects from the current network
    fn leave(&mut self) -> Result<(), Self::ConfigurationError>;

    /// 0: off, 1: on, 2: on & customizable
    fn set_dhcp(&mut self, mode: u8) -> Result<(), Self::ConfigurationError>;

    /// Returns the current WIFI connection status
    fn get_join_status(&mut self) -> JoinState;

    /// Returns local address information
    fn get_address(&mut self) -> Result<LocalAddress, Self::AddressError>;
}

/// Central client for network communication
///
/// TX_SIZE: Max. payload size in bytes of a single socket write command. The module accepts up to 4096 bytes.
pub struct Adapter<'a, T: Transport, C: Timer<TIMER_HZ>, const TIMER_HZ: u32, const TX_SIZE: usize> {
    /// Serial link to the module
    pub(crate) transport: T,

    /// Timer used for timeout measurement
    pub(crate) timer: C,

    /// Released by the data arrived notification of the transport
    pub(crate) wake: &'a WakeSignal,

    /// Registered asynchronous indication handlers
    pub(crate) oob: OobTable<Adapter<'a, T, C, TIMER_HZ, TX_SIZE>>,

    /// Protocol state
    pub(crate) session: Session,
}

/// Protocol state owned by the foreground
pub(crate) struct Session {
    /// Currently active response timeout
    pub(crate) timeout_ms: u32,

    /// Normal operating response timeout
    pub(crate) response_timeout_ms: u32,

    /// Response timeout while handling a disassociation
    pub(crate) reassociation_timeout_ms: u32,

    /// Timeout for joining and for waiting on the link to come back up
    pub(crate) connect_timeout_ms: u32,

    /// Current association state
    pub(crate) link: LinkState,

    /// IP address reported by the last link up indication
    pub(crate) address: Option<Ipv4Addr>,

    /// Number of active disassociation handlers
    pub(crate) reassociation_depth: u8,

    /// Outcome of the last completed disassociation handler
    pub(crate) last_reassociation: Option<ReassociationOutcome>,

    /// True while the drain loop runs. Prevents nested drains out of indication handlers.
    pub(crate) draining: bool,

    /// True while a command is sent with blocked async indications
    pub(crate) blocking: bool,

    /// Lines read while blocking indications, replayed by the next regular wait
    pub(crate) deferred: DeferredLines,

    /// Socket slots and pending data
    pub(crate) ledger: Ledger,

    /// Received payloads
    pub(crate) packets: PacketQueue,

    /// Next slot served by the drain loop
    pub(crate) drain_cursor: usize,

    /// Last fatal event signaled by the module
    pub(crate) fault: Option<FaultEvent>,
}

impl Session {
    fn new() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            response_timeout_ms: DEFAULT_TIMEOUT_MS,
            reassociation_timeout_ms: DEFAULT_REASSOCIATION_TIMEOUT_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            link: LinkState::Disassociated,
            address: None,
            reassociation_depth: 0,
            last_reassociation: None,
            draining: false,
            blocking: false,
            deferred: DeferredLines::new(),
            ledger: Ledger::new(),
            packets: PacketQueue::new(DEFAULT_PACKET_BUDGET),
            drain_cursor: 0,
            fault: None,
        }
    }

    /// Drops all module socket ids, packets and link state. Configuration and active handler frames are kept.
    pub(crate) fn reinitialize(&mut self) {
        self.link = LinkState::Disassociated;
        self.address = None;
        self.deferred.clear();
        self.ledger.unbind_all();
        self.packets.clear();
        self.drain_cursor = 0;
    }
}

/// Operating mode of the module
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WifiMode {
    Idle = 0,
    Station = 1,
    Ibss = 2,
    MiniAccessPoint = 3,
}

/// Security mode of the target network. Credentials are passed through as given.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Security {
    None = 0,
    Wep = 1,
    WpaPersonal = 2,
}

/// Possible errors when joining an access point
#[derive(Clone, Debug, PartialEq)]
pub enum JoinError {
    /// Error while setting a configuration variable (passphrase, security mode, WIFI mode)
    ConfigurationError(ConfigurationError),

    /// Error while setting the SSID
    SsidError(AtError),

    /// Link up was not signaled within the connect timeout
    AssociationFailed(AtError),

    /// Given SSID is longer then the max. size of 32 chars
    InvalidSSIDLength,

    /// Given password is longer then the max. size of 64 chars
    InvalidPasswordLength,
}

/// Errors for configuration commands
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigurationError {
    /// Setting the given variable failed
    CommandFailed(&'static str, AtError),

    /// Restarting the module failed
    RestartFailed(RestartError),

    /// DHCP mode out of range 0..=2
    InvalidDhcpMode,
}

/// Errors when restarting the module
#[derive(Clone, Debug, PartialEq)]
pub enum RestartError {
    /// Sending the restart command failed
    CommandFailed(AtError),

    /// Console active was not signaled within the connect timeout
    ConsoleTimeout(AtError),
}

/// Errors when receiving local address information
#[derive(Clone, Debug, PartialEq)]
pub enum AddressError {
    /// Status or configuration query failed
    CommandError(AtError),
}

/// Current WIFI connection state
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct JoinState {
    /// True if associated to an WIFI access point
    pub connected: bool,

    /// IP address reported on association
    pub address: Option<Ipv4Addr>,
}

/// Local IP and MAC addresses
#[derive(Default, Clone, Debug, PartialEq)]
pub struct LocalAddress {
    /// Local IPv4 address if assigned
    pub ipv4: Option<Ipv4Addr>,

    /// Local MAC address
    pub mac: Option<String<17>>,
}

impl<'a, T: Transport, C: Timer<TIMER_HZ>, const TIMER_HZ: u32, const TX_SIZE: usize> WifiAdapter
    for Adapter<'a, T, C, TIMER_HZ, TX_SIZE>
{
    type JoinError = JoinError;
    type AddressError = AddressError;
    type ConfigurationError = ConfigurationError;
    type RestartError = RestartError;

    fn startup(&mut self, mode: WifiMode) -> Result<(), ConfigurationError> {
        self.restart().map_err(ConfigurationError::RestartFailed)?;

        self.send_command(&SetConfigCommand::local_echo_off())?;
        self.send_command(&SetConfigCommand::number("wifi_ht_mode", 1))?;
        self.send_command(&SetConfigCommand::hex("wifi_opr_rate_mask", 0x003F_FFCF))?;
        self.send_command(&SetConfigCommand::number("wifi_beacon_loss_thresh", 10))?;
        self.send_command(&SetConfigCommand::wifi_mode(mode as u32))?;

        Ok(())
    }

    fn restart(&mut self) -> Result<(), RestartError> {
        let command = RestartCommand;
        self.write_command(&command).map_err(|error| command.command_error(error))?;

        let timeout = self.session.connect_timeout_ms;
        self.await_with_timeout::<ConsoleActiveResponse>(timeout)
            .map_err(RestartError::ConsoleTimeout)?;

        info!("Module restarted");
        self.session.reinitialize();
        Ok(())
    }

    /// Connects to an WIFI access point and returns the connection state
    ///
    /// Blocks until the module signals link up, but at most for the connect timeout.
    fn join(&mut self, ssid: &str, key: &str, security: Security) -> Result<JoinState, JoinError> {
        if ssid.len() > 32 {
            return Err(JoinError::InvalidSSIDLength);
        }

        if key.len() > 64 {
            return Err(JoinError::InvalidPasswordLength);
        }

        self.session.link = LinkState::Disassociated;
        self.session.address = None;

        self.send_guarded(&SetConfigCommand::text("wifi_wpa_psk_text", key))
            .map_err(JoinError::ConfigurationError)?;
        self.send_guarded(&SetSsidCommand::new(ssid))?;
        self.send_guarded(&SetConfigCommand::number("wifi_priv_mode", security as u32))
            .map_err(JoinError::ConfigurationError)?;
        self.send_guarded(&SetConfigCommand::wifi_mode(WifiMode::Station as u32))
            .map_err(JoinError::ConfigurationError)?;

        // Link up may already have been observed while awaiting the command responses
        if self.session.link != LinkState::Associated {
            let timeout = self.session.connect_timeout_ms;
            let response = self
                .await_with_timeout::<WifiUpResponse>(timeout)
                .map_err(JoinError::AssociationFailed)?;

            self.session.link = LinkState::Associated;
            self.session.address = Some(response.address);
        }

        info!("Joined network {}", ssid);
        Ok(self.get_join_status())
    }

    fn leave(&mut self) -> Result<(), ConfigurationError> {
        self.send_guarded(&SetConfigCommand::wifi_mode(WifiMode::Idle as u32))?;
        self.session.link = LinkState::Disassociated;
        self.session.address = None;
        Ok(())
    }

    fn set_dhcp(&mut self, mode: u8) -> Result<(), ConfigurationError> {
        if mode > 2 {
            return Err(ConfigurationError::InvalidDhcpMode);
        }

        self.send_guarded(&SetConfigCommand::dhcp(mode as u32))
    }

    fn get_join_status(&mut self) -> JoinState {
        JoinState {
            connected: self.is_connected(),
            address: self.session.address,
        }
    }

    fn get_address(&mut self) -> Result<LocalAddress, AddressError> {
        let ip: IpAddressResponse = self.query(&StatusCommand::ip_address())?;
        let mac: MacAddressResponse = self.query(&GetConfigCommand::mac_address())?;

        Ok(LocalAddress {
            ipv4: Some(ip.address),
            mac: Some(mac.mac),
        })
    }
}

impl<'a, T: Transport, C: Timer<TIMER_HZ>, const TIMER_HZ: u32, const TX_SIZE: usize>
    Adapter<'a, T, C, TIMER_HZ, TX_SIZE>
{
    /// Creates a new network adapter. The transport needs to call [WakeSignal::notify] on received data.
    pub fn new(transport: T, timer: C, wake: &'a WakeSignal) -> Self {
        let mut adapter = Self {
            transport,
            timer,
            wake,
            oob: OobTable::new(),
            session: Session::new(),
        };

        adapter.register_indication_handlers();
        adapter
    }

    /// True if associated to a network. Gets updated by indications.
    pub fn is_connected(&self) -> bool {
        self.session.link == LinkState::Associated
    }

    /// Current association state
    pub fn link_state(&self) -> LinkState {
        self.session.link
    }

    /// Returns and resets the last fatal event signaled by the module
    pub fn take_fault(&mut self) -> Option<FaultEvent> {
        self.session.fault.take()
    }

    /// Registers (or removes) the user callback invoked on every data arrived notification
    pub fn attach(&self, callback: Option<fn()>) {
        self.wake.attach(callback);
    }

    /// True if received bytes are waiting in the transport
    pub fn is_readable(&mut self) -> bool {
        self.transport.read_ready().unwrap_or(false)
    }

    /// True if the transport accepts more bytes
    pub fn is_writable(&mut self) -> bool {
        self.transport.write_ready().unwrap_or(false)
    }

    /// Pending data bookkeeping
    pub fn ledger(&self) -> &Ledger {
        &self.session.ledger
    }

    /// Received but not yet consumed payloads
    pub fn packets(&self) -> &PacketQueue {
        &self.session.packets
    }

    /// Sets the response timeout in ms. Applies per received byte.
    pub fn set_timeout_ms(&mut self, timeout: u32) {
        self.session.timeout_ms = timeout;
        self.session.response_timeout_ms = timeout;
    }

    /// Sets the timeout of scan/roam commands while handling a disassociation in ms
    pub fn set_reassociation_timeout_ms(&mut self, timeout: u32) {
        self.session.reassociation_timeout_ms = timeout;
    }

    /// Sets the timeout for joining and waiting on reassociation in ms
    pub fn set_connect_timeout_ms(&mut self, timeout: u32) {
        self.session.connect_timeout_ms = timeout;
    }

    /// Sets the max. number of buffered payload bytes
    pub fn set_packet_budget(&mut self, budget: usize) {
        self.session.packets.set_budget(budget);
    }

    /// Sends a command and awaits the given response followed by an acknowledgment
    pub(crate) fn query<Cmd, R>(&mut self, command: &Cmd) -> Result<R, Cmd::Error>
    where
        Cmd: core::fmt::Display + CommandErrorHandler,
        R: crate::responses::Response,
    {
        let result = self.write_command(command).and_then(|_| {
            let response = self.await_response::<R>()?;
            self.await_ok()?;
            Ok(response)
        });

        result.map_err(|error| command.command_error(error))
    }

    /// Awaits the given response with a temporary timeout
    pub(crate) fn await_with_timeout<R: crate::responses::Response>(&mut self, timeout_ms: u32) -> Result<R, AtError> {
        let saved_timeout = self.session.timeout_ms;
        self.session.timeout_ms = timeout_ms;

        let result = self.await_response::<R>();

        self.session.timeout_ms = saved_timeout;
        result
    }

    /// Sends a configuration command with blocked async indications and drains pending data afterwards
    pub(crate) fn send_guarded<Cmd>(&mut self, command: &Cmd) -> Result<(), Cmd::Error>
    where
        Cmd: core::fmt::Display + CommandErrorHandler,
    {
        let saved_timeout = self.session.timeout_ms;
        self.session.timeout_ms = self.session.response_timeout_ms;

        let result = self.with_blocked_indications(
            |adapter| {
                adapter.write_blocked_command(command)?;
                adapter.await_ok()
            },
            |error| error,
        );

        if let Err(error) = self.drain_pending() {
            warn!("Reading pending data failed: {:?}", error);
        }

        self.session.timeout_ms = saved_timeout;
        result.map_err(|error| command.command_error(error))
    }
}
