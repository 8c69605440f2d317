use crate::stack::Error as StackError;
use crate::wifi::{AddressError, ConfigurationError, JoinError, RestartError};
use atat::Error as AtError;
use core::fmt::{Display, Formatter, Result as FmtResult};
use heapless::String;

/// Trait for mapping command errors
pub trait CommandErrorHandler {
    type Error;

    /// Maps regular errors
    fn command_error(&self, error: AtError) -> Self::Error;
}

/// Bare `AT` used for provoking an acknowledgment
#[derive(Clone, Default)]
pub struct ProbeCommand;

impl Display for ProbeCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str("AT")
    }
}

impl CommandErrorHandler for ProbeCommand {
    type Error = StackError;

    fn command_error(&self, error: AtError) -> Self::Error {
        StackError::ProbeFailed(error)
    }
}

/// Socket protocol of the module
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SocketKind {
    Tcp,
    Udp,
    /// TLS secured TCP
    Secure,
}

impl SocketKind {
    fn as_str(&self) -> &'static str {
        match self {
            SocketKind::Tcp => "t",
            SocketKind::Udp => "u",
            SocketKind::Secure => "s",
        }
    }
}

/// Opens a socket with enabled pending data indications
#[derive(Clone)]
pub struct OpenSocketCommand<'a> {
    /// Remote host (IP or hostname)
    host: &'a str,

    /// Remote port
    port: u16,

    kind: SocketKind,
}

impl<'a> OpenSocketCommand<'a> {
    pub fn new(kind: SocketKind, host: &'a str, port: u16) -> Self {
        Self { host, port, kind }
    }
}

impl Display for OpenSocketCommand<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "AT+S.SOCKON={},{},{},ind", self.host, self.port, self.kind.as_str())
    }
}

impl CommandErrorHandler for OpenSocketCommand<'_> {
    type Error = StackError;

    fn command_error(&self, error: AtError) -> Self::Error {
        StackError::OpenFailed(error)
    }
}

/// Announces the given number of payload bytes, which get written raw afterwards
#[derive(Clone)]
pub struct WriteSocketCommand {
    module_id: u8,
    length: usize,
}

impl WriteSocketCommand {
    pub fn new(module_id: u8, length: usize) -> Self {
        Self { module_id, length }
    }
}

impl Display for WriteSocketCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "AT+S.SOCKW={},{}", self.module_id, self.length)
    }
}

impl CommandErrorHandler for WriteSocketCommand {
    type Error = StackError;

    fn command_error(&self, error: AtError) -> Self::Error {
        StackError::SendFailed(error)
    }
}

/// Queries the pending data length. Needs to be sent while async indications are blocked.
#[derive(Clone)]
pub struct QuerySocketCommand {
    module_id: u8,
}

impl QuerySocketCommand {
    pub fn new(module_id: u8) -> Self {
        Self { module_id }
    }
}

impl Display for QuerySocketCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "AT+S.SOCKQ={}", self.module_id)
    }
}

impl CommandErrorHandler for QuerySocketCommand {
    type Error = StackError;

    fn command_error(&self, error: AtError) -> Self::Error {
        StackError::QueryFailed(error)
    }
}

/// Reads the given number of pending bytes. Needs to be sent while async indications are blocked.
#[derive(Clone)]
pub struct ReadSocketCommand {
    module_id: u8,
    length: u32,
}

impl ReadSocketCommand {
    pub fn new(module_id: u8, length: u32) -> Self {
        Self { module_id, length }
    }
}

impl Display for ReadSocketCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "AT+S.SOCKR={},{}", self.module_id, self.length)
    }
}

impl CommandErrorHandler for ReadSocketCommand {
    type Error = StackError;

    fn command_error(&self, error: AtError) -> Self::Error {
        StackError::ReadFailed(error)
    }
}

/// Closes the given socket
#[derive(Clone)]
pub struct CloseSocketCommand {
    module_id: u8,
}

impl CloseSocketCommand {
    pub fn new(module_id: u8) -> Self {
        Self { module_id }
    }
}

impl Display for CloseSocketCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "AT+S.SOCKC={}", self.module_id)
    }
}

impl CommandErrorHandler for CloseSocketCommand {
    type Error = StackError;

    fn command_error(&self, error: AtError) -> Self::Error {
        StackError::CloseFailed(error)
    }
}

/// Triggers a network scan
#[derive(Clone, Default)]
pub struct ScanCommand;

impl Display for ScanCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str("AT+S.SCAN")
    }
}

impl CommandErrorHandler for ScanCommand {
    type Error = StackError;

    fn command_error(&self, error: AtError) -> Self::Error {
        StackError::ScanFailed(error)
    }
}

/// Triggers reassociation to the configured network
#[derive(Clone, Default)]
pub struct RoamCommand;

impl Display for RoamCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str("AT+S.ROAM")
    }
}

impl CommandErrorHandler for RoamCommand {
    type Error = StackError;

    fn command_error(&self, error: AtError) -> Self::Error {
        StackError::RoamFailed(error)
    }
}

/// Value of a configuration variable
#[derive(Clone)]
pub enum ConfigValue<'a> {
    Number(u32),
    Hex(u32),
    Text(&'a str),
}

/// Sets a configuration variable, e.g. `AT+S.SCFG=wifi_mode,1`
#[derive(Clone)]
pub struct SetConfigCommand<'a> {
    key: &'static str,
    value: ConfigValue<'a>,
}

impl<'a> SetConfigCommand<'a> {
    pub fn number(key: &'static str, value: u32) -> Self {
        Self {
            key,
            value: ConfigValue::Number(value),
        }
    }

    pub fn hex(key: &'static str, value: u32) -> Self {
        Self {
            key,
            value: ConfigValue::Hex(value),
        }
    }

    pub fn text(key: &'static str, value: &'a str) -> Self {
        Self {
            key,
            value: ConfigValue::Text(value),
        }
    }

    /// Disables the local echo of the module
    pub fn local_echo_off() -> Self {
        Self::number("localecho1", 0)
    }

    /// 0: idle, 1: station, 2: IBSS, 3: mini AP
    pub fn wifi_mode(mode: u32) -> Self {
        Self::number("wifi_mode", mode)
    }

    /// 0: off, 1: on, 2: on & customizable
    pub fn dhcp(mode: u32) -> Self {
        Self::number("ip_use_dhcp", mode)
    }
}

impl Display for SetConfigCommand<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match &self.value {
            ConfigValue::Number(value) => write!(f, "AT+S.SCFG={},{}", self.key, value),
            ConfigValue::Hex(value) => write!(f, "AT+S.SCFG={},0x{:08X}", self.key, value),
            ConfigValue::Text(value) => write!(f, "AT+S.SCFG={},{}", self.key, value),
        }
    }
}

impl CommandErrorHandler for SetConfigCommand<'_> {
    type Error = ConfigurationError;

    fn command_error(&self, error: AtError) -> Self::Error {
        ConfigurationError::CommandFailed(self.key, error)
    }
}

/// Sets the SSID of the target network
#[derive(Clone)]
pub struct SetSsidCommand<'a> {
    ssid: &'a str,
}

impl<'a> SetSsidCommand<'a> {
    pub fn new(ssid: &'a str) -> Self {
        Self { ssid }
    }
}

impl Display for SetSsidCommand<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "AT+S.SSIDTXT={}", self.ssid)
    }
}

impl CommandErrorHandler for SetSsidCommand<'_> {
    type Error = JoinError;

    fn command_error(&self, error: AtError) -> Self::Error {
        JoinError::SsidError(error)
    }
}

/// Soft reset of the module
#[derive(Clone, Default)]
pub struct RestartCommand;

impl Display for RestartCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str("AT+CFUN=0")
    }
}

impl CommandErrorHandler for RestartCommand {
    type Error = RestartError;

    fn command_error(&self, error: AtError) -> Self::Error {
        RestartError::CommandFailed(error)
    }
}

/// Reads a status variable, e.g. `AT+S.STS=ip_ipaddr`
#[derive(Clone)]
pub struct StatusCommand {
    key: &'static str,
}

impl StatusCommand {
    pub fn ip_address() -> Self {
        Self { key: "ip_ipaddr" }
    }
}

impl Display for StatusCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "AT+S.STS={}", self.key)
    }
}

impl CommandErrorHandler for StatusCommand {
    type Error = AddressError;

    fn command_error(&self, error: AtError) -> Self::Error {
        AddressError::CommandError(error)
    }
}

/// Reads a configuration variable, e.g. `AT+S.GCFG=nv_wifi_macaddr`
#[derive(Clone)]
pub struct GetConfigCommand {
    key: &'static str,
}

impl GetConfigCommand {
    pub fn mac_address() -> Self {
        Self { key: "nv_wifi_macaddr" }
    }
}

impl Display for GetConfigCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "AT+S.GCFG={}", self.key)
    }
}

impl CommandErrorHandler for GetConfigCommand {
    type Error = AddressError;

    fn command_error(&self, error: AtError) -> Self::Error {
        AddressError::CommandError(error)
    }
}

/// Max. length of an encoded command line
pub(crate) const COMMAND_SIZE: usize = 192;

/// Encodes the command into a line buffer. Returns None if the command does not fit.
pub(crate) fn encode<C: Display>(command: &C) -> Option<String<COMMAND_SIZE>> {
    use core::fmt::Write;

    let mut line = String::new();
    write!(line, "{}", command).ok()?;
    Some(line)
}
