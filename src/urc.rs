//! # Asynchronous indications
//!
//! Unsolicited lines of the module, which may show up inside the reply stream of any command.
use atat::AtatUrc;
use core::str::FromStr;

/// Pending data notification, e.g. `+WIND:55:Pending Data:1:1024`
pub const PENDING_DATA_PREFIX: &str = "+WIND:55:Pending Data";

/// Lost association to the access point, e.g. `+WIND:41:WiFi Disassociation: 8`
pub const DISASSOCIATION_PREFIX: &str = "+WIND:41:WiFi Disassociation";

/// Module crashed, e.g. `+WIND:8:Hard Fault:Console1: r0 00000000, r1 ...`
pub const HARD_FAULT_PREFIX: &str = "+WIND:8:Hard Fault";

/// Socket closed by the peer, e.g. `+WIND:58:Socket Closed:1`
pub const SOCKET_CLOSED_PREFIX: &str = "+WIND:58:Socket Closed";

/// Module and driver disagree about in-flight data
pub const PENDING_DATA_ERROR_PREFIX: &str = "ERROR: Pending data";

/// Register value used for fields missing in a hard fault report
pub const MISSING_REGISTER: u32 = 0xFFFF_FFFF;

/// Parsed indication line
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Indication {
    /// The module buffered the given amount of bytes for the socket
    PendingData { module_id: u8, amount: u32 },
    /// Association lost with the given reason code
    Disassociation { reason: u32 },
    /// Module crashed
    HardFault(HardFaultReport),
    /// Socket was closed by the remote side
    SocketClosed { module_id: u8 },
    /// Protocol error regarding pending data
    PendingDataError,
}

/// Crash dump of the module, missing fields are left at [MISSING_REGISTER] / None
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HardFaultReport {
    /// Index of the crashed console
    pub console: Option<u32>,

    /// r0, r1, r2, r3, r12
    pub registers: [u32; 5],
}

impl Default for HardFaultReport {
    fn default() -> Self {
        Self {
            console: None,
            registers: [MISSING_REGISTER; 5],
        }
    }
}

impl AtatUrc for Indication {
    type Response = Self;

    fn parse(resp: &[u8]) -> Option<Self::Response> {
        let line = core::str::from_utf8(resp).ok()?.trim_end();

        if let Some(fields) = line.strip_prefix(PENDING_DATA_PREFIX) {
            let (module_id, amount) = Self::parse_pending_data(fields)?;
            return Some(Self::PendingData { module_id, amount });
        }

        if let Some(fields) = line.strip_prefix(DISASSOCIATION_PREFIX) {
            let reason = parse_number(fields.strip_prefix(':')?)?;
            return Some(Self::Disassociation { reason });
        }

        if let Some(fields) = line.strip_prefix(HARD_FAULT_PREFIX) {
            return Some(Self::HardFault(HardFaultReport::parse(fields)));
        }

        if let Some(fields) = line.strip_prefix(SOCKET_CLOSED_PREFIX) {
            let module_id = parse_number(fields.strip_prefix(':')?.split(':').next()?)?;
            return Some(Self::SocketClosed { module_id });
        }

        if line.starts_with(PENDING_DATA_ERROR_PREFIX) {
            return Some(Self::PendingDataError);
        }

        None
    }
}

impl Indication {
    /// Parses the `:<id>:<amount>` remainder of a pending data line
    pub(crate) fn parse_pending_data(fields: &str) -> Option<(u8, u32)> {
        let mut fields = fields.strip_prefix(':')?.split(':');
        let module_id = parse_number(fields.next()?)?;
        let amount = parse_number(fields.next()?)?;

        if fields.next().is_some() {
            return None;
        }

        Some((module_id, amount))
    }
}

impl HardFaultReport {
    /// Best-effort parsing of `:Console<n>: r0 <hex>, r1 <hex>, r2 <hex>, r3 <hex>, r12 <hex>`
    fn parse(fields: &str) -> Self {
        let mut report = Self::default();
        let fields = fields.trim_start_matches(':');

        let (console, registers) = match fields.split_once(':') {
            Some((console, registers)) => (console, registers),
            None => (fields, ""),
        };

        report.console = console.trim().strip_prefix("Console").and_then(parse_number);

        for register in registers.split(',') {
            let mut parts = register.split_whitespace();
            let (Some(name), Some(value)) = (parts.next(), parts.next()) else {
                continue;
            };

            let index = match name {
                "r0" => 0,
                "r1" => 1,
                "r2" => 2,
                "r3" => 3,
                "r12" => 4,
                _ => continue,
            };

            if let Ok(value) = u32::from_str_radix(value, 16) {
                report.registers[index] = value;
            }
        }

        report
    }
}

fn parse_number<T: FromStr>(field: &str) -> Option<T> {
    field.trim().parse().ok()
}
