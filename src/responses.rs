use core::str::FromStr;
use embedded_nal::Ipv4Addr;
use heapless::String;

/// Reply line pattern awaited by the matcher
pub trait Response: Sized {
    /// Returns the parsed response if the line matches
    fn parse(line: &str) -> Option<Self>;
}

/// Standard acknowledgment line
#[derive(Clone, Debug, PartialEq)]
pub struct OkResponse;

impl Response for OkResponse {
    fn parse(line: &str) -> Option<Self> {
        (line.trim_end() == "OK").then_some(OkResponse)
    }
}

/// Module assigned socket id, e.g. ` ID: 03`
#[derive(Clone, Debug, PartialEq)]
pub struct SocketIdResponse {
    pub module_id: u8,
}

impl Response for SocketIdResponse {
    fn parse(line: &str) -> Option<Self> {
        let module_id = parse_field(line, "ID:")?;
        Some(Self { module_id })
    }
}

/// Pending data length of a socket, e.g. ` DATALEN: 10`
#[derive(Clone, Debug, PartialEq)]
pub struct DataLengthResponse {
    pub length: u32,
}

impl Response for DataLengthResponse {
    fn parse(line: &str) -> Option<Self> {
        let length = parse_field(line, "DATALEN:")?;
        Some(Self { length })
    }
}

/// Network association confirmed, e.g. `+WIND:24:WiFi Up:10.0.0.181`
#[derive(Clone, Debug, PartialEq)]
pub struct WifiUpResponse {
    pub address: Ipv4Addr,
}

impl Response for WifiUpResponse {
    fn parse(line: &str) -> Option<Self> {
        let address = line.strip_prefix("+WIND:24:WiFi Up:")?.trim();
        Some(Self {
            address: Ipv4Addr::from_str(address).ok()?,
        })
    }
}

/// Module finished booting
#[derive(Clone, Debug, PartialEq)]
pub struct ConsoleActiveResponse;

impl Response for ConsoleActiveResponse {
    fn parse(line: &str) -> Option<Self> {
        line.starts_with("+WIND:0:Console active").then_some(ConsoleActiveResponse)
    }
}

/// Status variable line of `AT+S.STS`, e.g. `#  ip_ipaddr = 10.0.0.181`
#[derive(Clone, Debug, PartialEq)]
pub struct IpAddressResponse {
    pub address: Ipv4Addr,
}

impl Response for IpAddressResponse {
    fn parse(line: &str) -> Option<Self> {
        let value = parse_variable(line, "ip_ipaddr")?;
        Some(Self {
            address: Ipv4Addr::from_str(value).ok()?,
        })
    }
}

/// Configuration variable line of `AT+S.GCFG`, e.g. `#  nv_wifi_macaddr = 00:80:E1:B8:2A:11`
#[derive(Clone, Debug, PartialEq)]
pub struct MacAddressResponse {
    pub mac: String<17>,
}

impl Response for MacAddressResponse {
    fn parse(line: &str) -> Option<Self> {
        let value = parse_variable(line, "nv_wifi_macaddr")?;
        let valid = value.len() == 17 && value.split(':').all(|octet| u8::from_str_radix(octet, 16).is_ok());

        if !valid {
            return None;
        }

        let mut mac = String::new();
        mac.push_str(value).ok()?;
        Some(Self { mac })
    }
}

/// Parses a numeric field of a `<label> <number>` line with optional leading whitespace
fn parse_field<T: FromStr>(line: &str, label: &str) -> Option<T> {
    line.trim_start().strip_prefix(label)?.trim().parse().ok()
}

/// Returns the value of a `#  <name> = <value>` line
fn parse_variable<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let (key, value) = line.strip_prefix('#')?.split_once('=')?;

    if key.trim() != name {
        return None;
    }

    Some(value.trim())
}
