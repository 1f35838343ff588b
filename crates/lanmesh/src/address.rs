//! Address parsing and ephemeral endpoint allocation.

use std::fmt;
use std::net::{Ipv4Addr, TcpListener};
use std::str::FromStr;

use crate::error::{Error, Result};

/// A resolved `(ip, port)` endpoint.
///
/// Formats and parses as `ip:port`, matching the wire form used throughout
/// the control RPC and the application transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// The IPv4 address.
    pub ip: Ipv4Addr,
    /// The port, always in `1..=65535`.
    pub port: u16,
}

impl Endpoint {
    /// Build an endpoint from its parts.
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (ip, port) = s
            .split_once(':')
            .ok_or_else(|| Error::InvalidAddress(s.to_string()))?;
        let ip: Ipv4Addr = ip
            .parse()
            .map_err(|_| Error::InvalidAddress(s.to_string()))?;
        let port: u16 = port
            .parse()
            .map_err(|_| Error::InvalidAddress(s.to_string()))?;
        Ok(Self { ip, port })
    }
}

/// Split an address of the form `ip:port` into its parts. If `text` has no
/// colon, the whole string is taken to be a bare port and the IP side is
/// `None` (meaning "infer the local routable IP at use time").
pub fn split_address(text: &str) -> (Option<&str>, &str) {
    match text.split_once(':') {
        Some((ip, port)) => (Some(ip), port),
        None => (None, text),
    }
}

/// A `send_message_to` / `wait_for_notification_from` address argument.
///
/// `send_message_to` requires a single address: passing a sequence fails
/// with [`Error::InvalidAddress`], since broadcasting a request is
/// explicitly disallowed. `wait_for_notification_from` accepts either,
/// connecting one subscriber per address and multiplexing receives across
/// all of them.
#[derive(Debug, Clone)]
pub enum Address {
    /// A single `ip:port` (or bare-port) address.
    One(String),
    /// Several addresses, subscribed to jointly.
    Many(Vec<String>),
}

impl Address {
    /// Require this to be a single address; a sequence is `InvalidAddress`.
    pub fn one(&self) -> Result<&str> {
        match self {
            Self::One(address) => Ok(address),
            Self::Many(_) => Err(Error::InvalidAddress(
                "a sequence of addresses was given where a single address is required".into(),
            )),
        }
    }

    /// All addresses this represents, as an owned list (one element for
    /// [`Address::One`]).
    pub fn all(&self) -> Vec<String> {
        match self {
            Self::One(address) => vec![address.clone()],
            Self::Many(addresses) => addresses.clone(),
        }
    }
}

impl From<&str> for Address {
    fn from(address: &str) -> Self {
        Self::One(address.to_string())
    }
}

impl From<String> for Address {
    fn from(address: String) -> Self {
        Self::One(address)
    }
}

impl From<&String> for Address {
    fn from(address: &String) -> Self {
        Self::One(address.clone())
    }
}

impl From<Vec<String>> for Address {
    fn from(addresses: Vec<String>) -> Self {
        Self::Many(addresses)
    }
}

impl From<&[&str]> for Address {
    fn from(addresses: &[&str]) -> Self {
        Self::Many(addresses.iter().map(|s| s.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Address {
    fn from(addresses: [&str; N]) -> Self {
        Self::Many(addresses.iter().map(|s| s.to_string()).collect())
    }
}

/// What `advertise`/`unadvertise` accept as their address argument: a bare
/// port (the local routable IP is inferred at use time) or full `ip:port`
/// text.
#[derive(Debug, Clone)]
pub enum AddressArg {
    /// A bare port, with no IP override.
    Port(u16),
    /// `ip:port` or a numeric-port string.
    Text(String),
}

impl AddressArg {
    /// Resolve to `(ip, port)`, `ip` being `None` when the address was a
    /// bare port.
    pub fn resolve(&self) -> Result<(Option<String>, u16)> {
        match self {
            Self::Port(port) => Ok((None, *port)),
            Self::Text(text) => {
                let (ip, port) = split_address(text);
                let port: u16 = port
                    .parse()
                    .map_err(|_| Error::InvalidAddress(text.clone()))?;
                Ok((ip.map(str::to_string), port))
            }
        }
    }
}

impl From<u16> for AddressArg {
    fn from(port: u16) -> Self {
        Self::Port(port)
    }
}

impl From<&str> for AddressArg {
    fn from(address: &str) -> Self {
        Self::Text(address.to_string())
    }
}

impl From<String> for AddressArg {
    fn from(address: String) -> Self {
        Self::Text(address)
    }
}

/// Allocate an ephemeral, currently-unused local endpoint of the form
/// `127.0.0.1:<port>`, suitable for test rigs that need a real, bindable
/// address without hardcoding a port number.
///
/// Implementation: bind a TCP listener to port 0, read back the port the
/// kernel assigned, then drop the listener so the caller can bind it
/// themselves.
pub fn local_address() -> Result<String> {
    let listener = TcpListener::bind(("127.0.0.1", 0))?;
    let port = listener.local_addr()?.port();
    Ok(format!("127.0.0.1:{port}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_address_with_colon() {
        assert_eq!(split_address("10.0.0.1:9001"), (Some("10.0.0.1"), "9001"));
    }

    #[test]
    fn split_address_without_colon_is_bare_port() {
        assert_eq!(split_address("9001"), (None, "9001"));
    }

    #[test]
    fn local_address_is_bindable() {
        let addr = local_address().unwrap();
        assert!(addr.starts_with("127.0.0.1:"));
        let endpoint: Endpoint = addr.parse().unwrap();
        // A second bind to the same address should succeed now that the
        // probe listener has been dropped.
        let listener = TcpListener::bind((endpoint.ip, endpoint.port)).unwrap();
        drop(listener);
    }

    #[test]
    fn endpoint_display_and_parse_round_trip() {
        let endpoint = Endpoint::new(Ipv4Addr::new(192, 168, 1, 5), 9001);
        let text = endpoint.to_string();
        assert_eq!(text, "192.168.1.5:9001");
        assert_eq!(text.parse::<Endpoint>().unwrap(), endpoint);
    }

    #[test]
    fn endpoint_parse_rejects_missing_colon() {
        assert!("9001".parse::<Endpoint>().is_err());
    }

    #[test]
    fn address_one_accepts_single() {
        let address: Address = "127.0.0.1:9001".into();
        assert_eq!(address.one().unwrap(), "127.0.0.1:9001");
    }

    #[test]
    fn address_one_rejects_sequence() {
        let address: Address = ["127.0.0.1:9001", "127.0.0.1:9002"].into();
        assert!(address.one().unwrap_err().is_invalid_address());
        assert_eq!(address.all().len(), 2);
    }

    #[test]
    fn address_arg_resolves_bare_port() {
        let (ip, port) = AddressArg::from(9001u16).resolve().unwrap();
        assert_eq!(ip, None);
        assert_eq!(port, 9001);
    }

    #[test]
    fn address_arg_resolves_ip_and_port() {
        let (ip, port) = AddressArg::from("10.0.0.5:9001").resolve().unwrap();
        assert_eq!(ip.as_deref(), Some("10.0.0.5"));
        assert_eq!(port, 9001);
    }
}
