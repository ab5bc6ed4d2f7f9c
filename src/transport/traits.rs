use async_trait::async_trait;
use std::fmt;
use std::io::Result;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::error::SsdpError;

/// Immutable (address, port) pair identifying a datagram source or destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    address: IpAddr,
    port: u16,
}

impl Endpoint {
    pub const fn new(address: IpAddr, port: u16) -> Self {
        Endpoint { address, port }
    }

    /// Builds an endpoint from an address string, validating both parts.
    pub fn parse(address: &str, port: u16) -> crate::Result<Self> {
        if address.trim().is_empty() {
            return Err(SsdpError::argument("endpoint address cannot be empty"));
        }
        if port == 0 {
            return Err(SsdpError::argument("endpoint port must be positive"));
        }
        let address = address
            .trim()
            .parse::<IpAddr>()
            .map_err(|e| SsdpError::argument(format!("invalid endpoint address {address:?}: {e}")))?;
        Ok(Endpoint { address, port })
    }

    pub fn address(&self) -> IpAddr {
        self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Endpoint::new(addr.ip(), addr.port())
    }
}

impl From<Endpoint> for SocketAddr {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.socket_addr()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket_addr())
    }
}

/// One datagram as handed over by a socket.
#[derive(Debug, Clone)]
pub struct ReceivedDatagram {
    pub buffer: Vec<u8>,
    pub len: usize,
    pub from: Endpoint,
}

impl ReceivedDatagram {
    pub fn new(buffer: Vec<u8>, len: usize, from: Endpoint) -> Self {
        ReceivedDatagram { buffer, len, from }
    }

    pub fn data(&self) -> &[u8] {
        &self.buffer[..self.len.min(self.buffer.len())]
    }
}

/// A datagram socket used by the communications server.
/// Object-safe so tests can plug in an in-memory network.
#[async_trait]
pub trait SsdpSocket: Send + Sync {
    /// Waits for the next datagram.
    async fn receive(&self) -> Result<ReceivedDatagram>;

    /// Sends `data` to `destination`.
    async fn send_to(&self, data: &[u8], destination: Endpoint) -> Result<()>;

    fn local_endpoint(&self) -> Result<Endpoint>;
}

/// Builds the platform sockets the communications server owns.
pub trait SocketFactory: Send + Sync {
    /// Socket bound to `local` used for sends and unicast replies.
    fn create_unicast_socket(&self, local: Endpoint, multicast_ttl: u32) -> Result<Arc<dyn SsdpSocket>>;

    /// Socket bound to the group port and joined to `group`.
    fn create_multicast_socket(
        &self,
        group: Endpoint,
        interface: Option<IpAddr>,
        multicast_ttl: u32,
    ) -> Result<Arc<dyn SsdpSocket>>;
}
