use super::traits::{Endpoint, ReceivedDatagram, SocketFactory, SsdpSocket};
use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use std::io::Result;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::UdpSocket;

const MAX_DATAGRAM_SIZE: usize = 8192;

pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Binds a socket for sending and receiving unicast replies.
    pub fn bind_unicast(local: SocketAddr, multicast_ttl: u32) -> Result<Self> {
        let socket = Socket::new(Domain::for_address(local), Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        match local {
            SocketAddr::V4(_) => {
                socket.set_multicast_ttl_v4(multicast_ttl)?;
                socket.set_multicast_loop_v4(true)?;
            }
            SocketAddr::V6(_) => {
                socket.set_only_v6(true)?;
                socket.set_multicast_hops_v6(multicast_ttl)?;
                socket.set_multicast_loop_v6(true)?;
            }
        }
        socket.set_nonblocking(true)?;
        socket.bind(&local.into())?;
        Self::from_socket2(socket)
    }

    /// Binds the group port and joins the multicast group.
    pub fn bind_multicast(group: SocketAddr, interface: Option<IpAddr>, multicast_ttl: u32) -> Result<Self> {
        let socket = Socket::new(Domain::for_address(group), Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        #[cfg(unix)]
        socket.set_reuse_port(true)?;

        match group.ip() {
            IpAddr::V4(group_ip) => {
                socket.set_multicast_ttl_v4(multicast_ttl)?;
                socket.set_multicast_loop_v4(true)?;
                socket.set_nonblocking(true)?;
                socket.bind(&SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), group.port()).into())?;
                let iface = match interface {
                    Some(IpAddr::V4(ip)) => ip,
                    _ => Ipv4Addr::UNSPECIFIED,
                };
                socket.join_multicast_v4(&group_ip, &iface)?;
            }
            IpAddr::V6(group_ip) => {
                socket.set_only_v6(true)?;
                socket.set_multicast_hops_v6(multicast_ttl)?;
                socket.set_multicast_loop_v6(true)?;
                socket.set_nonblocking(true)?;
                socket.bind(&SocketAddr::new(Ipv6Addr::UNSPECIFIED.into(), group.port()).into())?;
                socket.join_multicast_v6(&group_ip, 0)?;
            }
        }
        Self::from_socket2(socket)
    }

    fn from_socket2(socket: Socket) -> Result<Self> {
        let std_socket: std::net::UdpSocket = socket.into();
        Ok(UdpTransport {
            socket: UdpSocket::from_std(std_socket)?,
        })
    }
}

#[async_trait]
impl SsdpSocket for UdpTransport {
    async fn receive(&self) -> Result<ReceivedDatagram> {
        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];
        let (len, from) = self.socket.recv_from(&mut buffer).await?;
        buffer.truncate(len);
        Ok(ReceivedDatagram::new(buffer, len, from.into()))
    }

    async fn send_to(&self, data: &[u8], destination: Endpoint) -> Result<()> {
        self.socket.send_to(data, destination.socket_addr()).await?;
        Ok(())
    }

    fn local_endpoint(&self) -> Result<Endpoint> {
        self.socket.local_addr().map(Endpoint::from)
    }
}

/// Creates real UDP sockets. Must be used from within a tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct UdpSocketFactory;

impl SocketFactory for UdpSocketFactory {
    fn create_unicast_socket(&self, local: Endpoint, multicast_ttl: u32) -> Result<Arc<dyn SsdpSocket>> {
        Ok(Arc::new(UdpTransport::bind_unicast(local.socket_addr(), multicast_ttl)?))
    }

    fn create_multicast_socket(
        &self,
        group: Endpoint,
        interface: Option<IpAddr>,
        multicast_ttl: u32,
    ) -> Result<Arc<dyn SsdpSocket>> {
        Ok(Arc::new(UdpTransport::bind_multicast(
            group.socket_addr(),
            interface,
            multicast_ttl,
        )?))
    }
}
