use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Fixed datagram receive size
pub const DATAGRAM_SIZE: usize = 1024;

/// Datagram prefix asking the receiver to call the sender back
pub const START_OF_PACKET: &str = "START_OF_PACKET";

/// Transport protocol used for outbound local-network messages
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LanProtocol {
    #[default]
    Tcp,
    Udp,
}

/// Local-network adapter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LanConfig {
    pub local_address: IpAddr,
    pub tcp_port: u16,
    pub udp_port: u16,
    pub protocol: LanProtocol,

    /// Take over a port still held by another socket
    pub close_port: bool,

    /// Accept/receive timeout of the service loops, also the per-connection
    /// read timeout
    pub poll_timeout_ms: u64,

    /// Listen backlog of the stream endpoint
    pub connection_limit: u32,

    pub connect_timeout_ms: u64,
}

impl LanConfig {
    pub fn tcp_addr(&self) -> SocketAddr {
        SocketAddr::new(self.local_address, self.tcp_port)
    }

    pub fn udp_addr(&self) -> SocketAddr {
        SocketAddr::new(self.local_address, self.udp_port)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for LanConfig {
    fn default() -> Self {
        Self {
            local_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            tcp_port: 5000,
            udp_port: 5010,
            protocol: LanProtocol::Tcp,
            close_port: false,
            poll_timeout_ms: 1_500,
            connection_limit: 5,
            connect_timeout_ms: 5_000,
        }
    }
}

/// Parse `START_OF_PACKET <address> <port>` into the callback address
pub fn parse_rendezvous(datagram: &str) -> Option<SocketAddr> {
    let mut fields = datagram.split_whitespace();
    if fields.next()? != START_OF_PACKET {
        return None;
    }
    let ip: IpAddr = fields.next()?.parse().ok()?;
    let port: u16 = fields.next()?.parse().ok()?;
    Some(SocketAddr::new(ip, port))
}

pub fn rendezvous_request(callback: SocketAddr) -> String {
    format!("{} {} {}", START_OF_PACKET, callback.ip(), callback.port())
}
