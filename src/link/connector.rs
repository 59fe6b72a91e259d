use crate::link::error::{LinkError, LinkResult};
use crate::transport::BoxedStream;
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;

/// Opens a fresh duplex session to a short-range peer
#[async_trait]
pub trait LinkConnector: Send + Sync {
    async fn connect(&self, hardware_address: &str) -> LinkResult<BoxedStream>;
}

/// Connector reaching link peers through stream sockets, e.g. serial or
/// radio bridges that expose each paired device on a TCP port.
#[derive(Debug, Clone)]
pub struct TcpLinkConnector {
    peers: HashMap<String, SocketAddr>,
    connect_timeout: Duration,
}

impl TcpLinkConnector {
    pub fn new(peers: HashMap<String, SocketAddr>) -> Self {
        Self {
            peers: peers
                .into_iter()
                .map(|(address, socket)| (normalize(&address), socket))
                .collect(),
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn add_peer(&mut self, hardware_address: &str, socket: SocketAddr) {
        self.peers.insert(normalize(hardware_address), socket);
    }

    pub fn resolve(&self, hardware_address: &str) -> Option<SocketAddr> {
        self.peers.get(&normalize(hardware_address)).copied()
    }
}

#[async_trait]
impl LinkConnector for TcpLinkConnector {
    async fn connect(&self, hardware_address: &str) -> LinkResult<BoxedStream> {
        let socket = self
            .resolve(hardware_address)
            .ok_or_else(|| LinkError::UnknownPeer(hardware_address.to_string()))?;

        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(socket))
            .await
            .map_err(|_| LinkError::Timeout(self.connect_timeout))?
            .map_err(|e| LinkError::ConnectionFailed(format!("{socket}: {e}")))?;
        stream.set_nodelay(true)?;

        Ok(Box::new(stream))
    }
}

/// Hardware addresses compare case-insensitively
fn normalize(address: &str) -> String {
    address.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_ignores_case() {
        let mut connector = TcpLinkConnector::new(HashMap::new());
        connector.add_peer("00:1a:7d:da:71:13", "127.0.0.1:7001".parse().unwrap());

        assert_eq!(
            connector.resolve("00:1A:7D:DA:71:13"),
            Some("127.0.0.1:7001".parse().unwrap())
        );
        assert!(connector.resolve("00:00:00:00:00:00").is_none());
    }

    #[tokio::test]
    async fn test_unknown_peer() {
        let connector = TcpLinkConnector::new(HashMap::new());
        let result = connector.connect("AA:BB:CC:DD:EE:FF").await;
        assert!(matches!(result, Err(LinkError::UnknownPeer(_))));
    }
}
