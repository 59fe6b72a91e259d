//! Per-message workers spawned by the local-network adapter

use crate::lan::error::{LanError, LanResult};
use crate::lan::types::{rendezvous_request, DATAGRAM_SIZE, START_OF_PACKET};
use crate::message::{Instance, Message};
use crate::metrics;
use crate::priority::InboundQueue;
use bytes::Bytes;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tracing::{debug, info, warn};

/// Read `conn` until the peer closes; every read is bounded by `read_timeout`
async fn read_payload<S>(conn: &mut S, read_timeout: Duration) -> LanResult<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut payload = Vec::new();
    let mut buffer = vec![0u8; DATAGRAM_SIZE];
    loop {
        let read = tokio::time::timeout(read_timeout, conn.read(&mut buffer))
            .await
            .map_err(|_| LanError::Timeout(read_timeout))??;
        if read == 0 {
            return Ok(payload);
        }
        payload.extend_from_slice(&buffer[..read]);
    }
}

async fn write_payload<S>(conn: &mut S, payload: &[u8]) -> LanResult<()>
where
    S: AsyncWrite + Unpin,
{
    conn.write_all(payload).await?;
    conn.shutdown().await?;
    Ok(())
}

/// Received bytes as a message: a serialized instance keeps its type,
/// anything else is text
pub(crate) fn decode_payload(payload: &[u8]) -> Message {
    match Message::from_bytes(payload) {
        Ok(message @ Message::Instance(Instance { attachment: None, .. })) => message,
        _ => Message::text(String::from_utf8_lossy(payload).into_owned()),
    }
}

pub(crate) fn push_inbound(inbound: &InboundQueue, payload: &[u8]) -> bool {
    if payload.is_empty() {
        return false;
    }
    let message = decode_payload(payload);
    match inbound.push_back(message) {
        Ok(()) => {
            info!("New message received over LAN");
            metrics::record_received("lan");
            true
        }
        Err(e) => {
            warn!(error = %e, "Reception buffer full, LAN message dropped");
            false
        }
    }
}

/// Serve one accepted stream connection
pub async fn tcp_receptor(mut conn: TcpStream, inbound: InboundQueue, read_timeout: Duration) {
    match read_payload(&mut conn, read_timeout).await {
        Ok(payload) => {
            push_inbound(&inbound, &payload);
        }
        Err(e) => warn!(error = %e, "TCP reception failed"),
    }
    let _ = conn.shutdown().await;
}

/// Stream `payload` over an already established connection
pub async fn tcp_transmitter(mut conn: TcpStream, payload: Bytes) {
    match write_payload(&mut conn, &payload).await {
        Ok(()) => info!(bytes = payload.len(), "Message sent over TCP"),
        Err(e) => warn!(error = %e, "TCP transmission failed"),
    }
}

/// Answer a rendezvous request: connect back and collect the payload
pub async fn udp_responder(
    callback: SocketAddr,
    inbound: InboundQueue,
    connect_timeout: Duration,
    read_timeout: Duration,
) {
    let result = async {
        let mut conn = tokio::time::timeout(connect_timeout, TcpStream::connect(callback))
            .await
            .map_err(|_| LanError::Timeout(connect_timeout))?
            .map_err(|e| LanError::ConnectionFailed(format!("{callback}: {e}")))?;
        let payload = read_payload(&mut conn, read_timeout).await;
        let _ = conn.shutdown().await;
        payload
    }
    .await;

    match result {
        Ok(payload) => {
            push_inbound(&inbound, &payload);
        }
        Err(e) => warn!(%callback, error = %e, "Rendezvous callback failed"),
    }
}

/// Send `payload` to `destination` over datagrams.
///
/// A payload that fits one datagram is sent as is; anything larger, or
/// anything that would be mistaken for a rendezvous request, goes through
/// the rendezvous: we listen on an ephemeral stream port, ask the receiver
/// to call back and stream the payload over that connection.
pub async fn udp_transmitter(
    local_address: IpAddr,
    destination: SocketAddr,
    payload: Bytes,
    accept_timeout: Duration,
) -> LanResult<()> {
    let socket = UdpSocket::bind(SocketAddr::new(local_address, 0)).await?;
    socket.connect(destination).await?;

    if payload.len() <= DATAGRAM_SIZE && !payload.starts_with(START_OF_PACKET.as_bytes()) {
        socket.send(&payload).await?;
        info!(%destination, bytes = payload.len(), "Message sent over UDP");
        return Ok(());
    }

    // The connected socket tells us which interface reaches the destination
    let callback_ip = socket.local_addr()?.ip();
    let listener = TcpListener::bind(SocketAddr::new(callback_ip, 0)).await?;
    let callback = listener.local_addr()?;

    socket
        .send(rendezvous_request(callback).as_bytes())
        .await?;
    debug!(%destination, %callback, "Rendezvous requested");

    let (mut conn, peer) = tokio::time::timeout(accept_timeout, listener.accept())
        .await
        .map_err(|_| LanError::Timeout(accept_timeout))??;
    write_payload(&mut conn, &payload).await?;
    info!(%peer, bytes = payload.len(), "Message sent over UDP rendezvous");

    Ok(())
}
