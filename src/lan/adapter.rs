use crate::contact::Contact;
use crate::lan::error::{LanError, LanResult};
use crate::lan::types::{parse_rendezvous, LanConfig, LanProtocol, DATAGRAM_SIZE, START_OF_PACKET};
use crate::lan::workers::{self, push_inbound};
use crate::message::{Message, TransportKind};
use crate::metrics;
use crate::priority::InboundQueue;
use crate::transport::Transport;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Local-network adapter: a stream endpoint and a datagram endpoint, each
/// served by its own loop, plus fire-and-forget transmit workers
pub struct LanAdapter {
    config: LanConfig,
    inbound: InboundQueue,
    tcp_listener: Mutex<Option<std::net::TcpListener>>,
    udp_socket: Mutex<Option<std::net::UdpSocket>>,
    tcp_addr: Mutex<Option<SocketAddr>>,
    udp_addr: Mutex<Option<SocketAddr>>,
    bind_failed: AtomicBool,
    active: Arc<AtomicBool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl LanAdapter {
    pub fn new(config: LanConfig, inbound: InboundQueue) -> Self {
        Self {
            config,
            inbound,
            tcp_listener: Mutex::new(None),
            udp_socket: Mutex::new(None),
            tcp_addr: Mutex::new(None),
            udp_addr: Mutex::new(None),
            bind_failed: AtomicBool::new(false),
            active: Arc::new(AtomicBool::new(false)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Bind both endpoints. A failure is logged and leaves the affected
    /// endpoint inert; returns whether both endpoints are bound.
    pub fn bind(&self) -> bool {
        let mut failed = false;

        if self.tcp_listener.lock().is_none() {
            match self.bind_stream() {
                Ok(listener) => {
                    *self.tcp_addr.lock() = listener.local_addr().ok();
                    *self.tcp_listener.lock() = Some(listener);
                }
                Err(e) => {
                    error!(error = %e, "TCP endpoint unavailable");
                    failed = true;
                }
            }
        }

        if self.udp_socket.lock().is_none() {
            match self.bind_datagram() {
                Ok(socket) => {
                    *self.udp_addr.lock() = socket.local_addr().ok();
                    *self.udp_socket.lock() = Some(socket);
                }
                Err(e) => {
                    error!(error = %e, "UDP endpoint unavailable");
                    failed = true;
                }
            }
        }

        self.bind_failed.store(failed, Ordering::SeqCst);
        !failed
    }

    fn bind_stream(&self) -> LanResult<std::net::TcpListener> {
        let addr = self.config.tcp_addr();
        let socket = self.prepare_socket(addr, Type::STREAM, Protocol::TCP)?;
        socket
            .listen(self.config.connection_limit as i32)
            .map_err(|source| LanError::BindFailed { addr, source })?;
        Ok(socket.into())
    }

    fn bind_datagram(&self) -> LanResult<std::net::UdpSocket> {
        let addr = self.config.udp_addr();
        let socket = self.prepare_socket(addr, Type::DGRAM, Protocol::UDP)?;
        Ok(socket.into())
    }

    fn prepare_socket(&self, addr: SocketAddr, ty: Type, protocol: Protocol) -> LanResult<Socket> {
        let bind_failed = |source| LanError::BindFailed { addr, source };

        let socket = Socket::new(Domain::for_address(addr), ty, Some(protocol)).map_err(bind_failed)?;
        if ty == Type::STREAM || self.config.close_port {
            socket.set_reuse_address(true).map_err(bind_failed)?;
        }
        #[cfg(unix)]
        if self.config.close_port {
            socket.set_reuse_port(true).map_err(bind_failed)?;
        }
        socket.set_nonblocking(true).map_err(bind_failed)?;
        socket.bind(&addr.into()).map_err(bind_failed)?;
        Ok(socket)
    }

    /// Spawn the service loops for whichever endpoints are bound
    pub fn start(&self) -> LanResult<()> {
        self.active.store(true, Ordering::SeqCst);

        if let Some(listener) = self.tcp_listener.lock().take() {
            let listener = TcpListener::from_std(listener)?;
            let task = tokio::spawn(stream_loop(
                listener,
                self.inbound.clone(),
                self.active.clone(),
                self.config.clone(),
            ));
            self.tasks.lock().push(task);
        }

        if let Some(socket) = self.udp_socket.lock().take() {
            let socket = UdpSocket::from_std(socket)?;
            let task = tokio::spawn(datagram_loop(
                socket,
                self.inbound.clone(),
                self.active.clone(),
                self.config.clone(),
            ));
            self.tasks.lock().push(task);
        }

        info!(
            tcp = ?self.tcp_local_addr(),
            udp = ?self.udp_local_addr(),
            "LAN adapter started"
        );
        Ok(())
    }

    /// Bind and start; returns false when an endpoint could not be bound
    pub fn connect(&self) -> bool {
        let bound = self.bind();
        if let Err(e) = self.start() {
            error!(error = %e, "LAN adapter failed to start");
            return false;
        }
        bound
    }

    /// Clear the active flag and wait for the service loops to exit
    pub async fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
        *self.tcp_addr.lock() = None;
        *self.udp_addr.lock() = None;
        info!("LAN adapter stopped");
    }

    pub async fn disconnect(&self) {
        self.stop().await;
    }

    /// Hand `payload` to a transmit worker.
    ///
    /// Over datagrams the result only says the worker was started. Over
    /// streams the connection is established first, so a refused or
    /// unreachable peer is reported as `false`.
    pub async fn send(&self, dest: IpAddr, tcp_port: u16, udp_port: u16, payload: Bytes) -> bool {
        match self.config.protocol {
            LanProtocol::Udp => {
                let local = self.config.local_address;
                let destination = SocketAddr::new(dest, udp_port);
                let accept_timeout = self.config.connect_timeout();
                tokio::spawn(async move {
                    if let Err(e) =
                        workers::udp_transmitter(local, destination, payload, accept_timeout).await
                    {
                        warn!(%destination, error = %e, "UDP transmission failed");
                    }
                });
                true
            }
            LanProtocol::Tcp => {
                let destination = SocketAddr::new(dest, tcp_port);
                let timeout = self.config.connect_timeout();
                match tokio::time::timeout(timeout, TcpStream::connect(destination)).await {
                    Ok(Ok(conn)) => {
                        tokio::spawn(workers::tcp_transmitter(conn, payload));
                        true
                    }
                    Ok(Err(e)) => {
                        warn!(%destination, error = %e, "TCP connection failed");
                        false
                    }
                    Err(_) => {
                        warn!(%destination, ?timeout, "TCP connection timed out");
                        false
                    }
                }
            }
        }
    }

    pub fn protocol(&self) -> LanProtocol {
        self.config.protocol
    }

    pub fn tcp_local_addr(&self) -> Option<SocketAddr> {
        *self.tcp_addr.lock()
    }

    pub fn udp_local_addr(&self) -> Option<SocketAddr> {
        *self.udp_addr.lock()
    }

    pub fn bind_failed(&self) -> bool {
        self.bind_failed.load(Ordering::SeqCst)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

async fn stream_loop(
    listener: TcpListener,
    inbound: InboundQueue,
    active: Arc<AtomicBool>,
    config: LanConfig,
) {
    let poll_timeout = config.poll_timeout();
    while active.load(Ordering::SeqCst) {
        match tokio::time::timeout(poll_timeout, listener.accept()).await {
            Ok(Ok((conn, peer))) => {
                debug!(%peer, "TCP connection accepted");
                tokio::spawn(workers::tcp_receptor(conn, inbound.clone(), poll_timeout));
            }
            Ok(Err(e)) => warn!(error = %e, "TCP accept failed"),
            Err(_) => {}
        }
    }
    debug!("TCP service loop stopped");
}

async fn datagram_loop(
    socket: UdpSocket,
    inbound: InboundQueue,
    active: Arc<AtomicBool>,
    config: LanConfig,
) {
    let poll_timeout = config.poll_timeout();
    let mut buffer = vec![0u8; DATAGRAM_SIZE];
    while active.load(Ordering::SeqCst) {
        let (read, peer) = match tokio::time::timeout(poll_timeout, socket.recv_from(&mut buffer)).await {
            Ok(Ok(received)) => received,
            Ok(Err(e)) => {
                warn!(error = %e, "UDP receive failed");
                continue;
            }
            Err(_) => continue,
        };

        let datagram = &buffer[..read];
        if datagram.starts_with(START_OF_PACKET.as_bytes()) {
            let request = String::from_utf8_lossy(datagram);
            match parse_rendezvous(&request) {
                Some(callback) => {
                    debug!(%peer, %callback, "Rendezvous request received");
                    tokio::spawn(workers::udp_responder(
                        callback,
                        inbound.clone(),
                        config.connect_timeout(),
                        poll_timeout,
                    ));
                }
                None => {
                    let e = LanError::MalformedRendezvous(request.into_owned());
                    warn!(%peer, error = %e, "Datagram ignored");
                }
            }
        } else {
            push_inbound(&inbound, datagram);
        }
    }
    debug!("UDP service loop stopped");
}

fn payload_of(message: &Message) -> LanResult<Bytes> {
    if !TransportKind::Lan.carries(message) {
        return Err(LanError::Unsupported(message.variant().as_str()));
    }
    match message {
        Message::PlainText { body } => Ok(Bytes::from(body.clone())),
        _ => Ok(message.to_bytes()?),
    }
}

#[async_trait]
impl Transport for LanAdapter {
    fn kind(&self) -> TransportKind {
        TransportKind::Lan
    }

    fn is_available(&self) -> bool {
        self.is_active()
    }

    async fn deliver(&self, contact: &Contact, message: &Message) -> bool {
        let Some(endpoint) = contact.lan else {
            warn!(contact = %contact.identity, "Contact has no LAN address");
            return false;
        };
        match payload_of(message) {
            Ok(payload) => {
                self.send(endpoint.ip, endpoint.tcp_port, endpoint.udp_port, payload)
                    .await
            }
            Err(e) => {
                warn!(contact = %contact.identity, error = %e, "Could not prepare LAN payload");
                metrics::record_payload_error("lan");
                false
            }
        }
    }
}
