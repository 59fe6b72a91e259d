use crate::contact::Contact;
use crate::link::connector::LinkConnector;
use crate::link::receiver::LinkReceiver;
use crate::link::transmitter::LinkTransmitter;
use crate::link::types::LinkConfig;
use crate::message::{Message, TransportKind};
use crate::priority::InboundQueue;
use crate::transport::Transport;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Short-range link adapter: one connection per exchange, both directions
pub struct LinkAdapter {
    connector: Arc<dyn LinkConnector>,
    transmitter: LinkTransmitter,
    receiver: LinkReceiver,
    inbound: InboundQueue,
    poll_timeout: Duration,
    active: Arc<AtomicBool>,
    listener_task: Mutex<Option<JoinHandle<()>>>,
}

impl LinkAdapter {
    pub fn new(config: &LinkConfig, connector: Arc<dyn LinkConnector>, inbound: InboundQueue) -> Self {
        Self {
            connector,
            transmitter: LinkTransmitter::new(config.io_timeout()),
            receiver: LinkReceiver::new(config.download_dir.clone(), config.io_timeout()),
            inbound,
            poll_timeout: config.poll_timeout(),
            active: Arc::new(AtomicBool::new(false)),
            listener_task: Mutex::new(None),
        }
    }

    /// Open a session to `hardware_address` and run one exchange on it
    pub async fn send(&self, hardware_address: &str, message: &Message) -> bool {
        match self.connector.connect(hardware_address).await {
            Ok(conn) => {
                debug!(peer = hardware_address, "Link session opened");
                self.transmitter.send(message, conn).await
            }
            Err(e) => {
                warn!(peer = hardware_address, error = %e, "Link connection failed");
                false
            }
        }
    }

    /// Bind `addr` and serve inbound sessions until [`LinkAdapter::stop`]
    pub async fn listen(&self, addr: SocketAddr) -> std::io::Result<SocketAddr> {
        let listener = TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;
        self.start(listener);
        Ok(local)
    }

    /// Serve inbound sessions accepted on `listener`
    pub fn start(&self, listener: TcpListener) {
        self.active.store(true, Ordering::SeqCst);

        let active = self.active.clone();
        let receiver = self.receiver.clone();
        let inbound = self.inbound.clone();
        let poll_timeout = self.poll_timeout;

        let task = tokio::spawn(async move {
            while active.load(Ordering::SeqCst) {
                match tokio::time::timeout(poll_timeout, listener.accept()).await {
                    Ok(Ok((conn, peer))) => {
                        debug!(%peer, "Link session accepted");
                        let receiver = receiver.clone();
                        let inbound = inbound.clone();
                        tokio::spawn(async move {
                            receiver.serve(conn, &inbound).await;
                        });
                    }
                    Ok(Err(e)) => warn!(error = %e, "Link accept failed"),
                    // Timeouts only give the loop a chance to observe the flag
                    Err(_) => {}
                }
            }
            info!("Link listener stopped");
        });

        if let Some(previous) = self.listener_task.lock().replace(task) {
            previous.abort();
        }
    }

    pub async fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
        let task = self.listener_task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    pub fn is_listening(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn receiver(&self) -> &LinkReceiver {
        &self.receiver
    }
}

#[async_trait]
impl Transport for LinkAdapter {
    fn kind(&self) -> TransportKind {
        TransportKind::Link
    }

    async fn deliver(&self, contact: &Contact, message: &Message) -> bool {
        match &contact.hardware {
            Some(address) => self.send(address, message).await,
            None => {
                warn!(contact = %contact.identity, "Contact has no link address");
                false
            }
        }
    }
}
