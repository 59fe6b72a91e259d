use crate::config::CommunicatorConfig;
use crate::contact::ContactAuthorizer;
use crate::dispatcher::Dispatcher;
use crate::lan::LanAdapter;
use crate::link::{LinkAdapter, LinkConnector, TcpLinkConnector};
use crate::message::{Message, Outbound, TransportKind};
use crate::modem::{InboundHook, SmsAdapter, SmsHook};
use crate::priority::{InboundQueue, OutboundQueue, QueueStats};
use crate::transport::BoxedStream;
use std::sync::Arc;
use tracing::{error, info, warn};

/// The relay: both queues, the dispatcher and one adapter per transport,
/// constructed once and shared by reference
pub struct Communicator {
    config: CommunicatorConfig,
    dispatcher: Arc<Dispatcher>,
    lan: Arc<LanAdapter>,
    link: Arc<LinkAdapter>,
    sms: Arc<SmsAdapter>,
}

/// Optional collaborators replacing the defaults derived from the config
pub struct CommunicatorBuilder {
    config: CommunicatorConfig,
    authorizer: Option<Arc<dyn ContactAuthorizer>>,
    link_connector: Option<Arc<dyn LinkConnector>>,
    sms_hook: Option<Arc<dyn SmsHook>>,
}

impl CommunicatorBuilder {
    pub fn authorizer(mut self, authorizer: Arc<dyn ContactAuthorizer>) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    pub fn link_connector(mut self, connector: Arc<dyn LinkConnector>) -> Self {
        self.link_connector = Some(connector);
        self
    }

    pub fn sms_hook(mut self, hook: Arc<dyn SmsHook>) -> Self {
        self.sms_hook = Some(hook);
        self
    }

    pub fn build(self) -> Communicator {
        let config = self.config;
        let inbound = InboundQueue::new(config.buffers.reception);
        let outbound = OutboundQueue::new(config.buffers.transmission);

        let authorizer: Arc<dyn ContactAuthorizer> = match self.authorizer {
            Some(authorizer) => authorizer,
            None => Arc::new(config.contact_book()),
        };
        let connector: Arc<dyn LinkConnector> = match self.link_connector {
            Some(connector) => connector,
            None => Arc::new(TcpLinkConnector::new(config.link.peers.clone())),
        };
        let hook: Arc<dyn SmsHook> = match self.sms_hook {
            Some(hook) => hook,
            None => Arc::new(InboundHook::new(inbound.clone())),
        };

        let lan = Arc::new(LanAdapter::new(config.lan.clone(), inbound.clone()));
        let link = Arc::new(LinkAdapter::new(&config.link, connector, inbound.clone()));
        let sms = Arc::new(SmsAdapter::new(config.sms.clone(), authorizer.clone(), hook));

        let dispatcher = Arc::new(Dispatcher::new(authorizer, outbound, inbound));
        dispatcher.register(lan.clone());
        dispatcher.register(link.clone());
        dispatcher.register(sms.clone());

        Communicator {
            config,
            dispatcher,
            lan,
            link,
            sms,
        }
    }
}

impl Communicator {
    pub fn builder(config: CommunicatorConfig) -> CommunicatorBuilder {
        CommunicatorBuilder {
            config,
            authorizer: None,
            link_connector: None,
            sms_hook: None,
        }
    }

    /// Communicator over the configured contacts and link peers
    pub fn new(config: CommunicatorConfig) -> Self {
        Self::builder(config).build()
    }

    /// Start the transmission loop and every configured transport.
    /// A transport that fails to come up is logged and left inert.
    pub async fn open(&self) {
        self.dispatcher.start();

        self.connect_lan();

        if let Some(addr) = self.config.link.listen {
            match self.link.listen(addr).await {
                Ok(local) => info!(%local, "Link listener started"),
                Err(e) => error!(%addr, error = %e, "Link listener unavailable"),
            }
        }

        if let Some(port) = self.config.sms.port.clone() {
            self.connect_modem(&port).await;
        }

        info!("Communicator open");
    }

    /// Stop every loop; transfers already in progress run to completion
    pub async fn close(&self) {
        self.dispatcher.stop().await;
        futures::join!(self.lan.stop(), self.link.stop(), self.sms.disconnect());
        info!("Communicator closed");
    }

    /// Queue `outbound` for `receiver`, optionally pinned to `device`
    pub fn send(
        &self,
        outbound: impl Into<Outbound>,
        receiver: Option<&str>,
        device: Option<TransportKind>,
    ) -> bool {
        self.dispatcher.enqueue(outbound, receiver, device)
    }

    pub fn receive(&self) -> Option<Message> {
        self.dispatcher.drain()
    }

    pub fn length(&self) -> usize {
        self.dispatcher.pending_count()
    }

    /// Running totals of the outbound and inbound queues
    pub fn queue_stats(&self) -> (QueueStats, QueueStats) {
        (
            self.dispatcher.outbound().stats(),
            self.dispatcher.inbound().stats(),
        )
    }

    /// Open the serial device at `port` and start the modem
    pub async fn connect_modem(&self, port: &str) -> bool {
        #[cfg(feature = "serial")]
        {
            match crate::modem::serial::open(port, &self.config.sms) {
                Ok(stream) => self.connect_modem_stream(stream).await,
                Err(e) => {
                    error!(port, error = %e, "Modem unavailable");
                    false
                }
            }
        }
        #[cfg(not(feature = "serial"))]
        {
            warn!(port, "Serial support not compiled in, modem not connected");
            false
        }
    }

    /// Start the modem over an already opened device channel
    pub async fn connect_modem_stream(&self, stream: BoxedStream) -> bool {
        match self.sms.connect(stream).await {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "Modem initialization failed");
                false
            }
        }
    }

    pub async fn disconnect_modem(&self) {
        self.sms.disconnect().await;
    }

    /// Bind and serve the local-network endpoints
    pub fn connect_lan(&self) -> bool {
        if self.lan.is_active() {
            return true;
        }
        self.lan.connect()
    }

    pub async fn disconnect_lan(&self) {
        self.lan.disconnect().await;
    }

    pub fn config(&self) -> &CommunicatorConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn lan(&self) -> &Arc<LanAdapter> {
        &self.lan
    }

    pub fn link(&self) -> &Arc<LinkAdapter> {
        &self.link
    }

    pub fn sms(&self) -> &Arc<SmsAdapter> {
        &self.sms
    }
}
