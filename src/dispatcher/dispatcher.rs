use crate::contact::{AddressClass, Contact, ContactAuthorizer};
use crate::dispatcher::error::{DispatchError, DispatchResult};
use crate::message::{Envelope, Message, Outbound, TransportKind};
use crate::metrics;
use crate::priority::{InboundQueue, OutboundQueue, QueuedEnvelope};
use crate::transport::Transport;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Pause of the transmission loop when the outbound queue is empty
pub const IDLE_INTERVAL: Duration = Duration::from_millis(50);

/// What the transmission loop did with one envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered(TransportKind),
    Failed(TransportKind),
    /// Discarded unsent after its ttl
    Expired,
    /// No registered transport can reach the destination
    NoRoute,
}

/// Owns both queues and moves outbound envelopes to the transports
pub struct Dispatcher {
    outbound: OutboundQueue,
    inbound: InboundQueue,
    authorizer: Arc<dyn ContactAuthorizer>,
    transports: RwLock<Vec<Arc<dyn Transport>>>,
    active: Arc<AtomicBool>,
    idle_interval: Duration,
    loop_task: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    pub fn new(authorizer: Arc<dyn ContactAuthorizer>, outbound: OutboundQueue, inbound: InboundQueue) -> Self {
        Self {
            outbound,
            inbound,
            authorizer,
            transports: RwLock::new(Vec::new()),
            active: Arc::new(AtomicBool::new(false)),
            idle_interval: IDLE_INTERVAL,
            loop_task: Mutex::new(None),
        }
    }

    pub fn with_idle_interval(mut self, interval: Duration) -> Self {
        self.idle_interval = interval;
        self
    }

    /// Make `transport` available to the transmission loop, replacing any
    /// transport of the same kind
    pub fn register(&self, transport: Arc<dyn Transport>) {
        let mut transports = self.transports.write();
        transports.retain(|t| t.kind() != transport.kind());
        transports.push(transport);
    }

    pub fn inbound(&self) -> &InboundQueue {
        &self.inbound
    }

    pub fn outbound(&self) -> &OutboundQueue {
        &self.outbound
    }

    /// Admit a message into the outbound queue.
    ///
    /// A bare payload needs `receiver`; a full envelope keeps its own
    /// destination and only takes `device` as a transport override.
    /// Nothing is queued when an error is returned.
    pub fn try_enqueue(
        &self,
        outbound: impl Into<Outbound>,
        receiver: Option<&str>,
        device: Option<TransportKind>,
    ) -> DispatchResult<Uuid> {
        if self.outbound.is_full() {
            return Err(DispatchError::QueueFull(self.outbound.capacity()));
        }

        let envelope = match outbound.into() {
            Outbound::Envelope(envelope) => envelope.with_preferred_transport(device),
            Outbound::Payload(message) => {
                let receiver = receiver.ok_or(DispatchError::MissingDestination)?;
                let mut builder = Envelope::builder(message).destination(receiver);
                if let Some(device) = device {
                    builder = builder.preferred_transport(device);
                }
                builder.build().ok_or(DispatchError::MissingDestination)?
            }
        };

        if !self.authorizer.is_authorized_anywhere(envelope.destination()) {
            return Err(DispatchError::Unauthorized(envelope.destination().to_string()));
        }

        let priority = envelope.priority();
        let queued = QueuedEnvelope::new(envelope);
        let id = queued.id;
        self.outbound
            .enqueue(queued.key(), queued)
            .map_err(|_| DispatchError::QueueFull(self.outbound.capacity()))?;

        metrics::record_enqueued(priority);
        metrics::set_queue_depth("outbound", self.outbound.len());
        Ok(id)
    }

    /// [`Dispatcher::try_enqueue`] with the rejection logged
    pub fn enqueue(
        &self,
        outbound: impl Into<Outbound>,
        receiver: Option<&str>,
        device: Option<TransportKind>,
    ) -> bool {
        match self.try_enqueue(outbound, receiver, device) {
            Ok(id) => {
                debug!(%id, "Message queued for transmission");
                true
            }
            Err(e) => {
                warn!(error = %e, "Message rejected");
                metrics::record_rejected(e.reason());
                false
            }
        }
    }

    /// Oldest received message, never blocks
    pub fn drain(&self) -> Option<Message> {
        let message = self.inbound.dequeue().ok()?;
        metrics::set_queue_depth("inbound", self.inbound.len());
        Some(message)
    }

    /// Number of received messages waiting to be drained
    pub fn pending_count(&self) -> usize {
        self.inbound.len()
    }

    /// Transport for one attempt: the preferred one when it can be used,
    /// else the first usable in [`TransportKind::FALLBACK_ORDER`]
    pub fn select_transport(&self, envelope: &Envelope, contact: &Contact) -> Option<Arc<dyn Transport>> {
        let transports = self.transports.read();
        let message = envelope.message();
        let usable = |kind: TransportKind| {
            if !kind.carries(message) || !contact.has_address(AddressClass::from(kind)) {
                return None;
            }
            transports
                .iter()
                .find(|t| t.kind() == kind && t.is_available())
                .cloned()
        };

        envelope
            .preferred_transport()
            .and_then(usable)
            .or_else(|| TransportKind::FALLBACK_ORDER.into_iter().find_map(usable))
    }

    /// Take the most urgent envelope and make its single delivery attempt.
    /// Returns `None` when the outbound queue is empty.
    pub async fn process_next(&self) -> Option<Delivery> {
        let queued = self.outbound.dequeue().ok()?;
        metrics::set_queue_depth("outbound", self.outbound.len());

        if queued.is_expired() {
            debug!(id = %queued.id, "Message expired before transmission");
            metrics::record_expired();
            return Some(Delivery::Expired);
        }

        let envelope = &queued.envelope;
        let route = self
            .authorizer
            .lookup(envelope.destination())
            .and_then(|contact| Some((self.select_transport(envelope, &contact)?, contact)));
        let Some((transport, contact)) = route else {
            warn!(
                id = %queued.id,
                destination = envelope.destination(),
                "No transport can reach the destination"
            );
            return Some(Delivery::NoRoute);
        };

        let kind = transport.kind();
        let delivered = transport.deliver(&contact, envelope.message()).await;
        metrics::record_delivery(kind.as_str(), delivered, queued.wait_time());
        if delivered {
            info!(id = %queued.id, transport = %kind, destination = envelope.destination(), "Message delivered");
            Some(Delivery::Delivered(kind))
        } else {
            warn!(id = %queued.id, transport = %kind, destination = envelope.destination(), "Delivery failed");
            Some(Delivery::Failed(kind))
        }
    }

    /// Spawn the transmission loop
    pub fn start(self: &Arc<Self>) {
        if self.active.swap(true, Ordering::SeqCst) {
            return;
        }

        let dispatcher = self.clone();
        let task = tokio::spawn(async move {
            while dispatcher.active.load(Ordering::SeqCst) {
                if dispatcher.process_next().await.is_none() {
                    tokio::time::sleep(dispatcher.idle_interval).await;
                }
            }
            info!("Transmission loop stopped");
        });
        *self.loop_task.lock() = Some(task);
    }

    /// Clear the active flag and wait for the loop; an attempt in progress
    /// runs to completion
    pub async fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
        let task = self.loop_task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact::{ContactBook, LanEndpoint};
    use async_trait::async_trait;

    struct Recorder {
        kind: TransportKind,
        outcome: bool,
        seen: Mutex<Vec<(String, Message)>>,
    }

    impl Recorder {
        fn new(kind: TransportKind, outcome: bool) -> Arc<Self> {
            Arc::new(Self {
                kind,
                outcome,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn bodies(&self) -> Vec<String> {
            self.seen
                .lock()
                .iter()
                .filter_map(|(_, m)| m.as_text().map(str::to_string))
                .collect()
        }
    }

    #[async_trait]
    impl Transport for Recorder {
        fn kind(&self) -> TransportKind {
            self.kind
        }

        async fn deliver(&self, contact: &Contact, message: &Message) -> bool {
            self.seen
                .lock()
                .push((contact.identity.clone(), message.clone()));
            self.outcome
        }
    }

    fn book() -> Arc<ContactBook> {
        Arc::new(ContactBook::from_contacts([
            Contact::new("client01")
                .with_lan(LanEndpoint {
                    ip: "127.0.0.1".parse().unwrap(),
                    tcp_port: 5000,
                    udp_port: 5010,
                })
                .with_hardware("00:1A:7D:DA:71:13")
                .with_phone("3512560536"),
            Contact::new("phone_only").with_phone("3510000000"),
        ]))
    }

    fn dispatcher(capacity: usize) -> Dispatcher {
        Dispatcher::new(book(), OutboundQueue::new(capacity), InboundQueue::new(capacity))
    }

    fn envelope(body: &str, priority: i32) -> Envelope {
        Envelope::builder(Message::text(body))
            .destination("client01")
            .priority(priority)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_outbound_order_by_priority_then_fifo() {
        let dispatcher = dispatcher(10);
        let lan = Recorder::new(TransportKind::Lan, true);
        dispatcher.register(lan.clone());

        for (body, priority) in [("low", 1), ("high-a", 50), ("mid", 10), ("high-b", 50)] {
            assert!(dispatcher.enqueue(envelope(body, priority), None, None));
        }
        while dispatcher.process_next().await.is_some() {}

        assert_eq!(lan.bodies(), vec!["high-a", "high-b", "mid", "low"]);
    }

    #[tokio::test]
    async fn test_zero_ttl_never_reaches_a_transport() {
        let dispatcher = dispatcher(10);
        let lan = Recorder::new(TransportKind::Lan, true);
        dispatcher.register(lan.clone());

        let expired = Envelope::builder("late")
            .destination("client01")
            .ttl(Duration::ZERO)
            .build()
            .unwrap();
        assert!(dispatcher.enqueue(expired, None, None));

        assert_eq!(dispatcher.process_next().await, Some(Delivery::Expired));
        assert!(lan.seen.lock().is_empty());
    }

    #[test]
    fn test_admission_full_queue() {
        let dispatcher = dispatcher(1);
        assert!(dispatcher.enqueue(envelope("first", 10), None, None));

        let result = dispatcher.try_enqueue(envelope("second", 99), None, None);
        assert_eq!(result, Err(DispatchError::QueueFull(1)));
        assert_eq!(dispatcher.outbound().len(), 1);
    }

    #[test]
    fn test_admission_unauthorized_and_missing_destination() {
        let dispatcher = dispatcher(4);

        let result = dispatcher.try_enqueue(Message::text("hi"), Some("stranger"), None);
        assert_eq!(result, Err(DispatchError::Unauthorized("stranger".into())));

        let result = dispatcher.try_enqueue(Message::text("hi"), None, None);
        assert_eq!(result, Err(DispatchError::MissingDestination));

        assert!(dispatcher.outbound().is_empty());
    }

    #[tokio::test]
    async fn test_preferred_transport_wins() {
        let dispatcher = dispatcher(4);
        let lan = Recorder::new(TransportKind::Lan, true);
        let link = Recorder::new(TransportKind::Link, true);
        dispatcher.register(lan.clone());
        dispatcher.register(link.clone());

        assert!(dispatcher.enqueue(Message::text("pinned"), Some("client01"), Some(TransportKind::Link)));
        assert_eq!(
            dispatcher.process_next().await,
            Some(Delivery::Delivered(TransportKind::Link))
        );
        assert!(lan.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_fallback_skips_transports_without_address() {
        let dispatcher = dispatcher(4);
        let lan = Recorder::new(TransportKind::Lan, true);
        let sms = Recorder::new(TransportKind::Sms, false);
        dispatcher.register(lan.clone());
        dispatcher.register(sms.clone());

        assert!(dispatcher.enqueue(Message::text("hola"), Some("phone_only"), None));
        assert_eq!(
            dispatcher.process_next().await,
            Some(Delivery::Failed(TransportKind::Sms))
        );
        assert_eq!(sms.bodies(), vec!["hola"]);
        // Failures are not re-queued
        assert!(dispatcher.outbound().is_empty());
    }

    #[tokio::test]
    async fn test_files_are_never_routed_to_sms() {
        let dispatcher = dispatcher(4);
        dispatcher.register(Recorder::new(TransportKind::Sms, true));

        assert!(dispatcher.enqueue(
            Message::file("/tmp/report.csv"),
            Some("phone_only"),
            Some(TransportKind::Sms)
        ));
        assert_eq!(dispatcher.process_next().await, Some(Delivery::NoRoute));
    }

    #[tokio::test]
    async fn test_files_fall_through_lan_to_link() {
        let dispatcher = dispatcher(4);
        let lan = Recorder::new(TransportKind::Lan, true);
        let link = Recorder::new(TransportKind::Link, true);
        dispatcher.register(lan.clone());
        dispatcher.register(link.clone());

        assert!(dispatcher.enqueue(Message::file("/tmp/report.csv"), Some("client01"), None));
        assert!(dispatcher.enqueue(
            Message::instance(serde_json::json!({"level": 4})),
            Some("client01"),
            None
        ));
        assert_eq!(
            dispatcher.process_next().await,
            Some(Delivery::Delivered(TransportKind::Link))
        );
        assert_eq!(
            dispatcher.process_next().await,
            Some(Delivery::Delivered(TransportKind::Lan))
        );
        assert_eq!(link.seen.lock()[0].1, Message::file("/tmp/report.csv"));
    }

    #[test]
    fn test_drain_empty_is_idempotent() {
        let dispatcher = dispatcher(4);
        for _ in 0..3 {
            assert!(dispatcher.drain().is_none());
            assert_eq!(dispatcher.pending_count(), 0);
        }
    }

    #[tokio::test]
    async fn test_concurrent_push_and_drain() {
        let dispatcher = Arc::new(dispatcher(1000));
        let mut workers = Vec::new();
        for worker in 0..8 {
            let inbound = dispatcher.inbound().clone();
            workers.push(tokio::spawn(async move {
                for i in 0..100 {
                    while inbound.push_back(Message::text(format!("{worker}-{i}"))).is_err() {
                        tokio::task::yield_now().await;
                    }
                }
            }));
        }

        let consumer = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                let mut drained = Vec::new();
                while drained.len() < 800 {
                    match dispatcher.drain() {
                        Some(message) => drained.push(message),
                        None => tokio::task::yield_now().await,
                    }
                }
                drained
            })
        };

        for worker in workers {
            worker.await.unwrap();
        }
        let drained = consumer.await.unwrap();

        let mut bodies: Vec<_> = drained
            .iter()
            .map(|m| m.as_text().unwrap().to_string())
            .collect();
        bodies.sort();
        bodies.dedup();
        assert_eq!(bodies.len(), 800);
        assert!(dispatcher.drain().is_none());
    }

    #[tokio::test]
    async fn test_loop_delivers_until_stopped() {
        let dispatcher = Arc::new(dispatcher(4).with_idle_interval(Duration::from_millis(5)));
        let lan = Recorder::new(TransportKind::Lan, true);
        dispatcher.register(lan.clone());
        dispatcher.start();

        assert!(dispatcher.enqueue(Message::text("ping"), Some("client01"), None));
        for _ in 0..100 {
            if !lan.seen.lock().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        dispatcher.stop().await;

        assert_eq!(lan.bodies(), vec!["ping"]);
        assert!(!dispatcher.is_active());
    }
}
