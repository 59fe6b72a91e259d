use crate::contact::{AddressClass, Contact, ContactAuthorizer};
use crate::message::{Message, TransportKind};
use crate::metrics;
use crate::modem::error::{ModemError, ModemResult};
use crate::modem::session::{CommandOutput, ModemSession};
use crate::modem::types::{
    SmsConfig, SmsRecord, END_OF_MESSAGE, LIST_RESPONSE, LIST_UNREAD, OK, PURGE_READ_AND_SENT,
    SEND_CONFIRMATION,
};
use crate::priority::InboundQueue;
use crate::transport::{BoxedStream, Transport};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Receives the text of every message from an authorized sender
pub trait SmsHook: Send + Sync {
    fn handle(&self, sender: &str, text: &str);
}

/// Default hook: queue the text for the application
pub struct InboundHook {
    inbound: InboundQueue,
}

impl InboundHook {
    pub fn new(inbound: InboundQueue) -> Self {
        Self { inbound }
    }
}

impl SmsHook for InboundHook {
    fn handle(&self, sender: &str, text: &str) {
        match self.inbound.push_back(Message::text(text)) {
            Ok(()) => {
                info!(sender, "New text message received");
                metrics::record_received("sms");
            }
            Err(e) => warn!(sender, error = %e, "Reception buffer full, text message dropped"),
        }
    }
}

/// Serial text-messaging adapter
pub struct SmsAdapter {
    config: SmsConfig,
    authorizer: Arc<dyn ContactAuthorizer>,
    hook: Arc<dyn SmsHook>,
    session: Mutex<Option<Arc<ModemSession>>>,
    active: Arc<AtomicBool>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl SmsAdapter {
    pub fn new(config: SmsConfig, authorizer: Arc<dyn ContactAuthorizer>, hook: Arc<dyn SmsHook>) -> Self {
        Self {
            config,
            authorizer,
            hook,
            session: Mutex::new(None),
            active: Arc::new(AtomicBool::new(false)),
            poll_task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SmsConfig {
        &self.config
    }

    /// Take ownership of the device channel, initialize it and start polling
    pub async fn connect(&self, stream: BoxedStream) -> ModemResult<()> {
        if self.is_connected() {
            self.disconnect().await;
        }

        let session = Arc::new(ModemSession::new(stream, self.config.read_timeout()));
        session.initialize(&self.config.message_center).await?;
        *self.session.lock() = Some(session.clone());

        self.active.store(true, Ordering::SeqCst);
        let poller = Poller {
            session,
            config: self.config.clone(),
            authorizer: self.authorizer.clone(),
            hook: self.hook.clone(),
            active: self.active.clone(),
        };
        *self.poll_task.lock() = Some(tokio::spawn(poller.run()));

        info!("Modem connected");
        Ok(())
    }

    /// Stop polling and release the device
    pub async fn disconnect(&self) {
        self.active.store(false, Ordering::SeqCst);
        let task = self.poll_task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
        if self.session.lock().take().is_some() {
            info!("Modem disconnected");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.lock().is_some()
    }

    fn session(&self) -> ModemResult<Arc<ModemSession>> {
        self.session.lock().clone().ok_or(ModemError::NotConnected)
    }

    /// Send `text` to `phone`; on confirmation the device's read and sent
    /// folders are purged
    pub async fn send(&self, phone: &str, text: &str) -> bool {
        match self.try_send(phone, text).await {
            Ok(confirmed) => {
                info!(phone, confirmed, "Text message sent");
                true
            }
            Err(e) => {
                warn!(phone, error = %e, "Text message not sent");
                false
            }
        }
    }

    async fn try_send(&self, phone: &str, text: &str) -> ModemResult<bool> {
        let session = self.session()?;

        let command = format!("AT+CMGS=\"{phone}\"\r");
        let body = format!("{text}{END_OF_MESSAGE}");
        let outputs = session.send_sequence(&[command.as_str(), body.as_str()]).await?;

        if let Some(fault) = outputs.iter().find_map(|output| output.fault.clone()) {
            return Err(ModemError::Rejected {
                command: command.trim_end().to_string(),
                fault,
            });
        }

        let Some(submitted) = outputs.last() else {
            return Ok(false);
        };
        let confirmed = submitted.find(SEND_CONFIRMATION).is_some();
        if confirmed {
            self.purge_read_and_sent().await;
        }
        Ok(confirmed)
    }

    /// Voice-dial `number`
    pub async fn dial(&self, number: &str) -> bool {
        self.simple_command(&format!("ATD{number};\r")).await
    }

    /// Delete the message stored at `index`
    pub async fn remove_message(&self, index: u32) -> bool {
        self.simple_command(&format!("AT+CMGD={index}\r")).await
    }

    /// Delete every read and sent message from device storage
    pub async fn purge_read_and_sent(&self) -> bool {
        self.simple_command(PURGE_READ_AND_SENT).await
    }

    async fn simple_command(&self, command: &str) -> bool {
        let result = match self.session() {
            Ok(session) => session.send_command(command).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(output) => output.is_ok(),
            Err(e) => {
                warn!(command = command.trim_end(), error = %e, "Modem command failed");
                false
            }
        }
    }
}

struct Poller {
    session: Arc<ModemSession>,
    config: SmsConfig,
    authorizer: Arc<dyn ContactAuthorizer>,
    hook: Arc<dyn SmsHook>,
    active: Arc<AtomicBool>,
}

impl Poller {
    async fn run(self) {
        let interval = self.config.poll_interval();
        while self.active.load(Ordering::SeqCst) {
            tokio::time::sleep(interval).await;
            if !self.active.load(Ordering::SeqCst) {
                break;
            }

            let records = match self.session.send_command(LIST_UNREAD).await {
                Ok(output) => parse_listing(&output, &self.config.country_prefix),
                Err(e) => {
                    warn!(error = %e, "Unread message query failed");
                    continue;
                }
            };
            if records.is_empty() {
                continue;
            }

            debug!(count = records.len(), "New text messages");
            for record in records {
                self.process(record).await;
            }
        }
        info!("Modem poll loop stopped");
    }

    async fn process(&self, record: SmsRecord) {
        if self
            .authorizer
            .is_known_address(AddressClass::Phone, &record.sender)
        {
            self.hook.handle(&record.sender, &record.body);
        } else if record.sender == self.config.system_sender {
            debug!(sender = %record.sender, "Message from the operator gateway ignored");
        } else {
            warn!(sender = %record.sender, "Sender not registered");
        }

        let command = format!("AT+CMGD={}\r", record.index);
        if let Err(e) = self.session.send_command(&command).await {
            warn!(index = record.index, error = %e, "Could not delete processed message");
        }
    }
}

/// Pair every list-response header with the line that follows it, up to
/// the closing `OK`
pub fn parse_listing(output: &CommandOutput, country_prefix: &str) -> Vec<SmsRecord> {
    let mut records = Vec::new();
    let mut lines = output.lines.iter();

    while let Some(line) = lines.next() {
        if line.trim() == OK {
            break;
        }
        if !line.starts_with(LIST_RESPONSE) {
            continue;
        }
        let body = lines.next().map(String::as_str).unwrap_or_default();
        match (message_index(line), sender_number(line, country_prefix)) {
            (Some(index), Some(sender)) => records.push(SmsRecord {
                index,
                sender,
                body: normalize_body(body),
            }),
            _ => warn!(header = %line, "Unparseable message header"),
        }
    }

    records
}

/// Sender from the third field of a list-response header, with the
/// country prefix removed
pub fn sender_number(header: &str, country_prefix: &str) -> Option<String> {
    let field = header.trim_end().split(',').nth(2)?.trim().trim_matches('"');
    let number = if country_prefix.is_empty() {
        field
    } else {
        field.strip_prefix(country_prefix).unwrap_or(field)
    };
    if number.is_empty() {
        None
    } else {
        Some(number.to_string())
    }
}

/// Lowercased body without its line terminator
pub fn normalize_body(body: &str) -> String {
    body.trim_end_matches(['\r', '\n']).to_lowercase()
}

/// Storage index from `+CMGL: <i>,...` or `+CMGS: <i>`
pub fn message_index(line: &str) -> Option<u32> {
    let rest = line
        .strip_prefix(LIST_RESPONSE)
        .or_else(|| line.strip_prefix(SEND_CONFIRMATION))?;
    rest.trim_start_matches(':')
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}

#[async_trait]
impl Transport for SmsAdapter {
    fn kind(&self) -> TransportKind {
        TransportKind::Sms
    }

    fn is_available(&self) -> bool {
        self.is_connected()
    }

    async fn deliver(&self, contact: &Contact, message: &Message) -> bool {
        let Some(phone) = &contact.phone else {
            warn!(contact = %contact.identity, "Contact has no phone number");
            return false;
        };
        match message.as_text() {
            Some(text) => self.send(phone, text).await,
            None => {
                let e = ModemError::Unsupported(message.variant().as_str());
                warn!(contact = %contact.identity, error = %e, "Message not sent");
                metrics::record_payload_error("sms");
                false
            }
        }
    }
}
