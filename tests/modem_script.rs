use commrelay::contact::{Contact, ContactBook};
use commrelay::modem::{InboundHook, SmsAdapter, SmsConfig};
use commrelay::priority::InboundQueue;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

const UNREAD_LISTING: &str = "+CMGL: 0,\"REC UNREAD\",\"+5493512560536\",,\"24/05/14,10:21:07-12\"\r\n\
Primero\r\n\
+CMGL: 1,\"REC UNREAD\",\"876966\",,\"24/05/14,10:22:40-12\"\r\n\
Su saldo es de $0\r\n\
+CMGL: 2,\"REC UNREAD\",\"+5491144440000\",,\"24/05/14,10:23:02-12\"\r\n\
Hola\r\n\
\r\n\
OK\r\n";

const RESULT_CODE_BODIES: &str = "+CMGL: 3,\"REC UNREAD\",\"+5493512560536\",,\"24/05/14,11:00:00-12\"\r\n\
OK\r\n\
+CMGL: 4,\"REC UNREAD\",\"+5493512560536\",,\"24/05/14,11:00:30-12\"\r\n\
ERROR 42\r\n\
+CMGL: 5,\"REC UNREAD\",\"+5493512560536\",,\"24/05/14,11:01:00-12\"\r\n\
Segundo\r\n\
\r\n\
OK\r\n";

type Log = Arc<Mutex<Vec<String>>>;

/// Scripted device: echoes each command and answers it the way a GSM
/// modem in text mode does
async fn fake_modem(mut device: DuplexStream, log: Log, listing: &'static str, reject_submit: bool) {
    let mut pending = Vec::new();
    let mut chunk = [0u8; 256];
    let mut listed = false;

    loop {
        let n = match device.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        pending.extend_from_slice(&chunk[..n]);

        while let Some(end) = pending.iter().position(|b| *b == b'\r' || *b == 0x1a) {
            let raw: Vec<u8> = pending.drain(..=end).collect();
            let submitted = raw.last() == Some(&0x1a);
            let command = String::from_utf8_lossy(&raw[..raw.len() - 1]).to_string();
            log.lock().push(command.clone());

            let reply = if submitted {
                if reject_submit {
                    format!("{command}\r\n+CMS ERROR: 330\r\n")
                } else {
                    format!("{command}\r\n+CMGS: 17\r\n\r\nOK\r\n")
                }
            } else if command.starts_with("AT+CMGS=") {
                format!("{command}\r\n> ")
            } else if command.starts_with("AT+CMGL=") && !listed {
                listed = true;
                format!("{command}\r\n{listing}")
            } else {
                format!("{command}\r\nOK\r\n")
            };

            if device.write_all(reply.as_bytes()).await.is_err() {
                return;
            }
        }
    }
}

fn sms_config() -> SmsConfig {
    SmsConfig {
        read_timeout_ms: 100,
        poll_interval_ms: 50,
        message_center: "543512000000".to_string(),
        ..Default::default()
    }
}

async fn scripted_adapter(
    inbound: &InboundQueue,
    listing: &'static str,
    reject_submit: bool,
) -> (SmsAdapter, Log) {
    let (host, device) = tokio::io::duplex(4096);
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    tokio::spawn(fake_modem(device, log.clone(), listing, reject_submit));

    let book = ContactBook::from_contacts([Contact::new("client01").with_phone("3512560536")]);
    let adapter = SmsAdapter::new(
        sms_config(),
        Arc::new(book),
        Arc::new(InboundHook::new(inbound.clone())),
    );
    adapter.connect(Box::new(host)).await.unwrap();
    (adapter, log)
}

async fn connected_adapter(inbound: &InboundQueue, reject_submit: bool) -> (SmsAdapter, Log) {
    scripted_adapter(inbound, UNREAD_LISTING, reject_submit).await
}

async fn wait_for_command(log: &Log, command: &str) -> bool {
    for _ in 0..200 {
        if log.lock().iter().any(|c| c == command) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_initialization_sequence() {
    let inbound = InboundQueue::new(8);
    let (adapter, log) = connected_adapter(&inbound, false).await;

    let issued: Vec<String> = log.lock().iter().take(5).cloned().collect();
    assert_eq!(
        issued,
        vec![
            "ATE1",
            "AT+CMGF=1",
            "AT+CPMS=\"ME\",\"ME\",\"ME\"",
            "AT+CNMI=1,1,0,0,0",
            "AT+CSCA=\"+543512000000\"",
        ]
    );
    assert!(adapter.is_connected());
    adapter.disconnect().await;
    assert!(!adapter.is_connected());
}

#[tokio::test]
async fn test_poll_delivers_only_authorized_senders() {
    let inbound = InboundQueue::new(8);
    let (adapter, log) = connected_adapter(&inbound, false).await;

    assert!(wait_for_command(&log, "AT+CMGD=2").await);
    adapter.disconnect().await;

    assert_eq!(inbound.len(), 1);
    assert_eq!(inbound.dequeue().unwrap().as_text(), Some("primero"));

    let log = log.lock();
    for index in 0..3 {
        let delete = format!("AT+CMGD={index}");
        assert!(log.contains(&delete), "missing {delete}");
    }
}

#[tokio::test]
async fn test_bodies_that_look_like_result_codes() {
    let inbound = InboundQueue::new(8);
    let (adapter, log) = scripted_adapter(&inbound, RESULT_CODE_BODIES, false).await;

    assert!(wait_for_command(&log, "AT+CMGD=5").await);
    adapter.disconnect().await;

    let bodies: Vec<String> = std::iter::from_fn(|| inbound.dequeue().ok())
        .filter_map(|m| m.as_text().map(str::to_string))
        .collect();
    assert_eq!(bodies, vec!["ok", "error 42", "segundo"]);
}

#[tokio::test]
async fn test_send_confirmed_purges_storage() {
    let inbound = InboundQueue::new(8);
    let (adapter, log) = connected_adapter(&inbound, false).await;

    assert!(adapter.send("3512560536", "Nivel de agua: 80%").await);
    adapter.disconnect().await;

    let log = log.lock();
    let submit = log
        .iter()
        .position(|c| c == "AT+CMGS=\"3512560536\"")
        .unwrap();
    assert_eq!(log[submit + 1], "Nivel de agua: 80%");
    assert!(log[submit + 2..].iter().any(|c| c == "AT+CMGD=1,2"));
}

#[tokio::test]
async fn test_send_rejected_by_network() {
    let inbound = InboundQueue::new(8);
    let (adapter, log) = connected_adapter(&inbound, true).await;

    assert!(!adapter.send("3512560536", "hola").await);
    adapter.disconnect().await;

    let log = log.lock();
    assert!(!log.iter().any(|c| c == "AT+CMGD=1,2"));
}

#[tokio::test]
async fn test_commands_fail_once_disconnected() {
    let inbound = InboundQueue::new(8);
    let (adapter, _log) = connected_adapter(&inbound, false).await;
    adapter.disconnect().await;

    assert!(!adapter.send("3512560536", "hola").await);
    assert!(!adapter.dial("3512560536").await);
    assert!(!adapter.remove_message(0).await);
}
