use crate::metrics;
use crate::modem::codes::{DeviceFault, CME_ERROR, CMS_ERROR, ERROR, NO_CARRIER};
use crate::modem::error::{ModemError, ModemResult};
use crate::modem::types::{LIST_RESPONSE, OK};
use crate::transport::BoxedStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Response to one command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Response lines without their terminators, echo included
    pub lines: Vec<String>,
    /// Last error marker found in the response
    pub fault: Option<DeviceFault>,
}

impl CommandOutput {
    pub fn is_ok(&self) -> bool {
        self.fault.is_none()
    }

    pub fn find(&self, prefix: &str) -> Option<&str> {
        self.lines
            .iter()
            .map(String::as_str)
            .find(|line| line.starts_with(prefix))
    }
}

/// Long-lived command/response session with a line-oriented device.
///
/// Exchanges are serialized: the channel lock is held from the write of a
/// command until its response has been read, so concurrent callers never
/// interleave on the device.
pub struct ModemSession {
    channel: Mutex<BufReader<BoxedStream>>,
    read_timeout: Duration,
    error: AtomicBool,
}

impl ModemSession {
    pub fn new(stream: BoxedStream, read_timeout: Duration) -> Self {
        Self {
            channel: Mutex::new(BufReader::new(stream)),
            read_timeout,
            error: AtomicBool::new(false),
        }
    }

    /// Whether the last command failed, at write level or by device report
    pub fn has_error(&self) -> bool {
        self.error.load(Ordering::SeqCst)
    }

    /// Write `command` and collect the response lines.
    ///
    /// Lines are read until the device goes quiet for the read timeout or a
    /// final result code arrives. Device error markers are reported in
    /// [`CommandOutput::fault`]; only a failing channel is an `Err`.
    pub async fn send_command(&self, command: &str) -> ModemResult<CommandOutput> {
        let mut channel = self.channel.lock().await;
        self.exchange(&mut channel, command).await
    }

    /// Run `commands` back to back without letting another caller in
    /// between, stopping at the first device fault
    pub async fn send_sequence(&self, commands: &[&str]) -> ModemResult<Vec<CommandOutput>> {
        let mut channel = self.channel.lock().await;
        let mut outputs = Vec::with_capacity(commands.len());
        for command in commands {
            let output = self.exchange(&mut channel, command).await?;
            let failed = output.fault.is_some();
            outputs.push(output);
            if failed {
                break;
            }
        }
        Ok(outputs)
    }

    async fn exchange(
        &self,
        channel: &mut BufReader<BoxedStream>,
        command: &str,
    ) -> ModemResult<CommandOutput> {
        self.error.store(false, Ordering::SeqCst);

        let written = async {
            channel.write_all(command.as_bytes()).await?;
            channel.flush().await
        }
        .await;
        if let Err(e) = written {
            self.error.store(true, Ordering::SeqCst);
            warn!(command = printable(command), error = %e, "Write to modem failed");
            return Err(e.into());
        }

        let output = self.read_response(channel).await?;
        if let Some(fault) = &output.fault {
            warn!(command = printable(command), %fault, "Modem reported an error");
            metrics::record_device_error(fault.kind());
            self.error.store(true, Ordering::SeqCst);
        }

        debug!(command = printable(command), lines = output.lines.len(), "Command completed");
        Ok(output)
    }

    /// Collect response lines until a final result code or a quiet device.
    /// The line after a list-response header is message text, so it is
    /// neither a result code nor an error marker.
    async fn read_response(&self, channel: &mut BufReader<BoxedStream>) -> ModemResult<CommandOutput> {
        let mut output = CommandOutput::default();
        let mut buffer = Vec::new();
        let mut body_next = false;

        loop {
            match tokio::time::timeout(self.read_timeout, channel.read_until(b'\n', &mut buffer)).await {
                Ok(Ok(0)) => {
                    if !buffer.is_empty() {
                        output.lines.push(take_line(&mut buffer));
                    }
                    if output.lines.is_empty() {
                        self.error.store(true, Ordering::SeqCst);
                        return Err(ModemError::ChannelClosed);
                    }
                    return Ok(output);
                }
                Ok(Ok(_)) => {
                    let line = take_line(&mut buffer);
                    if body_next {
                        body_next = false;
                        output.lines.push(line);
                        continue;
                    }
                    body_next = line.starts_with(LIST_RESPONSE);
                    if let Some(fault) = DeviceFault::from_line(&line) {
                        output.fault = Some(fault);
                    }
                    let done = is_final(&line);
                    output.lines.push(line);
                    if done {
                        return Ok(output);
                    }
                }
                Ok(Err(e)) => {
                    self.error.store(true, Ordering::SeqCst);
                    return Err(e.into());
                }
                // Quiet device: whatever arrived is the whole response
                Err(_) => {
                    if !buffer.is_empty() {
                        output.lines.push(take_line(&mut buffer));
                    }
                    return Ok(output);
                }
            }
        }
    }

    /// Put the device in text mode with on-device storage and new-message
    /// notifications, and set the outbound message center
    pub async fn initialize(&self, message_center: &str) -> ModemResult<()> {
        let center = format!("AT+CSCA=\"+{}\"\r", message_center.trim_start_matches('+'));
        let commands = [
            "ATE1\r",
            "AT+CMGF=1\r",
            "AT+CPMS=\"ME\",\"ME\",\"ME\"\r",
            "AT+CNMI=1,1,0,0,0\r",
            center.as_str(),
        ];
        for command in commands {
            let output = self.send_command(command).await?;
            if let Some(fault) = output.fault {
                warn!(command = printable(command), %fault, "Modem setup step rejected");
            }
        }
        Ok(())
    }
}

fn take_line(buffer: &mut Vec<u8>) -> String {
    let line = String::from_utf8_lossy(buffer)
        .trim_end_matches(['\r', '\n'])
        .to_string();
    buffer.clear();
    line
}

fn is_final(line: &str) -> bool {
    let line = line.trim();
    line == OK
        || line.starts_with(ERROR)
        || line.starts_with(CME_ERROR)
        || line.starts_with(CMS_ERROR)
        || line.starts_with(NO_CARRIER)
}

fn printable(command: &str) -> &str {
    command.trim_end_matches(['\r', '\x1a'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn session_pair(read_timeout: Duration) -> (ModemSession, tokio::io::DuplexStream) {
        let (local, remote) = tokio::io::duplex(4096);
        (ModemSession::new(Box::new(local), read_timeout), remote)
    }

    #[tokio::test]
    async fn test_command_collects_lines_until_ok() {
        let (session, mut device) = session_pair(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let n = device.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"AT\r");
            device.write_all(b"AT\r\r\nOK\r\n").await.unwrap();
            // Keep the channel open past the response
            tokio::time::sleep(Duration::from_secs(2)).await;
        });

        let output = session.send_command("AT\r").await.unwrap();
        assert_eq!(output.lines, vec!["AT".to_string(), "OK".to_string()]);
        assert!(output.is_ok());
        assert!(!session.has_error());
    }

    #[tokio::test]
    async fn test_equipment_error_sets_flag() {
        let (session, mut device) = session_pair(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let _ = device.read(&mut buf).await.unwrap();
            device.write_all(b"+CME ERROR: 11\r\n").await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
        });

        let output = session.send_command("AT+CMGF=1\r").await.unwrap();
        assert_eq!(
            output.fault,
            Some(DeviceFault::Equipment {
                code: Some(11),
                description: "SIM PIN required"
            })
        );
        assert!(session.has_error());
    }

    #[tokio::test]
    async fn test_quiet_device_returns_partial_prompt() {
        let (session, mut device) = session_pair(Duration::from_millis(50));
        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let _ = device.read(&mut buf).await.unwrap();
            device.write_all(b"AT+CMGS=\"123\"\r\r\n> ").await.unwrap();
            tokio::time::sleep(Duration::from_secs(1)).await;
        });

        let output = session.send_command("AT+CMGS=\"123\"\r").await.unwrap();
        assert_eq!(output.lines.last().map(String::as_str), Some("> "));
        assert!(output.is_ok());
    }

    #[tokio::test]
    async fn test_listing_body_is_not_a_result_code() {
        let (session, mut device) = session_pair(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let _ = device.read(&mut buf).await.unwrap();
            device
                .write_all(
                    b"+CMGL: 0,\"REC UNREAD\",\"+5493512560536\",,\"24/05/14,10:21:07-12\"\r\n\
OK\r\n\
+CMGL: 1,\"REC UNREAD\",\"+5493512560536\",,\"24/05/14,10:22:40-12\"\r\n\
ERROR 42\r\n\
+CMGL: 2,\"REC UNREAD\",\"+5493512560536\",,\"24/05/14,10:23:02-12\"\r\n\
segundo\r\n\r\nOK\r\n",
                )
                .await
                .unwrap();
            let _ = device.read(&mut buf).await.unwrap();
            device.write_all(b"AT+CMGD=0\r\r\nOK\r\n").await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
        });

        let listing = session.send_command("AT+CMGL=\"REC UNREAD\"\r").await.unwrap();
        assert_eq!(listing.lines.len(), 8);
        assert_eq!(listing.lines[1], "OK");
        assert_eq!(listing.lines[3], "ERROR 42");
        assert!(listing.is_ok());
        assert!(!session.has_error());

        let deleted = session.send_command("AT+CMGD=0\r").await.unwrap();
        assert_eq!(deleted.lines, vec!["AT+CMGD=0".to_string(), "OK".to_string()]);
    }

    #[tokio::test]
    async fn test_sequence_stops_at_first_fault() {
        let (session, mut device) = session_pair(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let _ = device.read(&mut buf).await.unwrap();
            device.write_all(b"+CMS ERROR: 330\r\n").await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
        });

        let outputs = session
            .send_sequence(&["AT+CMGS=\"123\"\r", "hola\x1a"])
            .await
            .unwrap();
        assert_eq!(outputs.len(), 1);
        assert!(!outputs[0].is_ok());
    }

    #[tokio::test]
    async fn test_closed_channel_is_an_error() {
        let (session, device) = session_pair(Duration::from_millis(50));
        drop(device);

        assert!(session.send_command("AT\r").await.is_err());
        assert!(session.has_error());
    }
}
