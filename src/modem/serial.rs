//! Real serial devices, bridged onto an async duplex channel

use crate::modem::error::{ModemError, ModemResult};
use crate::modem::types::SmsConfig;
use crate::transport::BoxedStream;
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

const BRIDGE_BUFFER: usize = 4096;

/// Open `port` at the configured baud rate.
///
/// The device is driven by two blocking tasks, one per direction, joined to
/// the returned stream through an in-memory pipe. Dropping the stream ends
/// the write task, and the read task follows within one read timeout.
pub fn open(port: &str, config: &SmsConfig) -> ModemResult<BoxedStream> {
    let mut builder = serialport::new(port, config.baud_rate).timeout(Duration::from_millis(200));
    #[cfg(unix)]
    {
        builder = builder
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None);
    }
    let mut reader = builder
        .open()
        .map_err(|e| ModemError::Port(format!("{port}: {e}")))?;
    let _ = reader.clear(serialport::ClearBuffer::All);
    let mut writer = reader
        .try_clone()
        .map_err(|e| ModemError::Port(format!("{port}: {e}")))?;

    let (stream, bridge) = tokio::io::duplex(BRIDGE_BUFFER);
    let (mut outgoing, mut incoming) = tokio::io::split(bridge);
    let runtime = tokio::runtime::Handle::current();
    let closed = Arc::new(AtomicBool::new(false));

    let read_runtime = runtime.clone();
    let read_closed = closed.clone();
    tokio::task::spawn_blocking(move || {
        let mut buffer = [0u8; 512];
        loop {
            match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => {
                    if read_runtime.block_on(incoming.write_all(&buffer[..n])).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == ErrorKind::TimedOut => {
                    if read_closed.load(Ordering::SeqCst) {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Serial read failed");
                    break;
                }
            }
        }
        debug!("Serial read bridge closed");
    });

    tokio::task::spawn_blocking(move || {
        let mut buffer = [0u8; 512];
        loop {
            match runtime.block_on(outgoing.read(&mut buffer)) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if let Err(e) = writer.write_all(&buffer[..n]).and_then(|_| writer.flush()) {
                        warn!(error = %e, "Serial write failed");
                        break;
                    }
                }
            }
        }
        closed.store(true, Ordering::SeqCst);
        debug!("Serial write bridge closed");
    });

    info!(port, baud_rate = config.baud_rate, "Serial device opened");
    Ok(Box::new(stream))
}
