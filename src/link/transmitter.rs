//! Sending half of the short-range link protocol
//!
//! Every exchange is stop-and-wait: each frame written by the sender is
//! followed by one acknowledgement read before the next frame goes out.
//! The connection handed to a `send_*` call is always shut down before the
//! call returns, whatever the outcome.

use crate::link::error::{LinkError, LinkResult};
use crate::link::types::{
    FileOutcome, CHUNK_SIZE, END_OF_INSTANCE, EOF, READY, START_OF_FILE, START_OF_INSTANCE,
};
use crate::message::{Instance, Message};
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct LinkTransmitter {
    io_timeout: Duration,
}

impl LinkTransmitter {
    pub fn new(io_timeout: Duration) -> Self {
        Self { io_timeout }
    }

    /// Route a message to the exchange its variant calls for
    pub async fn send<S>(&self, message: &Message, conn: S) -> bool
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        match message {
            Message::PlainText { body } => self.send_plain_text(body, conn).await,
            Message::FileRef { path } => self.send_file(path, conn).await,
            Message::Instance(instance) => self.send_instance(instance, conn).await,
        }
    }

    pub async fn send_plain_text<S>(&self, text: &str, mut conn: S) -> bool
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let result = self.write_frame(&mut conn, text.as_bytes()).await;
        close(conn).await;

        match result {
            Ok(()) => {
                info!("Message sent over link");
                true
            }
            Err(e) => {
                warn!(error = %e, "Message not sent over link");
                false
            }
        }
    }

    pub async fn send_file<S>(&self, path: &Path, mut conn: S) -> bool
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let result = self.transfer_file(path, &mut conn).await;
        close(conn).await;
        log_file_outcome(path, result)
    }

    pub async fn send_instance<S>(&self, instance: &Instance, mut conn: S) -> bool
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let result = self.transfer_instance(instance, &mut conn).await;
        close(conn).await;

        match result {
            Ok(None) => {
                info!("Message instance sent over link");
                true
            }
            Ok(Some(outcome)) => match &instance.attachment {
                Some(path) => log_file_outcome(path, Ok(outcome)),
                None => true,
            },
            Err(e) => {
                warn!(error = %e, "Message instance not sent over link");
                false
            }
        }
    }

    /// Run the file exchange on `conn` without closing it
    pub async fn transfer_file<S>(&self, path: &Path, conn: &mut S) -> LinkResult<FileOutcome>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| LinkError::Protocol(format!("{} has no file name", path.display())))?;
        let mut file = File::open(path).await?;

        self.write_frame(conn, START_OF_FILE).await?;
        self.read_ack(conn).await?;
        self.write_frame(conn, file_name.as_bytes()).await?;

        let response = self.read_chunk(conn).await?;
        if response != READY {
            return Ok(FileOutcome::AlreadyPresent);
        }

        debug!(file = file_name, "Transferring file over link");

        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut bytes = 0u64;
        let mut chunks = 0u32;
        loop {
            let filled = fill_chunk(&mut file, &mut buffer).await?;
            if filled == 0 {
                break;
            }
            self.write_frame(conn, &buffer[..filled]).await?;
            self.read_ack(conn).await?;
            bytes += filled as u64;
            chunks += 1;
        }

        self.write_frame(conn, EOF).await?;
        self.read_ack(conn).await?;

        Ok(FileOutcome::Sent { bytes, chunks })
    }

    /// Run the instance exchange on `conn` without closing it.
    ///
    /// Returns the outcome of the attached file transfer, if the instance
    /// carries one.
    pub async fn transfer_instance<S>(
        &self,
        instance: &Instance,
        conn: &mut S,
    ) -> LinkResult<Option<FileOutcome>>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let serialized = Message::Instance(instance.clone()).to_bytes()?;

        self.write_frame(conn, START_OF_INSTANCE).await?;
        self.read_ack(conn).await?;

        for chunk in serialized.chunks(CHUNK_SIZE) {
            self.write_frame(conn, chunk).await?;
            self.read_ack(conn).await?;
        }

        self.write_frame(conn, END_OF_INSTANCE).await?;

        match &instance.attachment {
            Some(path) => Ok(Some(self.transfer_file(path, conn).await?)),
            None => Ok(None),
        }
    }

    async fn write_frame<S>(&self, conn: &mut S, frame: &[u8]) -> LinkResult<()>
    where
        S: AsyncWrite + Unpin,
    {
        self.bounded(async {
            conn.write_all(frame).await?;
            conn.flush().await
        })
        .await
    }

    /// Read one chunk of at most `CHUNK_SIZE` bytes
    async fn read_chunk<S>(&self, conn: &mut S) -> LinkResult<Vec<u8>>
    where
        S: AsyncRead + Unpin,
    {
        let mut buffer = vec![0u8; CHUNK_SIZE];
        let read = self.bounded(conn.read(&mut buffer)).await?;
        if read == 0 {
            return Err(LinkError::ConnectionClosed);
        }
        buffer.truncate(read);
        Ok(buffer)
    }

    async fn read_ack<S>(&self, conn: &mut S) -> LinkResult<()>
    where
        S: AsyncRead + Unpin,
    {
        self.read_chunk(conn).await.map(|_| ())
    }

    async fn bounded<T, F>(&self, operation: F) -> LinkResult<T>
    where
        F: Future<Output = std::io::Result<T>>,
    {
        tokio::time::timeout(self.io_timeout, operation)
            .await
            .map_err(|_| LinkError::Timeout(self.io_timeout))?
            .map_err(LinkError::from)
    }
}

impl Default for LinkTransmitter {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

/// Read from `file` until `buffer` is full or the file ends
async fn fill_chunk(file: &mut File, buffer: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        let read = file.read(&mut buffer[filled..]).await?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(filled)
}

pub(crate) async fn close<S>(mut conn: S)
where
    S: AsyncWrite + Unpin,
{
    if let Err(e) = conn.shutdown().await {
        debug!(error = %e, "Link shutdown failed");
    }
}

fn log_file_outcome(path: &Path, result: LinkResult<FileOutcome>) -> bool {
    match result {
        Ok(FileOutcome::Sent { bytes, chunks }) => {
            info!(file = %path.display(), bytes, chunks, "File sent over link");
            true
        }
        Ok(FileOutcome::AlreadyPresent) => {
            // The peer keeps its copy; nothing left to retry
            warn!(file = %path.display(), "File already exists on peer, rejected");
            true
        }
        Err(e) => {
            warn!(file = %path.display(), error = %e, "File not sent over link");
            false
        }
    }
}
