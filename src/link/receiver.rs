//! Receiving half of the short-range link protocol

use crate::link::error::{LinkError, LinkResult};
use crate::link::transmitter::close;
use crate::link::types::{
    ACK, CHUNK_SIZE, END_OF_INSTANCE, EOF, FILE_EXISTS, READY, START_OF_FILE, START_OF_INSTANCE,
};
use crate::message::Message;
use crate::metrics;
use crate::priority::InboundQueue;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

/// Reads frames of at most `CHUNK_SIZE` bytes, keeping bytes a peer sent
/// without waiting for an acknowledgement for the next read.
struct FrameReader<'a, S> {
    conn: &'a mut S,
    pending: Vec<u8>,
    io_timeout: Duration,
}

impl<'a, S> FrameReader<'a, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn new(conn: &'a mut S, io_timeout: Duration) -> Self {
        Self {
            conn,
            pending: Vec::new(),
            io_timeout,
        }
    }

    async fn next_frame(&mut self) -> LinkResult<Vec<u8>> {
        if !self.pending.is_empty() {
            return Ok(std::mem::take(&mut self.pending));
        }

        let mut buffer = vec![0u8; CHUNK_SIZE];
        let read = tokio::time::timeout(self.io_timeout, self.conn.read(&mut buffer))
            .await
            .map_err(|_| LinkError::Timeout(self.io_timeout))??;
        if read == 0 {
            return Err(LinkError::ConnectionClosed);
        }
        buffer.truncate(read);
        Ok(buffer)
    }

    fn unread(&mut self, bytes: &[u8]) {
        if !bytes.is_empty() {
            let mut restored = bytes.to_vec();
            restored.extend_from_slice(&self.pending);
            self.pending = restored;
        }
    }

    /// Everything left until the peer closes
    async fn read_to_end(&mut self) -> LinkResult<Vec<u8>> {
        let mut data = std::mem::take(&mut self.pending);
        loop {
            match self.next_frame().await {
                Ok(frame) => data.extend_from_slice(&frame),
                Err(LinkError::ConnectionClosed) => return Ok(data),
                Err(e) => return Err(e),
            }
        }
    }

    async fn reply(&mut self, frame: &[u8]) -> LinkResult<()> {
        tokio::time::timeout(self.io_timeout, async {
            self.conn.write_all(frame).await?;
            self.conn.flush().await
        })
        .await
        .map_err(|_| LinkError::Timeout(self.io_timeout))?
        .map_err(LinkError::from)
    }
}

#[derive(Debug, Clone)]
pub struct LinkReceiver {
    download_dir: PathBuf,
    io_timeout: Duration,
}

impl LinkReceiver {
    pub fn new(download_dir: impl Into<PathBuf>, io_timeout: Duration) -> Self {
        Self {
            download_dir: download_dir.into(),
            io_timeout,
        }
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Serve one inbound session and push what it carried into `inbound`.
    /// The connection is closed on every path.
    pub async fn serve<S>(&self, mut conn: S, inbound: &InboundQueue) -> bool
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let result = self.receive(&mut conn).await;
        close(conn).await;

        match result {
            Ok(message) => {
                info!("New message received over link");
                match inbound.push_back(message) {
                    Ok(()) => {
                        metrics::record_received("link");
                        true
                    }
                    Err(e) => {
                        warn!(error = %e, "Reception buffer full, link message dropped");
                        false
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Link reception failed");
                false
            }
        }
    }

    /// Run the receiving side of one exchange without closing `conn`
    pub async fn receive<S>(&self, conn: &mut S) -> LinkResult<Message>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let mut reader = FrameReader::new(conn, self.io_timeout);
        let first = reader.next_frame().await?;

        if let Some(rest) = first.strip_prefix(START_OF_FILE) {
            reader.unread(rest);
            let path = self.receive_file(&mut reader).await?;
            Ok(Message::file(path))
        } else if let Some(rest) = first.strip_prefix(START_OF_INSTANCE) {
            reader.unread(rest);
            self.receive_instance(&mut reader).await
        } else {
            reader.unread(&first);
            let body = reader.read_to_end().await?;
            Ok(Message::text(String::from_utf8_lossy(&body).into_owned()))
        }
    }

    async fn receive_file<S>(&self, reader: &mut FrameReader<'_, S>) -> LinkResult<PathBuf>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        reader.reply(ACK).await?;

        let name_frame = reader.next_frame().await?;
        let file_name = sanitize_file_name(&name_frame)?;
        let target = self.download_dir.join(&file_name);

        if fs::try_exists(&target).await? {
            reader.reply(FILE_EXISTS).await?;
            debug!(file = %target.display(), "Link peer offered a file we already hold");
            return Ok(target);
        }

        fs::create_dir_all(&self.download_dir).await?;
        reader.reply(READY).await?;

        let mut file = File::create(&target).await?;
        let written = async {
            loop {
                let frame = reader.next_frame().await?;
                if frame == EOF {
                    reader.reply(ACK).await?;
                    break;
                }
                file.write_all(&frame).await?;
                reader.reply(ACK).await?;
            }
            file.flush().await?;
            Ok::<(), LinkError>(())
        }
        .await;

        if let Err(e) = written {
            // Partial content must not be mistaken for a complete file later
            let _ = fs::remove_file(&target).await;
            return Err(e);
        }

        Ok(target)
    }

    async fn receive_instance<S>(&self, reader: &mut FrameReader<'_, S>) -> LinkResult<Message>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        reader.reply(ACK).await?;

        let mut serialized = Vec::new();
        loop {
            let frame = reader.next_frame().await?;
            if let Some(rest) = frame.strip_prefix(END_OF_INSTANCE) {
                reader.unread(rest);
                break;
            }
            serialized.extend_from_slice(&frame);
            reader.reply(ACK).await?;
        }

        let mut message = Message::from_bytes(&serialized)?;
        if let Message::Instance(instance) = &mut message {
            if instance.attachment.is_some() {
                let marker = reader.next_frame().await?;
                let rest = marker.strip_prefix(START_OF_FILE).ok_or_else(|| {
                    LinkError::Protocol("expected attached file after instance".into())
                })?;
                reader.unread(rest);
                instance.attachment = Some(self.receive_file(reader).await?);
            }
        } else {
            return Err(LinkError::Protocol(
                "instance frame did not carry an instance".into(),
            ));
        }

        Ok(message)
    }
}

/// Keep only the final path component of a peer supplied name
fn sanitize_file_name(frame: &[u8]) -> LinkResult<String> {
    let name = std::str::from_utf8(frame)
        .map_err(|_| LinkError::Protocol("file name is not valid UTF-8".into()))?;
    Path::new(name.trim())
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_owned)
        .ok_or_else(|| LinkError::Protocol(format!("invalid file name {name:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name(b"photo.jpg").unwrap(), "photo.jpg");
        assert_eq!(sanitize_file_name(b"../../etc/passwd").unwrap(), "passwd");
        assert!(sanitize_file_name(b"..").is_err());
        assert!(sanitize_file_name(&[0xff, 0xfe]).is_err());
    }

    #[tokio::test]
    async fn test_receive_plain_text() {
        let dir = tempfile::tempdir().unwrap();
        let receiver = LinkReceiver::new(dir.path(), Duration::from_secs(5));
        let (mut local, mut remote) = tokio::io::duplex(4096);

        remote.write_all(b"status report").await.unwrap();
        remote.shutdown().await.unwrap();

        let message = receiver.receive(&mut local).await.unwrap();
        assert_eq!(message.as_text(), Some("status report"));
    }

    #[tokio::test]
    async fn test_existing_file_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("known.txt"), b"old").unwrap();
        let receiver = LinkReceiver::new(dir.path(), Duration::from_secs(5));
        let (mut local, mut remote) = tokio::io::duplex(4096);

        let peer = tokio::spawn(async move {
            let mut buffer = vec![0u8; CHUNK_SIZE];
            remote.write_all(START_OF_FILE).await.unwrap();
            let n = remote.read(&mut buffer).await.unwrap();
            assert_eq!(&buffer[..n], ACK);
            remote.write_all(b"known.txt").await.unwrap();
            let n = remote.read(&mut buffer).await.unwrap();
            buffer[..n].to_vec()
        });

        let message = receiver.receive(&mut local).await.unwrap();
        assert_eq!(message, Message::file(dir.path().join("known.txt")));
        assert_eq!(peer.await.unwrap(), FILE_EXISTS);
        assert_eq!(std::fs::read(dir.path().join("known.txt")).unwrap(), b"old");
    }

    #[tokio::test]
    async fn test_serve_pushes_into_inbound() {
        let dir = tempfile::tempdir().unwrap();
        let receiver = LinkReceiver::new(dir.path(), Duration::from_secs(5));
        let inbound = InboundQueue::new(4);
        let (local, mut remote) = tokio::io::duplex(4096);

        remote.write_all(b"ping").await.unwrap();
        remote.shutdown().await.unwrap();

        assert!(receiver.serve(local, &inbound).await);
        assert_eq!(inbound.dequeue().unwrap(), Message::text("ping"));
    }
}
