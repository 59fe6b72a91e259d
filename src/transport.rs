use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::contact::Contact;
use crate::message::{Message, TransportKind};

pub trait AsyncReadWrite: AsyncRead + AsyncWrite {}

impl<T> AsyncReadWrite for T where T: AsyncRead + AsyncWrite {}

/// Exclusively owned duplex channel of one session
pub type BoxedStream = Box<dyn AsyncReadWrite + Unpin + Send>;

/// Outbound side of an adapter as seen by the dispatcher.
///
/// `deliver` is a single attempt; failures are logged by the adapter and
/// reported as `false`.
#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Whether the adapter can currently attempt a delivery
    fn is_available(&self) -> bool {
        true
    }

    async fn deliver(&self, contact: &Contact, message: &Message) -> bool;
}
