//! Store-and-forward message relay over a short-range link, the local
//! network and a serial text-messaging modem, behind one priority-ordered
//! send/receive pipeline.

pub mod communicator;
pub mod config;
pub mod contact;
pub mod dispatcher;
pub mod lan;
pub mod link;
pub mod message;
pub mod metrics;
pub mod modem;
pub mod priority;
pub mod transport;

pub use communicator::{Communicator, CommunicatorBuilder};
pub use config::{CommunicatorConfig, ConfigError};
pub use contact::{AddressClass, Contact, ContactAuthorizer, ContactBook, LanEndpoint};
pub use dispatcher::{Delivery, DispatchError, Dispatcher};
pub use message::{Envelope, Instance, Message, Outbound, TransportKind};
pub use transport::{BoxedStream, Transport};
