//! Contact authorization
//!
//! The relay never mutates contact data; it only asks whether an identity is
//! allowed to use a given address class and where to reach it.

pub mod book;
pub mod types;

pub use book::ContactBook;
pub use types::{AddressClass, Contact, LanEndpoint};

/// Read-only view of the authorized contact tables
pub trait ContactAuthorizer: Send + Sync {
    /// Whether `identity` is present in the allow-list of `class`
    fn is_authorized(&self, class: AddressClass, identity: &str) -> bool;

    /// Full record for `identity`
    fn lookup(&self, identity: &str) -> Option<Contact>;

    /// Whether some contact owns `address` in `class`
    fn is_known_address(&self, class: AddressClass, address: &str) -> bool;

    fn is_authorized_anywhere(&self, identity: &str) -> bool {
        AddressClass::ALL
            .iter()
            .any(|class| self.is_authorized(*class, identity))
    }
}
