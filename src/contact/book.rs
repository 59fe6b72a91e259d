use crate::contact::types::{AddressClass, Contact};
use crate::contact::ContactAuthorizer;
use parking_lot::RwLock;
use std::collections::HashMap;

/// In-memory contact directory
#[derive(Debug, Default)]
pub struct ContactBook {
    contacts: RwLock<HashMap<String, Contact>>,
}

impl ContactBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_contacts(contacts: impl IntoIterator<Item = Contact>) -> Self {
        let book = Self::new();
        for contact in contacts {
            book.insert(contact);
        }
        book
    }

    pub fn insert(&self, contact: Contact) {
        self.contacts
            .write()
            .insert(contact.identity.clone(), contact);
    }

    pub fn remove(&self, identity: &str) -> Option<Contact> {
        self.contacts.write().remove(identity)
    }

    pub fn len(&self) -> usize {
        self.contacts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.read().is_empty()
    }
}

impl ContactAuthorizer for ContactBook {
    fn is_authorized(&self, class: AddressClass, identity: &str) -> bool {
        self.contacts
            .read()
            .get(identity)
            .map(|c| c.has_address(class))
            .unwrap_or(false)
    }

    fn lookup(&self, identity: &str) -> Option<Contact> {
        self.contacts.read().get(identity).cloned()
    }

    fn is_known_address(&self, class: AddressClass, address: &str) -> bool {
        self.contacts
            .read()
            .values()
            .any(|c| c.address(class).as_deref() == Some(address))
    }
}
