use crate::message::TransportKind;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Address namespaces a contact can be reached through
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AddressClass {
    Network,
    Hardware,
    Email,
    Phone,
}

impl AddressClass {
    pub const ALL: [AddressClass; 4] = [
        AddressClass::Network,
        AddressClass::Hardware,
        AddressClass::Email,
        AddressClass::Phone,
    ];
}

/// Local-network endpoint of a contact
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LanEndpoint {
    pub ip: IpAddr,
    pub tcp_port: u16,
    pub udp_port: u16,
}

/// A known party and its transport addresses
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Contact {
    pub identity: String,

    #[serde(default)]
    pub lan: Option<LanEndpoint>,

    /// Short-range link hardware address
    #[serde(default)]
    pub hardware: Option<String>,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub phone: Option<String>,
}

impl Contact {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            ..Default::default()
        }
    }

    pub fn with_lan(mut self, endpoint: LanEndpoint) -> Self {
        self.lan = Some(endpoint);
        self
    }

    pub fn with_hardware(mut self, address: impl Into<String>) -> Self {
        self.hardware = Some(address.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn has_address(&self, class: AddressClass) -> bool {
        match class {
            AddressClass::Network => self.lan.is_some(),
            AddressClass::Hardware => self.hardware.is_some(),
            AddressClass::Email => self.email.is_some(),
            AddressClass::Phone => self.phone.is_some(),
        }
    }

    /// Textual form of the address in `class`, if any
    pub fn address(&self, class: AddressClass) -> Option<String> {
        match class {
            AddressClass::Network => self.lan.map(|e| e.ip.to_string()),
            AddressClass::Hardware => self.hardware.clone(),
            AddressClass::Email => self.email.clone(),
            AddressClass::Phone => self.phone.clone(),
        }
    }
}

impl From<TransportKind> for AddressClass {
    fn from(kind: TransportKind) -> Self {
        match kind {
            TransportKind::Lan => AddressClass::Network,
            TransportKind::Link => AddressClass::Hardware,
            TransportKind::Sms => AddressClass::Phone,
        }
    }
}
