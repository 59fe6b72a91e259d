//! Relay configuration loaded from TOML

use crate::contact::{Contact, ContactBook};
use crate::lan::LanConfig;
use crate::link::LinkConfig;
use crate::modem::SmsConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Capacities of the two queues
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    pub reception: usize,
    pub transmission: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            reception: 100,
            transmission: 100,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CommunicatorConfig {
    pub buffers: BufferConfig,
    pub lan: LanConfig,
    pub sms: SmsConfig,
    pub link: LinkConfig,
    pub contacts: Vec<Contact>,
}

impl CommunicatorConfig {
    /// Read, parse and validate `path`
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.buffers.reception == 0 || self.buffers.transmission == 0 {
            return Err(ConfigError::Invalid("buffer capacities must be non-zero".into()));
        }
        let timers = [
            ("lan.poll_timeout_ms", self.lan.poll_timeout_ms),
            ("lan.connect_timeout_ms", self.lan.connect_timeout_ms),
            ("sms.read_timeout_ms", self.sms.read_timeout_ms),
            ("sms.poll_interval_ms", self.sms.poll_interval_ms),
            ("link.io_timeout_ms", self.link.io_timeout_ms),
            ("link.poll_timeout_ms", self.link.poll_timeout_ms),
        ];
        if let Some((name, _)) = timers.iter().find(|(_, ms)| *ms == 0) {
            return Err(ConfigError::Invalid(format!("{name} must be non-zero")));
        }

        let mut identities = std::collections::HashSet::new();
        for contact in &self.contacts {
            if contact.identity.is_empty() {
                return Err(ConfigError::Invalid("contact without identity".into()));
            }
            if !identities.insert(contact.identity.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate contact: {}",
                    contact.identity
                )));
            }
        }
        Ok(())
    }

    /// In-memory authorizer over the configured contacts
    pub fn contact_book(&self) -> ContactBook {
        ContactBook::from_contacts(self.contacts.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact::{AddressClass, ContactAuthorizer};
    use crate::lan::LanProtocol;
    use std::io::Write;

    const SAMPLE: &str = r#"
[buffers]
reception = 20
transmission = 30

[lan]
local_address = "192.168.1.10"
protocol = "udp"
close_port = true

[sms]
message_center = "543512000000"

[link]
download_dir = "/var/lib/commrelay/downloads"

[link.peers]
"00:1A:7D:DA:71:13" = "127.0.0.1:7001"

[[contacts]]
identity = "client01"
phone = "3512560536"
hardware = "00:1A:7D:DA:71:13"

[[contacts]]
identity = "client02"
lan = { ip = "192.168.1.20", tcp_port = 5000, udp_port = 5010 }
"#;

    #[test]
    fn test_parse_full_config() {
        let config = CommunicatorConfig::from_toml_str(SAMPLE).unwrap();

        assert_eq!(config.buffers.reception, 20);
        assert_eq!(config.buffers.transmission, 30);
        assert_eq!(config.lan.protocol, LanProtocol::Udp);
        assert!(config.lan.close_port);
        assert_eq!(config.lan.tcp_port, 5000);
        assert_eq!(config.sms.baud_rate, 115_200);
        assert_eq!(config.sms.message_center, "543512000000");
        assert_eq!(config.link.peers.len(), 1);
        assert_eq!(config.contacts.len(), 2);

        let book = config.contact_book();
        assert!(book.is_authorized(AddressClass::Phone, "client01"));
        assert!(book.is_authorized(AddressClass::Network, "client02"));
    }

    #[test]
    fn test_defaults_from_empty_document() {
        let config = CommunicatorConfig::from_toml_str("").unwrap();
        assert_eq!(config.buffers.reception, 100);
        assert_eq!(config.lan.udp_port, 5010);
        assert_eq!(config.sms.country_prefix, "+549");
        assert!(config.contacts.is_empty());
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let result = CommunicatorConfig::from_toml_str("[buffers]\nreception = 0");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_zero_timers() {
        for doc in [
            "[sms]\nread_timeout_ms = 0",
            "[link]\nio_timeout_ms = 0",
            "[lan]\npoll_timeout_ms = 0",
        ] {
            let result = CommunicatorConfig::from_toml_str(doc);
            assert!(matches!(result, Err(ConfigError::Invalid(_))), "{doc}");
        }
    }

    #[test]
    fn test_rejects_duplicate_contacts() {
        let doc = "[[contacts]]\nidentity = \"a\"\n[[contacts]]\nidentity = \"a\"";
        assert!(matches!(
            CommunicatorConfig::from_toml_str(doc),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = CommunicatorConfig::load(file.path()).unwrap();
        assert_eq!(config.buffers.transmission, 30);

        assert!(matches!(
            CommunicatorConfig::load("/nonexistent/commrelay.toml"),
            Err(ConfigError::Io(_))
        ));
    }
}
