//! Device error markers and their code tables (3GPP TS 27.007 / 27.005)

use std::fmt;

pub const CME_ERROR: &str = "+CME ERROR";
pub const CMS_ERROR: &str = "+CMS ERROR";
pub const NO_CARRIER: &str = "NO CARRIER";
pub const ERROR: &str = "ERROR";

/// Description used when a code is missing from the tables
pub const UNKNOWN_ERROR: &str = "unknown error";

/// Error condition reported by the device for one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceFault {
    /// `+CMS ERROR: <code>`, message service failure
    Service {
        code: Option<u16>,
        description: &'static str,
    },
    /// `+CME ERROR: <code>`, mobile equipment failure
    Equipment {
        code: Option<u16>,
        description: &'static str,
    },
    NoCarrier,
    Generic,
}

impl DeviceFault {
    /// Recognize an error marker at the start of a response line
    pub fn from_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix(CME_ERROR) {
            let code = parse_code(rest);
            Some(DeviceFault::Equipment {
                code,
                description: code.map(equipment_error).unwrap_or(UNKNOWN_ERROR),
            })
        } else if let Some(rest) = line.strip_prefix(CMS_ERROR) {
            let code = parse_code(rest);
            Some(DeviceFault::Service {
                code,
                description: code.map(service_error).unwrap_or(UNKNOWN_ERROR),
            })
        } else if line.starts_with(NO_CARRIER) {
            Some(DeviceFault::NoCarrier)
        } else if line.starts_with(ERROR) {
            Some(DeviceFault::Generic)
        } else {
            None
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            DeviceFault::Service { description, .. } => description,
            DeviceFault::Equipment { description, .. } => description,
            DeviceFault::NoCarrier => "no carrier",
            DeviceFault::Generic => "command failed",
        }
    }

    /// Metric label
    pub fn kind(&self) -> &'static str {
        match self {
            DeviceFault::Service { .. } => "service",
            DeviceFault::Equipment { .. } => "equipment",
            DeviceFault::NoCarrier => "no_carrier",
            DeviceFault::Generic => "generic",
        }
    }
}

impl fmt::Display for DeviceFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceFault::Service { code: Some(code), description } => {
                write!(f, "CMS {code}: {description}")
            }
            DeviceFault::Equipment { code: Some(code), description } => {
                write!(f, "CME {code}: {description}")
            }
            other => f.write_str(other.description()),
        }
    }
}

fn parse_code(rest: &str) -> Option<u16> {
    rest.trim_start_matches(':').trim().parse().ok()
}

/// `+CME ERROR` table
pub fn equipment_error(code: u16) -> &'static str {
    match code {
        0 => "phone failure",
        1 => "no connection to phone",
        2 => "phone-adaptor link reserved",
        3 => "operation not allowed",
        4 => "operation not supported",
        5 => "PH-SIM PIN required",
        6 => "PH-FSIM PIN required",
        7 => "PH-FSIM PUK required",
        10 => "SIM not inserted",
        11 => "SIM PIN required",
        12 => "SIM PUK required",
        13 => "SIM failure",
        14 => "SIM busy",
        15 => "SIM wrong",
        16 => "incorrect password",
        17 => "SIM PIN2 required",
        18 => "SIM PUK2 required",
        20 => "memory full",
        21 => "invalid index",
        22 => "not found",
        23 => "memory failure",
        24 => "text string too long",
        25 => "invalid characters in text string",
        26 => "dial string too long",
        27 => "invalid characters in dial string",
        30 => "no network service",
        31 => "network timeout",
        32 => "network not allowed, emergency calls only",
        40 => "network personalization PIN required",
        41 => "network personalization PUK required",
        42 => "network subset personalization PIN required",
        43 => "network subset personalization PUK required",
        44 => "service provider personalization PIN required",
        45 => "service provider personalization PUK required",
        46 => "corporate personalization PIN required",
        47 => "corporate personalization PUK required",
        100 => "unknown",
        _ => UNKNOWN_ERROR,
    }
}

/// `+CMS ERROR` table
pub fn service_error(code: u16) -> &'static str {
    match code {
        1 => "unassigned (unallocated) number",
        8 => "operator determined barring",
        10 => "call barred",
        21 => "short message transfer rejected",
        27 => "destination out of service",
        28 => "unidentified subscriber",
        29 => "facility rejected",
        30 => "unknown subscriber",
        38 => "network out of order",
        41 => "temporary failure",
        42 => "congestion",
        47 => "resources unavailable, unspecified",
        50 => "requested facility not subscribed",
        69 => "requested facility not implemented",
        81 => "invalid short message transfer reference value",
        95 => "invalid message, unspecified",
        96 => "invalid mandatory information",
        97 => "message type non-existent or not implemented",
        98 => "message not compatible with short message protocol state",
        99 => "information element non-existent or not implemented",
        111 => "protocol error, unspecified",
        127 => "interworking, unspecified",
        300 => "ME failure",
        301 => "SMS service of ME reserved",
        302 => "operation not allowed",
        303 => "operation not supported",
        304 => "invalid PDU mode parameter",
        305 => "invalid text mode parameter",
        310 => "SIM not inserted",
        311 => "SIM PIN required",
        312 => "PH-SIM PIN required",
        313 => "SIM failure",
        314 => "SIM busy",
        315 => "SIM wrong",
        316 => "SIM PUK required",
        317 => "SIM PIN2 required",
        318 => "SIM PUK2 required",
        320 => "memory failure",
        321 => "invalid memory index",
        322 => "memory full",
        330 => "SMSC address unknown",
        331 => "no network service",
        332 => "network timeout",
        340 => "no +CNMA acknowledgement expected",
        500 => "unknown error",
        _ => UNKNOWN_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equipment_error_line() {
        let fault = DeviceFault::from_line("+CME ERROR: 10\r\n").unwrap();
        assert_eq!(
            fault,
            DeviceFault::Equipment {
                code: Some(10),
                description: "SIM not inserted"
            }
        );
        assert_eq!(fault.to_string(), "CME 10: SIM not inserted");
    }

    #[test]
    fn test_service_error_line() {
        let fault = DeviceFault::from_line("+CMS ERROR: 330").unwrap();
        assert_eq!(fault.description(), "SMSC address unknown");
        assert_eq!(fault.kind(), "service");
    }

    #[test]
    fn test_unknown_code_falls_back() {
        let fault = DeviceFault::from_line("+CME ERROR: 9999").unwrap();
        assert_eq!(
            fault,
            DeviceFault::Equipment {
                code: Some(9999),
                description: UNKNOWN_ERROR
            }
        );

        let fault = DeviceFault::from_line("+CMS ERROR: not-a-number").unwrap();
        assert_eq!(
            fault,
            DeviceFault::Service {
                code: None,
                description: UNKNOWN_ERROR
            }
        );
    }

    #[test]
    fn test_plain_markers() {
        assert_eq!(DeviceFault::from_line("NO CARRIER\r\n"), Some(DeviceFault::NoCarrier));
        assert_eq!(DeviceFault::from_line("ERROR\r\n"), Some(DeviceFault::Generic));
        assert_eq!(DeviceFault::from_line("OK\r\n"), None);
        assert_eq!(DeviceFault::from_line("+CMGS: 17"), None);
    }
}
