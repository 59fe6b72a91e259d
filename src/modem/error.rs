use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModemError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Modem not connected")]
    NotConnected,

    #[error("Device channel closed")]
    ChannelClosed,

    #[error("Device rejected {command}: {fault}")]
    Rejected {
        command: String,
        fault: crate::modem::codes::DeviceFault,
    },

    #[error("Unsupported message for SMS: {0}")]
    Unsupported(&'static str),

    #[error("Serial port error: {0}")]
    Port(String),
}

pub type ModemResult<T> = Result<T, ModemError>;
