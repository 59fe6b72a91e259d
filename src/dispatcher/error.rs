use thiserror::Error;

/// Why a message was refused at `send`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Transmission buffer full (capacity: {0})")]
    QueueFull(usize),

    #[error("Destination not authorized: {0}")]
    Unauthorized(String),

    #[error("No destination given for a bare payload")]
    MissingDestination,
}

impl DispatchError {
    /// Metric label
    pub fn reason(&self) -> &'static str {
        match self {
            DispatchError::QueueFull(_) => "queue_full",
            DispatchError::Unauthorized(_) => "unauthorized",
            DispatchError::MissingDestination => "missing_destination",
        }
    }
}

pub type DispatchResult<T> = Result<T, DispatchError>;
