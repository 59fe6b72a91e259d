use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum QueueError {
    #[error("Queue is full (capacity: {0})")]
    QueueFull(usize),

    #[error("Queue is empty")]
    QueueEmpty,
}

pub type QueueResult<T> = Result<T, QueueError>;
