use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("session closed before a line arrived")]
    Closed,
    #[error("invalid key chord '{input}': {reason}")]
    InvalidChord { input: String, reason: String },
    #[error("no element matches '{0}'")]
    MissingElement(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type BridgeResult<T> = std::result::Result<T, BridgeError>;
