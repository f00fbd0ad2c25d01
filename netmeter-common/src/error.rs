use thiserror::Error;

/// Common error type for netmeter components.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid metric key: {0}")]
    InvalidKey(String),

    /// Two snapshots for different keys were merged.
    #[error("Cannot merge snapshots of different keys: '{left}' and '{right}'")]
    KeyMismatch { left: String, right: String },

    #[error("Producer read failed: {0}")]
    Producer(String),

    #[error("Sink error: {0}")]
    Sink(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CBOR serialization error: {0}")]
    Cbor(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an invalid key error.
    pub fn invalid_key(msg: impl Into<String>) -> Self {
        Self::InvalidKey(msg.into())
    }

    /// Create a producer read error.
    pub fn producer(msg: impl Into<String>) -> Self {
        Self::Producer(msg.into())
    }
}

impl From<ciborium::ser::Error<std::io::Error>> for Error {
    fn from(e: ciborium::ser::Error<std::io::Error>) -> Self {
        Error::Cbor(e.to_string())
    }
}

impl From<ciborium::de::Error<std::io::Error>> for Error {
    fn from(e: ciborium::de::Error<std::io::Error>) -> Self {
        Error::Cbor(e.to_string())
    }
}

/// Result type alias using netmeter's Error.
pub type Result<T> = std::result::Result<T, Error>;
