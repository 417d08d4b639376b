//! Error types for the smart meter logger

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Logger error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport reached end of stream or the device went away
    #[error("Transport disconnected")]
    Disconnected,

    /// Malformed frame content
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// Field name or OBIS identifier not present in the code registry
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// Time-series store rejected or failed a write
    #[error("Store error: {0}")]
    Store(String),

    /// Store URL could not be parsed
    #[error("Invalid store URL: {0}")]
    InvalidUrl(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}
