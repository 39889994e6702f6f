/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0} was not found")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    Handler(String),

    #[error("Load error: {0}")]
    Load(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}
