use thiserror::Error;

/// Error taxonomy shared by every memoria crate.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("capacity error: {0}")]
    Capacity(String),

    #[error("threat detected: {0}")]
    Threat(String),

    #[error("operation timed out after {0}ms")]
    Timeout(u64),

    #[error("component unavailable: {0}")]
    Unavailable(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Error::Persistence(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn capacity(msg: impl Into<String>) -> Self {
        Error::Capacity(msg.into())
    }

    pub fn threat(msg: impl Into<String>) -> Self {
        Error::Threat(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Error::Unavailable(msg.into())
    }
}
