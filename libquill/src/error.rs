//! Error types for Quill

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, QuillError>;

#[derive(Error, Debug)]
pub enum QuillError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Not signed in: {0}")]
    NotAuthenticated(String),
}

impl QuillError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            QuillError::Validation(_) => 3,
            QuillError::NotAuthenticated(_) => 2,
            QuillError::Network(e) if e.is_unauthorized() => 2,
            QuillError::Network(_) => 1,
            QuillError::Storage(_) => 1,
            QuillError::Config(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid API URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Failure of a request against the blog API.
#[derive(Error, Debug, Clone)]
pub enum NetworkError {
    /// The request never produced a response (DNS, refused, timeout).
    #[error("Request failed: {0}")]
    Transport(String),

    /// The server answered with a non-2xx status.
    #[error("{endpoint} returned HTTP {status}")]
    Status {
        endpoint: String,
        status: u16,
        body: Option<String>,
    },

    /// The response arrived but did not have the expected shape.
    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl NetworkError {
    /// Response body, when the server sent a non-empty one
    pub fn body(&self) -> Option<&str> {
        match self {
            NetworkError::Status { body: Some(body), .. } if !body.trim().is_empty() => {
                Some(body.as_str())
            }
            _ => None,
        }
    }

    /// HTTP status, when a response was received
    pub fn status(&self) -> Option<u16> {
        match self {
            NetworkError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            NetworkError::Decode(err.to_string())
        } else {
            NetworkError::Transport(err.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Token storage unavailable: {0}")]
    Unavailable(String),

    #[error("Token storage IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Keyring error: {0}")]
    Keyring(String),

    #[error("Refusing to follow symlink at {0:?}")]
    Symlink(PathBuf),
}
