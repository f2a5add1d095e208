use std::io;

/// Custom error type for jekyll-hook operations
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("malformed push event: {0}")]
    MalformedEvent(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("task queue is closed")]
    QueueClosed,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

/// Helper type for Results that use HookError
pub type Result<T> = std::result::Result<T, HookError>;
