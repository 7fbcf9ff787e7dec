//! Core error types for Tweaker

#[derive(thiserror::Error, Debug)]
pub enum TweakerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Script source error: {0}")]
    Source(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, TweakerError>;
