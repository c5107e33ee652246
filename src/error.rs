use crate::buffer::BufferError;
use crate::config::ConfigError;
use crate::sink::SinkError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("scale source disconnected")]
    SourceDisconnected,
    #[error("history buffer error: {0}")]
    Buffer(#[from] BufferError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),
    #[error("scale error: {0}")]
    Scale(String),
    #[error("unknown brew: {0}")]
    UnknownBrew(String),
    #[error("invalid action: {0}")]
    InvalidAction(String),
    #[error("invalid correction: {0}")]
    InvalidCorrection(String),
    #[error("brew {brew_id} summary corrected but sample series was not: {source}")]
    PartialCorrection { brew_id: String, source: SinkError },
    #[error("state lock poisoned")]
    StateLock,
}
