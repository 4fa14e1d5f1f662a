use thiserror::Error;

/// Top-level error type for the forwarder pipeline.
#[derive(Error, Debug)]
pub enum ForwarderError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::app::ConfigError),

    #[error("Formatter error: {0}")]
    Format(#[from] crate::formatter::FormatError),

    #[error("Rate limiter error: {0}")]
    RateLimit(#[from] crate::reliability::RateLimitError),

    #[error("Source error: {0}")]
    Source(#[from] crate::source::SourceError),

    #[error("Queue error: {0}")]
    Queue(#[from] crate::buffer::BufferError),

    #[error("Logging setup error: {0}")]
    Logging(#[from] crate::app::LoggingError),

    #[error("Shutdown error: {0}")]
    Shutdown(String),
}
