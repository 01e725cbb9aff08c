use thiserror::Error;

/// Errors that can occur within any channel adapter (spec.md §6 — only the
/// adapter *interface* is in scope for the core; concrete Telegram/console
/// wiring lives outside this crate).
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("operation timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("configuration error: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, ChannelError>;
