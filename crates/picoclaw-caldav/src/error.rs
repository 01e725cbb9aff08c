use thiserror::Error;

/// Errors that can occur while talking to the CalDAV remote. No retries
/// happen at this layer (spec.md §4.2) — transient failures are surfaced to
/// the caller, who may choose to retry via the tool-call loop.
#[derive(Debug, Error)]
pub enum CalDavError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote error ({status}): {body}")]
    Remote { status: u16, body: String },

    #[error("ICS parse error: {0}")]
    Parse(String),

    #[error("item not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, CalDavError>;
