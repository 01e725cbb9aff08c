use thiserror::Error;

/// The core error taxonomy shared by every skill, the tool-call loop, and
/// the scheduler fabric. Every variant maps to a stable short code via
/// [`PicoclawError::code`] so callers can surface a consistent label to the
/// LLM or to logs without matching on the error text.
#[derive(Debug, Error)]
pub enum PicoclawError {
    /// Missing or malformed config. Fatal at startup only — never returned
    /// from a skill's `execute`.
    #[error("configuration error: {0}")]
    Config(String),

    /// A skill could not create or read its workspace directory.
    #[error("workspace error: {0}")]
    Workspace(String),

    /// Non-2xx response from CalDAV, an HTTP fetch, or the LM endpoint.
    #[error("remote error ({status}): {message}")]
    Remote { status: u16, message: String },

    /// ICS, OPML, XML, or JSON payload could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// The skill registry has no entry for the requested name.
    #[error("tool not found: {name}")]
    ToolNotFound { name: String },

    /// The tool-call loop hit its iteration cap. Not a failure — callers
    /// should treat the last assistant content as the answer.
    #[error("iteration cap reached after {iterations} iterations")]
    IterationCapReached { iterations: usize },

    /// The enclosing cancellation scope was cancelled. Never logged as a
    /// failure; a normal consequence of shutdown.
    #[error("cancelled")]
    Cancelled,

    /// A panic was caught at a fetch/skill boundary and converted to a
    /// per-unit error instead of tearing down the process.
    #[error("panic recovered: {0}")]
    Panic(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PicoclawError {
    /// Short, stable code string — safe to show to the LM or log without
    /// leaking secrets (passwords, tokens) that may appear in the message.
    pub fn code(&self) -> &'static str {
        match self {
            PicoclawError::Config(_) => "CONFIG_ERROR",
            PicoclawError::Workspace(_) => "WORKSPACE_ERROR",
            PicoclawError::Remote { .. } => "REMOTE_ERROR",
            PicoclawError::Parse(_) => "PARSE_ERROR",
            PicoclawError::ToolNotFound { .. } => "TOOL_NOT_FOUND",
            PicoclawError::IterationCapReached { .. } => "ITERATION_CAP_REACHED",
            PicoclawError::Cancelled => "CANCELLED",
            PicoclawError::Panic(_) => "PANIC",
            PicoclawError::Serialization(_) => "SERIALIZATION_ERROR",
            PicoclawError::Io(_) => "IO_ERROR",
        }
    }

    /// True for errors that are a normal part of the control flow and
    /// should never be surfaced as a user-visible failure (spec.md §7).
    pub fn is_silent(&self) -> bool {
        matches!(self, PicoclawError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, PicoclawError>;
