use serde::{Deserialize, Serialize};

/// The uniform return value of every skill invocation (spec.md §3
/// "ToolResult"). Invariant: at least one of `for_llm`/`for_user` is
/// non-empty unless `silent`; `for_llm` is mandatory when `is_error`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolResult {
    /// Text fed back into the transcript; authoritative for continuation
    /// logic.
    pub for_llm: String,
    /// Text rendered to the human; may be a truncated or emoji-decorated
    /// variant of `for_llm`.
    pub for_user: String,
    /// Suppresses the user channel.
    pub silent: bool,
    /// Marks failure; still may carry text.
    pub is_error: bool,
    /// The caller returns immediately; the result is published later via
    /// the bus.
    pub is_async: bool,
}

impl ToolResult {
    pub fn success(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            for_user: text.clone(),
            for_llm: text,
            silent: false,
            is_error: false,
            is_async: false,
        }
    }

    pub fn success_for(for_llm: impl Into<String>, for_user: impl Into<String>) -> Self {
        Self {
            for_llm: for_llm.into(),
            for_user: for_user.into(),
            silent: false,
            is_error: false,
            is_async: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            for_user: message.clone(),
            for_llm: message,
            silent: false,
            is_error: true,
            is_async: false,
        }
    }

    pub fn silent_ok() -> Self {
        Self {
            for_llm: String::new(),
            for_user: String::new(),
            silent: true,
            is_error: false,
            is_async: false,
        }
    }

    pub fn async_ack(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            for_user: message.clone(),
            for_llm: message,
            silent: false,
            is_error: false,
            is_async: true,
        }
    }

    /// Text to append to the transcript if present, falling back to
    /// `for_user` when `for_llm` is empty (spec.md §4.5 "append a `tool`
    /// message with `forLLM` (or `forUser` if `forLLM` empty)").
    pub fn transcript_text(&self) -> &str {
        if !self.for_llm.is_empty() {
            &self.for_llm
        } else {
            &self.for_user
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_ok_has_no_text_and_is_not_an_error() {
        let r = ToolResult::silent_ok();
        assert!(r.silent);
        assert!(!r.is_error);
        assert!(r.for_llm.is_empty() && r.for_user.is_empty());
    }

    #[test]
    fn error_carries_text_on_both_channels() {
        let r = ToolResult::error("boom");
        assert!(r.is_error);
        assert_eq!(r.for_llm, "boom");
        assert_eq!(r.for_user, "boom");
    }

    #[test]
    fn transcript_text_falls_back_to_for_user() {
        let r = ToolResult {
            for_llm: String::new(),
            for_user: "shown to human only".into(),
            silent: false,
            is_error: false,
            is_async: false,
        };
        assert_eq!(r.transcript_text(), "shown to human only");
    }
}
