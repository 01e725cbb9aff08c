use serde::{Deserialize, Serialize};

/// Where a message or a scheduler-fired prompt came from — carried through
/// the tool-call loop so the composer knows which outbound channel (if any)
/// should receive the final reply. spec.md §3 "Scheduled job" entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelOrigin {
    /// Channel adapter name, e.g. `"telegram"`, `"console"`.
    pub channel: String,
    /// Chat/conversation identifier within that channel.
    pub chat_id: String,
}

impl ChannelOrigin {
    pub fn new(channel: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            chat_id: chat_id.into(),
        }
    }

    /// The synthetic origin used for scheduler-internal prompts that have no
    /// external channel to reply to (e.g. a probe before a job exists).
    pub fn internal() -> Self {
        Self {
            channel: "internal".to_string(),
            chat_id: "internal".to_string(),
        }
    }
}
