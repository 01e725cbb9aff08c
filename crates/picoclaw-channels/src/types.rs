use serde::{Deserialize, Serialize};

/// A message received from an external channel (Telegram, console, …).
///
/// spec.md §6 "Message bus": one of the two topics the core consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Logical channel name (e.g. `"telegram"`, `"console"`).
    pub channel: String,
    /// Platform-native identifier for the sender (chat id, user id, …).
    pub sender_id: String,
    /// Human-readable display name for the sender, if available.
    pub sender_name: Option<String>,
    /// Plain text content of the message.
    pub content: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Full raw payload from the platform for cases that need extra fields.
    pub raw_payload: Option<serde_json::Value>,
}

impl InboundMessage {
    pub fn new(channel: impl Into<String>, sender_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            sender_id: sender_id.into(),
            sender_name: None,
            content: content.into(),
            timestamp: chrono::Utc::now(),
            raw_payload: None,
        }
    }

    pub fn origin(&self) -> picoclaw_core::types::ChannelOrigin {
        picoclaw_core::types::ChannelOrigin::new(self.channel.clone(), self.sender_id.clone())
    }
}

/// A message to be delivered to an external channel — the core's other
/// topic (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub channel: String,
    pub recipient_id: String,
    pub content: String,
    #[serde(default)]
    pub format: MessageFormat,
}

impl OutboundMessage {
    pub fn new(channel: impl Into<String>, recipient_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            recipient_id: recipient_id.into(),
            content: content.into(),
            format: MessageFormat::default(),
        }
    }

    pub fn from_origin(origin: &picoclaw_core::types::ChannelOrigin, content: impl Into<String>) -> Self {
        Self::new(origin.channel.clone(), origin.chat_id.clone(), content)
    }
}

/// Formatting hint for outbound message content.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageFormat {
    #[default]
    PlainText,
    Markdown,
    Html,
}

/// Runtime connection state of a channel adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    Connected,
    Connecting,
    Disconnected,
    Error(String),
}
