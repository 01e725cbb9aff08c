use async_trait::async_trait;

use crate::{error::ChannelError, types::ChannelStatus, types::OutboundMessage};

/// Common interface implemented by every channel adapter (Telegram,
/// console, …). spec.md §1 treats concrete adapters as external
/// collaborators — only this interface is in scope for the core.
///
/// Implementations must be `Send + Sync` so they can be stored in a
/// [`crate::manager::ChannelManager`] and driven from multiple Tokio tasks.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Stable lowercase identifier for this channel (e.g. `"telegram"`),
    /// unique across all registered adapters.
    fn name(&self) -> &str;

    /// Establish the connection to the external service.
    async fn connect(&mut self) -> Result<(), ChannelError>;

    /// Gracefully close the connection.
    async fn disconnect(&mut self) -> Result<(), ChannelError>;

    /// Deliver a single outbound message. `&self` (not `&mut self`) so a
    /// connected adapter can send concurrently.
    async fn send(&self, msg: &OutboundMessage) -> Result<(), ChannelError>;

    fn status(&self) -> ChannelStatus;
}
