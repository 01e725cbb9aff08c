use tokio::sync::broadcast;
use tracing::debug;

use crate::types::{InboundMessage, OutboundMessage};

const BUS_CAPACITY: usize = 256;

/// The two-topic pub/sub bus between the scheduler, skills, and outbound
/// channel adapters (spec.md §6 "Message bus (inbound/outbound)"). The core
/// consumes inbound and produces outbound; channel adapters do the reverse.
///
/// Many-writer, many-reader; delivery is best-effort and unordered across
/// topics, but per-topic order is preserved (spec.md §5) — each topic is
/// backed by its own `tokio::sync::broadcast` channel, which a single
/// producer publishes to in call order.
pub struct MessageBus {
    inbound_tx: broadcast::Sender<InboundMessage>,
    outbound_tx: broadcast::Sender<OutboundMessage>,
}

impl MessageBus {
    pub fn new() -> Self {
        let (inbound_tx, _) = broadcast::channel(BUS_CAPACITY);
        let (outbound_tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { inbound_tx, outbound_tx }
    }

    /// Published by a channel adapter when a message arrives from the
    /// outside world.
    pub fn publish_inbound(&self, msg: InboundMessage) {
        debug!(channel = %msg.channel, "publishing inbound message");
        let _ = self.inbound_tx.send(msg);
    }

    /// Published by the core (the composer, the heartbeat, a subagent) when
    /// a reply should reach an external channel.
    pub fn publish_outbound(&self, msg: OutboundMessage) {
        debug!(channel = %msg.channel, "publishing outbound message");
        let _ = self.outbound_tx.send(msg);
    }

    pub fn subscribe_inbound(&self) -> broadcast::Receiver<InboundMessage> {
        self.inbound_tx.subscribe()
    }

    pub fn subscribe_outbound(&self) -> broadcast::Receiver<OutboundMessage> {
        self.outbound_tx.subscribe()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inbound_subscriber_receives_published_message() {
        let bus = MessageBus::new();
        let mut rx = bus.subscribe_inbound();
        bus.publish_inbound(InboundMessage::new("telegram", "42", "hi"));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.sender_id, "42");
    }

    #[tokio::test]
    async fn outbound_preserves_publish_order_per_subscriber() {
        let bus = MessageBus::new();
        let mut rx = bus.subscribe_outbound();
        bus.publish_outbound(OutboundMessage::new("telegram", "1", "first"));
        bus.publish_outbound(OutboundMessage::new("telegram", "1", "second"));

        let a = rx.recv().await.unwrap();
        let b = rx.recv().await.unwrap();
        assert_eq!(a.content, "first");
        assert_eq!(b.content, "second");
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_error() {
        let bus = MessageBus::new();
        bus.publish_inbound(InboundMessage::new("console", "me", "hello"));
    }
}
