use std::collections::HashMap;

use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

use crate::{channel::Channel, error::ChannelError, types::ChannelStatus};

const BACKOFF_BASE_SECS: u64 = 5;
const BACKOFF_MAX_SECS: u64 = 300;
const MAX_ATTEMPTS: u32 = 10;
const JITTER_FRACTION: f64 = 0.10;

/// Registry of channel adapters, keyed by [`Channel::name`]. Connects,
/// disconnects, and queries them as a group, applying exponential backoff
/// with jitter on connect failure.
pub struct ChannelManager {
    channels: HashMap<String, Box<dyn Channel + Send + Sync>>,
}

impl ChannelManager {
    pub fn new() -> Self {
        Self { channels: HashMap::new() }
    }

    /// Register a channel adapter, replacing any existing one with the same
    /// name.
    pub fn register(&mut self, channel: Box<dyn Channel + Send + Sync>) {
        let name = channel.name().to_string();
        info!(channel = %name, "registering channel adapter");
        self.channels.insert(name, channel);
    }

    /// Connect every registered channel, sequentially, with backoff on
    /// failure; a channel that exhausts [`MAX_ATTEMPTS`] is logged and
    /// skipped rather than aborting the others.
    pub async fn connect_all(&mut self) {
        for (name, channel) in self.channels.iter_mut() {
            info!(channel = %name, "connecting channel");
            if let Err(e) = connect_with_backoff(name, channel.as_mut()).await {
                error!(channel = %name, error = %e, "failed to connect channel after retries");
            }
        }
    }

    pub async fn disconnect_all(&mut self) {
        for (name, channel) in self.channels.iter_mut() {
            info!(channel = %name, "disconnecting channel");
            if let Err(e) = channel.disconnect().await {
                warn!(channel = %name, error = %e, "error while disconnecting channel");
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&(dyn Channel + Send + Sync)> {
        self.channels.get(name).map(|b| b.as_ref())
    }

    /// Sorted by channel name for deterministic output.
    pub fn statuses(&self) -> Vec<(String, ChannelStatus)> {
        let mut result: Vec<(String, ChannelStatus)> =
            self.channels.iter().map(|(name, ch)| (name.clone(), ch.status())).collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}

impl Default for ChannelManager {
    fn default() -> Self {
        Self::new()
    }
}

async fn connect_with_backoff(name: &str, channel: &mut dyn Channel) -> Result<(), ChannelError> {
    let mut delay_secs = BACKOFF_BASE_SECS;

    for attempt in 1..=MAX_ATTEMPTS {
        match channel.connect().await {
            Ok(()) => {
                info!(channel = %name, attempt, "channel connected successfully");
                return Ok(());
            }
            Err(e) if attempt == MAX_ATTEMPTS => return Err(e),
            Err(e) => {
                let jitter = jitter_secs(delay_secs);
                let total = delay_secs + jitter;
                warn!(
                    channel = %name, attempt, max = MAX_ATTEMPTS, error = %e, retry_after_secs = total,
                    "channel connect failed, retrying with backoff"
                );
                sleep(Duration::from_secs(total)).await;
                delay_secs = (delay_secs * 2).min(BACKOFF_MAX_SECS);
            }
        }
    }

    unreachable!("backoff loop exited without returning")
}

fn jitter_secs(base_secs: u64) -> u64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);

    let max_jitter = ((base_secs as f64) * JITTER_FRACTION) as u64;
    if max_jitter == 0 {
        return 0;
    }
    (nanos as u64) % max_jitter
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::types::OutboundMessage;

    struct AlwaysOkChannel {
        name: String,
        status: ChannelStatus,
    }

    #[async_trait]
    impl Channel for AlwaysOkChannel {
        fn name(&self) -> &str {
            &self.name
        }
        async fn connect(&mut self) -> Result<(), ChannelError> {
            self.status = ChannelStatus::Connected;
            Ok(())
        }
        async fn disconnect(&mut self) -> Result<(), ChannelError> {
            self.status = ChannelStatus::Disconnected;
            Ok(())
        }
        async fn send(&self, _msg: &OutboundMessage) -> Result<(), ChannelError> {
            Ok(())
        }
        fn status(&self) -> ChannelStatus {
            self.status.clone()
        }
    }

    #[tokio::test]
    async fn connect_all_transitions_registered_channel_to_connected() {
        let mut manager = ChannelManager::new();
        manager.register(Box::new(AlwaysOkChannel {
            name: "console".to_string(),
            status: ChannelStatus::Disconnected,
        }));
        manager.connect_all().await;
        let statuses = manager.statuses();
        assert_eq!(statuses.len(), 1);
        assert!(matches!(statuses[0].1, ChannelStatus::Connected));
    }

    #[test]
    fn get_unknown_channel_returns_none() {
        let manager = ChannelManager::new();
        assert!(manager.get("missing").is_none());
    }
}
