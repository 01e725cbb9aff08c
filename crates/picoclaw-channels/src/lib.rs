//! Message bus and channel-adapter interface (spec.md §6). Concrete
//! adapters (Telegram, console) are external collaborators per spec.md §1 —
//! this crate only carries the [`Channel`] trait, the [`ChannelManager`]
//! that connects/tracks adapters, and the [`MessageBus`] pub/sub plane
//! between the core and the outside world.

pub mod bus;
pub mod channel;
pub mod error;
pub mod manager;
pub mod types;

pub use bus::MessageBus;
pub use channel::Channel;
pub use error::ChannelError;
pub use manager::ChannelManager;
pub use types::{ChannelStatus, InboundMessage, MessageFormat, OutboundMessage};
