//! Fan-out of stored content to subscribed channels.
//!
//! [`DeliveryEngine`] runs one cycle per content item: resolve recipients for
//! the item's category, render the caption, materialize media per recipient
//! and send through a [`Transport`](crate::transport::Transport), spacing
//! sends by a fixed minimum gap. The item is finalized once at the end of the
//! cycle whatever the per-recipient outcomes were.

mod engine;
mod media;
mod recipients;
mod throttle;

pub use engine::{
    DeliveryConfig, DeliveryEngine, DeliveryResult, DeliveryStatus, PostedItem, RecipientOutcome,
    DEFAULT_CATEGORY, DEFAULT_INTER_SEND_DELAY,
};
pub use media::{MediaError, MediaResolver, ResolvedMedia, DEFAULT_MAX_MEDIA_BYTES};
pub use recipients::RecipientRegistry;
pub use throttle::{SendPermit, SendThrottle};
