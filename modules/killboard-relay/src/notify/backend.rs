use async_trait::async_trait;

use crate::types::Message;

/// Pluggable delivery target for relay and report messages.
///
/// An `Err` means the message was not delivered; the poller relies on this
/// to hold its cursor and retry on the next tick.
#[async_trait]
pub trait NotifyBackend: Send + Sync {
    async fn send(&self, message: &Message) -> anyhow::Result<()>;
}
