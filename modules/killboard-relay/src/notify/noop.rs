use async_trait::async_trait;
use tracing::debug;

use super::backend::NotifyBackend;
use crate::types::Message;

/// Drops every message. Used when no webhook is configured.
pub struct NoopBackend;

#[async_trait]
impl NotifyBackend for NoopBackend {
    async fn send(&self, message: &Message) -> anyhow::Result<()> {
        debug!(channel = %message.channel, title = %message.title, "Notifications disabled, dropping message");
        Ok(())
    }
}
