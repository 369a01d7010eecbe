use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use killboard_common::config::webhook_override;

use super::backend::NotifyBackend;
use super::discord::DiscordWebhook;
use crate::types::Message;

/// Routes messages to a backend by their logical channel.
///
/// Unlike a fire-and-forget notifier, delivery errors are returned to the
/// caller: the relay uses them to decide whether its cursor may advance.
pub struct NotifyRouter {
    channels: HashMap<String, Box<dyn NotifyBackend>>,
    fallback: Option<Box<dyn NotifyBackend>>,
}

impl NotifyRouter {
    pub fn new(fallback: Option<Box<dyn NotifyBackend>>) -> Self {
        Self {
            channels: HashMap::new(),
            fallback,
        }
    }

    pub fn route(mut self, channel: &str, backend: Box<dyn NotifyBackend>) -> Self {
        self.channels.insert(channel.to_string(), backend);
        self
    }

    /// Build a router from environment configuration.
    ///
    /// Env vars:
    /// - `DISCORD_WEBHOOK_URL`: default webhook (passed in as `default_url`)
    /// - `DISCORD_WEBHOOK_URL_<CHANNEL>`: per-channel override (optional)
    ///
    /// Returns `None` when no webhook is configured for any channel.
    pub fn from_env(
        channels: &[&str],
        default_url: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Option<Self>> {
        let fallback: Option<Box<dyn NotifyBackend>> = match default_url {
            Some(url) => Some(Box::new(DiscordWebhook::new(url, timeout)?)),
            None => None,
        };
        let mut router = Self::new(fallback);
        for channel in channels {
            if let Some(url) = webhook_override(channel) {
                router = router.route(channel, Box::new(DiscordWebhook::new(url, timeout)?));
            }
        }

        if router.fallback.is_none() && router.channels.is_empty() {
            return Ok(None);
        }
        Ok(Some(router))
    }
}

#[async_trait]
impl NotifyBackend for NotifyRouter {
    async fn send(&self, message: &Message) -> anyhow::Result<()> {
        let backend = self
            .channels
            .get(&message.channel)
            .or(self.fallback.as_ref())
            .ok_or_else(|| anyhow::anyhow!("No webhook configured for channel '{}'", message.channel))?;
        backend.send(message).await
    }
}
