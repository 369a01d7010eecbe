use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use super::backend::NotifyBackend;
use crate::types::Message;

// Discord embed limits.
const MAX_TITLE: usize = 256;
const MAX_DESCRIPTION: usize = 4096;
const MAX_FIELDS: usize = 25;
const MAX_FIELD_NAME: usize = 256;
const MAX_FIELD_VALUE: usize = 1024;

/// Discord incoming webhook notification backend. Each message becomes a
/// single embed.
pub struct DiscordWebhook {
    webhook_url: String,
    http: reqwest::Client,
}

impl DiscordWebhook {
    pub fn new(webhook_url: String, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            webhook_url,
            http: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    /// Build the webhook body for `message`.
    pub fn payload(message: &Message) -> Value {
        let fields: Vec<Value> = message
            .fields
            .iter()
            .take(MAX_FIELDS)
            .map(|f| {
                // Discord rejects empty field values.
                let value = if f.value.is_empty() {
                    "-".to_string()
                } else {
                    truncate(&f.value, MAX_FIELD_VALUE)
                };
                json!({
                    "name": truncate(&f.name, MAX_FIELD_NAME),
                    "value": value,
                    "inline": f.inline,
                })
            })
            .collect();

        let mut embed = json!({
            "title": truncate(&message.title, MAX_TITLE),
            "fields": fields,
        });

        if let Some(description) = &message.description {
            embed["description"] = json!(truncate(description, MAX_DESCRIPTION));
        }
        if let Some(url) = &message.url {
            embed["url"] = json!(url);
        }
        if let Some(color) = message.color {
            embed["color"] = json!(color);
        }
        if let Some(image) = &message.image_url {
            embed["image"] = json!({ "url": image });
        }

        json!({
            "embeds": [embed],
            "allowed_mentions": { "parse": [] },
        })
    }

    async fn post(&self, payload: Value) -> anyhow::Result<()> {
        let resp = self
            .http
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Discord webhook returned non-success");
            anyhow::bail!("Discord webhook returned {status}");
        }

        Ok(())
    }
}

#[async_trait]
impl NotifyBackend for DiscordWebhook {
    async fn send(&self, message: &Message) -> anyhow::Result<()> {
        self.post(Self::payload(message)).await
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars - 1).collect();
    out.push('…');
    out
}
