use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use killboard_client::KillboardClient;
use killboard_common::{EventKey, Stream};

/// Read side of the killboard backend.
///
/// Returns raw records so callers can tell malformed records apart from
/// transport failures. Implementations may ignore `since` and return older
/// records too; callers always filter against their own cursor.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn fetch(&self, stream: Stream, since: Option<&EventKey>) -> Result<Vec<Value>>;
}

#[async_trait]
impl EventSource for KillboardClient {
    async fn fetch(&self, stream: Stream, since: Option<&EventKey>) -> Result<Vec<Value>> {
        Ok(self.fetch_raw(stream, since).await?)
    }
}
