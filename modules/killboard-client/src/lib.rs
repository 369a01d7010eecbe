pub mod error;
pub mod types;

pub use error::{ClientError, Result};
pub use types::NewKill;

use std::time::Duration;

use chrono::Utc;
use killboard_common::{EventKey, EventKind};
use serde_json::Value;

/// REST client for the killboard backend.
///
/// The backend exposes append-only `kills` and `deaths` feeds. Range
/// queries are optional on the server side: callers must still filter what
/// comes back against their own cursor.
pub struct KillboardClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl KillboardClient {
    /// Every request made through this client is bounded by `timeout`.
    pub fn new(base_url: &str, api_key: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn feed_url(&self, kind: EventKind) -> String {
        format!("{}/{}", self.base_url, kind.path())
    }

    /// Fetch raw feed records strictly after `since`, or the whole feed when
    /// `since` is `None`. Records are returned unparsed so the caller can
    /// decide what to do with malformed ones.
    pub async fn fetch_raw(&self, kind: EventKind, since: Option<&EventKey>) -> Result<Vec<Value>> {
        let mut request = self.client.get(self.feed_url(kind)).bearer_auth(&self.api_key);
        if let Some(key) = since {
            let (name, value) = key.query_param();
            request = request.query(&[(name, value)]);
        }

        let resp = ensure_success(request.send().await?).await?;
        let body: Value = resp.json().await?;
        let records = records_from_body(kind, body)?;
        tracing::debug!(stream = %kind, count = records.len(), since = ?since, "Fetched feed");
        Ok(records)
    }

    /// Submit a kill. `time` defaults to now (UTC) when unset.
    pub async fn report_kill(&self, kill: &NewKill) -> Result<Value> {
        let url = format!("{}/reportKill", self.base_url);
        let payload = kill.stamped(Utc::now());
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;
        let resp = ensure_success(resp).await?;

        tracing::info!(player = %payload.player, victim = %payload.victim, "Kill reported");
        Ok(resp.json().await?)
    }
}

/// Map a non-2xx response to `ClientError::Api`, carrying the body text.
async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}

/// Accept either a bare array or an object wrapping one under `data` or the
/// stream's own name.
fn records_from_body(kind: EventKind, body: Value) -> Result<Vec<Value>> {
    match body {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("data").or_else(|| map.remove(kind.path())) {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(ClientError::Parse(format!(
                "expected an array of {} records",
                kind.path()
            ))),
        },
        Value::Null => Ok(Vec::new()),
        other => Err(ClientError::Parse(format!(
            "expected an array of {} records, got {}",
            kind.path(),
            other
        ))),
    }
}
