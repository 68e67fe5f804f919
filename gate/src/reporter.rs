use crate::config::RemoteConfigSource;
use async_trait::async_trait;
use reqwest::Url;
use serde_json::{Value, json};
use std::time::Duration;

/// Session and launch events. Reporting is best-effort: failures are logged
/// and never reach the caller.
#[async_trait]
pub trait EventReporter: Send + Sync {
    async fn log_session(&self, uuid: &str, attribution_token: Option<&str>);
    async fn log_event(&self, uuid: &str, name: &str, payload: Option<Value>);
}

pub struct NoopReporter;

#[async_trait]
impl EventReporter for NoopReporter {
    async fn log_session(&self, _uuid: &str, _attribution_token: Option<&str>) {}

    async fn log_event(&self, _uuid: &str, _name: &str, _payload: Option<Value>) {}
}

/// Writes under `sessions/{uuid}` of the same Realtime Database that serves
/// the gate config. Timestamps are filled in server side.
pub struct RealtimeDatabaseReporter {
    client: reqwest::Client,
    base_url: String,
    auth: Option<String>,
    timeout: Duration,
}

impl RealtimeDatabaseReporter {
    pub fn new(source: &RemoteConfigSource, timeout: Duration) -> Self {
        RealtimeDatabaseReporter {
            client: reqwest::Client::new(),
            base_url: source.database_url.trim_end_matches('/').to_string(),
            auth: source.auth.clone(),
            timeout,
        }
    }

    fn url(&self, path: &str) -> Option<Url> {
        let mut url = match Url::parse(&format!("{}/{path}.json", self.base_url)) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(error = %e, path, "Cannot build event URL");
                return None;
            }
        };
        if let Some(ref auth) = self.auth {
            url.query_pairs_mut().append_pair("auth", auth);
        }
        Some(url)
    }

    async fn send(&self, request: reqwest::RequestBuilder, what: &str) {
        let result = request
            .timeout(self.timeout)
            .send()
            .await
            .and_then(|r| r.error_for_status());

        if let Err(e) = result {
            tracing::warn!(error = %e, what, "Failed to report");
        }
    }
}

fn server_timestamp() -> Value {
    json!({".sv": "timestamp"})
}

#[async_trait]
impl EventReporter for RealtimeDatabaseReporter {
    async fn log_session(&self, uuid: &str, attribution_token: Option<&str>) {
        let Some(url) = self.url(&format!("sessions/{uuid}")) else {
            return;
        };
        let body = json!({
            "uuid": uuid,
            "att_token": attribution_token.unwrap_or_default(),
            "timestamp": server_timestamp(),
        });
        self.send(self.client.put(url).json(&body), "session").await;
    }

    async fn log_event(&self, uuid: &str, name: &str, payload: Option<Value>) {
        let Some(url) = self.url(&format!("sessions/{uuid}/events")) else {
            return;
        };
        let mut body = json!({
            "event_name": name,
            "timestamp": server_timestamp(),
        });
        if let Some(payload) = payload {
            body["payload"] = payload;
        }
        // POST appends a child under a generated key
        self.send(self.client.post(url).json(&body), "event").await;
    }
}
