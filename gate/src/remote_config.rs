use crate::config::RemoteConfigSource;
use crate::errors::ConfigError;
use crate::types::RemoteGateConfig;
use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;
use std::time::Duration;

/// Fixed path of the gate record in the remote store.
const CONFIG_PATH: &str = "config";
const HOST_FIELD: &str = "stray";
const PATH_FIELD: &str = "swap";

#[async_trait]
pub trait ConfigFetcher: Send + Sync {
    /// A single read of the gate record. No retry.
    async fn fetch_base_config(&self) -> Result<RemoteGateConfig, ConfigError>;
}

/// Reads the gate record through the REST interface of a Firebase Realtime
/// Database: `GET {database_url}/config.json`.
pub struct RealtimeDatabaseFetcher {
    client: reqwest::Client,
    full_url: String,
    auth: Option<String>,
    timeout: Duration,
}

impl RealtimeDatabaseFetcher {
    pub fn new(source: &RemoteConfigSource, timeout: Duration) -> Self {
        let full_url = format!(
            "{}/{}.json",
            source.database_url.trim_end_matches('/'),
            CONFIG_PATH
        );

        RealtimeDatabaseFetcher {
            client: reqwest::Client::new(),
            full_url,
            auth: source.auth.clone(),
            timeout,
        }
    }
}

#[async_trait]
impl ConfigFetcher for RealtimeDatabaseFetcher {
    async fn fetch_base_config(&self) -> Result<RemoteGateConfig, ConfigError> {
        let mut url = Url::parse(&self.full_url)
            .map_err(|e| ConfigError::invalid(format!("bad database URL: {e}")))?;

        if let Some(ref auth) = self.auth {
            url.query_pairs_mut().append_pair("auth", auth);
        }

        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?;

        let record = response.json::<Value>().await?;
        parse_record(record)
    }
}

/// Serves a fixed record, or reports it missing.
pub struct StaticConfigFetcher {
    config: Option<RemoteGateConfig>,
}

impl StaticConfigFetcher {
    pub fn new(config: Option<RemoteGateConfig>) -> Self {
        StaticConfigFetcher { config }
    }
}

#[async_trait]
impl ConfigFetcher for StaticConfigFetcher {
    async fn fetch_base_config(&self) -> Result<RemoteGateConfig, ConfigError> {
        self.config.clone().ok_or(ConfigError::Missing)
    }
}

fn parse_record(record: Value) -> Result<RemoteGateConfig, ConfigError> {
    let fields = match record {
        Value::Null => return Err(ConfigError::Missing),
        Value::Object(fields) => fields,
        _ => return Err(ConfigError::invalid("config record is not an object")),
    };

    let host = fields
        .get(HOST_FIELD)
        .and_then(Value::as_str)
        .ok_or_else(|| ConfigError::invalid(format!("`{HOST_FIELD}` is absent or not a string")))?;
    let path = fields
        .get(PATH_FIELD)
        .and_then(Value::as_str)
        .ok_or_else(|| ConfigError::invalid(format!("`{PATH_FIELD}` is absent or not a string")))?;

    if host.trim().is_empty() {
        return Err(ConfigError::invalid("host fragment is blank"));
    }

    Ok(RemoteGateConfig::new(host, path))
}
