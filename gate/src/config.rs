use crate::types::{DeviceInfo, Strategy};
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("at least one resolution strategy is required")]
    NoStrategies,

    #[error("duplicate resolution strategy: {0:?}")]
    DuplicateStrategy(Strategy),

    #[error("POST timeout ({post}s) must not be shorter than GET timeout ({get}s)")]
    PostTimeoutTooShort { get: u64, post: u64 },

    #[error("invalid remote config database URL: {0}")]
    InvalidDatabaseUrl(String),

    #[error("unsupported gate scheme: {0}")]
    InvalidScheme(String),
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "type")]
pub enum StoreConfig {
    Filesystem { base_dir: String, filename: String },
    Memory,
}

/// Location of the remote key-value store holding the gate fragments.
#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct RemoteConfigSource {
    pub database_url: String,
    #[serde(default)]
    pub auth: Option<String>,
}

/// Identity values known up front, typically supplied by the host's SDKs.
#[derive(Clone, Deserialize, Debug, Default, PartialEq)]
pub struct IdentityConfig {
    pub attribution_uid: Option<String>,
    pub installation_id: Option<String>,
    pub attribution_token: Option<String>,
    pub push_token: Option<String>,
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct Timeouts {
    pub remote_config_secs: u64,
    /// Upper bound on waiting for the push token before encoding the payload.
    pub push_token_secs: u64,
    pub installation_id_secs: u64,
    pub get_secs: u64,
    /// The POST fallback is allowed more time than the primary GET.
    pub post_secs: u64,
    /// Independent fuse around the whole redirect capture.
    pub redirect_fuse_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            remote_config_secs: 10,
            push_token_secs: 5,
            installation_id_secs: 5,
            get_secs: 10,
            post_secs: 20,
            redirect_fuse_secs: 10,
        }
    }
}

impl Timeouts {
    pub fn remote_config(&self) -> Duration {
        Duration::from_secs(self.remote_config_secs)
    }

    pub fn push_token(&self) -> Duration {
        Duration::from_secs(self.push_token_secs)
    }

    pub fn installation_id(&self) -> Duration {
        Duration::from_secs(self.installation_id_secs)
    }

    pub fn get(&self) -> Duration {
        Duration::from_secs(self.get_secs)
    }

    pub fn post(&self) -> Duration {
        Duration::from_secs(self.post_secs)
    }

    pub fn redirect_fuse(&self) -> Duration {
        Duration::from_secs(self.redirect_fuse_secs)
    }
}

fn default_scheme() -> String {
    "https".into()
}

fn default_strategies() -> Vec<Strategy> {
    vec![
        Strategy::PrimaryGet,
        Strategy::PostFallback,
        Strategy::RedirectResolve,
    ]
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct GateConfig {
    pub remote_config: RemoteConfigSource,
    /// Scheme used to build the gate base endpoint from the remote fragments.
    #[serde(default = "default_scheme")]
    pub gate_scheme: String,
    #[serde(default)]
    pub device: DeviceInfo,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub timeouts: Timeouts,
    /// Tried in order; a transport failure moves on to the next entry.
    #[serde(default = "default_strategies")]
    pub strategies: Vec<Strategy>,
    pub store: StoreConfig,
    #[serde(default = "default_true")]
    pub report_events: bool,
}

impl GateConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.strategies.is_empty() {
            return Err(ValidationError::NoStrategies);
        }

        let mut seen = HashSet::new();
        for strategy in &self.strategies {
            if !seen.insert(strategy) {
                return Err(ValidationError::DuplicateStrategy(*strategy));
            }
        }

        if self.timeouts.post_secs < self.timeouts.get_secs {
            return Err(ValidationError::PostTimeoutTooShort {
                get: self.timeouts.get_secs,
                post: self.timeouts.post_secs,
            });
        }

        Url::parse(&self.remote_config.database_url)
            .map_err(|e| ValidationError::InvalidDatabaseUrl(e.to_string()))?;

        if !matches!(self.gate_scheme.as_str(), "http" | "https") {
            return Err(ValidationError::InvalidScheme(self.gate_scheme.clone()));
        }

        Ok(())
    }
}
