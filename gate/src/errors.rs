use thiserror::Error;

/// Terminal failure of a resolution attempt.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("gate config record is missing")]
    Missing,

    #[error("invalid gate config: {0}")]
    Invalid(String),

    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("request timed out")]
    Timeout,
}

impl ConfigError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        ConfigError::Invalid(reason.into())
    }

    /// Transport failures let the resolver move on to the next strategy.
    /// Everything else ends the attempt.
    pub fn is_transport(&self) -> bool {
        matches!(self, ConfigError::Network(_) | ConfigError::Timeout)
    }
}

impl From<reqwest::Error> for ConfigError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ConfigError::Timeout
        } else if err.is_decode() {
            ConfigError::Invalid(format!("undecodable response body: {err}"))
        } else {
            ConfigError::Network(err)
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
