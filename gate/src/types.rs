use serde::Deserialize;
use std::time::SystemTime;
use url::Url;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionIdentity {
    /// Lowercase UUID v4, generated once per install.
    pub installation_id: String,
    pub attribution_token: Option<String>,
    pub push_token: Option<String>,
}

/// Host and path fragments read from the remote key-value store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteGateConfig {
    pub host_fragment: String,
    pub path_fragment: String,
}

impl RemoteGateConfig {
    pub fn new<H, P>(host: H, path: P) -> Self
    where
        H: AsRef<str>,
        P: AsRef<str>,
    {
        let host = host.as_ref().trim();
        let path = path.as_ref();
        let path_fragment = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };

        RemoteGateConfig {
            host_fragment: host.to_string(),
            path_fragment,
        }
    }

    pub fn base_endpoint(&self, scheme: &str) -> String {
        format!("{scheme}://{}{}", self.host_fragment, self.path_fragment)
    }
}

/// Static facts about the host device.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct DeviceInfo {
    #[serde(default)]
    pub device_model: String,
    #[serde(default)]
    pub bundle_id: String,
    #[serde(default)]
    pub os_version: String,
}

/// Everything the identity collector could gather for one launch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CollectedIdentity {
    pub attribution_uid: Option<String>,
    pub app_instance_id: Option<String>,
    pub session_id: String,
    pub push_token: Option<String>,
    pub attribution_token: Option<String>,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    PrimaryGet,
    PostFallback,
    RedirectResolve,
}

impl Strategy {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Strategy::PrimaryGet => "primary_get",
            Strategy::PostFallback => "post_fallback",
            Strategy::RedirectResolve => "redirect_resolve",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedEndpoint {
    pub url: Url,
    pub resolved_at: SystemTime,
    pub strategy: Strategy,
}
