use crate::types::{CollectedIdentity, DeviceInfo};
use base64::{Engine as _, engine::general_purpose::STANDARD};

/// The reporting attributes sent to the gate, in wire order. Absent values are
/// sent as empty strings and never omitted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportingPayload {
    pairs: [(&'static str, String); 8],
}

impl ReportingPayload {
    pub fn new(identity: &CollectedIdentity, device: &DeviceInfo) -> Self {
        let value = |v: &Option<String>| v.clone().unwrap_or_default();

        ReportingPayload {
            pairs: [
                ("appsflyer_id", value(&identity.attribution_uid)),
                ("app_instance_id", value(&identity.app_instance_id)),
                ("uid", identity.session_id.clone()),
                ("osVersion", device.os_version.clone()),
                ("devModel", device.device_model.clone()),
                ("bundle", device.bundle_id.clone()),
                ("fcm_token", value(&identity.push_token)),
                ("att_token", value(&identity.attribution_token)),
            ],
        }
    }

    pub fn pairs(&self) -> &[(&'static str, String)] {
        &self.pairs
    }

    /// `key=value` pairs joined by `&`. Values are not escaped.
    pub fn query_string(&self) -> String {
        self.pairs
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&")
    }

    pub fn encode(&self) -> String {
        STANDARD.encode(self.query_string().as_bytes())
    }
}

pub fn encode(identity: &CollectedIdentity, device: &DeviceInfo) -> String {
    ReportingPayload::new(identity, device).encode()
}
