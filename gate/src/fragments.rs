//! Reassembles the destination host from the two fragments a gate returns.

use crate::errors::ConfigError;
use serde_json::{Map, Value};
use url::Url;

/// Recognized names for the first and second fragment, in priority order.
const FIRST_FIELDS: &[&str] = &["bat", "mark"];
const SECOND_FIELDS: &[&str] = &["man", "time"];

/// The POST fallback answers with exactly these two fields.
const POST_FIELDS: (&str, &str) = ("bat", "man");

fn non_empty(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

pub fn as_object(body: &[u8]) -> Result<Map<String, Value>, ConfigError> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(_) => Err(ConfigError::invalid("gate response is not a JSON object")),
        Err(e) => Err(ConfigError::invalid(format!("gate response is not JSON: {e}"))),
    }
}

/// Picks the two fragments from a GET response.
///
/// Known field names win. Otherwise the first two non-empty string values are
/// taken in lexicographic key order, so the result never depends on how the
/// object happened to be laid out.
pub fn select(fields: &Map<String, Value>) -> Result<(String, String), ConfigError> {
    let first = FIRST_FIELDS.iter().find_map(|k| non_empty(fields.get(*k)));
    let second = SECOND_FIELDS.iter().find_map(|k| non_empty(fields.get(*k)));

    if let (Some(first), Some(second)) = (first, second) {
        return Ok((first.to_string(), second.to_string()));
    }

    let mut keys: Vec<&String> = fields.keys().collect();
    keys.sort();

    let values: Vec<&str> = keys
        .into_iter()
        .filter_map(|k| non_empty(fields.get(k)))
        .take(2)
        .collect();

    match values[..] {
        [first, second] => Ok((first.to_string(), second.to_string())),
        _ => Err(ConfigError::invalid("gate response has fewer than two fragments")),
    }
}

/// The POST fallback has no heuristics: both fixed fields must be present.
pub fn select_fixed(fields: &Map<String, Value>) -> Result<(String, String), ConfigError> {
    let (first_key, second_key) = POST_FIELDS;
    match (non_empty(fields.get(first_key)), non_empty(fields.get(second_key))) {
        (Some(first), Some(second)) => Ok((first.to_string(), second.to_string())),
        _ => Err(ConfigError::invalid(format!(
            "gate response lacks `{first_key}` and `{second_key}`"
        ))),
    }
}

/// A fragment starting with `.` is the suffix. With exactly one suffix the
/// other part goes in front; otherwise the parts are joined in selection order.
pub fn reconcile(first: &str, second: &str) -> String {
    match (first.starts_with('.'), second.starts_with('.')) {
        (true, false) => format!("{second}{first}"),
        _ => format!("{first}{second}"),
    }
}

/// Drops one trailing `/`, adds `https://` unless a scheme is present, and
/// parses the result.
pub fn to_url(host: &str) -> Result<Url, ConfigError> {
    let host = host.strip_suffix('/').unwrap_or(host);
    let candidate = if host.starts_with("http") {
        host.to_string()
    } else {
        format!("https://{host}")
    };

    let url = Url::parse(&candidate)
        .map_err(|e| ConfigError::invalid(format!("`{candidate}` is not a URL: {e}")))?;

    if url.host_str().is_none() {
        return Err(ConfigError::invalid(format!("`{candidate}` has no host")));
    }
    Ok(url)
}

/// Full path from a GET response body to the destination URL.
pub fn url_from_response(body: &[u8]) -> Result<Url, ConfigError> {
    let fields = as_object(body)?;
    let (first, second) = select(&fields)?;
    to_url(&reconcile(&first, &second))
}

/// Full path from a POST response body to the destination URL.
pub fn url_from_fixed_response(body: &[u8]) -> Result<Url, ConfigError> {
    let fields = as_object(body)?;
    let (first, second) = select_fixed(&fields)?;
    to_url(&format!("{first}{second}"))
}
