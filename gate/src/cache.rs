use crate::errors::StoreError;
use crate::store::KeyValueStore;
use std::sync::Arc;
use url::Url;

pub const FINAL_URL_KEY: &str = "final_url_cache";

/// Last resolved destination. A cached URL is reused as-is on every later
/// launch; nothing expires or invalidates it.
#[derive(Clone)]
pub struct ResultCache {
    store: Arc<dyn KeyValueStore>,
}

impl ResultCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        ResultCache { store }
    }

    /// Unconditionally replaces any previous value.
    pub fn store(&self, url: &Url) -> Result<(), StoreError> {
        self.store.store(FINAL_URL_KEY, &persisted_form(url))
    }

    pub fn load(&self) -> Result<Option<Url>, StoreError> {
        let Some(raw) = self.store.load(FINAL_URL_KEY)? else {
            return Ok(None);
        };

        match Url::parse(&raw) {
            Ok(url) => Ok(Some(url)),
            Err(e) => {
                tracing::warn!(error = %e, value = %raw, "Ignoring unparseable cached URL");
                Ok(None)
            }
        }
    }
}

/// `Url` always serializes an empty path as `/`. A bare origin is stored
/// without it, as the destination was assembled.
fn persisted_form(url: &Url) -> String {
    let raw = url.as_str();
    if url.path() == "/" && url.query().is_none() && url.fragment().is_none() {
        if let Some(origin) = raw.strip_suffix('/') {
            return origin.to_string();
        }
    }
    raw.to_string()
}
