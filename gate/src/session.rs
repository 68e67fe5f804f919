use crate::identity::PushTokenSlot;
use crate::store::KeyValueStore;
use crate::types::SessionIdentity;
use parking_lot::RwLock;
use uuid::Uuid;

pub const INSTALLATION_ID_KEY: &str = "udid";

/// Process-wide identity, constructed once by the launch sequence and passed
/// to everything that needs it.
pub struct SessionContext {
    identity: RwLock<SessionIdentity>,
    push_tokens: PushTokenSlot,
}

impl SessionContext {
    /// Loads the persisted installation id, or generates and persists a new
    /// one. Storage failures are logged and never fail initialization.
    pub fn initialize(store: &dyn KeyValueStore) -> Self {
        let installation_id = persisted_installation_id(store);

        SessionContext {
            identity: RwLock::new(SessionIdentity {
                installation_id,
                attribution_token: None,
                push_token: None,
            }),
            push_tokens: PushTokenSlot::default(),
        }
    }

    /// Records the session identity. A missing attribution token is normal:
    /// the provider may be unavailable on this platform or have failed.
    pub fn configure(&self, installation_id: String, attribution_token: Option<String>) {
        let attribution_token = attribution_token.filter(|t| !t.trim().is_empty());
        if attribution_token.is_none() {
            tracing::debug!("No attribution token for this session");
        }

        let mut identity = self.identity.write();
        identity.installation_id = installation_id;
        identity.attribution_token = attribution_token;
    }

    /// Snapshot including the push token as currently known.
    pub fn identity(&self) -> SessionIdentity {
        let mut identity = self.identity.read().clone();
        identity.push_token = self.push_tokens.current();
        identity
    }

    pub fn installation_id(&self) -> String {
        self.identity.read().installation_id.clone()
    }

    pub fn attribution_token(&self) -> Option<String> {
        self.identity.read().attribution_token.clone()
    }

    pub fn push_tokens(&self) -> &PushTokenSlot {
        &self.push_tokens
    }
}

fn persisted_installation_id(store: &dyn KeyValueStore) -> String {
    match store.load(INSTALLATION_ID_KEY) {
        Ok(Some(id)) if !id.is_empty() => return id,
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "Failed to load installation id, generating a new one"),
    }

    // Hyphenated lowercase is the canonical form
    let id = Uuid::new_v4().to_string();
    if let Err(e) = store.store(INSTALLATION_ID_KEY, &id) {
        tracing::warn!(error = %e, "Failed to persist installation id");
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StoreError;
    use crate::store::{FilesystemStore, MemoryStore};

    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn load(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(std::io::Error::other("disk gone").into())
        }

        fn store(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(std::io::Error::other("disk gone").into())
        }
    }

    #[test]
    fn test_installation_id_is_generated_once() {
        let store = MemoryStore::default();

        let first = SessionContext::initialize(&store);
        let id = first.installation_id();
        assert_eq!(id.len(), 36);
        assert_eq!(id, id.to_lowercase());
        assert!(Uuid::parse_str(&id).is_ok());
        assert_eq!(store.load(INSTALLATION_ID_KEY).unwrap(), Some(id.clone()));

        let second = SessionContext::initialize(&store);
        assert_eq!(second.installation_id(), id);
    }

    #[test]
    fn test_installation_id_survives_damaged_store_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("gate.json"), br#"{"udid": "abc"#).unwrap();
        let base_dir = dir.path().to_str().unwrap();

        let first = SessionContext::initialize(&FilesystemStore::new(base_dir, "gate.json"));
        let second = SessionContext::initialize(&FilesystemStore::new(base_dir, "gate.json"));
        assert_eq!(first.installation_id(), second.installation_id());
        assert!(Uuid::parse_str(&first.installation_id()).is_ok());
    }

    #[test]
    fn test_initialize_survives_storage_failure() {
        let session = SessionContext::initialize(&BrokenStore);
        assert!(Uuid::parse_str(&session.installation_id()).is_ok());
    }

    #[test]
    fn test_configure() {
        let session = SessionContext::initialize(&MemoryStore::default());

        session.configure("abc".into(), None);
        assert_eq!(session.installation_id(), "abc");
        assert_eq!(session.attribution_token(), None);

        session.configure("abc".into(), Some("  ".into()));
        assert_eq!(session.attribution_token(), None);

        session.configure("abc".into(), Some("att".into()));
        session.push_tokens().publish("fcm");
        assert_eq!(
            session.identity(),
            SessionIdentity {
                installation_id: "abc".into(),
                attribution_token: Some("att".into()),
                push_token: Some("fcm".into()),
            }
        );
    }
}
