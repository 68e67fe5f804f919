use crate::session::SessionContext;
use crate::types::CollectedIdentity;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Single shared slot for the push token. Every pending waiter is released
/// together when a token is published; each waiter also carries its own
/// timeout.
pub struct PushTokenSlot {
    tx: watch::Sender<Option<String>>,
}

impl Default for PushTokenSlot {
    fn default() -> Self {
        let (tx, _rx) = watch::channel(None);
        PushTokenSlot { tx }
    }
}

impl PushTokenSlot {
    pub fn publish(&self, token: impl Into<String>) {
        let token = token.into();
        if token.trim().is_empty() {
            tracing::debug!("Ignoring blank push token");
            return;
        }
        // send_replace succeeds even while nobody is waiting
        self.tx.send_replace(Some(token));
    }

    pub fn current(&self) -> Option<String> {
        self.tx.borrow().clone()
    }

    /// Returns the token as soon as it is known, or whatever is available once
    /// `timeout` elapses. Never waits longer than `timeout`.
    pub async fn wait(&self, timeout: Duration) -> Option<String> {
        let mut rx = self.tx.subscribe();

        match tokio::time::timeout(timeout, rx.wait_for(Option::is_some)).await {
            Ok(Ok(token)) => token.as_ref().cloned(),
            Ok(Err(_closed)) => None,
            Err(_elapsed) => {
                tracing::debug!(?timeout, "Push token wait timed out");
                self.current()
            }
        }
    }
}

#[async_trait]
pub trait InstallationIdProvider: Send + Sync {
    /// Identifier assigned by the installation backend, if it can be obtained.
    async fn installation_id(&self) -> Option<String>;
}

pub trait AttributionProvider: Send + Sync {
    fn attribution_uid(&self) -> Option<String>;
}

/// Identity values known ahead of time.
#[derive(Clone, Debug, Default)]
pub struct StaticIdentity {
    pub attribution_uid: Option<String>,
    pub installation_id: Option<String>,
}

#[async_trait]
impl InstallationIdProvider for StaticIdentity {
    async fn installation_id(&self) -> Option<String> {
        self.installation_id.clone()
    }
}

impl AttributionProvider for StaticIdentity {
    fn attribution_uid(&self) -> Option<String> {
        self.attribution_uid.clone()
    }
}

pub struct IdentityCollector {
    installations: Arc<dyn InstallationIdProvider>,
    attribution: Arc<dyn AttributionProvider>,
    push_token_timeout: Duration,
    installation_id_timeout: Duration,
}

impl IdentityCollector {
    pub fn new(
        installations: Arc<dyn InstallationIdProvider>,
        attribution: Arc<dyn AttributionProvider>,
        push_token_timeout: Duration,
        installation_id_timeout: Duration,
    ) -> Self {
        IdentityCollector {
            installations,
            attribution,
            push_token_timeout,
            installation_id_timeout,
        }
    }

    /// Gathers the reporting identifiers. The push token wait and the
    /// installation id fetch run concurrently and are both bounded, so this
    /// never fails; unavailable values are left as `None`.
    pub async fn collect(&self, session: &SessionContext) -> CollectedIdentity {
        let (push_token, app_instance_id) = tokio::join!(
            session.push_tokens().wait(self.push_token_timeout),
            self.fetch_installation_id(),
        );

        CollectedIdentity {
            attribution_uid: self.attribution.attribution_uid(),
            app_instance_id,
            session_id: session.installation_id(),
            push_token,
            attribution_token: session.attribution_token(),
        }
    }

    async fn fetch_installation_id(&self) -> Option<String> {
        match tokio::time::timeout(
            self.installation_id_timeout,
            self.installations.installation_id(),
        )
        .await
        {
            Ok(id) => id,
            Err(_elapsed) => {
                tracing::warn!("Installation id fetch timed out");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_wait_returns_known_token_immediately() {
        let slot = PushTokenSlot::default();
        slot.publish("fcm-token");

        let start = Instant::now();
        assert_eq!(
            slot.wait(Duration::from_secs(5)).await,
            Some("fcm-token".into())
        );
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_with_none() {
        let slot = PushTokenSlot::default();

        let start = Instant::now();
        assert_eq!(slot.wait(Duration::from_secs(5)).await, None);
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiters_released_together() {
        let slot = Arc::new(PushTokenSlot::default());
        let start = Instant::now();

        let mut waiters = Vec::new();
        for _ in 0..3 {
            let slot = slot.clone();
            waiters.push(tokio::spawn(async move {
                let token = slot.wait(Duration::from_secs(60)).await;
                (token, start.elapsed())
            }));
        }

        tokio::time::sleep(Duration::from_secs(1)).await;
        slot.publish("late-token");

        for waiter in waiters {
            let (token, elapsed) = waiter.await.unwrap();
            assert_eq!(token, Some("late-token".into()));
            assert_eq!(elapsed, Duration::from_secs(1));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_token_does_not_release_waiters() {
        let slot = PushTokenSlot::default();
        slot.publish("   ");
        assert_eq!(slot.current(), None);
        assert_eq!(slot.wait(Duration::from_millis(10)).await, None);
    }

    struct SlowInstallations;

    #[async_trait]
    impl InstallationIdProvider for SlowInstallations {
        async fn installation_id(&self) -> Option<String> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Some("too-late".into())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_collect_degrades_missing_fields() {
        let session = SessionContext::initialize(&MemoryStore::default());
        session.configure("session-id".into(), None);

        let statics = Arc::new(StaticIdentity::default());
        let collector = IdentityCollector::new(
            Arc::new(SlowInstallations),
            statics,
            Duration::from_secs(5),
            Duration::from_secs(5),
        );

        let start = Instant::now();
        let identity = collector.collect(&session).await;
        // Both bounded waits run concurrently
        assert_eq!(start.elapsed(), Duration::from_secs(5));
        assert_eq!(
            identity,
            CollectedIdentity {
                attribution_uid: None,
                app_instance_id: None,
                session_id: "session-id".into(),
                push_token: None,
                attribution_token: None,
            }
        );
    }

    #[tokio::test]
    async fn test_collect_all_fields() {
        let session = SessionContext::initialize(&MemoryStore::default());
        session.configure("session-id".into(), Some("att".into()));
        session.push_tokens().publish("fcm");

        let statics = Arc::new(StaticIdentity {
            attribution_uid: Some("af-uid".into()),
            installation_id: Some("fid".into()),
        });
        let collector = IdentityCollector::new(
            statics.clone(),
            statics,
            Duration::from_secs(5),
            Duration::from_secs(5),
        );

        let identity = collector.collect(&session).await;
        assert_eq!(identity.attribution_uid.as_deref(), Some("af-uid"));
        assert_eq!(identity.app_instance_id.as_deref(), Some("fid"));
        assert_eq!(identity.push_token.as_deref(), Some("fcm"));
        assert_eq!(identity.attribution_token.as_deref(), Some("att"));
    }
}
