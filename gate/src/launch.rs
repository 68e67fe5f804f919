use crate::cache::ResultCache;
use crate::config::{GateConfig, ValidationError};
use crate::errors::ConfigError;
use crate::identity::{IdentityCollector, StaticIdentity};
use crate::metrics_defs::{CACHE_HIT, CACHE_MISS};
use crate::payload;
use crate::remote_config::{ConfigFetcher, RealtimeDatabaseFetcher};
use crate::reporter::{EventReporter, NoopReporter, RealtimeDatabaseReporter};
use crate::resolver::EndpointResolver;
use crate::session::SessionContext;
use crate::store::{self, KeyValueStore};
use crate::types::{DeviceInfo, ResolvedEndpoint};
use parking_lot::Mutex;
use serde_json::json;
use shared::counter;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use url::Url;

#[derive(Debug)]
pub enum LaunchOutcome {
    /// Destination from a previous launch; nothing was resolved.
    Cached(Url),
    Remote(ResolvedEndpoint),
    /// Resolution failed. The host shows its built-in offline experience.
    Offline(ConfigError),
}

impl LaunchOutcome {
    pub fn destination(&self) -> Option<&Url> {
        match self {
            LaunchOutcome::Cached(url) => Some(url),
            LaunchOutcome::Remote(endpoint) => Some(&endpoint.url),
            LaunchOutcome::Offline(_) => None,
        }
    }
}

/// Drives one cold start: cached destination first, otherwise the full
/// resolution pipeline.
pub struct LaunchController {
    session: Arc<SessionContext>,
    cache: ResultCache,
    fetcher: Arc<dyn ConfigFetcher>,
    collector: IdentityCollector,
    resolver: EndpointResolver,
    reporter: Arc<dyn EventReporter>,
    device: DeviceInfo,
    gate_scheme: String,
    pending_reports: Mutex<Vec<JoinHandle<()>>>,
}

impl LaunchController {
    pub fn new(
        config: &GateConfig,
        session: Arc<SessionContext>,
        store: Arc<dyn KeyValueStore>,
        fetcher: Arc<dyn ConfigFetcher>,
        collector: IdentityCollector,
        reporter: Arc<dyn EventReporter>,
    ) -> Self {
        let cache = ResultCache::new(store);
        let resolver =
            EndpointResolver::new(config.strategies.clone(), &config.timeouts, cache.clone());

        LaunchController {
            session,
            cache,
            fetcher,
            collector,
            resolver,
            reporter,
            device: config.device.clone(),
            gate_scheme: config.gate_scheme.clone(),
            pending_reports: Mutex::new(Vec::new()),
        }
    }

    /// Wires the production collaborators described by `config`.
    pub fn from_config(config: &GateConfig) -> Result<Self, ValidationError> {
        config.validate()?;

        let store = store::from_config(&config.store);
        let session = Arc::new(SessionContext::initialize(store.as_ref()));
        session.configure(
            session.installation_id(),
            config.identity.attribution_token.clone(),
        );
        if let Some(ref token) = config.identity.push_token {
            session.push_tokens().publish(token.clone());
        }

        let statics = Arc::new(StaticIdentity {
            attribution_uid: config.identity.attribution_uid.clone(),
            installation_id: config.identity.installation_id.clone(),
        });
        let collector = IdentityCollector::new(
            statics.clone(),
            statics,
            config.timeouts.push_token(),
            config.timeouts.installation_id(),
        );

        let fetcher = Arc::new(RealtimeDatabaseFetcher::new(
            &config.remote_config,
            config.timeouts.remote_config(),
        ));

        let reporter: Arc<dyn EventReporter> = if config.report_events {
            Arc::new(RealtimeDatabaseReporter::new(
                &config.remote_config,
                config.timeouts.remote_config(),
            ))
        } else {
            Arc::new(NoopReporter)
        };

        Ok(LaunchController::new(
            config, session, store, fetcher, collector, reporter,
        ))
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Reporting never delays the launch: session and outcome reports run
    /// in the background, see [`LaunchController::flush_reports`].
    pub async fn launch(&self) -> LaunchOutcome {
        let uuid = self.session.installation_id();
        let attribution_token = self.session.attribution_token();
        let reporter = self.reporter.clone();
        let session_uuid = uuid.clone();
        self.spawn_report(async move {
            reporter
                .log_session(&session_uuid, attribution_token.as_deref())
                .await;
        });

        if let Some(url) = self.cached() {
            counter!(CACHE_HIT).increment(1);
            tracing::info!(url = %url, "Using cached destination");
            return LaunchOutcome::Cached(url);
        }

        counter!(CACHE_MISS).increment(1);
        let outcome = match self.resolve().await {
            Ok(endpoint) => LaunchOutcome::Remote(endpoint),
            Err(e) => LaunchOutcome::Offline(e),
        };

        self.report(uuid, &outcome);
        outcome
    }

    /// One resolution attempt, bypassing the cache. The config fetch and the
    /// identity collection run concurrently; a config failure abandons the
    /// identity wait and the gate is never contacted.
    pub async fn resolve(&self) -> Result<ResolvedEndpoint, ConfigError> {
        let (config, identity) = tokio::try_join!(
            self.fetcher.fetch_base_config(),
            async { Ok::<_, ConfigError>(self.collector.collect(&self.session).await) },
        )?;

        let payload = payload::encode(&identity, &self.device);
        self.resolver
            .resolve(&config, &self.gate_scheme, &payload)
            .await
    }

    /// Waits for reports still in flight. Each one is bounded by the
    /// reporter's own request timeout.
    pub async fn flush_reports(&self) {
        let pending = std::mem::take(&mut *self.pending_reports.lock());
        for handle in pending {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Report task failed");
            }
        }
    }

    fn cached(&self) -> Option<Url> {
        match self.cache.load() {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read cached destination");
                None
            }
        }
    }

    // Cached launches only log the session.
    fn report(&self, uuid: String, outcome: &LaunchOutcome) {
        let (name, payload) = match outcome {
            LaunchOutcome::Cached(_) => return,
            LaunchOutcome::Remote(endpoint) => {
                ("open_webview", json!({"url": endpoint.url.as_str()}))
            }
            LaunchOutcome::Offline(e) => ("open_app_fallback", json!({"error": e.to_string()})),
        };

        let reporter = self.reporter.clone();
        self.spawn_report(async move {
            reporter.log_event(&uuid, name, Some(payload)).await;
        });
    }

    fn spawn_report<F>(&self, report: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut pending = self.pending_reports.lock();
        pending.retain(|handle| !handle.is_finished());
        pending.push(tokio::spawn(report));
    }
}
