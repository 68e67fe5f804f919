use crate::cache::ResultCache;
use crate::config::Timeouts;
use crate::errors::ConfigError;
use crate::fragments;
use crate::metrics_defs::{RESOLVE_DURATION, RESOLVE_FAILURE, RESOLVE_SUCCESS, STRATEGY_ESCALATED};
use crate::redirect::RedirectResolver;
use crate::types::{RemoteGateConfig, ResolvedEndpoint, Strategy};
use shared::{counter, histogram};
use std::time::{Duration, Instant, SystemTime};
use url::Url;

/// Turns the gate base endpoint and an encoded payload into the final
/// destination by trying each configured strategy in order.
///
/// Only transport failures (network errors, timeouts, error statuses) move on
/// to the next strategy. A response that arrives but cannot be turned into a
/// URL ends the attempt. A successful result is written to the cache before it
/// is returned.
pub struct EndpointResolver {
    client: reqwest::Client,
    strategies: Vec<Strategy>,
    get_timeout: Duration,
    post_timeout: Duration,
    redirects: RedirectResolver,
    cache: ResultCache,
}

impl EndpointResolver {
    pub fn new(strategies: Vec<Strategy>, timeouts: &Timeouts, cache: ResultCache) -> Self {
        EndpointResolver {
            client: reqwest::Client::new(),
            strategies,
            get_timeout: timeouts.get(),
            post_timeout: timeouts.post(),
            redirects: RedirectResolver::new(timeouts.redirect_fuse()),
            cache,
        }
    }

    pub async fn resolve(
        &self,
        config: &RemoteGateConfig,
        scheme: &str,
        payload: &str,
    ) -> Result<ResolvedEndpoint, ConfigError> {
        let base = Url::parse(&config.base_endpoint(scheme))
            .map_err(|e| ConfigError::invalid(format!("bad gate endpoint: {e}")))?;

        let started = Instant::now();
        let result = self.run_strategies(&base, payload).await;
        histogram!(RESOLVE_DURATION).record(started.elapsed().as_secs_f64());

        match result {
            Ok((url, strategy)) => {
                counter!(RESOLVE_SUCCESS, "strategy" => strategy.as_str()).increment(1);
                if let Err(e) = self.cache.store(&url) {
                    tracing::error!(error = %e, "Failed to cache resolved URL");
                }
                tracing::info!(url = %url, strategy = strategy.as_str(), "Resolved gate endpoint");

                Ok(ResolvedEndpoint {
                    url,
                    resolved_at: SystemTime::now(),
                    strategy,
                })
            }
            Err(e) => {
                counter!(RESOLVE_FAILURE).increment(1);
                tracing::warn!(error = %e, "Gate resolution failed");
                Err(e)
            }
        }
    }

    async fn run_strategies(
        &self,
        base: &Url,
        payload: &str,
    ) -> Result<(Url, Strategy), ConfigError> {
        let mut last_error = None;

        for strategy in &self.strategies {
            tracing::debug!(strategy = strategy.as_str(), "Trying gate strategy");

            match self.attempt(*strategy, base, payload).await {
                Ok(url) => return Ok((url, *strategy)),
                Err(e) if e.is_transport() => {
                    tracing::warn!(error = %e, strategy = strategy.as_str(), "Gate strategy failed, escalating");
                    counter!(STRATEGY_ESCALATED, "strategy" => strategy.as_str()).increment(1);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| ConfigError::invalid("no resolution strategies configured")))
    }

    async fn attempt(
        &self,
        strategy: Strategy,
        base: &Url,
        payload: &str,
    ) -> Result<Url, ConfigError> {
        match strategy {
            Strategy::PrimaryGet => self.primary_get(base, payload).await,
            Strategy::PostFallback => self.post_fallback(base, payload).await,
            Strategy::RedirectResolve => self.redirects.resolve(with_payload(base, payload)).await,
        }
    }

    async fn primary_get(&self, base: &Url, payload: &str) -> Result<Url, ConfigError> {
        let response = self
            .client
            .get(with_payload(base, payload))
            .timeout(self.get_timeout)
            .send()
            .await?
            .error_for_status()?;

        let body = response.bytes().await?;
        fragments::url_from_response(&body)
    }

    async fn post_fallback(&self, base: &Url, payload: &str) -> Result<Url, ConfigError> {
        let response = self
            .client
            .post(base.clone())
            .timeout(self.post_timeout)
            .form(&[("data", payload)])
            .send()
            .await?
            .error_for_status()?;

        let body = response.bytes().await?;
        fragments::url_from_fixed_response(&body)
    }
}

/// `{base}?data=<payload>`, with the payload percent-encoded.
fn with_payload(base: &Url, payload: &str) -> Url {
    let mut url = base.clone();
    url.query_pairs_mut().append_pair("data", payload);
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::testutils::{TestServer, spawn_json_server, spawn_server};
    use http::{Method, StatusCode, header};
    use serde_json::json;
    use shared::http::{make_redirect_response, make_response};
    use std::sync::Arc;

    fn gate_config(server: &TestServer) -> RemoteGateConfig {
        RemoteGateConfig::new(server.addr.to_string(), "gate")
    }

    fn make_resolver(strategies: Vec<Strategy>) -> (EndpointResolver, ResultCache) {
        let cache = ResultCache::new(Arc::new(MemoryStore::default()));
        let timeouts = Timeouts {
            get_secs: 2,
            post_secs: 4,
            redirect_fuse_secs: 2,
            ..Default::default()
        };
        (EndpointResolver::new(strategies, &timeouts, cache.clone()), cache)
    }

    fn all_strategies() -> Vec<Strategy> {
        vec![
            Strategy::PrimaryGet,
            Strategy::PostFallback,
            Strategy::RedirectResolve,
        ]
    }

    #[test]
    fn test_payload_is_percent_encoded() {
        let base = Url::parse("https://gate.example.com/start").unwrap();
        let url = with_payload(&base, "YT1i+Yz0/==");
        assert_eq!(
            url.as_str(),
            "https://gate.example.com/start?data=YT1i%2BYz0%2F%3D%3D"
        );
        assert_eq!(url.query_pairs().next().unwrap().1, "YT1i+Yz0/==");
    }

    #[tokio::test]
    async fn test_primary_get_resolves_and_caches() {
        for body in [json!({"bat": "a", "man": ".b"}), json!({"bat": ".b", "man": "a"})] {
            let server = spawn_json_server(body).await;
            let (resolver, cache) = make_resolver(all_strategies());

            let endpoint = resolver
                .resolve(&gate_config(&server), "http", "cGF5bG9hZA==")
                .await
                .unwrap();
            assert_eq!(endpoint.url, Url::parse("https://a.b").unwrap());
            assert_eq!(endpoint.strategy, Strategy::PrimaryGet);
            assert_eq!(cache.load().unwrap(), Some(endpoint.url));

            let requests = server.requests();
            assert_eq!(requests.len(), 1);
            assert_eq!(requests[0].method, Method::GET);
            assert_eq!(requests[0].uri.path(), "/gate");
            assert_eq!(requests[0].uri.query(), Some("data=cGF5bG9hZA%3D%3D"));
        }
    }

    #[tokio::test]
    async fn test_resolution_is_idempotent() {
        let server = spawn_json_server(json!({"mark": "shop", "time": ".example.com/"})).await;
        let (resolver, cache) = make_resolver(all_strategies());
        let config = gate_config(&server);

        let first = resolver.resolve(&config, "http", "p").await.unwrap();
        let cached_first = cache.load().unwrap();
        let second = resolver.resolve(&config, "http", "p").await.unwrap();

        assert_eq!(first.url, second.url);
        assert_eq!(cached_first, cache.load().unwrap());
        assert_eq!(first.url.as_str(), "https://shop.example.com/");
    }

    #[tokio::test]
    async fn test_parse_mismatch_is_terminal() {
        let server = spawn_json_server(json!({"only": "one"})).await;
        let (resolver, cache) = make_resolver(all_strategies());

        let err = resolver
            .resolve(&gate_config(&server), "http", "p")
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        // No POST fallback after a parse mismatch
        assert_eq!(server.requests().len(), 1);
        assert_eq!(cache.load().unwrap(), None);
    }

    #[tokio::test]
    async fn test_post_fallback_after_transport_failure() {
        let server = spawn_server(|req| async move {
            if req.method == Method::GET {
                return make_response(StatusCode::BAD_GATEWAY, "");
            }
            make_response(
                StatusCode::OK,
                json!({"bat": "shop", "man": ".example.com"}).to_string(),
            )
        })
        .await;
        let (resolver, cache) = make_resolver(all_strategies());

        let endpoint = resolver
            .resolve(&gate_config(&server), "http", "cGF5bG9hZA==")
            .await
            .unwrap();
        assert_eq!(endpoint.strategy, Strategy::PostFallback);
        assert_eq!(endpoint.url.as_str(), "https://shop.example.com/");
        assert_eq!(cache.load().unwrap(), Some(endpoint.url));

        let requests = server.requests();
        assert_eq!(requests.len(), 2);
        let post = &requests[1];
        assert_eq!(post.method, Method::POST);
        assert_eq!(post.uri.path(), "/gate");
        assert_eq!(
            post.headers.get(header::CONTENT_TYPE).unwrap(),
            "application/x-www-form-urlencoded"
        );
        assert_eq!(post.body.as_ref(), b"data=cGF5bG9hZA%3D%3D");
    }

    #[tokio::test]
    async fn test_redirect_resolve_after_get_and_post_fail() {
        let server = spawn_server(|req| async move {
            match (req.method.clone(), req.uri.path()) {
                (Method::POST, _) => make_response(StatusCode::SERVICE_UNAVAILABLE, ""),
                (Method::GET, "/gate") => make_redirect_response("/landing").unwrap(),
                (Method::GET, "/landing") => make_response(StatusCode::OK, "<html></html>"),
                _ => make_response(StatusCode::NOT_FOUND, ""),
            }
        })
        .await;

        // A primary GET would follow the redirect itself and fail to parse the
        // landing page, so start from the POST fallback.
        let (resolver, cache) = make_resolver(vec![Strategy::PostFallback, Strategy::RedirectResolve]);

        let endpoint = resolver
            .resolve(&gate_config(&server), "http", "p")
            .await
            .unwrap();
        assert_eq!(endpoint.strategy, Strategy::RedirectResolve);
        assert_eq!(endpoint.url.as_str(), server.url("/landing"));
        assert_eq!(cache.load().unwrap(), Some(endpoint.url));
    }

    #[tokio::test]
    async fn test_get_only_variant_reports_transport_error() {
        let server = spawn_server(|_req| async move {
            make_response(StatusCode::INTERNAL_SERVER_ERROR, "")
        })
        .await;
        let (resolver, _cache) = make_resolver(vec![Strategy::PrimaryGet]);

        let err = resolver
            .resolve(&gate_config(&server), "http", "p")
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Network(_)));
        assert_eq!(server.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_all_strategies_unreachable() {
        let (resolver, cache) = make_resolver(all_strategies());
        let config = RemoteGateConfig::new("127.0.0.1:9", "/gate");

        let err = resolver.resolve(&config, "http", "p").await.unwrap_err();
        assert!(err.is_transport());
        assert_eq!(cache.load().unwrap(), None);
    }
}
