use crate::errors::ConfigError;
use parking_lot::Mutex;
use reqwest::redirect::Policy;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const MAX_HOPS: usize = 10;

/// URLs visited while following redirects for one request, in order.
#[derive(Clone, Debug, PartialEq)]
pub struct RedirectChain {
    pub request_url: Url,
    pub hops: Vec<Url>,
}

impl RedirectChain {
    /// The last hop, or the request URL when no redirect happened.
    pub fn final_url(&self) -> &Url {
        self.hops.last().unwrap_or(&self.request_url)
    }
}

/// Follows a raw HTTP candidate to wherever it ends up, under an independent fuse.
pub struct RedirectResolver {
    fuse: Duration,
    max_hops: usize,
}

impl RedirectResolver {
    pub fn new(fuse: Duration) -> Self {
        RedirectResolver {
            fuse,
            max_hops: MAX_HOPS,
        }
    }

    pub async fn resolve(&self, request_url: Url) -> Result<Url, ConfigError> {
        Ok(self.follow(request_url).await?.final_url().clone())
    }

    /// Issues the request and records every hop before completion.
    ///
    /// Whichever finishes first, the request or the fuse, decides the result.
    /// A request outliving the fuse keeps running in the background and its
    /// outcome is ignored.
    pub async fn follow(&self, request_url: Url) -> Result<RedirectChain, ConfigError> {
        let hops = Arc::new(Mutex::new(Vec::new()));
        let client = recording_client(hops.clone(), self.max_hops)?;

        let url = request_url.clone();
        let request = tokio::spawn(async move { client.get(url).send().await.map(|_| ()) });

        let outcome = tokio::select! {
            joined = request => joined,
            _ = tokio::time::sleep(self.fuse) => {
                tracing::warn!(fuse = ?self.fuse, url = %request_url, "Redirect resolution fuse blown");
                return Err(ConfigError::Timeout);
            }
        };

        let chain = RedirectChain {
            request_url,
            hops: hops.lock().clone(),
        };

        match outcome {
            Ok(Ok(())) => Ok(chain),
            // Partial chains still count: the last hop reached is the answer
            Ok(Err(e)) if !chain.hops.is_empty() => {
                tracing::warn!(error = %e, hops = chain.hops.len(), "Redirect request failed after redirecting");
                Ok(chain)
            }
            Ok(Err(e)) => Err(e.into()),
            Err(e) => Err(ConfigError::invalid(format!("redirect task failed: {e}"))),
        }
    }
}

fn recording_client(
    hops: Arc<Mutex<Vec<Url>>>,
    max_hops: usize,
) -> Result<reqwest::Client, ConfigError> {
    let policy = Policy::custom(move |attempt| {
        // previous() includes the original request URL
        if attempt.previous().len() > max_hops {
            return attempt.stop();
        }
        hops.lock().push(attempt.url().clone());
        attempt.follow()
    });

    Ok(reqwest::Client::builder().redirect(policy).build()?)
}
