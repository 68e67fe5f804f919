use http::{HeaderMap, Method, StatusCode, Uri};
use http_body_util::Full;
use hyper::Response;
use hyper::body::Bytes;
use parking_lot::Mutex;
use serde_json::Value;
use shared::http::{make_response, serve_local};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Mock HTTP server on an ephemeral port that keeps every request it receives.
pub struct TestServer {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }
}

pub async fn spawn_server<F, Fut>(respond: F) -> TestServer
where
    F: Fn(RecordedRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response<Full<Bytes>>> + Send + 'static,
{
    let requests = Arc::new(Mutex::new(Vec::new()));
    let recorded = requests.clone();

    let addr = serve_local(move |req| {
        let (parts, body) = req.into_parts();
        let request = RecordedRequest {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
        };
        recorded.lock().push(request.clone());
        respond(request)
    })
    .await
    .unwrap();

    TestServer { addr, requests }
}

/// Answers every request with the same JSON document.
pub async fn spawn_json_server(value: Value) -> TestServer {
    let body = Bytes::from(value.to_string());
    spawn_server(move |_req| {
        let body = body.clone();
        async move { make_response(StatusCode::OK, body) }
    })
    .await
}
