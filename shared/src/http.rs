use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::{self, HeaderValue, InvalidHeaderValue};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Binds an ephemeral port on the loopback interface and serves every
/// connection with `handler` until the runtime shuts down.
///
/// Request bodies are collected before the handler runs so handlers can inspect
/// form and JSON payloads directly.
pub async fn serve_local<F, Fut>(handler: F) -> std::io::Result<SocketAddr>
where
    F: Fn(Request<Bytes>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response<Full<Bytes>>> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let handler = Arc::new(handler);

    tokio::spawn(async move {
        loop {
            let (stream, _peer_addr) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                    break;
                }
            };
            let _ = stream.set_nodelay(true);
            let io = TokioIo::new(stream);
            let handler = handler.clone();

            // Hand the connection to hyper; auto-detect h1/h2 on this socket
            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let handler = handler.clone();
                    async move {
                        let (parts, body) = req.into_parts();
                        let body = body
                            .collect()
                            .await
                            .map(|collected| collected.to_bytes())
                            .unwrap_or_default();
                        Ok::<_, Infallible>(handler(Request::from_parts(parts, body)).await)
                    }
                });

                let _ = Builder::new(TokioExecutor::new())
                    .serve_connection(io, service)
                    .await;
            });
        }
    });

    Ok(addr)
}

pub fn make_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

/// A 302 pointing at `location`.
pub fn make_redirect_response(location: &str) -> Result<Response<Full<Bytes>>, InvalidHeaderValue> {
    let mut response = make_response(StatusCode::FOUND, Bytes::new());
    response
        .headers_mut()
        .insert(header::LOCATION, HeaderValue::from_str(location)?);
    Ok(response)
}
