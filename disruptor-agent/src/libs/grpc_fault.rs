//! A protocol-aware gRPC (HTTP/2) reverse proxy that injects delay/status faults (C9)

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::HeaderValue;
use hyper::server::conn::http2;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo};
use rand::Rng;
use tokio::net::TcpListener;
use tracing::{event, instrument, Level};

use super::metrics::Metrics;
use crate::error::Error;

type ClientBody = Full<Bytes>;

/// gRPC `UNAVAILABLE`, returned when the upstream dial fails
const STATUS_UNAVAILABLE: u32 = 14;

/// The per-request fault behavior a gRPC fault handler applies
#[derive(Clone)]
pub struct GrpcFaultSpec {
    pub upstream_addr: SocketAddr,
    pub average_delay: Duration,
    pub delay_variation: Duration,
    pub error_rate: f64,
    pub status_code: u32,
    pub status_message: Option<String>,
    /// Fully-qualified `package.Service` names forwarded untouched (exact match)
    pub exclude: Vec<String>,
}

/// Runs a one-shot gRPC reverse proxy for the lifetime of the bound fault
pub struct GrpcFaultServer {
    listener: TcpListener,
    spec: Arc<GrpcFaultSpec>,
    client: Client<HttpConnector, ClientBody>,
    metrics: Arc<Metrics>,
}

impl GrpcFaultServer {
    pub async fn bind(
        listen_addr: SocketAddr,
        spec: GrpcFaultSpec,
        metrics: Arc<Metrics>,
    ) -> Result<Self, Error> {
        let listener = TcpListener::bind(listen_addr).await?;
        // upstream gRPC servers speak h2c (HTTP/2 cleartext); the legacy client needs to be
        // told explicitly since plain TCP has no ALPN to negotiate it
        let client = Client::builder(TokioExecutor::new())
            .http2_only(true)
            .build_http();
        Ok(GrpcFaultServer {
            listener,
            spec: Arc::new(spec),
            client,
            metrics,
        })
    }

    #[instrument(name = "GrpcFaultServer::start", skip_all, err(Debug))]
    pub async fn start(&self, shutdown: impl std::future::Future<Output = ()>) -> Result<(), Error> {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                () = &mut shutdown => return Ok(()),
                accepted = self.listener.accept() => {
                    let (stream, _peer) = accepted?;
                    let io = TokioIo::new(stream);
                    let spec = Arc::clone(&self.spec);
                    let client = self.client.clone();
                    let metrics = Arc::clone(&self.metrics);
                    tokio::spawn(async move {
                        let service = service_fn(move |req| {
                            handle(req, Arc::clone(&spec), client.clone(), Arc::clone(&metrics))
                        });
                        if let Err(err) = http2::Builder::new(TokioExecutor::new())
                            .serve_connection(io, service)
                            .await
                        {
                            event!(Level::DEBUG, error = %err, "grpc fault connection ended");
                        }
                    });
                }
            }
        }
    }
}

/// Extract the fully-qualified `package.Service` from a gRPC `:path`, e.g.
/// `/cart.v1.CartService/AddItem` -> `cart.v1.CartService`
fn service_name(path: &str) -> Option<&str> {
    let trimmed = path.strip_prefix('/')?;
    let (service, _method) = trimmed.rsplit_once('/')?;
    Some(service)
}

fn is_excluded(path: &str, exclude: &[String]) -> bool {
    match service_name(path) {
        Some(name) => exclude.iter().any(|svc| svc == name),
        None => false,
    }
}

fn jittered_delay(average: Duration, variation: Duration) -> Duration {
    let variation_secs = variation.as_secs_f64();
    let jitter = if variation_secs > 0.0 {
        rand::rng().random_range(-variation_secs..=variation_secs)
    } else {
        0.0
    };
    let secs = (average.as_secs_f64() * (1.0 + jitter)).max(0.0);
    Duration::from_secs_f64(secs)
}

/// Build a trailers-only gRPC status response
fn status_response(code: u32, message: Option<&str>) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(Bytes::new()));
    resp.headers_mut().insert(
        "content-type",
        HeaderValue::from_static("application/grpc"),
    );
    resp.headers_mut().insert(
        "grpc-status",
        HeaderValue::from_str(&code.to_string()).unwrap_or_else(|_| HeaderValue::from_static("2")),
    );
    if let Some(message) = message {
        if let Ok(value) = HeaderValue::from_str(message) {
            resp.headers_mut().insert("grpc-message", value);
        }
    }
    resp
}

async fn handle(
    req: Request<Incoming>,
    spec: Arc<GrpcFaultSpec>,
    client: Client<HttpConnector, ClientBody>,
    metrics: Arc<Metrics>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path().to_owned();

    if is_excluded(&path, &spec.exclude) {
        metrics.increment("excluded");
        return Ok(forward(req, &client, spec.upstream_addr).await);
    }

    if spec.error_rate > 0.0 {
        let draw: f64 = rand::rng().random_range(0.0..1.0);
        if draw < spec.error_rate {
            metrics.increment("error_injected");
            return Ok(status_response(spec.status_code, spec.status_message.as_deref()));
        }
    }

    if !spec.average_delay.is_zero() {
        let delay = jittered_delay(spec.average_delay, spec.delay_variation);
        metrics.increment("delay_injected");
        event!(Level::DEBUG, delay_ms = delay.as_millis(), path, "injecting grpc delay");
        tokio::time::sleep(delay).await;
    }

    Ok(forward(req, &client, spec.upstream_addr).await)
}

/// Rewrite a transparently-intercepted request's URI to an absolute form pointing at
/// `upstream`, mirroring `http_fault::retarget_uri`.
fn retarget_uri(uri: &hyper::Uri, upstream: SocketAddr) -> hyper::Uri {
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    hyper::Uri::builder()
        .scheme("http")
        .authority(upstream.to_string())
        .path_and_query(path_and_query)
        .build()
        .unwrap_or_else(|_| uri.clone())
}

async fn forward(
    req: Request<Incoming>,
    client: &Client<HttpConnector, ClientBody>,
    upstream: SocketAddr,
) -> Response<Full<Bytes>> {
    use http_body_util::BodyExt;

    let (mut parts, body) = req.into_parts();
    parts.uri = retarget_uri(&parts.uri, upstream);
    let collected = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => Bytes::new(),
    };
    let upstream_req = Request::from_parts(parts, Full::new(collected));

    match client.request(upstream_req).await {
        Ok(resp) => {
            let (parts, body) = resp.into_parts();
            let bytes = body.collect().await.map(|c| c.to_bytes()).unwrap_or_default();
            Response::from_parts(parts, Full::new(bytes))
        }
        Err(err) => {
            event!(Level::WARN, error = %err, "grpc upstream dial failed");
            status_response(STATUS_UNAVAILABLE, Some("upstream unavailable"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_name_splits_path_and_method() {
        assert_eq!(
            service_name("/cart.v1.CartService/AddItem"),
            Some("cart.v1.CartService")
        );
        assert_eq!(service_name("/bad"), None);
    }

    #[test]
    fn exclude_requires_exact_service_match() {
        let exclude = vec!["cart.v1.CartService".to_string()];
        assert!(is_excluded("/cart.v1.CartService/AddItem", &exclude));
        assert!(!is_excluded("/cart.v1.CartServiceV2/AddItem", &exclude));
    }
}
