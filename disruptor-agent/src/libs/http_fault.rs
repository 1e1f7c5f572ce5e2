//! A protocol-aware HTTP reverse proxy that injects delay/error faults per request (C9)

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo};
use rand::Rng;
use tokio::net::TcpListener;
use tracing::{event, instrument, Level};

use super::metrics::Metrics;
use crate::error::Error;

type ClientBody = Full<Bytes>;

/// The per-request fault behavior an HTTP fault handler applies
#[derive(Clone)]
pub struct HttpFaultSpec {
    pub upstream_addr: SocketAddr,
    pub average_delay: Duration,
    pub delay_variation: Duration,
    pub error_rate: f64,
    pub error_code: u16,
    pub error_body: Option<String>,
    pub exclude: Vec<String>,
}

/// Runs a one-shot HTTP reverse proxy for the lifetime of the bound fault
pub struct HttpFaultServer {
    listener: TcpListener,
    spec: Arc<HttpFaultSpec>,
    client: Client<HttpConnector, ClientBody>,
    metrics: Arc<Metrics>,
}

impl HttpFaultServer {
    /// Bind the proxy listen port
    pub async fn bind(
        listen_addr: SocketAddr,
        spec: HttpFaultSpec,
        metrics: Arc<Metrics>,
    ) -> Result<Self, Error> {
        let listener = TcpListener::bind(listen_addr).await?;
        let client = Client::builder(TokioExecutor::new()).build_http();
        Ok(HttpFaultServer {
            listener,
            spec: Arc::new(spec),
            client,
            metrics,
        })
    }

    /// Serve requests until `shutdown` resolves
    #[instrument(name = "HttpFaultServer::start", skip_all, err(Debug))]
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
                        if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                            event!(Level::DEBUG, error = %err, "http fault connection ended");
                        }
                    });
                }
            }
        }
    }
}

/// Decide whether a request path is exempt from fault injection
fn is_excluded(path: &str, exclude: &[String]) -> bool {
    exclude.iter().any(|prefix| path.starts_with(prefix.as_str()))
}

/// Draw a jittered delay the same way the handler framework does for raw TCP connections
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

async fn handle(
    req: Request<Incoming>,
    spec: Arc<HttpFaultSpec>,
    client: Client<HttpConnector, ClientBody>,
    metrics: Arc<Metrics>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path().to_owned();

    if is_excluded(&path, &spec.exclude) {
        metrics.increment("excluded");
        return Ok(forward(req, &client, spec.upstream_addr).await);
    }

    if spec.error_rate > 0.0 && spec.error_code != 0 {
        let draw: f64 = rand::rng().random_range(0.0..1.0);
        if draw < spec.error_rate {
            metrics.increment("error_injected");
            let body = spec.error_body.clone().unwrap_or_default();
            let status =
                StatusCode::from_u16(spec.error_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return Ok(Response::builder()
                .status(status)
                .body(Full::new(Bytes::from(body)))
                .unwrap_or_else(|_| Response::new(Full::new(Bytes::new()))));
        }
    }

    if !spec.average_delay.is_zero() {
        let delay = jittered_delay(spec.average_delay, spec.delay_variation);
        metrics.increment("delay_injected");
        event!(Level::DEBUG, delay_ms = delay.as_millis(), path, "injecting http delay");
        tokio::time::sleep(delay).await;
    }

    Ok(forward(req, &client, spec.upstream_addr).await)
}

/// Rewrite a transparently-intercepted request's URI to an absolute form pointing at
/// `upstream`, since the raw client never sent one (it dialed the pod's app port directly,
/// not this proxy, so its request-target is origin-form: just a path).
fn retarget_uri(uri: &hyper::Uri, upstream: SocketAddr) -> hyper::Uri {
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    hyper::Uri::builder()
        .scheme("http")
        .authority(upstream.to_string())
        .path_and_query(path_and_query)
        .build()
        .unwrap_or_else(|_| uri.clone())
}

/// Forward a request upstream verbatim, surfacing a dial failure as a 502
async fn forward(
    req: Request<Incoming>,
    client: &Client<HttpConnector, ClientBody>,
    upstream: SocketAddr,
) -> Response<Full<Bytes>> {
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
            event!(Level::WARN, error = %err, "upstream dial failed");
            Response::builder()
                .status(StatusCode::BAD_GATEWAY)
                .body(Full::new(Bytes::new()))
                .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclude_matches_by_prefix() {
        let exclude = vec!["/healthz".to_string(), "/metrics".to_string()];
        assert!(is_excluded("/healthz/live", &exclude));
        assert!(is_excluded("/metrics", &exclude));
        assert!(!is_excluded("/api/v1/orders", &exclude));
    }

    #[test]
    fn jittered_delay_with_zero_variation_is_exact() {
        let delay = jittered_delay(Duration::from_millis(100), Duration::ZERO);
        assert_eq!(delay, Duration::from_millis(100));
    }

    #[test]
    fn jittered_delay_stays_within_bounds() {
        for _ in 0..50 {
            let delay = jittered_delay(Duration::from_millis(100), Duration::from_millis(20));
            assert!(delay.as_millis() >= 80 && delay.as_millis() <= 120);
        }
    }
}
