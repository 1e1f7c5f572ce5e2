//! The pluggable per-connection handler contract (C8)

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use disruptor_core::models::ConnectionMeta;
use rand::Rng;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{event, Level};

use super::metrics::Metrics;

/// An error a handler's byte-copy loop can return
#[derive(Debug)]
pub enum HandlerError {
    /// Request a silent, no-log teardown of both connections
    Terminate,
    /// Propagate an IO failure
    Io(std::io::Error),
}

impl From<std::io::Error> for HandlerError {
    fn from(error: std::io::Error) -> Self {
        HandlerError::Io(error)
    }
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerError::Terminate => write!(f, "terminate"),
            HandlerError::Io(err) => write!(f, "{err}"),
        }
    }
}

/// One direction of one proxied connection
#[async_trait]
pub trait Handler: Send + Sync {
    /// Consume from the client and forward to the server until EOF or an error
    async fn handle_upward(
        &self,
        client: &mut (dyn AsyncRead + Unpin + Send),
        server: &mut (dyn AsyncWrite + Unpin + Send),
        meta: &ConnectionMeta,
    ) -> Result<(), HandlerError>;

    /// Consume from the server and forward to the client until EOF or an error
    async fn handle_downward(
        &self,
        server: &mut (dyn AsyncRead + Unpin + Send),
        client: &mut (dyn AsyncWrite + Unpin + Send),
        meta: &ConnectionMeta,
    ) -> Result<(), HandlerError>;

    /// Whether this connection needs a real upstream dial at all. `Reject` never touches its
    /// `server`/`client` arguments, so the proxy skips the dial for it entirely (P8): a fake
    /// upstream is still threaded through the signature, it just never connects anywhere.
    fn wants_upstream(&self) -> bool {
        true
    }
}

/// Copies bytes verbatim, both directions, until EOF
pub struct Forward;

#[async_trait]
impl Handler for Forward {
    async fn handle_upward(
        &self,
        client: &mut (dyn AsyncRead + Unpin + Send),
        server: &mut (dyn AsyncWrite + Unpin + Send),
        _meta: &ConnectionMeta,
    ) -> Result<(), HandlerError> {
        tokio::io::copy(client, server).await?;
        Ok(())
    }

    async fn handle_downward(
        &self,
        server: &mut (dyn AsyncRead + Unpin + Send),
        client: &mut (dyn AsyncWrite + Unpin + Send),
        _meta: &ConnectionMeta,
    ) -> Result<(), HandlerError> {
        tokio::io::copy(server, client).await?;
        Ok(())
    }
}

/// Tears the connection down immediately, both directions, before any byte is exchanged
pub struct Reject {
    metrics: Arc<Metrics>,
}

impl Reject {
    #[must_use]
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Reject { metrics }
    }
}

#[async_trait]
impl Handler for Reject {
    async fn handle_upward(
        &self,
        _client: &mut (dyn AsyncRead + Unpin + Send),
        _server: &mut (dyn AsyncWrite + Unpin + Send),
        _meta: &ConnectionMeta,
    ) -> Result<(), HandlerError> {
        self.metrics.increment("reject");
        Err(HandlerError::Terminate)
    }

    async fn handle_downward(
        &self,
        _server: &mut (dyn AsyncRead + Unpin + Send),
        _client: &mut (dyn AsyncWrite + Unpin + Send),
        _meta: &ConnectionMeta,
    ) -> Result<(), HandlerError> {
        Err(HandlerError::Terminate)
    }

    fn wants_upstream(&self) -> bool {
        false
    }
}

/// Injects a one-off latency per second of connection lifetime into the upward direction
pub struct Delay {
    average: Duration,
    variation: Duration,
    metrics: Arc<Metrics>,
    last_delay: Mutex<Option<Instant>>,
}

impl Delay {
    #[must_use]
    pub fn new(average: Duration, variation: Duration, metrics: Arc<Metrics>) -> Self {
        Delay {
            average,
            variation,
            metrics,
            last_delay: Mutex::new(None),
        }
    }

    fn jittered(&self) -> Duration {
        let variation_secs = self.variation.as_secs_f64();
        let jitter = if variation_secs > 0.0 {
            rand::rng().random_range(-variation_secs..=variation_secs)
        } else {
            0.0
        };
        let secs = (self.average.as_secs_f64() * (1.0 + jitter)).max(0.0);
        Duration::from_secs_f64(secs)
    }
}

#[async_trait]
impl Handler for Delay {
    async fn handle_upward(
        &self,
        client: &mut (dyn AsyncRead + Unpin + Send),
        server: &mut (dyn AsyncWrite + Unpin + Send),
        _meta: &ConnectionMeta,
    ) -> Result<(), HandlerError> {
        let mut buf = [0u8; 4096];
        loop {
            let read = client.read(&mut buf).await?;
            if read == 0 {
                return Ok(());
            }
            let should_delay = {
                let mut last = self.last_delay.lock().await;
                let elapsed = last.map(|at| at.elapsed()).unwrap_or(Duration::MAX);
                if elapsed > Duration::from_secs(1) {
                    *last = Some(Instant::now());
                    true
                } else {
                    false
                }
            };
            if should_delay {
                let delay = self.jittered();
                self.metrics.increment("delay");
                event!(Level::DEBUG, delay_ms = delay.as_millis(), "injecting delay");
                tokio::time::sleep(delay).await;
            }
            server.write_all(&buf[..read]).await?;
        }
    }

    async fn handle_downward(
        &self,
        server: &mut (dyn AsyncRead + Unpin + Send),
        client: &mut (dyn AsyncWrite + Unpin + Send),
        _meta: &ConnectionMeta,
    ) -> Result<(), HandlerError> {
        tokio::io::copy(server, client).await?;
        Ok(())
    }
}
