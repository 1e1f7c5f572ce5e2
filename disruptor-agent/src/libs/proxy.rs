//! The transparent TCP proxy core: accept loop, per-connection dial, teardown (C7)

use std::net::SocketAddr;
use std::sync::Arc;

use disruptor_core::models::ConnectionMeta;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{event, instrument, Level};

use super::handler::{Handler, HandlerError};
use crate::error::Error;

/// Builds a [`Handler`] for one accepted connection
pub trait HandlerFactory: Send + Sync {
    fn build(&self, meta: &ConnectionMeta) -> Arc<dyn Handler>;
}

impl<F> HandlerFactory for F
where
    F: Fn(&ConnectionMeta) -> Arc<dyn Handler> + Send + Sync,
{
    fn build(&self, meta: &ConnectionMeta) -> Arc<dyn Handler> {
        (self)(meta)
    }
}

/// A byte-level TCP proxy that dials one upstream per accepted connection
pub struct Proxy {
    listener: TcpListener,
    upstream_addr: SocketAddr,
    handlers: Arc<dyn HandlerFactory>,
}

impl Proxy {
    /// Bind a proxy listener
    ///
    /// # Arguments
    ///
    /// * `listen_addr` - The address to accept connections on
    /// * `upstream_addr` - The address dialed for every accepted connection
    /// * `handlers` - Builds a handler for each connection
    pub async fn bind(
        listen_addr: SocketAddr,
        upstream_addr: SocketAddr,
        handlers: Arc<dyn HandlerFactory>,
    ) -> Result<Self, Error> {
        let listener = TcpListener::bind(listen_addr).await?;
        Ok(Proxy {
            listener,
            upstream_addr,
            handlers,
        })
    }

    /// Accept connections until the listener errors or `shutdown` is signaled
    ///
    /// # Arguments
    ///
    /// * `shutdown` - Resolves when the proxy should stop accepting new connections
    #[instrument(name = "Proxy::start", skip_all, err(Debug))]
    pub async fn start(&self, shutdown: impl std::future::Future<Output = ()>) -> Result<(), Error> {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                () = &mut shutdown => return Ok(()),
                accepted = self.listener.accept() => {
                    let (downstream, client_addr) = accepted?;
                    let upstream_addr = self.upstream_addr;
                    let handlers = Arc::clone(&self.handlers);
                    tokio::spawn(async move {
                        if let Err(err) = handle_connection(downstream, client_addr, upstream_addr, handlers).await {
                            event!(Level::WARN, error = %err, "connection worker failed");
                        }
                    });
                }
            }
        }
    }
}

/// Per-connection worker: build a handler, dial upstream unless it opts out, race both
/// directions, tear down
async fn handle_connection(
    mut downstream: TcpStream,
    client_addr: SocketAddr,
    upstream_addr: SocketAddr,
    handlers: Arc<dyn HandlerFactory>,
) -> Result<(), Error> {
    let meta = ConnectionMeta::new(client_addr, upstream_addr);
    let handler = handlers.build(&meta);

    if !handler.wants_upstream() {
        let (mut down_read, mut down_write) = downstream.split();
        let mut fake_upstream_read = tokio::io::empty();
        let mut fake_upstream_write = tokio::io::sink();

        let upward = handler.handle_upward(&mut down_read, &mut fake_upstream_write, &meta);
        let downward = handler.handle_downward(&mut fake_upstream_read, &mut down_write, &meta);
        let outcome = tokio::select! {
            result = upward => result,
            result = downward => result,
        };
        let _ = downstream.shutdown().await;
        return match outcome {
            Ok(()) | Err(HandlerError::Terminate) => Ok(()),
            Err(HandlerError::Io(err)) => Err(Error::Io(err)),
        };
    }

    let mut upstream = match TcpStream::connect(upstream_addr).await {
        Ok(stream) => stream,
        Err(err) => {
            let _ = downstream.shutdown().await;
            return Err(Error::UpstreamDialFailed(format!(
                "{upstream_addr}: {err}"
            )));
        }
    };

    let (mut down_read, mut down_write) = downstream.split();
    let (mut up_read, mut up_write) = upstream.split();

    let upward = handler.handle_upward(&mut down_read, &mut up_write, &meta);
    let downward = handler.handle_downward(&mut up_read, &mut down_write, &meta);

    let outcome = tokio::select! {
        result = upward => result,
        result = downward => result,
    };

    let _ = downstream.shutdown().await;
    let _ = upstream.shutdown().await;

    match outcome {
        Ok(()) | Err(HandlerError::Terminate) => Ok(()),
        Err(HandlerError::Io(err)) => Err(Error::Io(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libs::handler::Forward;
    use tokio::io::{AsyncReadExt, AsyncWriteExt as _};

    async fn echo_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let (mut socket, _) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(_) => return,
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    loop {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => {
                                if socket.write_all(&buf[..n]).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                });
            }
        });
        addr
    }

    #[tokio::test]
    async fn forward_proxy_round_trips_bytes() {
        let upstream = echo_server().await;
        let handlers: Arc<dyn HandlerFactory> =
            Arc::new(|_meta: &ConnectionMeta| Arc::new(Forward) as Arc<dyn Handler>);
        let proxy = Proxy::bind("127.0.0.1:0".parse().unwrap(), upstream, handlers)
            .await
            .unwrap();
        let proxy_addr = proxy.listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            let _ = proxy.start(async { let _ = rx.await; }).await;
        });

        let mut client = TcpStream::connect(proxy_addr).await.unwrap();
        client.write_all(b"a line\n").await.unwrap();
        let mut buf = [0u8; 32];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"a line\n");

        let _ = tx.send(());
    }

    #[tokio::test]
    async fn reject_closes_without_dialing_upstream() {
        let handlers: Arc<dyn HandlerFactory> = Arc::new(|_meta: &ConnectionMeta| {
            Arc::new(super::super::handler::Reject::new(Arc::new(
                super::super::metrics::Metrics::new(),
            ))) as Arc<dyn Handler>
        });
        // a non-routable TEST-NET-1 address: connecting to it blocks on the SYN until it
        // times out. If Reject ever attempted the dial, the read below would hang well past
        // the timeout instead of observing an immediate close.
        let upstream: SocketAddr = "192.0.2.1:81".parse().unwrap();
        let proxy = Proxy::bind("127.0.0.1:0".parse().unwrap(), upstream, handlers)
            .await
            .unwrap();
        let proxy_addr = proxy.listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            let _ = proxy.start(async { let _ = rx.await; }).await;
        });

        let mut client = TcpStream::connect(proxy_addr).await.unwrap();
        let _ = client.write_all(b"x").await;
        let mut buf = [0u8; 8];
        let n = tokio::time::timeout(std::time::Duration::from_millis(500), client.read(&mut buf))
            .await
            .expect("read should return immediately; a dial attempt would hang")
            .unwrap_or(0);
        assert_eq!(n, 0);

        let _ = tx.send(());
    }
}
