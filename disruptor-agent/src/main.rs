use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use clap::Parser;
use tracing::{event, span, Level};

mod args;
mod error;
mod libs;

use args::{Args, Commands, GrpcArgs, HttpArgs, NetworkDropArgs};
use error::Error;
use libs::grpc_fault::{GrpcFaultServer, GrpcFaultSpec};
use libs::http_fault::{HttpFaultServer, HttpFaultSpec};
use libs::metrics::Metrics;
use libs::network_drop::NetworkDrop;

/// The disruptor agent's main loop: run exactly one fault for a bounded duration then exit
#[tokio::main]
async fn main() {
    let args = Args::parse();
    disruptor_core::tracing_setup::init_from_file("DisruptorAgent", &args.trace);

    let span = span!(Level::INFO, "Agent Run");
    let outcome = match args.command {
        Commands::Http(http_args) => run_http(http_args).await,
        Commands::Grpc(grpc_args) => run_grpc(grpc_args).await,
        Commands::NetworkDrop(drop_args) => run_network_drop(drop_args).await,
        Commands::Cleanup(_) => run_cleanup().await,
    };

    if let Err(error) = outcome {
        event!(parent: &span, Level::ERROR, error = %error, "agent run failed");
        std::process::exit(1);
    }
}

fn parse_upstream(host: &str, port: u16) -> Result<SocketAddr, Error> {
    let ip: IpAddr = host
        .parse()
        .map_err(|_| Error::UpstreamDialFailed(format!("invalid upstream host: {host}")))?;
    Ok(SocketAddr::new(ip, port))
}

async fn run_http(args: HttpArgs) -> Result<(), Error> {
    let upstream_port = args.port.unwrap_or(80);
    let upstream_addr = parse_upstream(&args.upstream_host, upstream_port)?;
    let listen_addr = SocketAddr::new(IpAddr::from([0, 0, 0, 0]), args.proxy_port);

    let spec = HttpFaultSpec {
        upstream_addr,
        average_delay: args.average_delay.unwrap_or_default(),
        delay_variation: args.delay_variation.unwrap_or_default(),
        error_rate: args.error_rate.unwrap_or_default(),
        error_code: args.error_code.unwrap_or(500),
        error_body: args.error_body,
        exclude: args.exclude,
    };

    let metrics = Arc::new(Metrics::new());
    let server = HttpFaultServer::bind(listen_addr, spec, Arc::clone(&metrics)).await?;
    let result = server.start(tokio::time::sleep(args.duration)).await;
    event!(Level::INFO, counters = ?metrics.snapshot(), "http fault finished");
    result
}

async fn run_grpc(args: GrpcArgs) -> Result<(), Error> {
    let upstream_port = args.port.unwrap_or(80);
    let upstream_addr = parse_upstream(&args.upstream_host, upstream_port)?;
    let listen_addr = SocketAddr::new(IpAddr::from([0, 0, 0, 0]), args.proxy_port);

    let spec = GrpcFaultSpec {
        upstream_addr,
        average_delay: args.average_delay.unwrap_or_default(),
        delay_variation: args.delay_variation.unwrap_or_default(),
        error_rate: args.error_rate.unwrap_or_default(),
        status_code: args.status_code.unwrap_or(2),
        status_message: args.status_message,
        exclude: args.exclude,
    };

    let metrics = Arc::new(Metrics::new());
    let server = GrpcFaultServer::bind(listen_addr, spec, Arc::clone(&metrics)).await?;
    let result = server.start(tokio::time::sleep(args.duration)).await;
    event!(Level::INFO, counters = ?metrics.snapshot(), "grpc fault finished");
    result
}

async fn run_network_drop(args: NetworkDropArgs) -> Result<(), Error> {
    let protocol = args.protocol.unwrap_or_else(|| "all".to_owned());
    let drop = NetworkDrop::new(args.port, &protocol);
    drop.install().await?;
    tokio::time::sleep(args.duration).await;
    drop.revert().await
}

/// Best-effort revert of any fault this agent may have left installed
async fn run_cleanup() -> Result<(), Error> {
    let drop = NetworkDrop::new(None, "all");
    // ignore the result: cleanup runs even when no network-drop rule was ever installed
    let _ = drop.revert().await;
    Ok(())
}
