use clap::{Parser, Subcommand};
use std::time::Duration;

/// Command line args for the disruptor agent, bit-exact with the argv the orchestrator builds
#[derive(Parser, Debug)]
#[clap(version, author)]
pub struct Args {
    /// The fault this agent invocation applies
    #[clap(subcommand)]
    pub command: Commands,
    /// The path to the tracing config to load
    #[clap(long, default_value = "/opt/disruptor/tracing.yml")]
    pub trace: String,
}

/// The fault kinds the agent knows how to apply
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Inject HTTP faults via an in-band reverse proxy
    Http(HttpArgs),
    /// Inject gRPC faults via an in-band reverse proxy
    Grpc(GrpcArgs),
    /// Drop network traffic for a target port/protocol
    NetworkDrop(NetworkDropArgs),
    /// Revert any fault this agent previously applied
    Cleanup(CleanupArgs),
}

#[derive(Parser, Debug)]
pub struct HttpArgs {
    /// How long the fault stays active
    #[clap(short, long, value_parser = parse_duration_secs)]
    pub duration: Duration,
    /// The application port traffic is intercepted on
    #[clap(short = 't', long)]
    pub port: Option<u16>,
    /// The average added latency, in milliseconds
    #[clap(short, long, value_parser = parse_duration_ms)]
    pub average_delay: Option<Duration>,
    /// The +/- variation applied around the average delay, in milliseconds
    #[clap(short = 'v', long, value_parser = parse_duration_ms)]
    pub delay_variation: Option<Duration>,
    /// The fraction of requests, in [0, 1], that receive the error response
    #[clap(short = 'r', long)]
    pub error_rate: Option<f64>,
    /// The HTTP status code returned for an injected error
    #[clap(short = 'e', long)]
    pub error_code: Option<u16>,
    /// The body returned alongside the error code
    #[clap(short = 'b', long)]
    pub error_body: Option<String>,
    /// A comma-separated list of URL path prefixes to forward untouched
    #[clap(short = 'x', long, value_delimiter = ',')]
    pub exclude: Vec<String>,
    /// The port the proxy listens on
    #[clap(short = 'p', long, default_value_t = 8080)]
    pub proxy_port: u16,
    /// The network interface traffic-interception rules attach to
    #[clap(short, long)]
    pub iface: Option<String>,
    /// The pod IP to forward traffic to
    #[clap(long)]
    pub upstream_host: String,
}

#[derive(Parser, Debug)]
pub struct GrpcArgs {
    #[clap(short, long, value_parser = parse_duration_secs)]
    pub duration: Duration,
    #[clap(short = 't', long)]
    pub port: Option<u16>,
    #[clap(short, long, value_parser = parse_duration_ms)]
    pub average_delay: Option<Duration>,
    #[clap(short = 'v', long, value_parser = parse_duration_ms)]
    pub delay_variation: Option<Duration>,
    #[clap(short = 'r', long)]
    pub error_rate: Option<f64>,
    /// The gRPC status code returned for an injected error
    #[clap(short = 's', long)]
    pub status_code: Option<u32>,
    /// The message returned alongside the status code
    #[clap(short = 'm', long)]
    pub status_message: Option<String>,
    /// A comma-separated list of fully-qualified `package.Service` names to forward untouched
    #[clap(short = 'x', long, value_delimiter = ',')]
    pub exclude: Vec<String>,
    #[clap(short = 'p', long, default_value_t = 8080)]
    pub proxy_port: u16,
    #[clap(long)]
    pub upstream_host: String,
}

#[derive(Parser, Debug)]
pub struct NetworkDropArgs {
    #[clap(short, long, value_parser = parse_duration_secs)]
    pub duration: Duration,
    /// The port to drop traffic for; omitted means all ports
    #[clap(short, long)]
    pub port: Option<u16>,
    /// The protocol to drop traffic for: tcp, udp, icmp, or all
    #[clap(short = 'P', long)]
    pub protocol: Option<String>,
}

#[derive(Parser, Debug)]
pub struct CleanupArgs;

/// Parse a duration rendered as `<seconds>s` (e.g. `60s`, `1.5s`)
fn parse_duration_secs(raw: &str) -> Result<Duration, String> {
    let secs = raw
        .strip_suffix('s')
        .ok_or_else(|| format!("duration {raw} is missing the `s` suffix"))?;
    let secs: f64 = secs
        .parse()
        .map_err(|_| format!("invalid duration: {raw}"))?;
    Ok(Duration::from_secs_f64(secs))
}

/// Parse a duration rendered as `<milliseconds>ms` (e.g. `100ms`)
fn parse_duration_ms(raw: &str) -> Result<Duration, String> {
    let ms = raw
        .strip_suffix("ms")
        .ok_or_else(|| format!("duration {raw} is missing the `ms` suffix"))?;
    let ms: u64 = ms.parse().map_err(|_| format!("invalid duration: {raw}"))?;
    Ok(Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_seconds_and_milliseconds() {
        assert_eq!(parse_duration_secs("60s").unwrap(), Duration::from_secs(60));
        assert_eq!(
            parse_duration_secs("1.5s").unwrap(),
            Duration::from_millis(1500)
        );
        assert_eq!(
            parse_duration_ms("100ms").unwrap(),
            Duration::from_millis(100)
        );
    }

    #[test]
    fn rejects_missing_suffix() {
        assert!(parse_duration_secs("60").is_err());
        assert!(parse_duration_ms("100").is_err());
    }
}
