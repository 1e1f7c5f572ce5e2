//! Pure functions producing the agent's argv from typed fault specs (C6)

use std::time::Duration;

use crate::models::{DisruptionOptions, GrpcFault, HttpFault, NetworkFault};

pub const AGENT_BIN: &str = "disruptor-agent";

/// Render a duration as seconds with up to two decimals, trailing zeros stripped (e.g. `1.5s`)
#[must_use]
pub fn format_duration_secs(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    let rounded = (secs * 100.0).round() / 100.0;
    let mut rendered = format!("{rounded:.2}");
    while rendered.ends_with('0') {
        rendered.pop();
    }
    if rendered.ends_with('.') {
        rendered.pop();
    }
    format!("{rendered}s")
}

/// Render a duration as whole milliseconds (e.g. `100ms`)
#[must_use]
pub fn format_duration_ms(duration: Duration) -> String {
    format!("{}ms", duration.as_millis())
}

/// Build the argv for `disruptor-agent http ...`, per §6
///
/// # Arguments
///
/// * `upstream_ip` - The pod IP the agent should forward untouched/delayed traffic to
/// * `fault` - The HTTP fault to apply
/// * `duration` - How long the fault should be active
/// * `opts` - Proxy bind options
#[must_use]
pub fn build_http_cmd(
    upstream_ip: &str,
    fault: &HttpFault,
    duration: Duration,
    opts: &DisruptionOptions,
) -> Vec<String> {
    let mut argv = vec![
        AGENT_BIN.to_owned(),
        "http".to_owned(),
        "-d".to_owned(),
        format_duration_secs(duration),
    ];
    if let Some(port) = fault.port {
        argv.push("-t".to_owned());
        argv.push(port.to_string());
    }
    if fault.average_delay > Duration::ZERO {
        argv.push("-a".to_owned());
        argv.push(format_duration_ms(fault.average_delay));
        argv.push("-v".to_owned());
        argv.push(format_duration_ms(fault.delay_variation));
    }
    if fault.error_rate > 0.0 {
        argv.push("-r".to_owned());
        argv.push(format_rate(fault.error_rate));
        argv.push("-e".to_owned());
        argv.push(fault.error_code.to_string());
        if let Some(body) = &fault.error_body {
            argv.push("-b".to_owned());
            argv.push(body.clone());
        }
    }
    if !fault.exclude.is_empty() {
        argv.push("-x".to_owned());
        argv.push(fault.exclude.join(","));
    }
    if opts.proxy_port != 0 {
        argv.push("-p".to_owned());
        argv.push(opts.proxy_port.to_string());
    }
    if let Some(iface) = &opts.iface {
        argv.push("-i".to_owned());
        argv.push(iface.clone());
    }
    argv.push("--upstream-host".to_owned());
    argv.push(upstream_ip.to_owned());
    argv
}

/// Build the argv for `disruptor-agent grpc ...`, per §6
///
/// # Arguments
///
/// * `upstream_ip` - The pod IP the agent should forward untouched/delayed traffic to
/// * `fault` - The gRPC fault to apply
/// * `duration` - How long the fault should be active
/// * `opts` - Proxy bind options
#[must_use]
pub fn build_grpc_cmd(
    upstream_ip: &str,
    fault: &GrpcFault,
    duration: Duration,
    opts: &DisruptionOptions,
) -> Vec<String> {
    let mut argv = vec![
        AGENT_BIN.to_owned(),
        "grpc".to_owned(),
        "-d".to_owned(),
        format_duration_secs(duration),
    ];
    if let Some(port) = fault.port {
        argv.push("-t".to_owned());
        argv.push(port.to_string());
    }
    if fault.average_delay > Duration::ZERO {
        argv.push("-a".to_owned());
        argv.push(format_duration_ms(fault.average_delay));
        argv.push("-v".to_owned());
        argv.push(format_duration_ms(fault.delay_variation));
    }
    if fault.error_rate > 0.0 {
        argv.push("-r".to_owned());
        argv.push(format_rate(fault.error_rate));
        argv.push("-s".to_owned());
        argv.push(fault.status_code.to_string());
        if let Some(msg) = &fault.status_message {
            argv.push("-m".to_owned());
            argv.push(msg.clone());
        }
    }
    if !fault.exclude.is_empty() {
        argv.push("-x".to_owned());
        argv.push(fault.exclude.join(","));
    }
    if opts.proxy_port != 0 {
        argv.push("-p".to_owned());
        argv.push(opts.proxy_port.to_string());
    }
    argv.push("--upstream-host".to_owned());
    argv.push(upstream_ip.to_owned());
    argv
}

/// Build the argv for `disruptor-agent network-drop ...`, per §6
///
/// # Arguments
///
/// * `fault` - The network fault to apply
/// * `duration` - How long the drop should be active
#[must_use]
pub fn build_network_drop_cmd(fault: &NetworkFault, duration: Duration) -> Vec<String> {
    let mut argv = vec![
        AGENT_BIN.to_owned(),
        "network-drop".to_owned(),
        "-d".to_owned(),
        format_duration_secs(duration),
    ];
    if let Some(port) = fault.port {
        if port != 0 {
            argv.push("-p".to_owned());
            argv.push(port.to_string());
        }
    }
    if let Some(protocol) = fault.protocol {
        argv.push("-P".to_owned());
        argv.push(protocol.as_str().to_owned());
    }
    argv
}

/// Build the argv for `disruptor-agent cleanup`, per §6 — always the same two elements
#[must_use]
pub fn build_cleanup_cmd() -> Vec<String> {
    vec![AGENT_BIN.to_owned(), "cleanup".to_owned()]
}

/// Render an error rate with trailing zeros trimmed, matching the duration formatting style
fn format_rate(rate: f64) -> String {
    let rounded = (rate * 1000.0).round() / 1000.0;
    let mut rendered = format!("{rounded}");
    if !rendered.contains('.') {
        rendered.push_str(".0");
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_duration_seconds_trimming_trailing_zeros() {
        assert_eq!(format_duration_secs(Duration::from_secs(60)), "60s");
        assert_eq!(format_duration_secs(Duration::from_millis(1500)), "1.5s");
    }

    #[test]
    fn formats_duration_milliseconds() {
        assert_eq!(format_duration_ms(Duration::from_millis(100)), "100ms");
    }

    #[test]
    fn builds_simple_http_500_argv() {
        let fault = HttpFault {
            port: Some(80),
            error_rate: 0.1,
            error_code: 500,
            ..Default::default()
        };
        let opts = DisruptionOptions {
            proxy_port: 0,
            iface: None,
        };
        let argv = build_http_cmd("192.0.2.6", &fault, Duration::from_secs(60), &opts);
        assert_eq!(
            argv,
            vec![
                "disruptor-agent", "http", "-d", "60s", "-t", "80", "-r", "0.1", "-e", "500",
                "--upstream-host", "192.0.2.6",
            ]
        );
    }

    #[test]
    fn builds_http_delay_argv_without_error_flags() {
        let fault = HttpFault {
            port: Some(80),
            average_delay: Duration::from_millis(100),
            delay_variation: Duration::ZERO,
            ..Default::default()
        };
        let opts = DisruptionOptions {
            proxy_port: 8080,
            iface: None,
        };
        let argv = build_http_cmd("192.0.2.6", &fault, Duration::from_secs(10), &opts);
        assert!(argv.contains(&"-a".to_owned()));
        assert!(argv.contains(&"100ms".to_owned()));
        assert!(argv.contains(&"0ms".to_owned()));
        assert!(!argv.contains(&"-r".to_owned()));
        assert!(!argv.contains(&"-e".to_owned()));
    }

    #[test]
    fn builds_grpc_with_status_message() {
        let fault = GrpcFault {
            port: Some(3000),
            error_rate: 0.1,
            status_code: 14,
            status_message: Some("internal error".to_owned()),
            ..Default::default()
        };
        let opts = DisruptionOptions {
            proxy_port: 0,
            iface: None,
        };
        let argv = build_grpc_cmd("192.0.2.6", &fault, Duration::from_secs(60), &opts);
        assert_eq!(
            argv,
            vec![
                "disruptor-agent", "grpc", "-d", "60s", "-t", "3000", "-r", "0.1", "-s", "14",
                "-m", "internal error", "--upstream-host", "192.0.2.6",
            ]
        );
    }

    #[test]
    fn build_cmd_is_idempotent() {
        let fault = HttpFault {
            port: Some(80),
            error_rate: 0.2,
            error_code: 503,
            ..Default::default()
        };
        let opts = DisruptionOptions::default();
        let a = build_http_cmd("10.0.0.1", &fault, Duration::from_secs(30), &opts);
        let b = build_http_cmd("10.0.0.1", &fault, Duration::from_secs(30), &opts);
        assert_eq!(a, b);
    }

    #[test]
    fn cleanup_argv_is_fixed() {
        assert_eq!(build_cleanup_cmd(), vec!["disruptor-agent", "cleanup"]);
    }
}
