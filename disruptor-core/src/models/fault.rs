//! Pure-data fault specifications

use std::time::Duration;

/// An HTTP fault: status-code injection and/or added latency
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpFault {
    /// The application port traffic is being intercepted on
    pub port: Option<i32>,
    /// The average added latency
    pub average_delay: Duration,
    /// The +/- variation applied around `average_delay`
    pub delay_variation: Duration,
    /// The fraction of requests, in [0, 1], that receive the error response
    pub error_rate: f64,
    /// The HTTP status code returned for an injected error
    pub error_code: u16,
    /// The body returned alongside `error_code`
    pub error_body: Option<String>,
    /// URL path prefixes that are forwarded untouched
    pub exclude: Vec<String>,
}

/// A gRPC fault: status-code injection and/or added latency
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GrpcFault {
    pub port: Option<i32>,
    pub average_delay: Duration,
    pub delay_variation: Duration,
    pub error_rate: f64,
    /// The gRPC status code returned for an injected error
    pub status_code: u32,
    /// The message returned alongside `status_code`
    pub status_message: Option<String>,
    /// Fully-qualified `package.Service` names forwarded untouched
    pub exclude: Vec<String>,
}

/// A count, either an absolute number of pods or a percentage of the resolved targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Count {
    Absolute(usize),
    Percentage(u8),
}

impl Count {
    /// Parse a count from its CLI form: a bare integer, or an integer suffixed with `%`
    ///
    /// # Arguments
    ///
    /// * `raw` - The raw count string
    pub fn parse(raw: &str) -> Result<Self, crate::Error> {
        if let Some(pct) = raw.strip_suffix('%') {
            let value: u8 = pct
                .parse()
                .map_err(|_| crate::Error::InvalidCount(format!("invalid percentage: {raw}")))?;
            if value > 100 {
                return Err(crate::Error::InvalidCount(format!(
                    "percentage out of range: {raw}"
                )));
            }
            Ok(Count::Percentage(value))
        } else {
            let value: usize = raw
                .parse()
                .map_err(|_| crate::Error::InvalidCount(format!("invalid count: {raw}")))?;
            Ok(Count::Absolute(value))
        }
    }

    /// Resolve this count against a total number of targets
    ///
    /// # Arguments
    ///
    /// * `total` - The number of resolved targets
    #[must_use]
    pub fn resolve(&self, total: usize) -> usize {
        match self {
            Count::Absolute(value) => (*value).min(total),
            Count::Percentage(pct) => (total * usize::from(*pct) / 100).min(total),
        }
    }
}

/// A pod-termination fault
#[derive(Debug, Clone, PartialEq)]
pub struct PodTerminationFault {
    /// How many resolved targets to terminate
    pub count: Count,
    /// The grace period to wait for each termination; `0` defaults to 10s
    pub timeout: Duration,
}

impl Default for PodTerminationFault {
    fn default() -> Self {
        PodTerminationFault {
            count: Count::Absolute(1),
            timeout: Duration::ZERO,
        }
    }
}

/// The network protocol a network fault should target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    #[default]
    All,
}

impl Protocol {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Icmp => "icmp",
            Protocol::All => "all",
        }
    }
}

/// A blanket network-drop fault
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkFault {
    /// `None` (or `0`) means all ports
    pub port: Option<u16>,
    pub protocol: Option<Protocol>,
}

/// Options common to the protocol-aware faults, telling the agent where to bind its proxy
#[derive(Debug, Clone, PartialEq)]
pub struct DisruptionOptions {
    /// The port the agent's proxy listens on
    pub proxy_port: u16,
    /// The network interface the HTTP proxy's redirect rules attach to
    pub iface: Option<String>,
}

impl Default for DisruptionOptions {
    fn default() -> Self {
        DisruptionOptions {
            proxy_port: 8080,
            iface: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_absolute_and_percentage_counts() {
        assert_eq!(Count::parse("3").unwrap(), Count::Absolute(3));
        assert_eq!(Count::parse("50%").unwrap(), Count::Percentage(50));
        assert!(Count::parse("nope").is_err());
        assert!(Count::parse("101%").is_err());
    }

    #[test]
    fn resolves_counts_against_total() {
        assert_eq!(Count::Absolute(10).resolve(3), 3);
        assert_eq!(Count::Percentage(50).resolve(10), 5);
        assert_eq!(Count::Percentage(0).resolve(10), 0);
    }
}
