//! The agent's own error type, wrapping `disruptor_core::Error` plus proxy-local failures

#[derive(Debug)]
pub enum Error {
    /// An error from the shared orchestrator crate (attach/exec/resolve failures never reach
    /// the agent directly, but the agent reuses the same config/tracing plumbing)
    Core(disruptor_core::Error),
    /// The proxy could not dial the configured upstream address
    UpstreamDialFailed(String),
    /// An IO error
    Io(std::io::Error),
    /// A hyper client/server error
    Hyper(hyper::Error),
    /// Failed to install or revert the `iptables` rules for a network-drop fault
    IpTables(String),
}

impl Error {
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Core(_) => "Core",
            Error::UpstreamDialFailed(_) => "UpstreamDialFailed",
            Error::Io(_) => "Io",
            Error::Hyper(_) => "Hyper",
            Error::IpTables(_) => "IpTables",
        }
    }

    pub fn msg(&self) -> Option<String> {
        match self {
            Error::Core(err) => err.msg(),
            Error::UpstreamDialFailed(msg) | Error::IpTables(msg) => Some(msg.clone()),
            Error::Io(err) => Some(err.to_string()),
            Error::Hyper(err) => Some(err.to_string()),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.msg().unwrap_or_else(|| self.kind().to_owned()))
    }
}

impl std::error::Error for Error {}

impl From<disruptor_core::Error> for Error {
    fn from(error: disruptor_core::Error) -> Self {
        Error::Core(error)
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::Io(error)
    }
}

impl From<hyper::Error> for Error {
    fn from(error: hyper::Error) -> Self {
        Error::Hyper(error)
    }
}
