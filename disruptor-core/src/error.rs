//! The error taxonomy for the disruptor orchestrator

/// An error from resolving targets, attaching agents, or running a disruption
#[derive(Debug)]
pub enum Error {
    /// The selector has no namespace and no label maps
    SelectorInvalid(String),
    /// A selector (or service selector) matched zero pods
    NoTargets(String),
    /// A named resource does not exist in the cluster
    NotFound(String),
    /// A service exposes more than one port and none was requested
    Ambiguous(String),
    /// The requested fault port is not exposed by the target pod
    NotExposed(String),
    /// The target pod uses the host network and was refused
    HostNetworkRefused(String),
    /// The target pod has not yet been assigned an IP
    NoPodIp(String),
    /// Patching the ephemeral container onto a pod failed
    AttachFailed(String),
    /// The ephemeral container never reached `Running` before the wait timed out
    NotStarted(String),
    /// The agent exited non-zero or its exec stream failed; stderr is captured when available
    ExecFailed { msg: String, stderr: String },
    /// An invalid termination count was supplied (bad integer or percentage)
    InvalidCount(String),
    /// The cluster's server version is older than this system supports
    UnsupportedCluster(String),
    /// The operation was cancelled
    Cancelled,
    /// A generic error with a message
    Generic(String),
    /// An error from the Kubernetes client
    K8s(kube::Error),
    /// An IO error
    Io(std::io::Error),
    /// An error converting a value with serde_json
    SerdeJson(serde_json::Error),
    /// An error converting a value with serde_yaml
    SerdeYaml(serde_yaml::Error),
    /// An error loading configuration
    Config(config::ConfigError),
    /// An error joining a tokio task
    TokioJoin(tokio::task::JoinError),
    /// An error parsing an integer (termination counts, percentages)
    ParseInt(std::num::ParseIntError),
}

impl Error {
    /// Create a new generic error
    ///
    /// # Arguments
    ///
    /// * `msg` - The error message to use
    pub fn new<T: Into<String>>(msg: T) -> Self {
        Error::Generic(msg.into())
    }

    /// Get a short, stable name for this error's kind
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Error::SelectorInvalid(_) => "SelectorInvalid",
            Error::NoTargets(_) => "NoTargets",
            Error::NotFound(_) => "NotFound",
            Error::Ambiguous(_) => "Ambiguous",
            Error::NotExposed(_) => "NotExposed",
            Error::HostNetworkRefused(_) => "HostNetworkRefused",
            Error::NoPodIp(_) => "NoPodIp",
            Error::AttachFailed(_) => "AttachFailed",
            Error::NotStarted(_) => "NotStarted",
            Error::ExecFailed { .. } => "ExecFailed",
            Error::InvalidCount(_) => "InvalidCount",
            Error::UnsupportedCluster(_) => "UnsupportedCluster",
            Error::Cancelled => "Cancelled",
            Error::Generic(_) => "Generic",
            Error::K8s(_) => "K8s",
            Error::Io(_) => "Io",
            Error::SerdeJson(_) => "SerdeJson",
            Error::SerdeYaml(_) => "SerdeYaml",
            Error::Config(_) => "Config",
            Error::TokioJoin(_) => "TokioJoin",
            Error::ParseInt(_) => "ParseInt",
        }
    }

    /// Get this error's message if one is available
    #[must_use]
    pub fn msg(&self) -> Option<String> {
        match self {
            Error::SelectorInvalid(msg)
            | Error::NoTargets(msg)
            | Error::NotFound(msg)
            | Error::Ambiguous(msg)
            | Error::NotExposed(msg)
            | Error::HostNetworkRefused(msg)
            | Error::NoPodIp(msg)
            | Error::AttachFailed(msg)
            | Error::NotStarted(msg)
            | Error::InvalidCount(msg)
            | Error::UnsupportedCluster(msg)
            | Error::Generic(msg) => Some(msg.clone()),
            Error::ExecFailed { msg, stderr } => {
                Some(format!("{msg} (stderr: {stderr})"))
            }
            Error::Cancelled => Some("operation cancelled".to_owned()),
            Error::K8s(err) => Some(err.to_string()),
            Error::Io(err) => Some(err.to_string()),
            Error::SerdeJson(err) => Some(err.to_string()),
            Error::SerdeYaml(err) => Some(err.to_string()),
            Error::Config(err) => Some(err.to_string()),
            Error::TokioJoin(err) => Some(err.to_string()),
            Error::ParseInt(err) => Some(err.to_string()),
        }
    }

    /// True when this error came from a cancelled operation
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Append captured stderr onto an exec failure, preserving other kinds untouched
    ///
    /// # Arguments
    ///
    /// * `stderr` - The stderr captured from the agent's cleanup exec
    #[must_use]
    pub fn with_stderr(self, stderr: impl Into<String>) -> Self {
        match self {
            Error::ExecFailed { msg, .. } => Error::ExecFailed {
                msg,
                stderr: stderr.into(),
            },
            other => other,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.msg().unwrap_or_else(|| self.kind().to_owned()))
    }
}

impl std::error::Error for Error {}

impl From<kube::Error> for Error {
    fn from(error: kube::Error) -> Self {
        Error::K8s(error)
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::Io(error)
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::SerdeJson(error)
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(error: serde_yaml::Error) -> Self {
        Error::SerdeYaml(error)
    }
}

impl From<config::ConfigError> for Error {
    fn from(error: config::ConfigError) -> Self {
        Error::Config(error)
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(error: tokio::task::JoinError) -> Self {
        Error::TokioJoin(error)
    }
}

impl From<std::num::ParseIntError> for Error {
    fn from(error: std::num::ParseIntError) -> Self {
        Error::ParseInt(error)
    }
}
