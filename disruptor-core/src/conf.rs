//! Configuration for the disruptor orchestrator

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::Error;

/// How chatty logging should be
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl LogLevel {
    /// Cast this log level to a `tracing` filter
    #[must_use]
    pub fn to_filter(self) -> tracing_subscriber::filter::LevelFilter {
        match self {
            LogLevel::Off => tracing_subscriber::filter::LevelFilter::OFF,
            LogLevel::Error => tracing_subscriber::filter::LevelFilter::ERROR,
            LogLevel::Warn => tracing_subscriber::filter::LevelFilter::WARN,
            LogLevel::Info => tracing_subscriber::filter::LevelFilter::INFO,
            LogLevel::Debug => tracing_subscriber::filter::LevelFilter::DEBUG,
            LogLevel::Trace => tracing_subscriber::filter::LevelFilter::TRACE,
        }
    }
}

/// The tracing config shared by both `disruptor-core` embedders and the agent binary
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct TracingConfig {
    /// The log level to emit at on stdout/stderr
    #[serde(default)]
    pub level: LogLevel,
}

impl TracingConfig {
    /// Load a tracing config from a YAML file, falling back to defaults if missing
    ///
    /// # Arguments
    ///
    /// * `path` - The path to load this tracing config from
    pub fn from_file(path: &str) -> Result<Self, Error> {
        if !std::path::Path::new(path).exists() {
            return Ok(TracingConfig::default());
        }
        let conf = config::Config::builder()
            .add_source(config::File::new(path, config::FileFormat::Yaml))
            .add_source(config::Environment::with_prefix("TRACING").separator("__"))
            .build()?
            .try_deserialize()?;
        Ok(conf)
    }
}

/// Orchestrator-wide settings: timeouts, the agent image, and the default namespace
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DisruptorConfig {
    /// How long to wait for the ephemeral agent container to reach `Running`
    #[serde(default = "DisruptorConfig::default_attach_timeout", with = "duration_secs")]
    pub attach_timeout: Duration,
    /// The default grace period used for pod termination when a fault doesn't set one
    #[serde(
        default = "DisruptorConfig::default_termination_timeout",
        with = "duration_secs"
    )]
    pub termination_timeout: Duration,
    /// The container image repository the agent ephemeral container is pulled from
    #[serde(default = "DisruptorConfig::default_agent_image")]
    pub agent_image: String,
    /// The image tag to use when the caller's own build identifier cannot be determined
    #[serde(default = "DisruptorConfig::default_agent_tag")]
    pub agent_tag: String,
    /// The namespace used when a selector doesn't set one
    #[serde(default = "DisruptorConfig::default_namespace")]
    pub namespace: String,
    /// Tracing settings
    #[serde(default)]
    pub tracing: TracingConfig,
}

impl DisruptorConfig {
    fn default_attach_timeout() -> Duration {
        Duration::from_secs(30)
    }

    fn default_termination_timeout() -> Duration {
        Duration::from_secs(10)
    }

    fn default_agent_image() -> String {
        "ghcr.io/grafana/xk6-disruptor-agent".to_owned()
    }

    fn default_agent_tag() -> String {
        "latest".to_owned()
    }

    fn default_namespace() -> String {
        "default".to_owned()
    }

    /// Load a config from a YAML file, layering environment variables (prefix `DISRUPTOR`) on top
    ///
    /// # Arguments
    ///
    /// * `path` - The path to load this config from
    pub fn from_file(path: &str) -> Result<Self, Error> {
        let conf = config::Config::builder()
            .add_source(config::File::new(path, config::FileFormat::Yaml))
            .add_source(config::Environment::with_prefix("DISRUPTOR").separator("__"))
            .build()?
            .try_deserialize()?;
        Ok(conf)
    }
}

impl Default for DisruptorConfig {
    fn default() -> Self {
        DisruptorConfig {
            attach_timeout: Self::default_attach_timeout(),
            termination_timeout: Self::default_termination_timeout(),
            agent_image: Self::default_agent_image(),
            agent_tag: Self::default_agent_tag(),
            namespace: Self::default_namespace(),
            tracing: TracingConfig::default(),
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let conf = DisruptorConfig::default();
        assert_eq!(conf.attach_timeout, Duration::from_secs(30));
        assert_eq!(conf.termination_timeout, Duration::from_secs(10));
        assert_eq!(conf.namespace, "default");
    }
}
