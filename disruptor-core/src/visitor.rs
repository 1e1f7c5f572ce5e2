//! Per-pod operations executed by the controller's fan-out (C4)

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{event, instrument, Level};

use crate::agent::{self, agent_container_spec, AGENT_CONTAINER_NAME};
use crate::commands::build_cleanup_cmd;
use crate::conf::DisruptorConfig;
use crate::models::{TargetPod, VisitCommand};
use crate::pod_helper::PodHelper;
use crate::Error;

/// A single-pod operation run by one controller worker
#[async_trait]
pub trait Visitor: Send + Sync {
    /// Perform this visitor's operation against one resolved pod
    async fn visit(&self, token: CancellationToken, pod: &TargetPod) -> Result<(), Error>;
}

/// Produces the per-pod exec/cleanup command pair for a fault, or refuses the pod
pub trait CommandProducer: Send + Sync {
    /// Compute the command pair for this pod, or a classified refusal error
    ///
    /// # Arguments
    ///
    /// * `pod` - The pod to build a command for
    fn command_for(&self, pod: &TargetPod) -> Result<VisitCommand, Error>;
}

/// Refuse pods with no IP yet, or that run on the host network, before building a command
///
/// # Arguments
///
/// * `pod` - The candidate pod
/// * `refuse_host_network` - Whether host-networked pods must be refused (true for HTTP/gRPC)
pub fn guard_pod(pod: &TargetPod, refuse_host_network: bool) -> Result<&str, Error> {
    if refuse_host_network && pod.host_network {
        return Err(Error::HostNetworkRefused(format!(
            "pod {} uses the host network",
            pod.name
        )));
    }
    pod.ip.as_deref().ok_or_else(|| {
        Error::NoPodIp(format!("pod {} has not been assigned an IP", pod.name))
    })
}

/// Attaches the agent then runs a fault-specific command, cleaning up on failure (C4.1)
pub struct AgentVisitor {
    helper: Arc<dyn PodHelper>,
    producer: Arc<dyn CommandProducer>,
    conf: DisruptorConfig,
    build_id: Option<String>,
}

impl AgentVisitor {
    /// Build an agent visitor
    ///
    /// # Arguments
    ///
    /// * `helper` - The pod helper used to attach and exec
    /// * `producer` - The fault-specific command producer
    /// * `conf` - Orchestrator-wide config (attach timeout, agent image)
    /// * `build_id` - The caller's own build identifier, used as the image tag
    #[must_use]
    pub fn new(
        helper: Arc<dyn PodHelper>,
        producer: Arc<dyn CommandProducer>,
        conf: DisruptorConfig,
        build_id: Option<String>,
    ) -> Self {
        AgentVisitor {
            helper,
            producer,
            conf,
            build_id,
        }
    }
}

#[async_trait]
impl Visitor for AgentVisitor {
    #[instrument(name = "AgentVisitor::visit", skip_all, fields(pod = %pod.name), err(Debug))]
    async fn visit(&self, token: CancellationToken, pod: &TargetPod) -> Result<(), Error> {
        let command = self.producer.command_for(pod)?;
        let spec = agent_container_spec(&self.conf, self.build_id.as_deref(), command.exec.clone());

        agent::attach(self.helper.as_ref(), &pod.name, &spec, self.conf.attach_timeout).await?;

        let exec = self.exec_cancellable(token, pod, &command.exec);
        match exec.await {
            Ok(_) => Ok(()),
            Err(err) if err.is_cancelled() => Err(err),
            Err(err) => {
                // cleanup must run even if the operation was cancelled, on a fresh token
                let stderr = self.run_cleanup(pod, &command.cleanup).await;
                Err(match stderr {
                    Some(stderr) => err.with_stderr(stderr),
                    None => err,
                })
            }
        }
    }
}

impl AgentVisitor {
    async fn exec_cancellable(
        &self,
        token: CancellationToken,
        pod: &TargetPod,
        argv: &[String],
    ) -> Result<(String, String), Error> {
        tokio::select! {
            biased;
            () = token.cancelled() => Err(Error::Cancelled),
            result = self.helper.exec(&pod.name, AGENT_CONTAINER_NAME, argv) => result,
        }
    }

    /// Run the cleanup argv on a best-effort basis, on a fresh (uncancelled) context
    async fn run_cleanup(&self, pod: &TargetPod, cleanup: &[String]) -> Option<String> {
        let cleanup = if cleanup.is_empty() {
            build_cleanup_cmd()
        } else {
            cleanup.to_vec()
        };
        match self.helper.exec(&pod.name, AGENT_CONTAINER_NAME, &cleanup).await {
            Ok((_, stderr)) => {
                if !stderr.is_empty() {
                    Some(stderr)
                } else {
                    None
                }
            }
            Err(err) => {
                event!(Level::WARN, pod = %pod.name, error = %err, msg = "cleanup exec failed");
                err.msg()
            }
        }
    }
}

/// Terminates a pod outright (C4.2)
pub struct TerminationVisitor {
    helper: Arc<dyn PodHelper>,
    timeout: Duration,
}

impl TerminationVisitor {
    /// Build a termination visitor
    ///
    /// # Arguments
    ///
    /// * `helper` - The pod helper used to delete pods
    /// * `timeout` - The grace period; `0` defaults to 10s per §4.4
    #[must_use]
    pub fn new(helper: Arc<dyn PodHelper>, timeout: Duration) -> Self {
        let timeout = if timeout.is_zero() {
            Duration::from_secs(10)
        } else {
            timeout
        };
        TerminationVisitor { helper, timeout }
    }
}

#[async_trait]
impl Visitor for TerminationVisitor {
    #[instrument(name = "TerminationVisitor::visit", skip_all, fields(pod = %pod.name), err(Debug))]
    async fn visit(&self, _token: CancellationToken, pod: &TargetPod) -> Result<(), Error> {
        self.helper.terminate(&pod.name, self.timeout).await?;
        event!(Level::INFO, pod = %pod.name, msg = "pod terminated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_pod_refuses_host_network() {
        let pod = TargetPod {
            host_network: true,
            ip: Some("10.0.0.1".to_owned()),
            ..Default::default()
        };
        assert!(matches!(
            guard_pod(&pod, true),
            Err(Error::HostNetworkRefused(_))
        ));
    }

    #[test]
    fn guard_pod_refuses_missing_ip() {
        let pod = TargetPod::default();
        assert!(matches!(guard_pod(&pod, true), Err(Error::NoPodIp(_))));
    }

    #[test]
    fn guard_pod_allows_host_network_for_termination() {
        let pod = TargetPod {
            host_network: true,
            ip: Some("10.0.0.1".to_owned()),
            ..Default::default()
        };
        assert!(guard_pod(&pod, false).is_ok());
    }

    #[test]
    fn termination_visitor_defaults_zero_timeout_to_ten_seconds() {
        let helper: Arc<dyn PodHelper> = Arc::new(crate::pod_helper::tests_support::NoopHelper);
        let visitor = TerminationVisitor::new(helper, Duration::ZERO);
        assert_eq!(visitor.timeout, Duration::from_secs(10));
    }
}
