//! The user-visible disruptor operations (C10)

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use tokio_util::sync::CancellationToken;
use tracing::{event, instrument, Level};

use crate::commands::{build_cleanup_cmd, build_grpc_cmd, build_http_cmd, build_network_drop_cmd};
use crate::conf::DisruptorConfig;
use crate::controller::PodController;
use crate::models::{
    DisruptionOptions, GrpcFault, HttpFault, NetworkFault, PodSelector, PodTerminationFault,
    TargetPod, VisitCommand,
};
use crate::pod_helper::PodHelper;
use crate::resolver::{map_port, Resolver};
use crate::visitor::{guard_pod, AgentVisitor, CommandProducer, TerminationVisitor};
use crate::Error;

/// What a disruptor instance was bound to at construction time
enum Target {
    Selector(PodSelector),
    Service { name: String, namespace: Option<String>, port: i32 },
}

/// Binds a selector (or a service) and a cluster accessor together; stateless between operations
pub struct Disruptor {
    helper: Arc<dyn PodHelper>,
    target: Target,
    conf: DisruptorConfig,
    build_id: Option<String>,
}

impl Disruptor {
    /// Build a disruptor bound to a label selector
    ///
    /// # Arguments
    ///
    /// * `helper` - The pod helper used for every cluster interaction
    /// * `selector` - The selector this disruptor resolves targets with
    /// * `conf` - Orchestrator-wide config
    #[must_use]
    pub fn new(helper: Arc<dyn PodHelper>, selector: PodSelector, conf: DisruptorConfig) -> Self {
        Disruptor {
            helper,
            target: Target::Selector(selector),
            conf,
            build_id: None,
        }
    }

    /// Build a disruptor bound to a service; the service's own selector resolves pods,
    /// and `port` (possibly `0`) is mapped per-pod once per operation (§4.10)
    ///
    /// # Arguments
    ///
    /// * `helper` - The pod helper used for every cluster interaction
    /// * `service` - The service name to resolve pods through
    /// * `namespace` - The namespace the service lives in
    /// * `port` - The service-facing port to map; `0` requires a single-port service
    /// * `conf` - Orchestrator-wide config
    #[must_use]
    pub fn for_service(
        helper: Arc<dyn PodHelper>,
        service: impl Into<String>,
        namespace: Option<String>,
        port: i32,
        conf: DisruptorConfig,
    ) -> Self {
        Disruptor {
            helper,
            target: Target::Service {
                name: service.into(),
                namespace,
                port,
            },
            conf,
            build_id: None,
        }
    }

    /// Set the build identifier used as the agent image tag
    #[must_use]
    pub fn with_build_id(mut self, build_id: impl Into<String>) -> Self {
        self.build_id = Some(build_id.into());
        self
    }

    /// Resolve this disruptor's current targets, mapping the service port per-pod if bound
    /// to a service
    async fn resolve(&self) -> Result<(Vec<TargetPod>, Option<HashMap<String, i32>>), Error> {
        let resolver = Resolver::new(self.helper.as_ref());
        match &self.target {
            Target::Selector(selector) => Ok((resolver.resolve(selector).await?, None)),
            Target::Service { name, namespace, port } => {
                let (service, pods) = resolver
                    .resolve_service(name, namespace.as_deref())
                    .await?;
                let mut mapped = HashMap::with_capacity(pods.len());
                for pod in &pods {
                    let concrete = map_port(&service, *port, pod)?;
                    mapped.insert(pod.name.clone(), concrete);
                }
                Ok((pods, Some(mapped)))
            }
        }
    }

    /// Return the names of the currently resolved target pods, resolving on call
    #[instrument(name = "Disruptor::targets", skip(self), err(Debug))]
    pub async fn targets(&self) -> Result<Vec<String>, Error> {
        let (pods, _) = self.resolve().await?;
        Ok(pods.into_iter().map(|pod| pod.name).collect())
    }

    /// Inject an HTTP fault across the resolved targets for the given duration
    #[instrument(name = "Disruptor::inject_http_faults", skip_all, err(Debug))]
    pub async fn inject_http_faults(
        &self,
        token: CancellationToken,
        fault: HttpFault,
        duration: Duration,
        opts: DisruptionOptions,
    ) -> Result<(), Error> {
        let (pods, ports) = self.resolve().await?;
        let producer = Arc::new(HttpCommandProducer {
            fault,
            duration,
            opts,
            port_overrides: ports,
        });
        self.run_agent_operation(token, pods, producer).await
    }

    /// Inject a gRPC fault across the resolved targets for the given duration
    #[instrument(name = "Disruptor::inject_grpc_faults", skip_all, err(Debug))]
    pub async fn inject_grpc_faults(
        &self,
        token: CancellationToken,
        fault: GrpcFault,
        duration: Duration,
        opts: DisruptionOptions,
    ) -> Result<(), Error> {
        let (pods, ports) = self.resolve().await?;
        let producer = Arc::new(GrpcCommandProducer {
            fault,
            duration,
            opts,
            port_overrides: ports,
        });
        self.run_agent_operation(token, pods, producer).await
    }

    /// Drop network traffic across the resolved targets for the given duration
    #[instrument(name = "Disruptor::inject_network_fault", skip_all, err(Debug))]
    pub async fn inject_network_fault(
        &self,
        token: CancellationToken,
        fault: NetworkFault,
        duration: Duration,
    ) -> Result<(), Error> {
        let (pods, _) = self.resolve().await?;
        let producer = Arc::new(NetworkDropCommandProducer { fault, duration });
        self.run_agent_operation(token, pods, producer).await
    }

    /// Sample `fault.count` resolved targets and terminate them
    #[instrument(name = "Disruptor::terminate_pods", skip_all, err(Debug))]
    pub async fn terminate_pods(
        &self,
        token: CancellationToken,
        fault: PodTerminationFault,
    ) -> Result<(), Error> {
        let (mut pods, _) = self.resolve().await?;
        let sample_size = fault.count.resolve(pods.len());
        pods.shuffle(&mut rand::rng());
        pods.truncate(sample_size);
        event!(Level::INFO, count = sample_size, msg = "sampled pods for termination");

        let controller = PodController::new(pods);
        let visitor = Arc::new(TerminationVisitor::new(Arc::clone(&self.helper), fault.timeout));
        controller.visit(token, visitor).await
    }

    async fn run_agent_operation(
        &self,
        token: CancellationToken,
        pods: Vec<TargetPod>,
        producer: Arc<dyn CommandProducer>,
    ) -> Result<(), Error> {
        let controller = PodController::new(pods);
        let visitor = Arc::new(AgentVisitor::new(
            Arc::clone(&self.helper),
            producer,
            self.conf.clone(),
            self.build_id.clone(),
        ));
        controller.visit(token, visitor).await
    }
}

struct HttpCommandProducer {
    fault: HttpFault,
    duration: Duration,
    opts: DisruptionOptions,
    port_overrides: Option<HashMap<String, i32>>,
}

impl CommandProducer for HttpCommandProducer {
    fn command_for(&self, pod: &TargetPod) -> Result<VisitCommand, Error> {
        let ip = guard_pod(pod, true)?;
        let mut fault = self.fault.clone();
        if let Some(overrides) = &self.port_overrides {
            fault.port = overrides.get(&pod.name).copied();
        }
        if let Some(port) = fault.port {
            if !pod.exposes_port(port) {
                return Err(Error::NotExposed(format!(
                    "pod {} does not expose port {port}",
                    pod.name
                )));
            }
        }
        let exec = build_http_cmd(ip, &fault, self.duration, &self.opts);
        Ok(VisitCommand::new(exec, build_cleanup_cmd()))
    }
}

struct GrpcCommandProducer {
    fault: GrpcFault,
    duration: Duration,
    opts: DisruptionOptions,
    port_overrides: Option<HashMap<String, i32>>,
}

impl CommandProducer for GrpcCommandProducer {
    fn command_for(&self, pod: &TargetPod) -> Result<VisitCommand, Error> {
        let ip = guard_pod(pod, true)?;
        let mut fault = self.fault.clone();
        if let Some(overrides) = &self.port_overrides {
            fault.port = overrides.get(&pod.name).copied();
        }
        if let Some(port) = fault.port {
            if !pod.exposes_port(port) {
                return Err(Error::NotExposed(format!(
                    "pod {} does not expose port {port}",
                    pod.name
                )));
            }
        }
        let exec = build_grpc_cmd(ip, &fault, self.duration, &self.opts);
        Ok(VisitCommand::new(exec, build_cleanup_cmd()))
    }
}

struct NetworkDropCommandProducer {
    fault: NetworkFault,
    duration: Duration,
}

impl CommandProducer for NetworkDropCommandProducer {
    fn command_for(&self, pod: &TargetPod) -> Result<VisitCommand, Error> {
        // network drops aren't protocol faults; host-network pods are still refused because
        // the agent's iptables rules assume a pod-private network namespace (§3)
        guard_pod(pod, true)?;
        let exec = build_network_drop_cmd(&self.fault, self.duration);
        Ok(VisitCommand::new(exec, build_cleanup_cmd()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pod_helper::tests_support::NoopHelper;

    #[tokio::test]
    async fn targets_surfaces_no_targets_error_on_empty_selector_match() {
        let disruptor = Disruptor::new(
            Arc::new(NoopHelper),
            PodSelector::new(Some("default".to_owned()), Default::default(), Default::default()),
            DisruptorConfig::default(),
        );
        let err = disruptor.targets().await.unwrap_err();
        assert!(matches!(err, Error::NoTargets(_)));
    }
}
