//! In-memory views of cluster pods, decoupled from the `k8s-openapi` wire types

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Pod as K8sPod;

/// The phase a pod is reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl From<Option<&str>> for PodPhase {
    fn from(raw: Option<&str>) -> Self {
        match raw {
            Some("Pending") => PodPhase::Pending,
            Some("Running") => PodPhase::Running,
            Some("Succeeded") => PodPhase::Succeeded,
            Some("Failed") => PodPhase::Failed,
            _ => PodPhase::Unknown,
        }
    }
}

/// A named port on a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerPort {
    pub name: Option<String>,
    pub port: i32,
}

/// A container as seen on a target pod
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodContainer {
    pub name: String,
    pub ports: Vec<ContainerPort>,
}

/// The running/waiting status of an ephemeral container already attached to a pod
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EphemeralContainerStatus {
    pub name: String,
    pub running: bool,
    pub waiting: bool,
}

/// A resolved target pod
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetPod {
    pub name: String,
    pub namespace: String,
    pub ip: Option<String>,
    pub containers: Vec<PodContainer>,
    pub host_network: bool,
    pub ephemeral_containers: Vec<EphemeralContainerStatus>,
    pub labels: BTreeMap<String, String>,
    pub phase: Option<PodPhase>,
}

impl TargetPod {
    /// Find a named container port on this pod
    ///
    /// # Arguments
    ///
    /// * `name` - The port name to look up
    #[must_use]
    pub fn find_named_port(&self, name: &str) -> Option<i32> {
        self.containers
            .iter()
            .flat_map(|container| &container.ports)
            .find(|port| port.name.as_deref() == Some(name))
            .map(|port| port.port)
    }

    /// Check whether this pod exposes a given numeric port on any container
    ///
    /// # Arguments
    ///
    /// * `port` - The numeric port to look up
    #[must_use]
    pub fn exposes_port(&self, port: i32) -> bool {
        self.containers
            .iter()
            .flat_map(|container| &container.ports)
            .any(|p| p.port == port)
    }

    /// Check whether an ephemeral container with the given name is already attached
    ///
    /// # Arguments
    ///
    /// * `name` - The ephemeral container name to look for
    #[must_use]
    pub fn has_ephemeral_container(&self, name: &str) -> bool {
        self.ephemeral_containers
            .iter()
            .any(|container| container.name == name)
    }
}

impl From<&K8sPod> for TargetPod {
    fn from(pod: &K8sPod) -> Self {
        let metadata = &pod.metadata;
        let name = metadata.name.clone().unwrap_or_default();
        let namespace = metadata.namespace.clone().unwrap_or_default();
        let labels = metadata
            .labels
            .clone()
            .unwrap_or_default()
            .into_iter()
            .collect();

        let spec = pod.spec.as_ref();
        let host_network = spec.and_then(|s| s.host_network).unwrap_or(false);
        let containers = spec
            .map(|s| {
                s.containers
                    .iter()
                    .map(|c| PodContainer {
                        name: c.name.clone(),
                        ports: c
                            .ports
                            .clone()
                            .unwrap_or_default()
                            .into_iter()
                            .map(|p| ContainerPort {
                                name: p.name,
                                port: p.container_port,
                            })
                            .collect(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let status = pod.status.as_ref();
        let ip = status.and_then(|s| s.pod_ip.clone());
        let phase = status.and_then(|s| s.phase.as_deref()).map(PodPhase::from);
        let ephemeral_containers = status
            .map(|s| {
                s.ephemeral_container_statuses
                    .clone()
                    .unwrap_or_default()
                    .into_iter()
                    .map(|c| EphemeralContainerStatus {
                        name: c.name,
                        running: c.state.as_ref().and_then(|st| st.running.as_ref()).is_some(),
                        waiting: c.state.as_ref().and_then(|st| st.waiting.as_ref()).is_some(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        TargetPod {
            name,
            namespace,
            ip,
            containers,
            host_network,
            ephemeral_containers,
            labels,
            phase,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pod_with_ports(ports: Vec<ContainerPort>) -> TargetPod {
        TargetPod {
            containers: vec![PodContainer {
                name: "app".to_owned(),
                ports,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn finds_named_port() {
        let pod = pod_with_ports(vec![ContainerPort {
            name: Some("http".to_owned()),
            port: 8080,
        }]);
        assert_eq!(pod.find_named_port("http"), Some(8080));
        assert_eq!(pod.find_named_port("grpc"), None);
    }

    #[test]
    fn detects_exposed_numeric_ports() {
        let pod = pod_with_ports(vec![ContainerPort {
            name: None,
            port: 80,
        }]);
        assert!(pod.exposes_port(80));
        assert!(!pod.exposes_port(81));
    }
}
