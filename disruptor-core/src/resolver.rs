//! Pod/service resolution and service-port mapping (C1)

use tracing::instrument;

use crate::models::{PodSelector, ServiceDescriptor, TargetPod};
use crate::pod_helper::PodHelper;
use crate::Error;

/// Resolves a declarative selector (or a service name) into a concrete set of target pods
pub struct Resolver<'a> {
    helper: &'a dyn PodHelper,
}

impl<'a> Resolver<'a> {
    /// Build a resolver over a pod helper
    ///
    /// # Arguments
    ///
    /// * `helper` - The pod helper used to list pods and fetch services
    #[must_use]
    pub fn new(helper: &'a dyn PodHelper) -> Self {
        Resolver { helper }
    }

    /// Resolve a label selector into its matching pods
    ///
    /// # Arguments
    ///
    /// * `selector` - The selector to resolve
    #[instrument(name = "Resolver::resolve", skip(self), fields(selector = %selector), err(Debug))]
    pub async fn resolve(&self, selector: &PodSelector) -> Result<Vec<TargetPod>, Error> {
        selector.validate()?;
        let pods = self.helper.list(selector).await?;
        if pods.is_empty() {
            return Err(Error::NoTargets(format!("no pods matched {selector}")));
        }
        Ok(pods)
    }

    /// Resolve the pods backing a named service
    ///
    /// # Arguments
    ///
    /// * `name` - The service name
    /// * `namespace` - The namespace the service lives in
    #[instrument(name = "Resolver::resolve_service", skip(self), err(Debug))]
    pub async fn resolve_service(
        &self,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<(ServiceDescriptor, Vec<TargetPod>), Error> {
        let service = self.helper.get_service(name).await?;
        let selector = PodSelector::new(
            namespace.map(ToOwned::to_owned),
            service.selector.clone(),
            Default::default(),
        );
        let pods = self.helper.list(&selector).await?;
        if pods.is_empty() {
            return Err(Error::NoTargets(format!(
                "service {name} matched no pods via its selector"
            )));
        }
        Ok((service, pods))
    }
}

/// Map a requested service port onto the pod's concrete container port
///
/// # Arguments
///
/// * `service` - The service descriptor to map the port through
/// * `requested` - The port requested on the service; `0` means "the only exposed port"
/// * `pod` - The pod to resolve the target port against
pub fn map_port(
    service: &ServiceDescriptor,
    requested: i32,
    pod: &TargetPod,
) -> Result<i32, Error> {
    let port = if requested == 0 {
        match service.ports.as_slice() {
            [only] => only,
            _ => {
                return Err(Error::Ambiguous(format!(
                    "service {} exposes {} ports; an explicit port is required",
                    service.name,
                    service.ports.len()
                )))
            }
        }
    } else {
        service.find_port(requested).ok_or_else(|| {
            Error::NotExposed(format!("service {} has no port {requested}", service.name))
        })?
    };

    match port.target_port.as_int() {
        Some(value) if !port.target_port.is_null() => Ok(value),
        _ => {
            let name = port.target_port.to_string();
            pod.find_named_port(&name).ok_or_else(|| {
                Error::NotExposed(format!(
                    "pod {} has no port named {name}",
                    pod.name
                ))
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IntOrString, ServicePort};

    fn pod_with_named_port(name: &str, port: i32) -> TargetPod {
        use crate::models::{ContainerPort, PodContainer};
        TargetPod {
            name: "pod-a".to_owned(),
            containers: vec![PodContainer {
                name: "app".to_owned(),
                ports: vec![ContainerPort {
                    name: Some(name.to_owned()),
                    port,
                }],
            }],
            ..Default::default()
        }
    }

    #[test]
    fn map_port_zero_requires_single_port_service() {
        let service = ServiceDescriptor {
            name: "svc".to_owned(),
            ports: vec![ServicePort {
                name: Some("http".to_owned()),
                port: 80,
                target_port: IntOrString::Int(8080),
            }],
            ..Default::default()
        };
        let pod = TargetPod::default();
        assert_eq!(map_port(&service, 0, &pod).unwrap(), 8080);
    }

    #[test]
    fn map_port_zero_fails_when_ambiguous() {
        let service = ServiceDescriptor {
            name: "svc".to_owned(),
            ports: vec![
                ServicePort {
                    name: Some("http".to_owned()),
                    port: 80,
                    target_port: IntOrString::Int(8080),
                },
                ServicePort {
                    name: Some("grpc".to_owned()),
                    port: 3000,
                    target_port: IntOrString::Int(3000),
                },
            ],
            ..Default::default()
        };
        let pod = TargetPod::default();
        match map_port(&service, 0, &pod) {
            Err(Error::Ambiguous(_)) => {}
            other => panic!("expected Ambiguous, got {other:?}"),
        }
    }

    #[test]
    fn map_port_resolves_named_target_port_against_pod() {
        let service = ServiceDescriptor {
            name: "svc".to_owned(),
            ports: vec![ServicePort {
                name: Some("http".to_owned()),
                port: 80,
                target_port: IntOrString::Str("web".to_owned()),
            }],
            ..Default::default()
        };
        let pod = pod_with_named_port("web", 9090);
        assert_eq!(map_port(&service, 80, &pod).unwrap(), 9090);
    }

    #[test]
    fn map_port_fails_when_named_port_absent_on_pod() {
        let service = ServiceDescriptor {
            name: "svc".to_owned(),
            ports: vec![ServicePort {
                name: Some("http".to_owned()),
                port: 80,
                target_port: IntOrString::Str("web".to_owned()),
            }],
            ..Default::default()
        };
        let pod = TargetPod::default();
        match map_port(&service, 80, &pod) {
            Err(Error::NotExposed(_)) => {}
            other => panic!("expected NotExposed, got {other:?}"),
        }
    }
}
