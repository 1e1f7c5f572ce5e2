//! Service descriptors and the `IntOrString` sum type used for port references

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::api::core::v1::Service as K8sService;

/// A sum type over an integer or a string, used for port references
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntOrString {
    Int(i32),
    Str(String),
}

impl IntOrString {
    /// Try to read this value as an integer, parsing a string form if necessary
    #[must_use]
    pub fn as_int(&self) -> Option<i32> {
        match self {
            IntOrString::Int(value) => Some(*value),
            IntOrString::Str(value) => value.parse().ok(),
        }
    }

    /// True when this value is the integer zero (used to mean "unset" for requested ports)
    #[must_use]
    pub fn is_zero(&self) -> bool {
        matches!(self, IntOrString::Int(0))
    }

    /// True when this is the empty string, the closest this type has to "null"
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, IntOrString::Str(value) if value.is_empty())
    }
}

impl fmt::Display for IntOrString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntOrString::Int(value) => write!(f, "{value}"),
            IntOrString::Str(value) => write!(f, "{value}"),
        }
    }
}

impl From<k8s_openapi::apimachinery::pkg::util::intstr::IntOrString> for IntOrString {
    fn from(value: k8s_openapi::apimachinery::pkg::util::intstr::IntOrString) -> Self {
        use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString as K8sIntOrString;
        match value {
            K8sIntOrString::Int(value) => IntOrString::Int(value),
            K8sIntOrString::String(value) => IntOrString::Str(value),
        }
    }
}

/// One exposed port on a service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePort {
    pub name: Option<String>,
    pub port: i32,
    pub target_port: IntOrString,
}

/// A resolved service descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub name: String,
    pub namespace: String,
    pub ports: Vec<ServicePort>,
    pub selector: BTreeMap<String, String>,
}

impl ServiceDescriptor {
    /// Find the service port matching a requested port number or name
    ///
    /// # Arguments
    ///
    /// * `requested` - The service-facing port number; `0` means "pick the only one"
    #[must_use]
    pub fn find_port(&self, requested: i32) -> Option<&ServicePort> {
        self.ports.iter().find(|port| port.port == requested)
    }
}

impl From<&K8sService> for ServiceDescriptor {
    fn from(service: &K8sService) -> Self {
        let name = service.metadata.name.clone().unwrap_or_default();
        let namespace = service.metadata.namespace.clone().unwrap_or_default();
        let spec = service.spec.as_ref();
        let ports = spec
            .map(|s| {
                s.ports
                    .clone()
                    .unwrap_or_default()
                    .into_iter()
                    .map(|p| ServicePort {
                        name: p.name,
                        port: p.port,
                        target_port: p
                            .target_port
                            .map(IntOrString::from)
                            .unwrap_or(IntOrString::Int(p.port)),
                    })
                    .collect()
            })
            .unwrap_or_default();
        let selector = spec
            .and_then(|s| s.selector.clone())
            .unwrap_or_default()
            .into_iter()
            .collect();
        ServiceDescriptor {
            name,
            namespace,
            ports,
            selector,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_or_string_parses_and_renders() {
        assert_eq!(IntOrString::Str("8080".to_owned()).as_int(), Some(8080));
        assert_eq!(IntOrString::Str("http".to_owned()).as_int(), None);
        assert!(IntOrString::Int(0).is_zero());
        assert!(IntOrString::Str(String::new()).is_null());
        assert_eq!(IntOrString::Int(80).to_string(), "80");
    }

    #[test]
    fn finds_port_by_number() {
        let service = ServiceDescriptor {
            ports: vec![ServicePort {
                name: Some("http".to_owned()),
                port: 80,
                target_port: IntOrString::Int(8080),
            }],
            ..Default::default()
        };
        assert!(service.find_port(80).is_some());
        assert!(service.find_port(81).is_none());
    }
}
