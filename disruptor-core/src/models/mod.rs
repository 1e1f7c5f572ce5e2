//! Data types shared across the resolver, controller, command builders, and proxy

mod command;
mod connection;
mod fault;
mod pod;
mod selector;
mod service;

pub use command::VisitCommand;
pub use connection::ConnectionMeta;
pub use fault::{
    Count, DisruptionOptions, GrpcFault, HttpFault, NetworkFault, PodTerminationFault, Protocol,
};
pub use pod::{ContainerPort, EphemeralContainerStatus, PodContainer, PodPhase, TargetPod};
pub use selector::PodSelector;
pub use service::{IntOrString, ServiceDescriptor, ServicePort};
