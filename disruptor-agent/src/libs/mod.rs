//! The agent's in-pod fault-injection machinery: proxy core, handlers, and protocol faults

pub mod grpc_fault;
pub mod handler;
pub mod http_fault;
pub mod metrics;
pub mod network_drop;
pub mod proxy;
