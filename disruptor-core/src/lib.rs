//! `disruptor-core` — target selection, agent fleet control, and the user-facing
//! fault-injection operations of the disruptor orchestrator.
//!
//! This crate embeds into a host process (a CLI, a test harness, a long-running
//! controller); it never runs standalone. The proxy the agent hosts inside a target's
//! network namespace lives in the sibling `disruptor-agent` binary crate.

pub mod agent;
pub mod commands;
pub mod conf;
pub mod controller;
pub mod error;
pub mod facade;
pub mod models;
pub mod pod_helper;
pub mod resolver;
pub mod tracing_setup;
pub mod visitor;

pub use conf::DisruptorConfig;
pub use error::Error;
pub use facade::Disruptor;
