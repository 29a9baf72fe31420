#![allow(unused_assignments)]

//! The orchestration model: components mapped to nodes, application instances, and the graph
//! of node dependencies derived from the capabilities components produce and consume.

pub mod application;
pub mod component;
mod error;
pub mod graph;
pub mod ir;
pub mod mapping;
pub mod refs;
pub mod value;

pub use application::{ApplicationInstance, NODES_PARAMETER, ProducedCapability};
pub use component::Component;
pub use error::Error;
pub use graph::{NodeGraph, ProducerPolicy};
pub use ir::{
    CapabilityReport, ComponentReport, EnvironmentReport, REPORT_SCHEMA, REPORT_VERSION,
    ReportError,
};
pub use mapping::ComponentMapping;
pub use refs::{CapabilityRef, ComponentRef, NODE_KIND, ResourceRef};
pub use value::Value;
