use std::collections::BTreeMap;

use miette::Diagnostic;
use thiserror::Error;

use crate::refs::{CapabilityRef, ComponentRef};

#[allow(unused_assignments)]
#[derive(Clone, Debug, Error, Diagnostic, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid resource reference `{0}`")]
    #[diagnostic(
        code(scenario::invalid_resource_ref),
        help("Resource references have the form `Kind[name]`.")
    )]
    InvalidResourceRef(String),

    #[error("invalid mapping {left} => {right}; {reason}")]
    #[diagnostic(code(scenario::invalid_mapping))]
    InvalidMapping {
        left: String,
        right: String,
        reason: &'static str,
    },

    #[error("node mapping of `{application}` must be a hash of nodes to components, found {found}")]
    #[diagnostic(code(scenario::malformed_node_mapping))]
    MalformedNodeMapping {
        application: String,
        found: &'static str,
    },

    #[error("component {component} mapped to two nodes: Node[{first}] and Node[{second}]")]
    #[diagnostic(code(scenario::duplicate_mapping))]
    DuplicateMapping {
        component: ComponentRef,
        first: String,
        second: String,
    },

    #[error("application {application} has no `nodes` argument")]
    #[diagnostic(
        code(scenario::missing_node_mapping),
        help("Pass `nodes` as a hash of `Node[...]` references to the components they host.")
    )]
    MissingNodeMapping { application: String },

    #[error("{component} on Node[{node}] consumes {capability} but nobody produces it")]
    #[diagnostic(code(scenario::unresolved_capability))]
    UnresolvedCapability {
        component: ComponentRef,
        node: String,
        capability: CapabilityRef,
    },

    #[error("{capability} is produced by more than one component: {}", join(.producers))]
    #[diagnostic(
        code(scenario::ambiguous_producer),
        help("Each capability must have exactly one producer under the `unique` producer policy.")
    )]
    AmbiguousProducer {
        capability: CapabilityRef,
        producers: Vec<ComponentRef>,
    },

    #[error(
        "node graph has cycles: {} (unordered: {})",
        .cycle.join(" -> "),
        describe_remaining(.remaining)
    )]
    #[diagnostic(
        code(scenario::cycle_detected),
        help("Break the cycle by moving a producer or consumer to another node.")
    )]
    CycleDetected {
        /// Nodes that could not be ordered, with the dependencies still unsatisfied.
        remaining: BTreeMap<String, Vec<String>>,
        /// One concrete cycle, first node repeated at the end.
        cycle: Vec<String>,
    },
}

fn join(refs: &[ComponentRef]) -> String {
    refs.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_remaining(remaining: &BTreeMap<String, Vec<String>>) -> String {
    remaining
        .iter()
        .map(|(node, deps)| format!("{node} -> [{}]", deps.join(", ")))
        .collect::<Vec<_>>()
        .join("; ")
}
