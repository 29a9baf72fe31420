use std::fmt::Write as _;

use super::{Reporter, ReporterError};
use crate::CompileOutput;

/// Human readable summary: instances with their placements, the node graph and the run order.
#[derive(Clone, Copy, Debug, Default)]
pub struct TextReporter;

impl Reporter for TextReporter {
    type Artifact = String;

    fn emit(&self, output: &CompileOutput) -> Result<Self::Artifact, ReporterError> {
        Ok(render_text(output))
    }
}

pub fn render_text(output: &CompileOutput) -> String {
    let mut out = String::new();

    for instance in &output.instances {
        let _ = writeln!(out, "{}", instance.reference());
        let mapping = instance.mapping();
        for component in mapping.components() {
            let node = mapping.node_for(component.reference()).unwrap_or("?");
            let _ = writeln!(out, "  {} => Node[{node}]", component.reference());
            for capability in component.produces() {
                let _ = writeln!(out, "    produces {capability}");
            }
            for capability in component.consumes() {
                let _ = writeln!(out, "    consumes {capability}");
            }
        }
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "Node graph:");
    for (node, deps) in output.graph.adjacency() {
        let deps = deps
            .iter()
            .filter(|dep| *dep != node)
            .map(String::as_str)
            .collect::<Vec<_>>();
        if deps.is_empty() {
            let _ = writeln!(out, "  {node} (root)");
        } else {
            let _ = writeln!(out, "  {node} -> {}", deps.join(", "));
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Run order ({}):", output.environment);
    for (idx, node) in output.order.iter().enumerate() {
        let _ = writeln!(out, "  {}. {node}", idx + 1);
    }
    out
}
