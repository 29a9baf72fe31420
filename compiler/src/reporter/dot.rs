use std::fmt::Write as _;

use super::{Reporter, ReporterError};
use crate::CompileOutput;

#[derive(Clone, Copy, Debug, Default)]
pub struct DotReporter;

impl Reporter for DotReporter {
    type Artifact = String;

    fn emit(&self, output: &CompileOutput) -> Result<Self::Artifact, ReporterError> {
        Ok(render_dot(output))
    }
}

/// Render the node graph as a Graphviz DOT diagram. Edges point from consumer to producer.
pub fn render_dot(output: &CompileOutput) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "digraph nodes {{");
    let _ = writeln!(out, "  rankdir=RL;");

    for (node, _) in output.graph.adjacency() {
        let step = output.order.iter().position(|n| n == node);
        let _ = write!(out, "  \"");
        write_escaped(&mut out, node);
        let _ = write!(out, "\" [label=\"");
        write_escaped(&mut out, node);
        if let Some(step) = step {
            let _ = write!(out, "\\n#{}", step + 1);
        }
        let _ = writeln!(out, "\"];");
    }

    for (node, deps) in output.graph.adjacency() {
        for dep in deps {
            let _ = write!(out, "  \"");
            write_escaped(&mut out, node);
            let _ = write!(out, "\" -> \"");
            write_escaped(&mut out, dep);
            let _ = writeln!(out, "\";");
        }
    }

    let _ = writeln!(out, "}}");
    out
}

fn write_escaped(out: &mut String, s: &str) {
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            _ => out.push(ch),
        }
    }
}
