use miette::Diagnostic;
use thiserror::Error;

use crate::CompileOutput;

pub mod dot;
pub mod json;
pub mod plan;
pub mod text;

pub use dot::DotReporter;
pub use json::JsonReporter;
pub use plan::PlanReporter;
pub use text::TextReporter;

#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum ReporterError {
    #[error("reporter error: {0}")]
    #[diagnostic(code(reporter::error))]
    Other(String),
}

pub trait Reporter {
    type Artifact;

    fn emit(&self, output: &CompileOutput) -> Result<Self::Artifact, ReporterError>;
}
