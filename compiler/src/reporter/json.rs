use super::{Reporter, ReporterError};
use crate::CompileOutput;

/// The environment report as pretty JSON, the form the file registry backend reads back.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonReporter;

impl Reporter for JsonReporter {
    type Artifact = String;

    fn emit(&self, output: &CompileOutput) -> Result<Self::Artifact, ReporterError> {
        let mut out = serde_json::to_string_pretty(&output.report())
            .map_err(|e| ReporterError::Other(format!("failed to render report: {e}")))?;
        out.push('\n');
        Ok(out)
    }
}
