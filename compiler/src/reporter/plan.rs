use super::{Reporter, ReporterError};
use crate::CompileOutput;

pub const DEFAULT_COMMAND: &str = "puppet agent --test --environment {environment} # {node}";

/// One command per node, in run order.
///
/// `{node}` and `{environment}` in the template are replaced; the template must mention
/// `{node}`, otherwise every line would be the same command.
#[derive(Clone, Debug)]
pub struct PlanReporter {
    template: String,
}

impl PlanReporter {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }
}

impl Default for PlanReporter {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND)
    }
}

impl Reporter for PlanReporter {
    type Artifact = Vec<String>;

    fn emit(&self, output: &CompileOutput) -> Result<Self::Artifact, ReporterError> {
        if !self.template.contains("{node}") {
            return Err(ReporterError::Other(format!(
                "command template `{}` does not mention {{node}}",
                self.template
            )));
        }
        Ok(output
            .order
            .iter()
            .map(|node| {
                self.template
                    .replace("{environment}", &output.environment)
                    .replace("{node}", node)
            })
            .collect())
    }
}
