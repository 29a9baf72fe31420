use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use crate::{
    application::ApplicationInstance,
    graph::NodeGraph,
    refs::{CapabilityRef, ComponentRef},
};

pub const REPORT_SCHEMA: &str = "ensemble.environment.report";
pub const REPORT_VERSION: u32 = 1;

/// Serialisable result of compiling one environment: what deployment tooling consumes and
/// what the file-backed capability registry reads back.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentReport {
    pub schema: String,
    pub version: u32,
    pub environment: String,
    /// Instance ref -> component ref -> placement.
    pub applications: BTreeMap<String, BTreeMap<String, ComponentReport>>,
    pub capabilities: BTreeMap<String, CapabilityReport>,
    pub graph: BTreeMap<String, Vec<String>>,
    pub order: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComponentReport {
    pub produces: Vec<CapabilityRef>,
    pub consumes: Vec<CapabilityRef>,
    pub node: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapabilityReport {
    pub application: String,
    pub component: ComponentRef,
    pub node: String,
    #[serde(default)]
    pub parameters: Map<String, Json>,
}

impl EnvironmentReport {
    pub fn new(
        environment: impl Into<String>,
        instances: &[ApplicationInstance],
        graph: &NodeGraph,
        order: Vec<String>,
    ) -> Self {
        let mut applications = BTreeMap::new();
        let mut capabilities = BTreeMap::new();

        for instance in instances {
            let mapping = instance.mapping();
            let components = mapping
                .components()
                .iter()
                .map(|component| {
                    let report = ComponentReport {
                        produces: component.produces().to_vec(),
                        consumes: component.consumes().to_vec(),
                        node: mapping
                            .node_for(component.reference())
                            .unwrap_or_default()
                            .to_string(),
                    };
                    (component.reference().to_string(), report)
                })
                .collect();
            applications.insert(instance.reference().to_string(), components);

            for produced in instance.capabilities() {
                capabilities
                    .entry(produced.capability.to_string())
                    .or_insert_with(|| CapabilityReport {
                        application: instance.reference().to_string(),
                        component: produced.component.clone(),
                        node: mapping
                            .node_for(&produced.component)
                            .unwrap_or_default()
                            .to_string(),
                        parameters: produced
                            .attributes
                            .iter()
                            .map(|(name, value)| (name.clone(), value.to_json()))
                            .collect(),
                    });
            }
        }

        let graph = graph
            .adjacency()
            .map(|(node, deps)| (node.to_string(), deps.iter().cloned().collect()))
            .collect();

        Self {
            schema: REPORT_SCHEMA.to_string(),
            version: REPORT_VERSION,
            environment: environment.into(),
            applications,
            capabilities,
            graph,
            order,
        }
    }

    /// Parse and check the schema/version header.
    pub fn from_json(input: &str) -> Result<Self, ReportError> {
        let report: Self = serde_json::from_str(input)?;
        if report.schema != REPORT_SCHEMA {
            return Err(ReportError::SchemaMismatch {
                expected: REPORT_SCHEMA,
                actual: report.schema,
            });
        }
        if report.version != REPORT_VERSION {
            return Err(ReportError::VersionMismatch {
                expected: REPORT_VERSION,
                actual: report.version,
            });
        }
        Ok(report)
    }

    pub fn capability(&self, capability: &CapabilityRef) -> Option<&CapabilityReport> {
        self.capabilities.get(&capability.to_string())
    }
}

#[allow(unused_assignments)]
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[non_exhaustive]
pub enum ReportError {
    #[error("invalid environment report: {0}")]
    #[diagnostic(code(scenario::report::invalid_json))]
    Json(#[from] serde_json::Error),
    #[error("environment report schema mismatch: expected {expected}, got {actual}")]
    #[diagnostic(code(scenario::report::schema_mismatch))]
    SchemaMismatch {
        expected: &'static str,
        actual: String,
    },
    #[error("environment report version mismatch: expected {expected}, got {actual}")]
    #[diagnostic(code(scenario::report::version_mismatch))]
    VersionMismatch { expected: u32, actual: u32 },
}
