#![allow(unused_assignments)]

#[cfg(test)]
mod tests;

pub mod catalog;
mod driver;
mod error;
pub mod eval;
pub mod reporter;
pub mod scope;

use ensemble_manifest::Manifest;
use ensemble_scenario::{ApplicationInstance, EnvironmentReport, NodeGraph, ProducerPolicy};

pub use catalog::{NodeCatalog, ResolvedCapability, instances_on, resolve_node_capabilities};
pub use error::Error;

pub const DEFAULT_ENVIRONMENT: &str = "production";

#[derive(Clone, Debug, bon::Builder)]
pub struct CompileOptions {
    /// Capabilities produced by this compile are tagged with this environment.
    #[builder(into, default = DEFAULT_ENVIRONMENT.to_string())]
    pub environment: String,
    #[builder(default)]
    pub producer_policy: ProducerPolicy,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Everything one compile produces.
#[derive(Clone, Debug)]
pub struct CompileOutput {
    pub environment: String,
    /// In instantiation order.
    pub instances: Vec<ApplicationInstance>,
    pub graph: NodeGraph,
    /// Producers before consumers.
    pub order: Vec<String>,
}

impl CompileOutput {
    pub fn report(&self) -> EnvironmentReport {
        EnvironmentReport::new(
            self.environment.clone(),
            &self.instances,
            &self.graph,
            self.order.clone(),
        )
    }

    /// Instances with at least one component on `node`.
    pub fn instances_on<'a>(
        &'a self,
        node: &'a str,
    ) -> impl Iterator<Item = &'a ApplicationInstance> + 'a {
        catalog::instances_on(&self.instances, node)
    }
}

#[derive(Clone, Debug, Default)]
pub struct Compiler {
    options: CompileOptions,
}

impl Compiler {
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Evaluate every instantiation in `manifests` without building the node graph.
    ///
    /// Capabilities consumed here need not be produced by these manifests; a node whose
    /// producers live in another environment compile is resolved through the capability
    /// registry instead.
    pub fn instantiate(&self, manifests: &[Manifest]) -> Result<Vec<ApplicationInstance>, Error> {
        let defs = driver::find(manifests)?;
        defs.instantiations()
            .iter()
            .map(|inst| defs.instantiate(inst))
            .collect()
    }

    /// Compile every instantiation in `manifests` into instances, fold them into one node graph
    /// and order it. Any error rejects the whole compile.
    pub fn compile(&self, manifests: &[Manifest]) -> Result<CompileOutput, Error> {
        let instances = self.instantiate(manifests)?;

        let mut graph = NodeGraph::new(self.options.producer_policy);
        for instance in &instances {
            graph.add_application(instance)?;
        }
        let order = graph.order()?;

        tracing::info!(
            environment = %self.options.environment,
            instances = instances.len(),
            nodes = graph.len(),
            "compiled environment"
        );

        Ok(CompileOutput {
            environment: self.options.environment.clone(),
            instances,
            graph,
            order,
        })
    }
}
