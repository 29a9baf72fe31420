//! Per-node capability resolution.
//!
//! When the catalogs of producing and consuming nodes are compiled separately, the node graph of
//! a single compile cannot tell a consumer where its capabilities live. Instead every capability
//! consumed on the node is looked up in the capability registry.

use ensemble_registry::{CapabilityValue, Registry};
use ensemble_scenario::{ApplicationInstance, CapabilityRef, ComponentRef};
use serde::Serialize;

use crate::Error;

/// A consumed capability together with the value the registry holds for it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResolvedCapability {
    pub component: ComponentRef,
    pub capability: CapabilityRef,
    pub value: CapabilityValue,
}

/// What one node needs from the rest of the environment.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct NodeCatalog {
    pub node: String,
    pub environment: String,
    pub components: Vec<ComponentRef>,
    pub capabilities: Vec<ResolvedCapability>,
}

impl NodeCatalog {
    pub fn new(node: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            environment: environment.into(),
            ..Default::default()
        }
    }

    /// Resolve the part of `instance` placed on this node and add it to the catalog.
    pub async fn add_instance(
        &mut self,
        registry: &Registry,
        instance: &ApplicationInstance,
    ) -> Result<(), Error> {
        let resolved =
            resolve_node_capabilities(registry, &self.environment, instance, &self.node).await?;
        self.components.extend(
            instance
                .mapping()
                .components_on(&self.node)
                .map(|component| component.reference().clone()),
        );
        self.capabilities.extend(resolved);
        Ok(())
    }
}

/// Instances with at least one component on `node`.
pub fn instances_on<'a>(
    instances: &'a [ApplicationInstance],
    node: &'a str,
) -> impl Iterator<Item = &'a ApplicationInstance> + 'a {
    instances
        .iter()
        .filter(move |instance| instance.mapping().nodes().any(|n| n == node))
}

/// Look up every capability consumed by components of `instance` placed on `node`.
///
/// A capability nobody has produced is [`ensemble_scenario::Error::UnresolvedCapability`]; a
/// registry that cannot answer is [`Error::CapabilityLookupFailed`].
pub async fn resolve_node_capabilities(
    registry: &Registry,
    environment: &str,
    instance: &ApplicationInstance,
    node: &str,
) -> Result<Vec<ResolvedCapability>, Error> {
    let mut resolved = Vec::new();
    for component in instance.mapping().components_on(node) {
        for capability in component.consumes() {
            let value = match registry.find(environment, capability).await {
                Ok(Some(value)) => value,
                Ok(None) => {
                    return Err(ensemble_scenario::Error::UnresolvedCapability {
                        component: component.reference().clone(),
                        node: node.to_string(),
                        capability: capability.clone(),
                    }
                    .into());
                }
                Err(source) => {
                    return Err(Error::CapabilityLookupFailed {
                        component: component.reference().clone(),
                        capability: capability.clone(),
                        source,
                    });
                }
            };
            tracing::debug!(
                component = %component.reference(),
                %capability,
                node,
                "resolved capability"
            );
            resolved.push(ResolvedCapability {
                component: component.reference().clone(),
                capability: capability.clone(),
                value,
            });
        }
    }
    Ok(resolved)
}
