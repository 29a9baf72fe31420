use std::collections::BTreeMap;

use serde::Serialize;

use crate::{
    Error,
    component::Component,
    mapping::ComponentMapping,
    refs::{CapabilityRef, ComponentRef, ResourceRef},
    value::Value,
};

pub const NODES_PARAMETER: &str = "nodes";

/// A capability produced inside an instance, with its evaluated attributes.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProducedCapability {
    pub capability: CapabilityRef,
    pub component: ComponentRef,
    pub attributes: BTreeMap<String, Value>,
}

/// One instantiation of an application definition, e.g. `Lamp[prod]`.
#[derive(Clone, Debug, PartialEq)]
pub struct ApplicationInstance {
    reference: ResourceRef,
    parameters: BTreeMap<String, Value>,
    mapping: ComponentMapping,
    capabilities: Vec<ProducedCapability>,
}

impl ApplicationInstance {
    /// `args` must contain `nodes`, which becomes the component mapping; everything else is a
    /// parameter.
    pub fn new(
        kind: &str,
        name: &str,
        mut args: BTreeMap<String, Value>,
    ) -> Result<Self, Error> {
        let reference = ResourceRef::new(kind, name);
        let nodes = args
            .remove(NODES_PARAMETER)
            .ok_or_else(|| Error::MissingNodeMapping {
                application: reference.to_string(),
            })?;
        let mapping = ComponentMapping::from_value(&reference.to_string(), &nodes)?;

        Ok(Self {
            reference,
            parameters: args,
            mapping,
            capabilities: Vec::new(),
        })
    }

    pub fn reference(&self) -> &ResourceRef {
        &self.reference
    }

    pub fn kind(&self) -> &str {
        self.reference.kind()
    }

    pub fn name(&self) -> &str {
        self.reference.name()
    }

    pub fn parameters(&self) -> &BTreeMap<String, Value> {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    /// Fill in a declared parameter the caller did not supply. Supplied values win.
    pub fn set_default(&mut self, name: impl Into<String>, value: Value) {
        self.parameters.entry(name.into()).or_insert(value);
    }

    pub fn mapping(&self) -> &ComponentMapping {
        &self.mapping
    }

    pub fn component(&self, reference: &ComponentRef) -> Option<&Component> {
        self.mapping.component(reference)
    }

    pub fn component_mut(&mut self, reference: &ComponentRef) -> Option<&mut Component> {
        self.mapping.component_mut(reference)
    }

    pub fn capabilities(&self) -> &[ProducedCapability] {
        &self.capabilities
    }

    pub fn record_capability(&mut self, capability: ProducedCapability) {
        self.capabilities.push(capability);
    }
}
