use serde::Serialize;

use crate::refs::{CapabilityRef, ComponentRef};

/// One resource instance inside an application instance.
///
/// Produced and consumed capabilities are appended while the owning instance is being built
/// and left alone afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Component {
    #[serde(rename = "ref")]
    reference: ComponentRef,
    produces: Vec<CapabilityRef>,
    consumes: Vec<CapabilityRef>,
}

impl Component {
    pub fn new(reference: ComponentRef) -> Self {
        Self {
            reference,
            produces: Vec::new(),
            consumes: Vec::new(),
        }
    }

    pub fn reference(&self) -> &ComponentRef {
        &self.reference
    }

    pub fn kind(&self) -> &str {
        self.reference.kind()
    }

    pub fn name(&self) -> &str {
        self.reference.name()
    }

    pub fn produces(&self) -> &[CapabilityRef] {
        &self.produces
    }

    pub fn consumes(&self) -> &[CapabilityRef] {
        &self.consumes
    }

    /// Append one or more produced capabilities; pass `[cap]` for a single one.
    pub fn produce(&mut self, capabilities: impl IntoIterator<Item = CapabilityRef>) {
        self.produces.extend(capabilities);
    }

    pub fn consume(&mut self, capabilities: impl IntoIterator<Item = CapabilityRef>) {
        self.consumes.extend(capabilities);
    }

    pub fn is_producer_of(&self, capability: &CapabilityRef) -> bool {
        self.produces.contains(capability)
    }
}
