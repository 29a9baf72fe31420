use std::{collections::HashMap, future::Future, pin::Pin};

use ensemble_scenario::{ApplicationInstance, CapabilityRef, EnvironmentReport};

use crate::{Backend, CapabilityValue, Error};

/// Capabilities held in memory, usually those produced by the current compile.
#[derive(Clone, Debug, Default)]
pub struct MemoryBackend {
    values: HashMap<(String, CapabilityRef), CapabilityValue>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Default::default()
    }

    /// Index every capability produced by `instances`. The first producer of a capability wins.
    pub fn from_instances(environment: &str, instances: &[ApplicationInstance]) -> Self {
        let mut backend = Self::new();
        for instance in instances {
            for produced in instance.capabilities() {
                let key = (environment.to_string(), produced.capability.clone());
                backend.values.entry(key).or_insert_with(|| CapabilityValue {
                    capability: produced.capability.clone(),
                    environment: environment.to_string(),
                    component: Some(produced.component.clone()),
                    node: instance
                        .mapping()
                        .node_for(&produced.component)
                        .map(str::to_string),
                    parameters: produced
                        .attributes
                        .iter()
                        .map(|(name, value)| (name.clone(), value.to_json()))
                        .collect(),
                });
            }
        }
        backend
    }

    pub fn from_report(report: &EnvironmentReport) -> Self {
        let mut backend = Self::new();
        for (capability, entry) in &report.capabilities {
            let Ok(capability) = capability.parse::<CapabilityRef>() else {
                tracing::warn!(%capability, "skipping malformed capability in report");
                continue;
            };
            backend.insert(CapabilityValue {
                capability,
                environment: report.environment.clone(),
                component: Some(entry.component.clone()),
                node: Some(entry.node.clone()),
                parameters: entry.parameters.clone(),
            });
        }
        backend
    }

    /// Replaces any earlier value for the same environment and capability.
    pub fn insert(&mut self, value: CapabilityValue) {
        self.values.insert(
            (value.environment.clone(), value.capability.clone()),
            value,
        );
    }

    pub fn get(&self, environment: &str, capability: &CapabilityRef) -> Option<&CapabilityValue> {
        self.values
            .get(&(environment.to_string(), capability.clone()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Backend for MemoryBackend {
    fn find<'a>(
        &'a self,
        environment: &'a str,
        capability: &'a CapabilityRef,
    ) -> Pin<Box<dyn Future<Output = Result<Option<CapabilityValue>, Error>> + Send + 'a>> {
        let value = self.get(environment, capability).cloned();
        Box::pin(std::future::ready(Ok(value)))
    }
}
