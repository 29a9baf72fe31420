use std::sync::Arc;

use dashmap::DashMap;
use ensemble_scenario::CapabilityRef;

use crate::CapabilityValue;

/// Positive lookup results, keyed by environment and capability.
///
/// Clones share storage, so a registry and the registries derived from it with
/// `with_backend` see the same entries.
#[derive(Clone, Debug, Default)]
pub struct Cache {
    inner: Arc<DashMap<(String, CapabilityRef), CapabilityValue>>,
}

impl Cache {
    pub fn get(&self, environment: &str, capability: &CapabilityRef) -> Option<CapabilityValue> {
        // DashMap doesn't support borrowed lookup for tuple keys.
        let key = (environment.to_string(), capability.clone());
        self.inner.get(&key).map(|entry| entry.value().clone())
    }

    pub fn put(&self, environment: &str, capability: &CapabilityRef, value: CapabilityValue) {
        self.inner
            .insert((environment.to_string(), capability.clone()), value);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
