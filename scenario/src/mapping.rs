use std::collections::HashMap;

use crate::{
    Error,
    component::Component,
    refs::{CapabilityRef, ComponentRef},
    value::Value,
};

/// Which node each component of an application instance is deployed to.
///
/// Nodes are kept in order of first appearance, and components in the order they were mapped,
/// both globally and per node.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ComponentMapping {
    components: Vec<Component>,
    by_node: Vec<(String, Vec<usize>)>,
    node_for_component: HashMap<ComponentRef, usize>,
}

impl ComponentMapping {
    /// Build from `(node, component)` pairs in either orientation. A side holding an array is
    /// flattened into one pair per element.
    pub fn new(pairs: impl IntoIterator<Item = (Value, Value)>) -> Result<Self, Error> {
        let mut mapping = Self::default();
        for (key, value) in pairs {
            match value {
                Value::Array(items) => {
                    for item in &items {
                        mapping.assoc(&key, item)?;
                    }
                }
                value => mapping.assoc(&key, &value)?,
            }
        }
        Ok(mapping)
    }

    /// Build from the evaluated `nodes` argument of `application`, which must be a hash.
    pub fn from_value(application: &str, nodes: &Value) -> Result<Self, Error> {
        match nodes {
            Value::Hash(entries) => Self::new(entries.iter().cloned()),
            other => Err(Error::MalformedNodeMapping {
                application: application.to_string(),
                found: other.type_name(),
            }),
        }
    }

    fn assoc(&mut self, left: &Value, right: &Value) -> Result<(), Error> {
        let as_node = |value: &Value| value.as_resource().filter(|r| r.is_node()).cloned();
        let (node, other) = match (as_node(left), as_node(right)) {
            (Some(node), None) => (node, right),
            (None, Some(node)) => (node, left),
            (Some(_), Some(_)) => {
                return Err(invalid_mapping(left, right, "only one of them can be a Node"));
            }
            (None, None) => {
                return Err(invalid_mapping(left, right, "one of them must be a Node"));
            }
        };
        let Some(component) = other.as_resource() else {
            return Err(invalid_mapping(
                left,
                right,
                "the other side must be a component reference",
            ));
        };

        if let Some(&bound) = self.node_for_component.get(component) {
            let first = &self.by_node[bound].0;
            if first == node.name() {
                return Ok(());
            }
            return Err(Error::DuplicateMapping {
                component: component.clone(),
                first: first.clone(),
                second: node.name().to_string(),
            });
        }

        let slot = match self.by_node.iter().position(|(name, _)| name == node.name()) {
            Some(slot) => slot,
            None => {
                self.by_node.push((node.name().to_string(), Vec::new()));
                self.by_node.len() - 1
            }
        };
        self.by_node[slot].1.push(self.components.len());
        self.node_for_component.insert(component.clone(), slot);
        self.components.push(Component::new(component.clone()));
        Ok(())
    }

    /// Distinct node names, in order of first appearance.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.by_node.iter().map(|(name, _)| name.as_str())
    }

    /// All mapped components in mapping order.
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn component(&self, reference: &ComponentRef) -> Option<&Component> {
        self.components
            .iter()
            .find(|component| component.reference() == reference)
    }

    pub fn component_mut(&mut self, reference: &ComponentRef) -> Option<&mut Component> {
        self.components
            .iter_mut()
            .find(|component| component.reference() == reference)
    }

    /// Components hosted on `node`, in mapping order.
    pub fn components_on<'a>(
        &'a self,
        node: &'a str,
    ) -> impl Iterator<Item = &'a Component> + 'a {
        let components = &self.components;
        self.by_node
            .iter()
            .filter(move |(name, _)| name == node)
            .flat_map(move |(_, indices)| indices.iter().map(move |&idx| &components[idx]))
    }

    pub fn node_for(&self, reference: &ComponentRef) -> Option<&str> {
        self.node_for_component
            .get(reference)
            .map(|&slot| self.by_node[slot].0.as_str())
    }

    /// Every component producing `capability`, in mapping order.
    pub fn producers<'a>(
        &'a self,
        capability: &'a CapabilityRef,
    ) -> impl Iterator<Item = &'a Component> + 'a {
        self.components
            .iter()
            .filter(move |component| component.is_producer_of(capability))
    }

    /// The node of the first component, in mapping order, that produces `capability`.
    pub fn producing_node(&self, capability: &CapabilityRef) -> Option<&str> {
        self.producers(capability)
            .next()
            .and_then(|component| self.node_for(component.reference()))
    }
}

fn invalid_mapping(left: &Value, right: &Value, reason: &'static str) -> Error {
    let render = |value: &Value| match value {
        Value::Resource(r) => r.to_string(),
        Value::String(s) => format!("'{s}'"),
        other => other.to_string(),
    };
    Error::InvalidMapping {
        left: render(left),
        right: render(right),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refs::ResourceRef;

    fn node(name: &str) -> Value {
        Value::Resource(ResourceRef::node(name))
    }

    fn res(kind: &str, name: &str) -> Value {
        Value::Resource(ResourceRef::new(kind, name))
    }

    #[test]
    fn pairs_in_either_orientation_are_accepted() {
        let mapping = ComponentMapping::new([
            (node("n1"), res("Db", "one")),
            (res("Web", "two"), node("n2")),
        ])
        .unwrap();

        assert_eq!(mapping.nodes().collect::<Vec<_>>(), ["n1", "n2"]);
        assert_eq!(mapping.node_for(&ResourceRef::new("Db", "one")), Some("n1"));
        assert_eq!(mapping.node_for(&ResourceRef::new("Web", "two")), Some("n2"));
    }

    #[test]
    fn arrays_are_flattened_per_component() {
        let mapping = ComponentMapping::new([
            (
                node("n1"),
                Value::Array(vec![res("Db", "one"), res("Db", "two")]),
            ),
            (node("n2"), res("Web", "w")),
        ])
        .unwrap();

        let on_n1 = mapping
            .components_on("n1")
            .map(|c| c.reference().to_string())
            .collect::<Vec<_>>();
        assert_eq!(on_n1, ["Db[one]", "Db[two]"]);
        assert_eq!(mapping.components().len(), 3);
        assert_eq!(mapping.components_on("n3").count(), 0);
    }

    #[test]
    fn nodes_are_distinct_in_first_appearance_order() {
        let mapping = ComponentMapping::new([
            (node("b"), res("X", "1")),
            (node("a"), res("X", "2")),
            (node("b"), res("X", "3")),
        ])
        .unwrap();
        assert_eq!(mapping.nodes().collect::<Vec<_>>(), ["b", "a"]);
    }

    #[test]
    fn both_sides_nodes_is_invalid() {
        let err = ComponentMapping::new([(node("n1"), node("n2"))]).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidMapping {
                left: "Node[n1]".to_string(),
                right: "Node[n2]".to_string(),
                reason: "only one of them can be a Node",
            }
        );
    }

    #[test]
    fn no_node_side_is_invalid() {
        for pair in [
            (res("Db", "one"), res("Web", "two")),
            (Value::from("n1"), res("Web", "two")),
        ] {
            let err = ComponentMapping::new([pair]).unwrap_err();
            assert!(
                matches!(err, Error::InvalidMapping { reason, .. } if reason == "one of them must be a Node")
            );
        }
    }

    #[test]
    fn non_reference_component_is_invalid() {
        let err = ComponentMapping::new([(node("n1"), Value::from("db"))]).unwrap_err();
        assert!(matches!(err, Error::InvalidMapping { .. }));
    }

    #[test]
    fn component_on_two_nodes_is_rejected_in_any_order() {
        for pairs in [
            vec![(node("n1"), res("Db", "one")), (node("n2"), res("Db", "one"))],
            vec![(res("Db", "one"), node("n2")), (node("n1"), res("db", "one"))],
        ] {
            let err = ComponentMapping::new(pairs).unwrap_err();
            assert!(matches!(err, Error::DuplicateMapping { .. }), "{err:?}");
        }

        let err = ComponentMapping::new([
            (node("n1"), res("Db", "one")),
            (node("n2"), res("Db", "one")),
        ])
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "component Db[one] mapped to two nodes: Node[n1] and Node[n2]"
        );
    }

    #[test]
    fn remapping_to_the_same_node_is_a_no_op() {
        let mapping = ComponentMapping::new([
            (node("n1"), res("Db", "one")),
            (node("n1"), res("Db", "one")),
        ])
        .unwrap();
        assert_eq!(mapping.components().len(), 1);
    }

    #[test]
    fn producing_node_takes_the_first_producer() {
        let mut mapping = ComponentMapping::new([
            (node("n1"), res("Db", "one")),
            (node("n2"), res("Db", "two")),
        ])
        .unwrap();
        let sql = CapabilityRef::new("Sql", "x");
        for name in ["two", "one"] {
            mapping
                .component_mut(&ResourceRef::new("Db", name))
                .unwrap()
                .produce([sql.clone()]);
        }

        assert_eq!(mapping.producing_node(&sql), Some("n1"));
        assert_eq!(mapping.producers(&sql).count(), 2);
        assert_eq!(
            mapping.producing_node(&CapabilityRef::new("Sql", "y")),
            None
        );
    }

    #[test]
    fn nodes_argument_must_be_a_hash() {
        let err = ComponentMapping::from_value("Lamp[prod]", &Value::from("n1")).unwrap_err();
        assert!(matches!(
            err,
            Error::MalformedNodeMapping { found: "string", .. }
        ));

        let mapping = ComponentMapping::from_value(
            "Lamp[prod]",
            &Value::Hash(vec![(node("n1"), res("Db", "one"))]),
        )
        .unwrap();
        assert_eq!(mapping.nodes().count(), 1);
    }
}
