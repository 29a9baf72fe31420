use std::{
    collections::{BTreeMap, BTreeSet, HashMap, VecDeque},
    fmt,
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::{
    Error,
    application::ApplicationInstance,
    component::Component,
    mapping::ComponentMapping,
    refs::CapabilityRef,
};

/// What to do when more than one component of an instance produces the same capability.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProducerPolicy {
    /// The first producer in mapping order wins.
    #[default]
    FirstMatch,
    /// Multiple producers are an error.
    Unique,
}

impl fmt::Display for ProducerPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProducerPolicy::FirstMatch => "first-match",
            ProducerPolicy::Unique => "unique",
        })
    }
}

impl FromStr for ProducerPolicy {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "first-match" => Ok(ProducerPolicy::FirstMatch),
            "unique" => Ok(ProducerPolicy::Unique),
            other => Err(format!(
                "unknown producer policy `{other}` (expected `first-match` or `unique`)"
            )),
        }
    }
}

/// Inter-node dependencies accumulated from one or more application instances.
///
/// Each node maps to the set of nodes it depends on, i.e. the nodes producing capabilities
/// its components consume.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeGraph {
    nodes: BTreeMap<String, BTreeSet<String>>,
    policy: ProducerPolicy,
}

impl NodeGraph {
    pub fn new(policy: ProducerPolicy) -> Self {
        Self {
            nodes: BTreeMap::new(),
            policy,
        }
    }

    pub fn policy(&self) -> ProducerPolicy {
        self.policy
    }

    /// Fold an instance into the graph.
    ///
    /// Every mapped node gets an entry, and every consumed capability adds an edge from the
    /// consuming node to the producing one unless both are the same node. Nothing is added
    /// when a capability cannot be resolved.
    pub fn add_application(&mut self, instance: &ApplicationInstance) -> Result<(), Error> {
        let mapping = instance.mapping();
        let mut edges = Vec::new();

        for node in mapping.nodes() {
            for component in mapping.components_on(node) {
                for capability in component.consumes() {
                    let producer = self.producing_node(mapping, component, node, capability)?;
                    if producer != node {
                        edges.push((node, producer));
                    }
                }
            }
        }

        for node in mapping.nodes() {
            self.nodes.entry(node.to_string()).or_default();
        }
        for (node, producer) in edges {
            self.nodes
                .entry(node.to_string())
                .or_default()
                .insert(producer.to_string());
        }
        Ok(())
    }

    fn producing_node<'m>(
        &self,
        mapping: &'m ComponentMapping,
        component: &Component,
        node: &str,
        capability: &CapabilityRef,
    ) -> Result<&'m str, Error> {
        if self.policy == ProducerPolicy::Unique {
            let producers = mapping
                .producers(capability)
                .map(|producer| producer.reference().clone())
                .collect::<Vec<_>>();
            if producers.len() > 1 {
                return Err(Error::AmbiguousProducer {
                    capability: capability.clone(),
                    producers,
                });
            }
        }

        mapping
            .producing_node(capability)
            .ok_or_else(|| Error::UnresolvedCapability {
                component: component.reference().clone(),
                node: node.to_string(),
                capability: capability.clone(),
            })
    }

    /// Record that `node` depends on `depends_on`, adding entries for both.
    pub fn add_dependency(&mut self, node: &str, depends_on: &str) {
        self.nodes.entry(depends_on.to_string()).or_default();
        self.nodes
            .entry(node.to_string())
            .or_default()
            .insert(depends_on.to_string());
    }

    pub fn contains(&self, node: &str) -> bool {
        self.nodes.contains_key(node)
    }

    pub fn dependencies(&self, node: &str) -> Option<&BTreeSet<String>> {
        self.nodes.get(node)
    }

    /// `(node, dependencies)` pairs sorted by node name.
    pub fn adjacency(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.nodes.iter().map(|(node, deps)| (node.as_str(), deps))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Deployment order: every node comes after all the nodes it depends on.
    ///
    /// Kahn's algorithm on a working copy with self-loops removed. Ready nodes are taken
    /// first-in first-out; the initial ready set and the nodes released by one completion are
    /// each queued in lexicographic order, so the result is deterministic.
    pub fn order(&self) -> Result<Vec<String>, Error> {
        let names = self.nodes.keys().map(String::as_str).collect::<Vec<_>>();
        let index = names
            .iter()
            .enumerate()
            .map(|(idx, &name)| (name, idx))
            .collect::<HashMap<_, _>>();

        let n = names.len();
        let mut pending = vec![0usize; n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (u, deps) in self.nodes.values().enumerate() {
            for dep in deps {
                let Some(&v) = index.get(dep.as_str()) else {
                    continue;
                };
                if u == v {
                    continue;
                }
                pending[u] += 1;
                dependents[v].push(u);
            }
        }

        let mut ready = (0..n).filter(|&u| pending[u] == 0).collect::<VecDeque<_>>();
        let mut done = vec![false; n];
        let mut order = Vec::with_capacity(n);
        while let Some(v) = ready.pop_front() {
            done[v] = true;
            order.push(names[v].to_string());
            for &u in &dependents[v] {
                pending[u] -= 1;
                if pending[u] == 0 {
                    ready.push_back(u);
                }
            }
        }

        if order.len() == n {
            return Ok(order);
        }

        let remaining = self
            .nodes
            .iter()
            .enumerate()
            .filter(|&(u, _)| !done[u])
            .map(|(_, (node, deps))| {
                let unsatisfied = deps
                    .iter()
                    .filter(|dep| {
                        *dep != node && index.get(dep.as_str()).is_some_and(|&v| !done[v])
                    })
                    .cloned()
                    .collect::<Vec<_>>();
                (node.clone(), unsatisfied)
            })
            .collect::<BTreeMap<_, _>>();
        let cycle = find_cycle(&remaining);
        Err(Error::CycleDetected { remaining, cycle })
    }
}

/// Every node left over by Kahn's algorithm still depends on another left-over node, so
/// following the first unsatisfied dependency from any of them must revisit a node.
fn find_cycle(remaining: &BTreeMap<String, Vec<String>>) -> Vec<String> {
    let mut path: Vec<&str> = Vec::new();
    let mut current = remaining.keys().next().map(String::as_str);

    while let Some(node) = current {
        if let Some(start) = path.iter().position(|&seen| seen == node) {
            let mut cycle = path[start..]
                .iter()
                .map(|node| node.to_string())
                .collect::<Vec<_>>();
            cycle.push(node.to_string());
            return cycle;
        }
        path.push(node);
        current = remaining
            .get(node)
            .and_then(|deps| deps.first())
            .map(String::as_str);
    }

    path.into_iter().map(str::to_string).collect()
}
