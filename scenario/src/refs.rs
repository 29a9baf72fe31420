use std::{fmt, str::FromStr, sync::Arc};

use serde_with::{DeserializeFromStr, SerializeDisplay};

use crate::Error;

pub const NODE_KIND: &str = "Node";

/// A `Kind[name]` reference to a resource: a component, a node or a capability.
///
/// Kinds are normalised so that every `::`-separated segment starts with an uppercase letter;
/// `db` and `Db` name the same type and `app::sql` becomes `App::Sql`.
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, DeserializeFromStr, SerializeDisplay,
)]
pub struct ResourceRef {
    kind: Arc<str>,
    name: Arc<str>,
}

/// A reference to one producible/consumable capability instance.
pub type CapabilityRef = ResourceRef;

/// A reference identifying one component inside an application instance.
pub type ComponentRef = ResourceRef;

impl ResourceRef {
    pub fn new(kind: impl AsRef<str>, name: impl Into<String>) -> Self {
        Self {
            kind: Arc::from(normalize_kind(kind.as_ref())),
            name: Arc::from(name.into()),
        }
    }

    pub fn node(name: impl Into<String>) -> Self {
        Self::new(NODE_KIND, name)
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_node(&self) -> bool {
        &*self.kind == NODE_KIND
    }
}

/// `app::sql` -> `App::Sql`.
pub fn normalize_kind(kind: &str) -> String {
    kind.split("::")
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("::")
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.kind, self.name)
    }
}

impl FromStr for ResourceRef {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidResourceRef(input.to_string());
        let body = input.strip_suffix(']').ok_or_else(invalid)?;
        let (kind, name) = body.split_once('[').ok_or_else(invalid)?;
        if kind.is_empty() || name.is_empty() || kind.contains(char::is_whitespace) {
            return Err(invalid());
        }
        Ok(Self::new(kind, name))
    }
}
