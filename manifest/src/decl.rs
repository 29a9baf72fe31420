use std::{fmt, marker::PhantomData};

use serde::{
    Deserialize, Deserializer,
    de::{self, MapAccess, Visitor},
};

use crate::{
    expr::Expr,
    names::{ApplicationName, ParameterName, TypeName},
};

/// Key/value entries in document order.
///
/// Unlike a map this keeps repeated keys, so a parameter supplied twice can be reported by
/// whoever evaluates the entries instead of being silently overwritten while parsing.
#[derive(Clone, Debug, PartialEq)]
pub struct Entries<K, V>(pub Vec<(K, V)>);

impl<K, V> Default for Entries<K, V> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<K, V> Entries<K, V> {
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.0.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.0.iter().map(|(k, _)| k)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: PartialEq, V> Entries<K, V> {
    /// First entry with the given key.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// The first key that appears more than once.
    pub fn first_duplicate(&self) -> Option<&K> {
        self.0
            .iter()
            .enumerate()
            .find(|(idx, (key, _))| self.0[..*idx].iter().any(|(k, _)| k == key))
            .map(|(_, (key, _))| key)
    }
}

impl<K, V> FromIterator<(K, V)> for Entries<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'de, K, V> Deserialize<'de> for Entries<K, V>
where
    K: Deserialize<'de>,
    V: Deserialize<'de>,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor<K, V>(PhantomData<(K, V)>);

        impl<'de, K, V> Visitor<'de> for EntriesVisitor<K, V>
        where
            K: Deserialize<'de>,
            V: Deserialize<'de>,
        {
            type Value = Entries<K, V>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut out = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry()? {
                    out.push(entry);
                }
                Ok(Entries(out))
            }
        }

        deserializer.deserialize_map(EntriesVisitor(PhantomData))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, bon::Builder)]
#[serde(deny_unknown_fields)]
#[non_exhaustive]
pub struct ParameterDecl {
    /// Evaluated when an instantiation does not supply the parameter.
    #[serde(default)]
    pub default: Option<Expr>,
}

/// A component type: a defined resource type that produces and/or consumes capabilities.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, bon::Builder)]
#[serde(deny_unknown_fields)]
#[non_exhaustive]
pub struct ComponentType {
    #[serde(default)]
    #[builder(default)]
    pub parameters: Entries<ParameterName, ParameterDecl>,
    #[serde(default)]
    #[builder(default)]
    pub produces: Vec<ProducesClause>,
    #[serde(default)]
    #[builder(default)]
    pub consumes: Vec<ConsumesClause>,
}

impl ComponentType {
    /// Parameters a declaration may set: the declared ones plus every consumes parameter.
    pub fn accepts(&self, name: &ParameterName) -> bool {
        self.parameters.contains_key(name) || self.consumes.iter().any(|c| &c.parameter == name)
    }
}

/// `produces Sql { $name: ... }`: evaluated in the scope of the producing component.
#[derive(Clone, Debug, PartialEq, Deserialize, bon::Builder)]
#[serde(deny_unknown_fields)]
#[non_exhaustive]
pub struct ProducesClause {
    pub capability: TypeName,
    pub title: Expr,
    #[serde(default)]
    #[builder(default)]
    pub attributes: Entries<ParameterName, Expr>,
}

/// `consumes Sql $db`: the capability is whatever the declaration passes as `db`.
#[derive(Clone, Debug, PartialEq, Deserialize, bon::Builder)]
#[serde(deny_unknown_fields)]
#[non_exhaustive]
pub struct ConsumesClause {
    pub capability: TypeName,
    pub parameter: ParameterName,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, bon::Builder)]
#[serde(deny_unknown_fields)]
#[non_exhaustive]
pub struct ApplicationDecl {
    #[serde(default)]
    #[builder(default)]
    pub parameters: Entries<ParameterName, ParameterDecl>,
    #[serde(default)]
    #[builder(default)]
    pub components: Vec<Statement>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(try_from = "RawStatement")]
#[non_exhaustive]
pub enum Statement {
    Component(ComponentDecl),
    Each(EachBlock),
}

#[derive(Clone, Debug, PartialEq, bon::Builder)]
#[non_exhaustive]
pub struct ComponentDecl {
    pub component: TypeName,
    pub title: Expr,
    #[builder(default)]
    pub args: Entries<ParameterName, Expr>,
}

/// Expands `body` once per element of `each`, with the element bound to `binding`.
#[derive(Clone, Debug, PartialEq, bon::Builder)]
#[non_exhaustive]
pub struct EachBlock {
    pub each: Expr,
    pub binding: ParameterName,
    #[builder(default)]
    pub body: Vec<Statement>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStatement {
    component: Option<TypeName>,
    title: Option<Expr>,
    #[serde(default)]
    args: Option<Entries<ParameterName, Expr>>,
    each: Option<Expr>,
    #[serde(rename = "as")]
    binding: Option<ParameterName>,
    #[serde(default)]
    body: Option<Vec<Statement>>,
}

impl TryFrom<RawStatement> for Statement {
    type Error = String;

    fn try_from(raw: RawStatement) -> Result<Self, Self::Error> {
        match (raw.component, raw.each) {
            (Some(component), None) => {
                if raw.binding.is_some() || raw.body.is_some() {
                    return Err("component declarations do not take `as` or `body`".to_string());
                }
                let title = raw
                    .title
                    .ok_or_else(|| format!("declaration of `{component}` is missing `title`"))?;
                Ok(Statement::Component(ComponentDecl {
                    component,
                    title,
                    args: raw.args.unwrap_or_default(),
                }))
            }
            (None, Some(each)) => {
                if raw.title.is_some() || raw.args.is_some() {
                    return Err("`each` blocks do not take `title` or `args`".to_string());
                }
                let binding = raw
                    .binding
                    .ok_or_else(|| "`each` block is missing `as`".to_string())?;
                Ok(Statement::Each(EachBlock {
                    each,
                    binding,
                    body: raw.body.unwrap_or_default(),
                }))
            }
            (Some(_), Some(_)) => {
                Err("statement has both `component` and `each`; use one or the other".to_string())
            }
            (None, None) => Err("statement needs either `component` or `each`".to_string()),
        }
    }
}

/// `lamp { prod: nodes => { ... } }` at top scope.
#[derive(Clone, Debug, PartialEq, Deserialize, bon::Builder)]
#[serde(deny_unknown_fields)]
#[non_exhaustive]
pub struct Instantiation {
    pub application: ApplicationName,
    pub title: Expr,
    #[serde(default)]
    #[builder(default)]
    pub args: Entries<ParameterName, Expr>,
}
