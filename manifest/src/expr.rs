use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, de};
use serde_json::{Number, Value as Json};

use crate::{
    error::Error,
    names::{ParameterName, TypeName, is_identifier},
};

/// A reduced expression as handed over by the language evaluator.
///
/// Strings carry a little syntax:
/// - `"$name"` is a variable lookup,
/// - `"Type[title]"` (capitalised type) is a resource reference whose title may interpolate,
/// - anything else is a string that may contain `${name}` interpolations.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum Expr {
    Undef,
    Bool(bool),
    Number(Number),
    String(InterpolatedString),
    Variable(ParameterName),
    Resource {
        kind: TypeName,
        title: InterpolatedString,
    },
    Array(Vec<Expr>),
    /// Keys are expressions too, so `{ "Node[n1]": "Db[one]" }` pairs two references.
    Hash(Vec<(Expr, Expr)>),
}

impl Expr {
    /// A string literal, never interpreted as a variable or reference.
    pub fn literal(value: impl Into<String>) -> Self {
        Expr::String(InterpolatedString::literal(value))
    }

    pub fn variable(name: ParameterName) -> Self {
        Expr::Variable(name)
    }

    pub fn resource(kind: TypeName, title: impl Into<String>) -> Self {
        Expr::Resource {
            kind,
            title: InterpolatedString::literal(title),
        }
    }
}

impl FromStr for Expr {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if let Some(name) = input.strip_prefix('$')
            && is_identifier(name)
        {
            return Ok(Expr::Variable(ParameterName::new(name)?));
        }

        if let Some((kind, title)) = split_resource_ref(input)? {
            return Ok(Expr::Resource {
                kind,
                title: title.parse()?,
            });
        }

        Ok(Expr::String(input.parse()?))
    }
}

/// Splits `Type[title]` into its parts. Strings that do not look like a reference are not an
/// error; a reference with an empty title is.
fn split_resource_ref(input: &str) -> Result<Option<(TypeName, &str)>, Error> {
    if !input.starts_with(|c: char| c.is_ascii_uppercase()) || !input.ends_with(']') {
        return Ok(None);
    }
    let Some(open) = input.find('[') else {
        return Ok(None);
    };
    let Ok(kind) = TypeName::new(&input[..open]) else {
        return Ok(None);
    };
    let title = &input[open + 1..input.len() - 1];
    if title.is_empty() {
        return Err(Error::InvalidResourceRef(input.to_string()));
    }
    Ok(Some((kind, title)))
}

impl TryFrom<Json> for Expr {
    type Error = Error;

    fn try_from(value: Json) -> Result<Self, Self::Error> {
        Ok(match value {
            Json::Null => Expr::Undef,
            Json::Bool(b) => Expr::Bool(b),
            Json::Number(n) => Expr::Number(n),
            Json::String(s) => s.parse()?,
            Json::Array(items) => Expr::Array(
                items
                    .into_iter()
                    .map(Expr::try_from)
                    .collect::<Result<_, _>>()?,
            ),
            Json::Object(map) => Expr::Hash(
                map.into_iter()
                    .map(|(key, value)| Ok((key.parse()?, Expr::try_from(value)?)))
                    .collect::<Result<_, Error>>()?,
            ),
        })
    }
}

impl<'de> Deserialize<'de> for Expr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Json::deserialize(deserializer)?;
        Expr::try_from(value).map_err(de::Error::custom)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Undef => f.write_str("undef"),
            Expr::Bool(b) => write!(f, "{b}"),
            Expr::Number(n) => write!(f, "{n}"),
            Expr::String(s) => write!(f, "\"{s}\""),
            Expr::Variable(name) => write!(f, "${name}"),
            Expr::Resource { kind, title } => write!(f, "{kind}[{title}]"),
            Expr::Array(items) => {
                f.write_str("[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Expr::Hash(entries) => {
                f.write_str("{")?;
                for (idx, (key, value)) in entries.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key} => {value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub struct InterpolatedString {
    pub parts: Vec<InterpolatedPart>,
}

impl InterpolatedString {
    pub fn literal(value: impl Into<String>) -> Self {
        let value = value.into();
        let parts = if value.is_empty() {
            Vec::new()
        } else {
            vec![InterpolatedPart::Literal(value)]
        };
        Self { parts }
    }

    /// The string itself when it contains no interpolation.
    pub fn as_literal(&self) -> Option<String> {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                InterpolatedPart::Literal(s) => out.push_str(s),
                InterpolatedPart::Variable(_) => return None,
            }
        }
        Some(out)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum InterpolatedPart {
    Literal(String),
    Variable(ParameterName),
}

impl FromStr for InterpolatedString {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut parts = Vec::new();
        let mut current_literal = String::new();
        let mut chars = input.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next();
                if !current_literal.is_empty() {
                    parts.push(InterpolatedPart::Literal(std::mem::take(
                        &mut current_literal,
                    )));
                }

                let mut inner = String::new();
                let mut closed = false;
                for ic in chars.by_ref() {
                    if ic == '}' {
                        closed = true;
                        break;
                    }
                    inner.push(ic);
                }

                if !closed {
                    return Err(Error::InvalidInterpolation(input.to_string()));
                }
                let name = ParameterName::new(inner.trim())
                    .map_err(|_| Error::InvalidInterpolation(input.to_string()))?;
                parts.push(InterpolatedPart::Variable(name));
            } else {
                current_literal.push(c);
            }
        }

        if !current_literal.is_empty() {
            parts.push(InterpolatedPart::Literal(current_literal));
        }

        Ok(Self { parts })
    }
}

impl fmt::Display for InterpolatedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in &self.parts {
            match part {
                InterpolatedPart::Literal(s) => f.write_str(s)?,
                InterpolatedPart::Variable(name) => write!(f, "${{{name}}}")?,
            }
        }
        Ok(())
    }
}
