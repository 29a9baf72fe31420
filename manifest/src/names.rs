use std::{borrow::Borrow, fmt, sync::Arc};

use serde_with::{DeserializeFromStr, SerializeDisplay};

use crate::error::Error;

/// Identifiers are `[A-Za-z_][A-Za-z0-9_]*`, optionally joined by `::` when namespaced.
pub(crate) fn ensure_identifier(
    name: &str,
    kind: &'static str,
    namespaced: bool,
) -> Result<(), Error> {
    let invalid = || Error::InvalidName {
        kind,
        name: name.to_string(),
    };

    if name.is_empty() {
        return Err(invalid());
    }

    let mut segments = if namespaced {
        name.split("::").collect::<Vec<_>>()
    } else {
        vec![name]
    };
    // A leading `::` anchors the name at top scope.
    if namespaced && segments.len() > 1 && segments[0].is_empty() {
        segments.remove(0);
    }

    for segment in segments {
        if !is_identifier(segment) {
            return Err(invalid());
        }
    }
    Ok(())
}

pub(crate) fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

macro_rules! name_type {
    ($name:ident, $kind:expr, $namespaced:expr) => {
        #[derive(
            Clone,
            Debug,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            DeserializeFromStr,
            SerializeDisplay,
        )]
        pub struct $name(Arc<str>);

        impl $name {
            pub fn new(name: impl Into<String>) -> Result<Self, Error> {
                let name = name.into();
                crate::names::ensure_identifier(&name, $kind, $namespaced)?;
                Ok(Self(Arc::from(name)))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = Error;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                Self::new(value)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = Error;

            fn try_from(value: &str) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0.to_string()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

name_type!(ApplicationName, "application", true);
name_type!(TypeName, "type", true);
name_type!(ParameterName, "parameter", false);
