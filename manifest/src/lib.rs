#![allow(unused_assignments)]

mod decl;
mod error;
mod expr;
mod names;

use std::{
    collections::BTreeMap,
    str::FromStr,
    sync::{Arc, OnceLock},
};

use bon::bon;
pub use decl::{
    ApplicationDecl, ComponentDecl, ComponentType, ConsumesClause, EachBlock, Entries,
    Instantiation, ParameterDecl, ProducesClause, Statement,
};
pub use error::Error;
pub use expr::{Expr, InterpolatedPart, InterpolatedString};
use miette::{NamedSource, SourceSpan};
pub use names::{ApplicationName, ParameterName, TypeName};
use semver::{Version, VersionReq};
use serde::Deserialize;
use serde_with::{MapPreventDuplicates, serde_as};

pub const SUPPORTED_MANIFEST_VERSION: &str = "^0.1";

fn supported_manifest_version_req() -> &'static VersionReq {
    static REQ: OnceLock<VersionReq> = OnceLock::new();
    REQ.get_or_init(|| {
        VersionReq::parse(SUPPORTED_MANIFEST_VERSION)
            .expect("supported manifest version requirement must be valid")
    })
}

/// One environment manifest: the model the language evaluator hands over.
#[derive(Clone, Debug, PartialEq)]
pub struct Manifest {
    manifest_version: Version,
    component_types: BTreeMap<TypeName, ComponentType>,
    applications: BTreeMap<ApplicationName, ApplicationDecl>,
    instances: Vec<Instantiation>,
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    manifest_version: Version,
    #[serde_as(as = "MapPreventDuplicates<_, _>")]
    #[serde(default)]
    component_types: BTreeMap<TypeName, ComponentType>,
    #[serde_as(as = "MapPreventDuplicates<_, _>")]
    #[serde(default)]
    applications: BTreeMap<ApplicationName, ApplicationDecl>,
    #[serde(default)]
    instances: Vec<Instantiation>,
}

impl RawManifest {
    fn validate(&self) -> Result<(), Error> {
        if !supported_manifest_version_req().matches(&self.manifest_version) {
            return Err(Error::UnsupportedManifestVersion {
                version: self.manifest_version.clone(),
                supported_req: SUPPORTED_MANIFEST_VERSION,
            });
        }

        for (name, ty) in &self.component_types {
            let owner = format!("component type `{name}`");
            if let Some(dup) = ty.parameters.first_duplicate() {
                return Err(Error::DuplicateParameterDecl {
                    owner,
                    parameter: dup.to_string(),
                });
            }
            for (idx, clause) in ty.consumes.iter().enumerate() {
                if ty.consumes[..idx]
                    .iter()
                    .any(|c| c.parameter == clause.parameter)
                {
                    return Err(Error::DuplicateConsumesParameter {
                        owner,
                        parameter: clause.parameter.to_string(),
                    });
                }
            }
        }

        for (name, app) in &self.applications {
            if let Some(dup) = app.parameters.first_duplicate() {
                return Err(Error::DuplicateParameterDecl {
                    owner: format!("application `{name}`"),
                    parameter: dup.to_string(),
                });
            }
        }

        Ok(())
    }
}

impl From<RawManifest> for Manifest {
    fn from(raw: RawManifest) -> Self {
        Self {
            manifest_version: raw.manifest_version,
            component_types: raw.component_types,
            applications: raw.applications,
            instances: raw.instances,
        }
    }
}

#[bon]
impl Manifest {
    #[builder]
    pub fn new(
        #[builder(default = Version::new(0, 1, 0))] manifest_version: Version,
        #[builder(default)] component_types: BTreeMap<TypeName, ComponentType>,
        #[builder(default)] applications: BTreeMap<ApplicationName, ApplicationDecl>,
        #[builder(default)] instances: Vec<Instantiation>,
    ) -> Result<Self, Error> {
        let raw = RawManifest {
            manifest_version,
            component_types,
            applications,
            instances,
        };
        raw.validate()?;
        Ok(raw.into())
    }
}

impl Manifest {
    /// Parse a JSON5 manifest; `name` labels diagnostics (usually the file path).
    pub fn parse_named(name: impl AsRef<str>, source: impl Into<Arc<str>>) -> Result<Self, Error> {
        let source: Arc<str> = source.into();
        let named_source =
            || NamedSource::new(name.as_ref(), Arc::clone(&source)).with_language("json5");

        let mut deserializer = json5::Deserializer::from_str(&source).map_err(|err| {
            let (message, span) = describe_json5_error(&source, &err);
            Error::Json5 {
                message,
                src: named_source(),
                span,
            }
        })?;

        let raw: RawManifest =
            serde_path_to_error::deserialize(&mut deserializer).map_err(|err| {
                let path = err.path().to_string();
                let (message, span) = describe_json5_error(&source, err.inner());
                Error::Deserialize {
                    path,
                    message,
                    src: named_source(),
                    span,
                }
            })?;

        raw.validate()?;
        Ok(raw.into())
    }

    pub fn manifest_version(&self) -> &Version {
        &self.manifest_version
    }

    pub fn component_types(&self) -> &BTreeMap<TypeName, ComponentType> {
        &self.component_types
    }

    pub fn applications(&self) -> &BTreeMap<ApplicationName, ApplicationDecl> {
        &self.applications
    }

    pub fn instances(&self) -> &[Instantiation] {
        &self.instances
    }
}

impl FromStr for Manifest {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Self::parse_named("<input>", input)
    }
}

fn describe_json5_error(source: &str, err: &json5::Error) -> (String, Option<SourceSpan>) {
    let json5::Error::Message { msg, location } = err;
    let span = location
        .as_ref()
        .and_then(|loc| offset_for_line_col(source, loc.line, loc.column))
        .map(|offset| SourceSpan::from((offset, 0)));
    (msg.clone(), span)
}

/// Byte offset of a one-based line/column pair.
fn offset_for_line_col(source: &str, line: usize, column: usize) -> Option<usize> {
    let mut offset = 0usize;
    for (idx, text) in source.split_inclusive('\n').enumerate() {
        if idx + 1 == line {
            let col = text
                .char_indices()
                .nth(column.saturating_sub(1))
                .map_or(text.len(), |(byte, _)| byte);
            return Some(offset + col);
        }
        offset += text.len();
    }
    None
}
