use std::sync::Arc;

use miette::{Diagnostic, NamedSource, SourceSpan};
use semver::Version;
use thiserror::Error;

#[allow(unused_assignments)]
#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum Error {
    #[error("json5 parse error: {message}")]
    #[diagnostic(code(manifest::json5_error))]
    Json5 {
        message: String,
        #[source_code]
        src: NamedSource<Arc<str>>,
        #[label("here")]
        span: Option<SourceSpan>,
    },

    #[error("invalid manifest at `{path}`: {message}")]
    #[diagnostic(code(manifest::deserialize_error))]
    Deserialize {
        path: String,
        message: String,
        #[source_code]
        src: NamedSource<Arc<str>>,
        #[label("{message}")]
        span: Option<SourceSpan>,
    },

    #[error("io error: {0}")]
    #[diagnostic(code(manifest::io_error))]
    Io(#[from] std::io::Error),

    #[error("invalid {kind} name `{name}`")]
    #[diagnostic(
        code(manifest::invalid_name),
        help(
            "Names are identifiers (`[A-Za-z_][A-Za-z0-9_]*`); type and application names may \
             be namespaced with `::`."
        )
    )]
    InvalidName { kind: &'static str, name: String },

    #[error("invalid interpolation in `{0}`")]
    #[diagnostic(
        code(manifest::invalid_interpolation),
        help("Interpolations have the form `${{name}}`.")
    )]
    InvalidInterpolation(String),

    #[error("invalid resource reference `{0}`")]
    #[diagnostic(
        code(manifest::invalid_resource_ref),
        help("Resource references have the form `Type[title]`.")
    )]
    InvalidResourceRef(String),

    #[error("unsupported manifest version `{version}` (supported: {supported_req})")]
    #[diagnostic(code(manifest::unsupported_version))]
    UnsupportedManifestVersion {
        version: Version,
        supported_req: &'static str,
    },

    #[error("parameter `{parameter}` is declared more than once on {owner}")]
    #[diagnostic(code(manifest::duplicate_parameter_decl))]
    DuplicateParameterDecl { owner: String, parameter: String },

    #[error("{owner} declares `{parameter}` as a consumes parameter more than once")]
    #[diagnostic(code(manifest::duplicate_consumes_parameter))]
    DuplicateConsumesParameter { owner: String, parameter: String },
}
