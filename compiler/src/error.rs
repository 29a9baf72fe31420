use ensemble_scenario::{CapabilityRef, ComponentRef};
use miette::Diagnostic;
use thiserror::Error;

#[allow(unused_assignments)]
#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Scenario(#[from] ensemble_scenario::Error),

    #[error("{kind} `{name}` is defined more than once")]
    #[diagnostic(code(compiler::duplicate_definition))]
    DuplicateDefinition { kind: &'static str, name: String },

    #[error("application `{application}` is not defined")]
    #[diagnostic(code(compiler::undefined_application))]
    UndefinedApplication { application: String },

    #[error("component type `{component_type}` used by {resource} is not defined")]
    #[diagnostic(code(compiler::undefined_component_type))]
    UndefinedComponentType {
        component_type: String,
        resource: String,
    },

    #[error("{resource} has {count} titles; only one title per declaration is supported")]
    #[diagnostic(
        code(compiler::unsupported_multi_title),
        help("Declare each instance separately.")
    )]
    UnsupportedMultiTitle { resource: String, count: usize },

    #[error("title of {resource} must be a string, found {found}")]
    #[diagnostic(code(compiler::invalid_title))]
    InvalidTitle {
        resource: String,
        found: &'static str,
    },

    #[error("parameter `{parameter}` is given more than once to {resource}")]
    #[diagnostic(code(compiler::duplicate_parameter))]
    DuplicateParameter { resource: String, parameter: String },

    #[error("{resource} has no parameter named `{parameter}`")]
    #[diagnostic(code(compiler::unknown_parameter))]
    UnknownParameter { resource: String, parameter: String },

    #[error("parameter `{parameter}` of {resource} has no value")]
    #[diagnostic(
        code(compiler::missing_parameter),
        help("Pass the parameter or give it a default.")
    )]
    MissingParameter { resource: String, parameter: String },

    #[error("{component} is declared in {application} but not mapped to any node")]
    #[diagnostic(
        code(compiler::unmapped_component),
        help("Every component declared by an application must appear in its `nodes` argument.")
    )]
    UnmappedComponent {
        component: ComponentRef,
        application: String,
    },

    #[error("{component} consumes {capability} through `{parameter}`, but no value was given")]
    #[diagnostic(code(compiler::missing_capability_argument))]
    MissingCapabilityArgument {
        component: ComponentRef,
        parameter: String,
        capability: String,
    },

    #[error("`{parameter}` of {component} must reference a {expected} capability, found {found}")]
    #[diagnostic(code(compiler::capability_type_mismatch))]
    CapabilityTypeMismatch {
        component: ComponentRef,
        parameter: String,
        expected: String,
        found: String,
    },

    #[error("`each` needs an array or a hash, found {found}")]
    #[diagnostic(code(compiler::not_iterable))]
    NotIterable { found: &'static str },

    #[error("unknown variable `${name}`")]
    #[diagnostic(code(compiler::undefined_variable))]
    UndefinedVariable { name: String },

    #[error("cannot evaluate `{expr}`")]
    #[diagnostic(code(compiler::unsupported_expression))]
    UnsupportedExpression { expr: String },

    #[error("looking up {capability} for {component} failed")]
    #[diagnostic(
        code(compiler::capability_lookup_failed),
        help("The capability registry could not be reached or gave an unusable answer.")
    )]
    CapabilityLookupFailed {
        component: ComponentRef,
        capability: CapabilityRef,
        #[source]
        source: ensemble_registry::Error,
    },
}
