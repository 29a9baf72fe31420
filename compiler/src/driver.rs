use std::collections::{BTreeMap, HashMap};

use ensemble_manifest::{
    ApplicationDecl, ComponentDecl, ComponentType, EachBlock, Entries, Expr, Instantiation,
    Manifest, ParameterDecl, ParameterName, Statement,
};
use ensemble_scenario::{
    ApplicationInstance, ProducedCapability, ResourceRef, Value, refs::normalize_kind,
};

use crate::{
    Error,
    eval::{eval, single_title, titles},
    scope::Scope,
};

/// Definitions and instantiations of every manifest in one compile, keyed by normalised kind.
#[derive(Debug, Default)]
pub(crate) struct Definitions<'m> {
    component_types: HashMap<String, &'m ComponentType>,
    applications: HashMap<String, &'m ApplicationDecl>,
    instantiations: Vec<&'m Instantiation>,
}

/// Find phase: index everything before evaluating anything.
pub(crate) fn find(manifests: &[Manifest]) -> Result<Definitions<'_>, Error> {
    let mut defs = Definitions::default();
    for manifest in manifests {
        for (name, ty) in manifest.component_types() {
            if defs
                .component_types
                .insert(normalize_kind(name.as_str()), ty)
                .is_some()
            {
                return Err(Error::DuplicateDefinition {
                    kind: "component type",
                    name: name.to_string(),
                });
            }
        }
        for (name, app) in manifest.applications() {
            if defs
                .applications
                .insert(normalize_kind(name.as_str()), app)
                .is_some()
            {
                return Err(Error::DuplicateDefinition {
                    kind: "application",
                    name: name.to_string(),
                });
            }
        }
        defs.instantiations.extend(manifest.instances());
    }
    Ok(defs)
}

impl<'m> Definitions<'m> {
    pub(crate) fn instantiations(&self) -> &[&'m Instantiation] {
        &self.instantiations
    }

    /// Eval phase: turn one instantiation into an application instance, then expand its body.
    pub(crate) fn instantiate(&self, inst: &Instantiation) -> Result<ApplicationInstance, Error> {
        let kind = normalize_kind(inst.application.as_str());
        let app = self
            .applications
            .get(&kind)
            .ok_or_else(|| Error::UndefinedApplication {
                application: inst.application.to_string(),
            })?;

        let mut scope = Scope::new();
        let title = single_title(eval(&inst.title, &scope)?, &kind)?;
        let resource = ResourceRef::new(&kind, title.clone()).to_string();

        let mut frame = scope.frame();
        frame.bind("name", Value::String(title.clone()));

        let args = eval_args(&inst.args, &frame, &resource)?;
        // A missing `nodes` argument is reported before anything else about the arguments.
        let mut instance = ApplicationInstance::new(&kind, &title, args)?;
        if let Some(unknown) = instance
            .parameters()
            .keys()
            .find(|name| !declares(&app.parameters, name))
        {
            return Err(Error::UnknownParameter {
                resource,
                parameter: unknown.clone(),
            });
        }
        tracing::debug!(instance = %instance.reference(), "instantiating application");

        // Defaults see the title and every supplied parameter.
        for (name, value) in instance.parameters() {
            frame.bind(name.clone(), value.clone());
        }
        for (name, decl) in app.parameters.iter() {
            if instance.parameter(name.as_str()).is_some() {
                continue;
            }
            let value = default_value(decl, name, &frame, &resource)?;
            frame.bind(name.to_string(), value.clone());
            instance.set_default(name.to_string(), value);
        }

        self.expand(&app.components, &mut frame, &mut instance)?;
        Ok(instance)
    }

    /// Expand phase: statements in declaration order, each block in a frame of its own.
    fn expand(
        &self,
        statements: &[Statement],
        scope: &mut Scope,
        instance: &mut ApplicationInstance,
    ) -> Result<(), Error> {
        for statement in statements {
            match statement {
                Statement::Component(decl) => self.expand_component(decl, scope, instance)?,
                Statement::Each(block) => self.expand_each(block, scope, instance)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn expand_each(
        &self,
        block: &EachBlock,
        scope: &mut Scope,
        instance: &mut ApplicationInstance,
    ) -> Result<(), Error> {
        let items = match eval(&block.each, scope)? {
            Value::Array(items) => items,
            Value::Hash(entries) => entries
                .into_iter()
                .map(|(key, value)| Value::Array(vec![key, value]))
                .collect(),
            other => {
                return Err(Error::NotIterable {
                    found: other.type_name(),
                });
            }
        };

        for item in items {
            let mut frame = scope.frame();
            frame.bind(block.binding.to_string(), item);
            self.expand(&block.body, &mut frame, instance)?;
        }
        Ok(())
    }

    fn expand_component(
        &self,
        decl: &ComponentDecl,
        scope: &mut Scope,
        instance: &mut ApplicationInstance,
    ) -> Result<(), Error> {
        let kind = normalize_kind(decl.component.as_str());
        let title = single_title(eval(&decl.title, scope)?, &kind)?;
        let reference = ResourceRef::new(&kind, title.clone());
        let resource = reference.to_string();

        let mut args = eval_args(&decl.args, scope, &resource)?;
        let ty = self
            .component_types
            .get(&kind)
            .ok_or_else(|| Error::UndefinedComponentType {
                component_type: decl.component.to_string(),
                resource: resource.clone(),
            })?;
        if let Some(unknown) = args.keys().find(|name| !accepts(ty, name)) {
            return Err(Error::UnknownParameter {
                resource,
                parameter: unknown.clone(),
            });
        }

        if instance.component(&reference).is_none() {
            return Err(Error::UnmappedComponent {
                component: reference,
                application: instance.reference().to_string(),
            });
        }

        let mut frame = scope.frame();
        frame.bind("name", Value::String(title));
        for (name, value) in &args {
            frame.bind(name.clone(), value.clone());
        }
        for (name, decl) in ty.parameters.iter() {
            // Consumed capabilities are checked below with their own error.
            if args.contains_key(name.as_str())
                || ty.consumes.iter().any(|c| &c.parameter == name)
            {
                continue;
            }
            let value = default_value(decl, name, &frame, &resource)?;
            frame.bind(name.to_string(), value.clone());
            args.insert(name.to_string(), value);
        }

        let mut produced = Vec::new();
        for clause in &ty.produces {
            let mut attributes = BTreeMap::new();
            for (name, expr) in clause.attributes.iter() {
                attributes.insert(name.to_string(), eval(expr, &frame)?);
            }
            for title in titles(eval(&clause.title, &frame)?, clause.capability.as_str())? {
                produced.push(ProducedCapability {
                    capability: ResourceRef::new(&clause.capability, title),
                    component: reference.clone(),
                    attributes: attributes.clone(),
                });
            }
        }
        drop(frame);

        let mut consumed = Vec::new();
        for clause in &ty.consumes {
            let parameter = clause.parameter.as_str();
            let value = match args.get(parameter) {
                Some(value) if !value.is_undef() => value,
                _ => {
                    return Err(Error::MissingCapabilityArgument {
                        component: reference,
                        parameter: parameter.to_string(),
                        capability: clause.capability.to_string(),
                    });
                }
            };
            let expected = normalize_kind(clause.capability.as_str());
            let refs: Vec<&Value> = match value {
                Value::Array(items) => items.iter().collect(),
                single => vec![single],
            };
            for item in refs {
                match item.as_resource() {
                    Some(capability) if capability.kind() == expected => {
                        consumed.push(capability.clone());
                    }
                    _ => {
                        return Err(Error::CapabilityTypeMismatch {
                            component: reference,
                            parameter: parameter.to_string(),
                            expected,
                            found: item.to_string(),
                        });
                    }
                }
            }
        }

        tracing::trace!(
            component = %reference,
            produces = produced.len(),
            consumes = consumed.len(),
            "expanded component"
        );
        if let Some(component) = instance.component_mut(&reference) {
            component.produce(produced.iter().map(|p| p.capability.clone()));
            component.consume(consumed);
        }
        for capability in produced {
            instance.record_capability(capability);
        }
        Ok(())
    }
}

fn declares(parameters: &Entries<ParameterName, ParameterDecl>, name: &str) -> bool {
    parameters.keys().any(|p| p.as_str() == name)
}

fn accepts(ty: &ComponentType, name: &str) -> bool {
    declares(&ty.parameters, name) || ty.consumes.iter().any(|c| c.parameter.as_str() == name)
}

fn eval_args(
    args: &Entries<ParameterName, Expr>,
    scope: &Scope,
    resource: &str,
) -> Result<BTreeMap<String, Value>, Error> {
    if let Some(dup) = args.first_duplicate() {
        return Err(Error::DuplicateParameter {
            resource: resource.to_string(),
            parameter: dup.to_string(),
        });
    }
    args.iter()
        .map(|(name, expr)| Ok((name.to_string(), eval(expr, scope)?)))
        .collect()
}

fn default_value(
    decl: &ParameterDecl,
    name: &ParameterName,
    scope: &Scope,
    resource: &str,
) -> Result<Value, Error> {
    match &decl.default {
        Some(expr) => eval(expr, scope),
        None => Err(Error::MissingParameter {
            resource: resource.to_string(),
            parameter: name.to_string(),
        }),
    }
}
