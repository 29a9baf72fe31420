use ensemble_manifest::{Expr, InterpolatedPart, InterpolatedString};
use ensemble_scenario::{ResourceRef, Value};

use crate::{Error, scope::Scope};

/// Reduce an expression to a value in `scope`.
pub fn eval(expr: &Expr, scope: &Scope) -> Result<Value, Error> {
    Ok(match expr {
        Expr::Undef => Value::Undef,
        Expr::Bool(b) => Value::Bool(*b),
        Expr::Number(n) => Value::Number(n.clone()),
        Expr::String(s) => Value::String(interpolate(s, scope)?),
        Expr::Variable(name) => scope
            .lookup(name.as_str())
            .cloned()
            .ok_or_else(|| Error::UndefinedVariable {
                name: name.to_string(),
            })?,
        Expr::Resource { kind, title } => {
            Value::Resource(ResourceRef::new(kind, interpolate(title, scope)?))
        }
        Expr::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| eval(item, scope))
                .collect::<Result<_, _>>()?,
        ),
        Expr::Hash(entries) => Value::Hash(
            entries
                .iter()
                .map(|(key, value)| Ok((eval(key, scope)?, eval(value, scope)?)))
                .collect::<Result<_, Error>>()?,
        ),
        _ => {
            return Err(Error::UnsupportedExpression {
                expr: expr.to_string(),
            });
        }
    })
}

fn interpolate(s: &InterpolatedString, scope: &Scope) -> Result<String, Error> {
    let mut out = String::new();
    for part in &s.parts {
        match part {
            InterpolatedPart::Literal(lit) => out.push_str(lit),
            InterpolatedPart::Variable(name) => {
                let value = scope
                    .lookup(name.as_str())
                    .ok_or_else(|| Error::UndefinedVariable {
                        name: name.to_string(),
                    })?;
                out.push_str(&value.to_string());
            }
            _ => {
                return Err(Error::UnsupportedExpression {
                    expr: s.to_string(),
                });
            }
        }
    }
    Ok(out)
}

/// Titles name exactly one resource; a one-element array is accepted as that element.
pub fn single_title(value: Value, resource: &str) -> Result<String, Error> {
    match value {
        Value::String(title) => Ok(title),
        Value::Array(mut titles) if titles.len() == 1 => single_title(titles.remove(0), resource),
        Value::Array(titles) if titles.len() > 1 => Err(Error::UnsupportedMultiTitle {
            resource: resource.to_string(),
            count: titles.len(),
        }),
        other => Err(Error::InvalidTitle {
            resource: resource.to_string(),
            found: other.type_name(),
        }),
    }
}

/// Produces titles may be one string or an array of strings, one capability each.
pub fn titles(value: Value, resource: &str) -> Result<Vec<String>, Error> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| single_title(item, resource))
            .collect(),
        other => Ok(vec![single_title(other, resource)?]),
    }
}
