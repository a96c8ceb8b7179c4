//! Stack manifest rendering
//!
//! The base infrastructure manifest is shipped as-is. The per-deployment
//! manifest is a YAML template whose string scalars may reference a closed
//! set of fields (`{{deployment_id}}`, `{{image}}`); the merged
//! configuration is then injected into every service's `environment`
//! mapping. All of this happens on the parsed document.
//!
//! The result is written out as JSON. Stack managers read manifests with a
//! YAML 1.1 parser, which turns plain scalars such as `yes`, `on` or `1_000`
//! into booleans and integers; JSON is valid YAML and double-quotes every
//! string, so environment values reach the container unchanged.

use serde_yaml::{Mapping, Value};

use crate::deploy::config::ConfigMap;
use crate::errors::DeployError;

/// Base infrastructure manifest: reverse proxy, database, cache
pub const SERVER_MANIFEST: &str = include_str!("../../templates/stack-server.yml");

/// Per-deployment manifest template
pub const DEPLOYMENT_TEMPLATE: &str = include_str!("../../templates/stack-deployment.yml");

/// Values a template may reference
#[derive(Debug, Clone, Copy)]
pub struct TemplateFields<'a> {
    pub deployment_id: &'a str,
    pub image: &'a str,
}

impl TemplateFields<'_> {
    fn lookup(&self, name: &str) -> Option<&str> {
        match name {
            "deployment_id" => Some(self.deployment_id),
            "image" => Some(self.image),
            _ => None,
        }
    }
}

/// The fixed base manifest, byte for byte
pub fn server_manifest() -> &'static [u8] {
    SERVER_MANIFEST.as_bytes()
}

/// Render a per-deployment manifest from `template`
pub fn render(
    template: &str,
    deployment_id: &str,
    image: &str,
    config: &ConfigMap,
) -> Result<String, DeployError> {
    let fields = TemplateFields {
        deployment_id,
        image,
    };

    let mut document: Value = serde_yaml::from_str(template)?;
    substitute_value(&mut document, &fields)?;

    let services = document
        .get_mut("services")
        .and_then(Value::as_mapping_mut)
        .ok_or_else(|| DeployError::Render("template declares no services".to_string()))?;

    let mut injected = 0;
    for (_, service) in services.iter_mut() {
        let Some(environment) = service
            .get_mut("environment")
            .and_then(Value::as_mapping_mut)
        else {
            continue;
        };
        stringify_environment(environment)?;
        for (key, value) in config.iter() {
            environment.insert(
                Value::String(key.to_string()),
                Value::String(escape_interpolation(value)),
            );
        }
        injected += 1;
    }

    if injected == 0 {
        return Err(DeployError::Render(
            "no service in the template has an environment mapping".to_string(),
        ));
    }

    let mut text = serde_json::to_string_pretty(&document)
        .map_err(|e| DeployError::Render(format!("unable to serialize manifest: {}", e)))?;
    text.push('\n');
    Ok(text)
}

/// Replace `{{name}}` references in `text`
pub fn substitute(text: &str, fields: &TemplateFields<'_>) -> Result<String, DeployError> {
    let mut output = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find("}}").ok_or_else(|| {
            DeployError::Render(format!("unterminated placeholder in '{}'", text))
        })?;
        let name = after[..end].trim();
        let value = fields.lookup(name).ok_or_else(|| {
            DeployError::Render(format!("unknown placeholder '{{{{{}}}}}'", name))
        })?;
        output.push_str(value);
        rest = &after[end + 2..];
    }
    output.push_str(rest);
    Ok(output)
}

fn substitute_value(value: &mut Value, fields: &TemplateFields<'_>) -> Result<(), DeployError> {
    match value {
        Value::String(text) => {
            if text.contains("{{") {
                *text = substitute(text, fields)?;
            }
        }
        Value::Sequence(items) => {
            for item in items {
                substitute_value(item, fields)?;
            }
        }
        Value::Mapping(mapping) => {
            for (_, item) in mapping.iter_mut() {
                substitute_value(item, fields)?;
            }
        }
        Value::Tagged(tagged) => substitute_value(&mut tagged.value, fields)?,
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
    Ok(())
}

/// The stack manager only accepts string environment values
fn stringify_environment(environment: &mut Mapping) -> Result<(), DeployError> {
    for (key, value) in environment.iter_mut() {
        let text = match value {
            Value::String(_) => continue,
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Number(n) => n.to_string(),
            Value::Null => String::new(),
            _ => {
                return Err(DeployError::Render(format!(
                    "environment entry {:?} is not a scalar",
                    key
                )))
            }
        };
        *value = Value::String(text);
    }
    Ok(())
}

/// `$` starts variable interpolation in stack manifests; `$$` is a literal `$`
fn escape_interpolation(value: &str) -> String {
    value.replace('$', "$$")
}
