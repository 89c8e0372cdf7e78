//! CloudFormation template model and merge engine.
//!
//! Components scattered across the project tree each contribute a partial
//! template ([`TemplateData`]). [`merge`] folds them into one deployable
//! template; [`resolve`] turns symbolic references inside it into concrete
//! values; [`requirements`] finds parameters the user has to supply; and
//! [`provision`] creates backing resources in an emulated cloud.
//!
//! # Merge semantics
//!
//! Parameters, resources and outputs are keyed by logical name. The first
//! template to define a name wins; later definitions are dropped with a
//! warning. An optional resource type filter restricts which resources are
//! taken at all.

pub mod aws;
pub mod provision;
pub mod requirements;
pub mod resolve;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tokio::fs;

use crate::core::DcError;

pub use provision::{
    ProvisionContext, ProvisionerRegistry, ResourceEnsurer, ResourceProvisioner, ServiceEndpoint,
};
pub use requirements::{find_required_configurations, function_environment_variables};
pub use resolve::{
    AttributeHandler, OfflineServices, RefHandler, ResolveContext, ServiceMonitor, ServiceStatus,
    ValueResolver,
};

const DEFAULT_FORMAT_VERSION: &str = "2010-09-09";
const DEFAULT_TRANSFORM: &str = "AWS::Serverless-2016-10-31";

/// A parsed CloudFormation template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateData {
    /// Template format version.
    #[serde(rename = "AWSTemplateFormatVersion", default = "default_format_version")]
    pub format_version: String,

    /// Macro applied to the template, normally the serverless transform.
    #[serde(default = "default_transform", skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,

    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Serverless globals shared by all functions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub globals: Option<Value>,

    /// Named conditions.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub conditions: BTreeMap<String, Value>,

    /// Input parameters by logical name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, Parameter>,

    /// Resources by logical name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resources: BTreeMap<String, ResourceData>,

    /// Outputs by logical name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, Value>,
}

fn default_format_version() -> String {
    DEFAULT_FORMAT_VERSION.to_string()
}

#[allow(clippy::unnecessary_wraps)]
fn default_transform() -> Option<String> {
    Some(DEFAULT_TRANSFORM.to_string())
}

impl Default for TemplateData {
    fn default() -> Self {
        Self {
            format_version: default_format_version(),
            transform: default_transform(),
            description: None,
            globals: None,
            conditions: BTreeMap::new(),
            parameters: BTreeMap::new(),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }
}

/// A template parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Parameter {
    /// Parameter type, e.g. `String`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,

    /// Value used when none is supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Description shown to the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Values the parameter is restricted to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Value>,

    /// Whether the value is masked in the console.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_echo: Option<Value>,
}

impl Parameter {
    /// The default rendered as a string, if it is a scalar.
    pub fn default_value(&self) -> Option<String> {
        self.default.as_ref().and_then(scalar_to_string)
    }
}

/// A template resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResourceData {
    /// Resource type tag, e.g. `AWS::DynamoDB::Table`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,

    /// Property bag.
    #[serde(default, skip_serializing_if = "serde_yaml::Mapping::is_empty")]
    pub properties: serde_yaml::Mapping,

    /// Logical names this resource depends on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<Value>,

    /// Condition guarding creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    /// Free-form metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,

    /// What happens to the resource on stack deletion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<String>,
}

impl ResourceData {
    /// Creates a resource of `resource_type` with `properties`.
    pub fn new(resource_type: impl Into<String>, properties: serde_yaml::Mapping) -> Self {
        Self {
            r#type: Some(resource_type.into()),
            properties,
            ..Self::default()
        }
    }

    /// Looks up a top-level property.
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Whether this resource has type `resource_type`.
    pub fn is_type(&self, resource_type: &str) -> bool {
        self.r#type.as_deref() == Some(resource_type)
    }
}

impl TemplateData {
    /// Parses a template from YAML text. `origin` names the source in errors.
    pub fn parse(content: &str, origin: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| {
            DcError::TemplateParseError {
                file: origin.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Reads and parses the template at `path`.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read template {}", path.display()))?;
        Self::parse(&content, &path.display().to_string())
    }

    /// Serializes to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize template")
    }

    /// Writes the template as YAML to `path`, creating parent directories.
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        fs::write(path, self.to_yaml()?)
            .await
            .with_context(|| format!("Failed to write template {}", path.display()))
    }

    /// Whether the template declares nothing.
    pub fn is_empty(&self) -> bool {
        self.globals.is_none()
            && self.conditions.is_empty()
            && self.parameters.is_empty()
            && self.resources.is_empty()
            && self.outputs.is_empty()
    }

    /// Resources of `resource_type`, in name order.
    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a ResourceData)> + 'a {
        self.resources.iter().filter(move |(_, resource)| resource.is_type(resource_type))
    }
}

/// Merges `templates` in order.
///
/// Colliding parameter, resource and output names keep the first definition.
/// When `include_types` is given, only resources whose type is listed are
/// taken; parameters and outputs are unaffected by the filter.
pub fn merge<I>(templates: I, include_types: Option<&[&str]>) -> TemplateData
where
    I: IntoIterator<Item = TemplateData>,
{
    let mut merged = TemplateData::default();

    for template in templates {
        if merged.description.is_none() {
            merged.description = template.description;
        }
        if merged.globals.is_none() {
            merged.globals = template.globals;
        }

        for (name, condition) in template.conditions {
            insert_first(&mut merged.conditions, "Conditions", name, condition);
        }

        for (name, parameter) in template.parameters {
            insert_first(&mut merged.parameters, "Parameters", name, parameter);
        }

        for (name, resource) in template.resources {
            let included = include_types.is_none_or(|types| {
                resource.r#type.as_deref().is_some_and(|t| types.contains(&t))
            });
            if included {
                insert_first(&mut merged.resources, "Resources", name, resource);
            }
        }

        for (name, output) in template.outputs {
            insert_first(&mut merged.outputs, "Outputs", name, output);
        }
    }

    merged
}

fn insert_first<T>(section: &mut BTreeMap<String, T>, label: &str, name: String, value: T) {
    if section.contains_key(&name) {
        tracing::warn!("{label}.{name} is defined more than once; keeping the first definition");
    } else {
        section.insert(name, value);
    }
}

/// Renders a YAML scalar as a string. Mappings and sequences yield `None`.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Turns a component name into a valid CloudFormation logical id.
///
/// Logical ids are alphanumeric; other characters are dropped and the
/// following character is upper-cased.
pub fn logical_id(name: &str) -> String {
    let mut id = String::with_capacity(name.len());
    let mut upper_next = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if upper_next {
                id.push(c.to_ascii_uppercase());
            } else {
                id.push(c);
            }
            upper_next = false;
        } else {
            upper_next = true;
        }
    }
    id
}
