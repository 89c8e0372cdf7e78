//! Configuration a template needs from the user.

use serde_yaml::{Mapping, Value};
use std::collections::BTreeSet;

use super::{ResourceData, TemplateData};
use crate::config::{ConfigScope, RequiredConfiguration};
use crate::constants::CLOUDFORMATION_PARAMETER_PREFIX;

/// Resource types whose properties carry `Environment.Variables`.
pub const FUNCTION_RESOURCE_TYPES: &[&str] = &["AWS::Serverless::Function", "AWS::Lambda::Function"];

/// The `Environment.Variables` mapping of a function-like resource.
pub fn function_environment_variables(resource: &ResourceData) -> Option<&Mapping> {
    let resource_type = resource.r#type.as_deref()?;
    if !FUNCTION_RESOURCE_TYPES.contains(&resource_type) {
        return None;
    }
    resource.property("Environment")?.get("Variables")?.as_mapping()
}

/// Parameters referenced from function environment variables that have no
/// template default.
///
/// Each becomes a user-scoped entry keyed
/// `cloudformation-parameters:<Parameter>`. A parameter referenced from
/// several functions is reported once.
pub fn find_required_configurations(template: &TemplateData) -> Vec<RequiredConfiguration> {
    let mut seen = BTreeSet::new();
    let mut required = Vec::new();

    for resource in template.resources.values() {
        let Some(variables) = function_environment_variables(resource) else {
            continue;
        };

        for value in variables.values() {
            let Some(name) = parameter_ref(value) else {
                continue;
            };
            let Some(parameter) = template.parameters.get(name) else {
                continue;
            };
            if parameter.default.is_some() || !seen.insert(name.to_string()) {
                continue;
            }

            let mut prompt = format!("Please enter local value for cloudformation parameter \"{name}\"");
            if let Some(description) = &parameter.description {
                prompt.push_str(&format!(" ({description})"));
            }
            prompt.push(':');

            required.push(RequiredConfiguration::new(
                format!("{CLOUDFORMATION_PARAMETER_PREFIX}{name}"),
                prompt,
                ConfigScope::User,
            ));
        }
    }

    required
}

fn parameter_ref(value: &Value) -> Option<&str> {
    match value {
        Value::Tagged(tagged) if tagged.tag == "Ref" => tagged.value.as_str(),
        Value::Mapping(map) if map.len() == 1 => map.get("Ref")?.as_str(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = r"
Parameters:
  ApiKey:
    Type: String
    Description: third-party key
  Stage:
    Type: String
    Default: dev
  Unused:
    Type: String
Resources:
  CreateOrder:
    Type: AWS::Serverless::Function
    Properties:
      Environment:
        Variables:
          API_KEY: !Ref ApiKey
          STAGE: !Ref Stage
          TABLE: !Ref Orders
          LITERAL: value
  ListOrders:
    Type: AWS::Lambda::Function
    Properties:
      Environment:
        Variables:
          API_KEY: { Ref: ApiKey }
  Orders:
    Type: AWS::DynamoDB::Table
";

    #[test]
    fn test_env_var_parameter_refs_without_default() {
        let template = TemplateData::parse(TEMPLATE, "test").unwrap();
        let required = find_required_configurations(&template);

        assert_eq!(required.len(), 1);
        assert_eq!(required[0].key, "cloudformation-parameters:ApiKey");
        assert_eq!(required[0].scope, ConfigScope::User);
        assert!(required[0].prompt.contains("\"ApiKey\""));
        assert!(required[0].prompt.contains("third-party key"));
    }

    #[test]
    fn test_non_function_resources_have_no_variables() {
        let template = TemplateData::parse(TEMPLATE, "test").unwrap();
        assert!(function_environment_variables(&template.resources["Orders"]).is_none());
        assert_eq!(
            function_environment_variables(&template.resources["CreateOrder"]).map(Mapping::len),
            Some(4)
        );
    }
}
