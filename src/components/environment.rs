//! Resolving function environment variables for local runs.
//!
//! A local API gateway hands its functions an `environment.json` of the form
//! `{ "<FunctionLogicalId>": { "<VARIABLE>": "<value>" } }`. Values are
//! resolved by the [`ParsesCloudformationValues`] components found from the
//! gateway's node outwards: the nearest parser answering wins.

use serde_yaml::Value;
use std::collections::BTreeMap;

use super::capabilities::ParsesCloudformationValues;
use super::tree::{Direction, Found};
use super::TreeContext;
use crate::template::{TemplateData, function_environment_variables};

/// Resolved variables per function logical id.
pub type EnvironmentVariables = BTreeMap<String, BTreeMap<String, String>>;

/// Value parsers visible from `ctx.node`, nearest first.
pub fn value_parsers<'t>(ctx: &TreeContext<'t>) -> Vec<Found<'t, dyn ParsesCloudformationValues>> {
    ctx.tree.find_all::<dyn ParsesCloudformationValues>(ctx.node, Direction::Out)
}

/// Asks each parser in turn; the first value wins.
///
/// A parser error counts as "no value" and is logged.
pub async fn parse_value(
    parsers: &[Found<'_, dyn ParsesCloudformationValues>],
    value: &Value,
    template: Option<&TemplateData>,
    ctx: &TreeContext<'_>,
) -> Option<String> {
    for parser in parsers {
        let parser_ctx = ctx.at(parser.node);
        match parser.component.parse(value, template, &parser_ctx).await {
            Ok(Some(parsed)) => return Some(parsed),
            Ok(None) => {}
            Err(e) => tracing::warn!("{} could not parse value: {e:#}", parser.component.name()),
        }
    }
    None
}

/// Resolves the `Environment.Variables` of every function in `template`.
///
/// Variables no parser can resolve are set to an empty string.
pub async fn find_environment_variables(
    template: &TemplateData,
    parsers: &[Found<'_, dyn ParsesCloudformationValues>],
    ctx: &TreeContext<'_>,
) -> EnvironmentVariables {
    let mut result = EnvironmentVariables::new();

    for (logical_id, resource) in &template.resources {
        let Some(variables) = function_environment_variables(resource) else {
            continue;
        };

        let mut resolved = BTreeMap::new();
        for (name, value) in variables {
            let Some(name) = name.as_str() else {
                continue;
            };
            let parsed = parse_value(parsers, value, Some(template), ctx).await;
            if parsed.is_none() {
                tracing::debug!("{logical_id}.{name} could not be resolved, using an empty value");
            }
            resolved.insert(name.to_string(), parsed.unwrap_or_default());
        }
        result.insert(logical_id.clone(), resolved);
    }

    result
}
