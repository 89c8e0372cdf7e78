//! Symbolic reference resolution.
//!
//! Template values may be plain scalars or references to other declarations:
//!
//! ```yaml
//! TABLE: !Ref OrdersTable              # short form
//! TABLE: { Ref: OrdersTable }          # long form
//! ARN: !GetAtt OrdersTable.Arn
//! ARN: { "Fn::GetAtt": [OrdersTable, Arn] }
//! ```
//!
//! A `Ref` to a parameter resolves through the settings store (namespaced by
//! `cloudformation-parameters:`) and falls back to the parameter's default.
//! A `Ref` or `GetAtt` to a resource is dispatched on the resource's type to a
//! registered handler, which may have to ask a running emulated service.
//!
//! Anything that cannot be resolved yields `None`: the backing service may
//! simply not be up yet.

use anyhow::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_yaml::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{ResourceData, TemplateData, scalar_to_string};
use crate::config::ProjectSettings;
use crate::constants::CLOUDFORMATION_PARAMETER_PREFIX;

/// Reachability of an emulated cloud service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceStatus {
    /// Whether the service answers requests.
    pub running: bool,
    /// Port the service listens on.
    pub port: u16,
}

/// Reports whether an emulated cloud service can be reached.
#[async_trait]
pub trait ServiceMonitor: Send + Sync {
    /// Current status of `service` (e.g. `cognito-idp`).
    async fn status(&self, service: &str) -> ServiceStatus;
}

/// Everything a resolution needs besides the value itself.
#[derive(Clone, Copy)]
pub struct ResolveContext<'a> {
    /// Template declaring the referenced parameters and resources.
    pub template: &'a TemplateData,
    /// Settings holding parameter values.
    pub settings: &'a ProjectSettings,
    /// Status of the services backing resources.
    pub monitor: &'a dyn ServiceMonitor,
    /// Region of the emulated cloud.
    pub region: &'a str,
}

/// Resolves `Ref` for one resource type.
#[async_trait]
pub trait RefHandler: Send + Sync {
    /// Value of `!Ref logical_id`.
    async fn resolve_ref(
        &self,
        logical_id: &str,
        resource: &ResourceData,
        resolver: &ValueResolver,
        ctx: &ResolveContext<'_>,
    ) -> Result<Option<String>>;
}

/// Resolves `GetAtt` for one resource type.
#[async_trait]
pub trait AttributeHandler: Send + Sync {
    /// Value of `!GetAtt logical_id.attribute`.
    async fn resolve_attribute(
        &self,
        logical_id: &str,
        resource: &ResourceData,
        attribute: &str,
        resolver: &ValueResolver,
        ctx: &ResolveContext<'_>,
    ) -> Result<Option<String>>;
}

/// Type-keyed dispatch tables for `Ref` and `GetAtt`.
#[derive(Clone, Default)]
pub struct ValueResolver {
    refs: HashMap<String, Arc<dyn RefHandler>>,
    attributes: HashMap<String, Arc<dyn AttributeHandler>>,
}

impl fmt::Debug for ValueResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut refs: Vec<_> = self.refs.keys().collect();
        refs.sort();
        let mut attributes: Vec<_> = self.attributes.keys().collect();
        attributes.sort();
        f.debug_struct("ValueResolver")
            .field("refs", &refs)
            .field("attributes", &attributes)
            .finish()
    }
}

/// A reference-shaped value.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Reference {
    Ref(String),
    GetAtt {
        logical_id: String,
        attribute: String,
    },
}

impl Reference {
    fn parse(value: &Value) -> Option<Self> {
        match value {
            Value::Tagged(tagged) if tagged.tag == "Ref" => {
                tagged.value.as_str().map(|name| Self::Ref(name.to_string()))
            }
            Value::Tagged(tagged) if tagged.tag == "GetAtt" => Self::get_att(&tagged.value),
            Value::Mapping(map) if map.len() == 1 => {
                let (key, inner) = map.iter().next()?;
                match key.as_str()? {
                    "Ref" => inner.as_str().map(|name| Self::Ref(name.to_string())),
                    "GetAtt" | "Fn::GetAtt" => Self::get_att(inner),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn get_att(value: &Value) -> Option<Self> {
        let (logical_id, attribute) = match value {
            Value::String(path) => {
                let (id, attribute) = path.split_once('.')?;
                (id.to_string(), attribute.to_string())
            }
            Value::Sequence(parts) => {
                let mut parts = parts.iter().map(Value::as_str);
                let id = parts.next()??;
                let rest: Option<Vec<&str>> = parts.collect();
                let rest = rest?;
                if rest.is_empty() {
                    return None;
                }
                (id.to_string(), rest.join("."))
            }
            _ => return None,
        };
        Some(Self::GetAtt {
            logical_id,
            attribute,
        })
    }
}

impl ValueResolver {
    /// A resolver with no resource handlers; only parameters resolve.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the `Ref` handler for `resource_type`.
    pub fn register_ref(
        &mut self,
        resource_type: impl Into<String>,
        handler: Arc<dyn RefHandler>,
    ) -> &mut Self {
        self.refs.insert(resource_type.into(), handler);
        self
    }

    /// Registers the `GetAtt` handler for `resource_type`.
    pub fn register_attribute(
        &mut self,
        resource_type: impl Into<String>,
        handler: Arc<dyn AttributeHandler>,
    ) -> &mut Self {
        self.attributes.insert(resource_type.into(), handler);
        self
    }

    /// Resolves `value` against `ctx`.
    ///
    /// Scalars pass through unchanged. References resolve as described in the
    /// module docs; unknown shapes, unknown names and untyped resources give
    /// `None`.
    pub fn resolve<'a>(
        &'a self,
        value: &'a Value,
        ctx: &'a ResolveContext<'a>,
    ) -> BoxFuture<'a, Option<String>> {
        Box::pin(async move {
            if let Some(scalar) = scalar_to_string(value) {
                return Some(scalar);
            }

            match Reference::parse(value)? {
                Reference::Ref(name) => self.resolve_ref(&name, ctx).await,
                Reference::GetAtt {
                    logical_id,
                    attribute,
                } => self.resolve_attribute(&logical_id, &attribute, ctx).await,
            }
        })
    }

    async fn resolve_ref(&self, name: &str, ctx: &ResolveContext<'_>) -> Option<String> {
        if let Some(parameter) = ctx.template.parameters.get(name) {
            let key = format!("{CLOUDFORMATION_PARAMETER_PREFIX}{name}");
            return ctx
                .settings
                .get_opt(&key)
                .map(str::to_string)
                .or_else(|| parameter.default_value());
        }

        let resource = ctx.template.resources.get(name)?;
        let resource_type = resource.r#type.as_deref()?;
        let Some(handler) = self.refs.get(resource_type) else {
            tracing::debug!("No Ref handler for {resource_type} ({name})");
            return None;
        };

        match handler.resolve_ref(name, resource, self, ctx).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Failed to resolve Ref {name}: {e:#}");
                None
            }
        }
    }

    async fn resolve_attribute(
        &self,
        logical_id: &str,
        attribute: &str,
        ctx: &ResolveContext<'_>,
    ) -> Option<String> {
        let resource = ctx.template.resources.get(logical_id)?;
        let resource_type = resource.r#type.as_deref()?;
        let Some(handler) = self.attributes.get(resource_type) else {
            tracing::debug!("No GetAtt handler for {resource_type} ({logical_id}.{attribute})");
            return None;
        };

        match handler.resolve_attribute(logical_id, resource, attribute, self, ctx).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Failed to resolve GetAtt {logical_id}.{attribute}: {e:#}");
                None
            }
        }
    }
}

/// Reports every service as down.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineServices;

#[async_trait]
impl ServiceMonitor for OfflineServices {
    async fn status(&self, _service: &str) -> ServiceStatus {
        ServiceStatus::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigScope;

    struct EchoHandler;

    #[async_trait]
    impl RefHandler for EchoHandler {
        async fn resolve_ref(
            &self,
            logical_id: &str,
            _resource: &ResourceData,
            _resolver: &ValueResolver,
            _ctx: &ResolveContext<'_>,
        ) -> Result<Option<String>> {
            Ok(Some(format!("ref:{logical_id}")))
        }
    }

    struct ArnHandler;

    #[async_trait]
    impl AttributeHandler for ArnHandler {
        async fn resolve_attribute(
            &self,
            logical_id: &str,
            _resource: &ResourceData,
            attribute: &str,
            _resolver: &ValueResolver,
            _ctx: &ResolveContext<'_>,
        ) -> Result<Option<String>> {
            Ok(Some(format!("{logical_id}/{attribute}")))
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl RefHandler for FailingHandler {
        async fn resolve_ref(
            &self,
            _logical_id: &str,
            _resource: &ResourceData,
            _resolver: &ValueResolver,
            _ctx: &ResolveContext<'_>,
        ) -> Result<Option<String>> {
            anyhow::bail!("service exploded")
        }
    }

    fn template() -> TemplateData {
        TemplateData::parse(
            r"
Parameters:
  Stage:
    Type: String
    Default: dev
  ApiKey:
    Type: String
Resources:
  Orders:
    Type: AWS::DynamoDB::Table
  Files:
    Type: AWS::S3::Bucket
  Loose:
    Properties: {}
",
            "test",
        )
        .unwrap()
    }

    fn resolver() -> ValueResolver {
        let mut resolver = ValueResolver::new();
        resolver
            .register_ref("AWS::DynamoDB::Table", Arc::new(EchoHandler))
            .register_ref("AWS::S3::Bucket", Arc::new(FailingHandler))
            .register_attribute("AWS::DynamoDB::Table", Arc::new(ArnHandler));
        resolver
    }

    fn yaml(text: &str) -> Value {
        serde_yaml::from_str(text).unwrap()
    }

    async fn resolve(value: &str, settings: &ProjectSettings) -> Option<String> {
        let template = template();
        let ctx = ResolveContext {
            template: &template,
            settings,
            monitor: &OfflineServices,
            region: "us-east-1",
        };
        let value = yaml(value);
        resolver().resolve(&value, &ctx).await
    }

    #[tokio::test]
    async fn test_scalars_pass_through() {
        let settings = ProjectSettings::new("/proj", "shop");
        assert_eq!(resolve("plain", &settings).await.as_deref(), Some("plain"));
        assert_eq!(resolve("42", &settings).await.as_deref(), Some("42"));
        assert_eq!(resolve("true", &settings).await.as_deref(), Some("true"));
    }

    #[tokio::test]
    async fn test_parameter_default_then_stored_value() {
        let mut settings = ProjectSettings::new("/proj", "shop");
        assert_eq!(resolve("!Ref Stage", &settings).await.as_deref(), Some("dev"));

        settings.set("cloudformation-parameters:Stage", "local", ConfigScope::User);
        assert_eq!(resolve("!Ref Stage", &settings).await.as_deref(), Some("local"));
        assert_eq!(resolve("{ Ref: Stage }", &settings).await.as_deref(), Some("local"));
    }

    #[tokio::test]
    async fn test_parameter_without_default_or_value_is_absent() {
        let settings = ProjectSettings::new("/proj", "shop");
        assert_eq!(resolve("!Ref ApiKey", &settings).await, None);
    }

    #[tokio::test]
    async fn test_resource_ref_dispatches_on_type() {
        let settings = ProjectSettings::new("/proj", "shop");
        assert_eq!(resolve("!Ref Orders", &settings).await.as_deref(), Some("ref:Orders"));
    }

    #[tokio::test]
    async fn test_get_att_forms() {
        let settings = ProjectSettings::new("/proj", "shop");
        assert_eq!(resolve("!GetAtt Orders.Arn", &settings).await.as_deref(), Some("Orders/Arn"));
        assert_eq!(
            resolve("{ 'Fn::GetAtt': [Orders, StreamArn] }", &settings).await.as_deref(),
            Some("Orders/StreamArn")
        );
        assert_eq!(
            resolve("{ GetAtt: Orders.Stream.Arn }", &settings).await.as_deref(),
            Some("Orders/Stream.Arn")
        );
    }

    #[tokio::test]
    async fn test_unresolvable_shapes_are_absent() {
        let settings = ProjectSettings::new("/proj", "shop");
        // untyped resource
        assert_eq!(resolve("!Ref Loose", &settings).await, None);
        // unknown name
        assert_eq!(resolve("!Ref Missing", &settings).await, None);
        // no attribute handler for bucket
        assert_eq!(resolve("!GetAtt Files.Arn", &settings).await, None);
        // handler error
        assert_eq!(resolve("!Ref Files", &settings).await, None);
        // unsupported intrinsic
        assert_eq!(resolve("{ 'Fn::Join': ['-', [a, b]] }", &settings).await, None);
        assert_eq!(resolve("[a, b]", &settings).await, None);
    }
}
