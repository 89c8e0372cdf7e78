//! Built-in handlers for AWS resource types.
//!
//! | Type | Ref | Ensure (priority) | Service |
//! |---|---|---|---|
//! | `AWS::S3::Bucket` | bucket name | 1 | `s3` |
//! | `AWS::DynamoDB::Table` | table name | 1 | `dynamodb` |
//! | `AWS::Cognito::UserPool` | pool id, via the running emulator | 2 | `cognito-idp` |
//!
//! Creation is delegated to a [`ResourceProvisioner`]; [`AwsCliProvisioner`]
//! drives the AWS CLI in a container against the emulator endpoint.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_yaml::Mapping;
use std::fmt;
use std::sync::Arc;

use super::provision::{ProvisionContext, ProvisionerRegistry, ResourceEnsurer, ResourceProvisioner, ServiceEndpoint};
use super::resolve::{RefHandler, ResolveContext, ValueResolver};
use super::ResourceData;
use crate::runner::{CommandRunner, ContainerSpec};

/// `AWS::S3::Bucket`
pub const BUCKET: &str = "AWS::S3::Bucket";
/// `AWS::DynamoDB::Table`
pub const TABLE: &str = "AWS::DynamoDB::Table";
/// `AWS::Cognito::UserPool`
pub const USER_POOL: &str = "AWS::Cognito::UserPool";

const AWS_CLI_IMAGE: &str = "amazon/aws-cli";

/// Per-type facts the built-in handlers need.
#[derive(Debug, Clone, Copy)]
struct ResourceKind {
    resource_type: &'static str,
    service: &'static str,
    name_property: &'static str,
}

const KINDS: &[ResourceKind] = &[
    ResourceKind {
        resource_type: BUCKET,
        service: "s3",
        name_property: "BucketName",
    },
    ResourceKind {
        resource_type: TABLE,
        service: "dynamodb",
        name_property: "TableName",
    },
    ResourceKind {
        resource_type: USER_POOL,
        service: "cognito-idp",
        name_property: "UserPoolName",
    },
];

fn kind(resource_type: &str) -> Option<ResourceKind> {
    KINDS.iter().copied().find(|k| k.resource_type == resource_type)
}

/// Physical name of a resource: its name property when that resolves,
/// otherwise the logical name.
async fn physical_name(
    logical_id: &str,
    resource: &ResourceData,
    name_property: &str,
    resolver: &ValueResolver,
    ctx: &ResolveContext<'_>,
) -> String {
    match resource.property(name_property) {
        Some(value) => resolver.resolve(value, ctx).await.unwrap_or_else(|| logical_id.to_string()),
        None => logical_id.to_string(),
    }
}

/// `Ref` of tables and buckets: the physical name.
struct NameRef {
    name_property: &'static str,
}

#[async_trait]
impl RefHandler for NameRef {
    async fn resolve_ref(
        &self,
        logical_id: &str,
        resource: &ResourceData,
        resolver: &ValueResolver,
        ctx: &ResolveContext<'_>,
    ) -> Result<Option<String>> {
        Ok(Some(physical_name(logical_id, resource, self.name_property, resolver, ctx).await))
    }
}

/// `Ref` of user pools: the pool id, which only exists once the emulator runs.
struct UserPoolRef {
    provisioner: Arc<dyn ResourceProvisioner>,
}

#[async_trait]
impl RefHandler for UserPoolRef {
    async fn resolve_ref(
        &self,
        logical_id: &str,
        resource: &ResourceData,
        resolver: &ValueResolver,
        ctx: &ResolveContext<'_>,
    ) -> Result<Option<String>> {
        let status = ctx.monitor.status("cognito-idp").await;
        if !status.running {
            tracing::debug!("cognito-idp is not running; {logical_id} has no id yet");
            return Ok(None);
        }

        let name = physical_name(logical_id, resource, "UserPoolName", resolver, ctx).await;
        let endpoint = ServiceEndpoint::local(status.port, ctx.region);
        self.provisioner.physical_id(USER_POOL, &name, &endpoint).await
    }
}

/// Creates resources whose backing service the emulator runs.
struct ServiceEnsurer {
    kind: ResourceKind,
    provisioner: Arc<dyn ResourceProvisioner>,
}

#[async_trait]
impl ResourceEnsurer for ServiceEnsurer {
    async fn ensure_exists(
        &self,
        logical_name: &str,
        resource: &ResourceData,
        ctx: &ProvisionContext<'_>,
    ) -> Result<()> {
        if !ctx.has_service(self.kind.service) {
            tracing::warn!(
                "Skipping {logical_name}: service '{}' is not configured for the stack",
                self.kind.service
            );
            return Ok(());
        }

        let name =
            physical_name(logical_name, resource, self.kind.name_property, ctx.resolver, &ctx.resolve)
                .await;
        self.provisioner
            .ensure(self.kind.resource_type, &name, &resource.properties, ctx.endpoint)
            .await
    }
}

/// Registers the built-in `Ref` handlers on `resolver`.
pub fn register_ref_handlers(resolver: &mut ValueResolver, provisioner: &Arc<dyn ResourceProvisioner>) {
    resolver
        .register_ref(
            BUCKET,
            Arc::new(NameRef {
                name_property: "BucketName",
            }),
        )
        .register_ref(
            TABLE,
            Arc::new(NameRef {
                name_property: "TableName",
            }),
        )
        .register_ref(
            USER_POOL,
            Arc::new(UserPoolRef {
                provisioner: provisioner.clone(),
            }),
        );
}

/// Registers the built-in ensurers on `registry`.
pub fn register_ensurers(registry: &mut ProvisionerRegistry, provisioner: &Arc<dyn ResourceProvisioner>) {
    for (resource_type, priority) in [(BUCKET, 1), (TABLE, 1), (USER_POOL, 2)] {
        if let Some(kind) = kind(resource_type) {
            registry.register(
                resource_type,
                priority,
                Arc::new(ServiceEnsurer {
                    kind,
                    provisioner: provisioner.clone(),
                }),
            );
        }
    }
}

/// [`ResourceProvisioner`] running the AWS CLI container against the emulator.
pub struct AwsCliProvisioner {
    runner: Arc<dyn CommandRunner>,
}

impl fmt::Debug for AwsCliProvisioner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCliProvisioner").field("runner", &self.runner).finish()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UserPoolList {
    #[serde(default)]
    user_pools: Vec<UserPoolSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UserPoolSummary {
    id: String,
    name: String,
}

impl AwsCliProvisioner {
    /// Provisioner issuing commands through `runner`.
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
        }
    }

    async fn aws(&self, endpoint: &ServiceEndpoint, args: &[String]) -> Result<(bool, String)> {
        let spec = ContainerSpec::new(AWS_CLI_IMAGE)
            .network("host")
            .env("AWS_ACCESS_KEY_ID", "test")
            .env("AWS_SECRET_ACCESS_KEY", "test")
            .env("AWS_DEFAULT_REGION", &endpoint.region)
            .command(
                ["--endpoint-url".to_string(), endpoint.url.clone(), "--output".into(), "json".into()]
                    .into_iter()
                    .chain(args.iter().cloned()),
            );
        let output = self.runner.run(spec.run_command()).await?;
        Ok((output.success, output.combined()))
    }

    async fn create(
        &self,
        endpoint: &ServiceEndpoint,
        args: Vec<String>,
        exists_marker: &str,
        name: &str,
    ) -> Result<()> {
        let (success, output) = self.aws(endpoint, &args).await?;
        if success {
            tracing::info!("Created {name}");
            Ok(())
        } else if output.contains(exists_marker) {
            tracing::debug!("{name} already exists");
            Ok(())
        } else {
            anyhow::bail!("Failed to create {name}: {output}")
        }
    }
}

fn json_property(properties: &Mapping, key: &str) -> Result<Option<String>> {
    properties
        .get(key)
        .map(|value| serde_json::to_string(value).with_context(|| format!("Invalid {key}")))
        .transpose()
}

#[async_trait]
impl ResourceProvisioner for AwsCliProvisioner {
    async fn ensure(
        &self,
        resource_type: &str,
        name: &str,
        properties: &Mapping,
        endpoint: &ServiceEndpoint,
    ) -> Result<()> {
        match resource_type {
            BUCKET => {
                let args = vec!["s3api".into(), "create-bucket".into(), "--bucket".into(), name.into()];
                self.create(endpoint, args, "BucketAlreadyOwnedByYou", name).await
            }
            TABLE => {
                let mut args = vec![
                    "dynamodb".into(),
                    "create-table".into(),
                    "--table-name".into(),
                    name.into(),
                    "--billing-mode".into(),
                    "PAY_PER_REQUEST".into(),
                ];
                if let Some(definitions) = json_property(properties, "AttributeDefinitions")? {
                    args.extend(["--attribute-definitions".into(), definitions]);
                }
                if let Some(schema) = json_property(properties, "KeySchema")? {
                    args.extend(["--key-schema".into(), schema]);
                }
                self.create(endpoint, args, "ResourceInUseException", name).await
            }
            USER_POOL => {
                if self.physical_id(USER_POOL, name, endpoint).await?.is_some() {
                    tracing::debug!("{name} already exists");
                    return Ok(());
                }
                let args = vec!["cognito-idp".into(), "create-user-pool".into(), "--pool-name".into(), name.into()];
                self.create(endpoint, args, "ResourceExists", name).await
            }
            other => anyhow::bail!("Don't know how to create resources of type {other}"),
        }
    }

    async fn physical_id(
        &self,
        resource_type: &str,
        name: &str,
        endpoint: &ServiceEndpoint,
    ) -> Result<Option<String>> {
        match resource_type {
            USER_POOL => {
                let args = ["cognito-idp", "list-user-pools", "--max-results", "60"].map(String::from);
                let (success, output) = self.aws(endpoint, &args).await?;
                if !success {
                    anyhow::bail!("Failed to list user pools: {output}");
                }
                let pools: UserPoolList =
                    serde_json::from_str(&output).context("Unexpected list-user-pools output")?;
                Ok(pools.user_pools.into_iter().find(|pool| pool.name == name).map(|pool| pool.id))
            }
            BUCKET | TABLE => Ok(Some(name.to_string())),
            _ => Ok(None),
        }
    }
}
