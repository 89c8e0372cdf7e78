//! Creating template resources in an emulated cloud.
//!
//! The [`ProvisionerRegistry`] maps a resource type to a priority and a
//! [`ResourceEnsurer`]. A provisioning pass walks the merged template and
//! ensures every resource with a registered type exists, lowest priority
//! first, so that e.g. tables exist before anything looking them up.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_yaml::Mapping;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::resolve::{ResolveContext, ValueResolver};
use super::{ResourceData, TemplateData};

/// Where the emulated cloud listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    /// Base URL, e.g. `http://localhost:4566`.
    pub url: String,
    /// Region requests are signed for.
    pub region: String,
}

impl ServiceEndpoint {
    /// Endpoint on `localhost:port`.
    pub fn local(port: u16, region: &str) -> Self {
        Self {
            url: format!("http://localhost:{port}"),
            region: region.to_string(),
        }
    }
}

/// The cloud API used to create resources and look up their identifiers.
#[async_trait]
pub trait ResourceProvisioner: Send + Sync + fmt::Debug {
    /// Creates the resource `name` of `resource_type` unless it already exists.
    async fn ensure(
        &self,
        resource_type: &str,
        name: &str,
        properties: &Mapping,
        endpoint: &ServiceEndpoint,
    ) -> Result<()>;

    /// Physical identifier of the resource named `name`, if it exists.
    async fn physical_id(
        &self,
        resource_type: &str,
        name: &str,
        endpoint: &ServiceEndpoint,
    ) -> Result<Option<String>>;
}

/// State shared by one provisioning pass.
pub struct ProvisionContext<'a> {
    /// Template whose resources are provisioned; also used for resolution.
    pub resolve: ResolveContext<'a>,
    /// Resolver for names given as references.
    pub resolver: &'a ValueResolver,
    /// Services the emulator was started with.
    pub services: &'a [String],
    /// Where the emulator listens.
    pub endpoint: &'a ServiceEndpoint,
}

impl ProvisionContext<'_> {
    /// Whether the emulator runs `service`.
    pub fn has_service(&self, service: &str) -> bool {
        self.services.iter().any(|s| s == service)
    }
}

/// Ensures resources of one type exist.
#[async_trait]
pub trait ResourceEnsurer: Send + Sync {
    /// Ensure the resource `logical_name` exists.
    async fn ensure_exists(
        &self,
        logical_name: &str,
        resource: &ResourceData,
        ctx: &ProvisionContext<'_>,
    ) -> Result<()>;
}

struct Registration {
    priority: u32,
    ensurer: Arc<dyn ResourceEnsurer>,
}

/// Resource type -> (priority, ensurer).
#[derive(Default)]
pub struct ProvisionerRegistry {
    entries: HashMap<String, Registration>,
}

impl fmt::Debug for ProvisionerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> =
            self.entries.iter().map(|(name, entry)| (name.as_str(), entry.priority)).collect();
        types.sort_unstable();
        f.debug_struct("ProvisionerRegistry").field("types", &types).finish()
    }
}

impl ProvisionerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `ensurer` for `resource_type`, replacing any previous one.
    pub fn register(
        &mut self,
        resource_type: impl Into<String>,
        priority: u32,
        ensurer: Arc<dyn ResourceEnsurer>,
    ) -> &mut Self {
        self.entries.insert(
            resource_type.into(),
            Registration {
                priority,
                ensurer,
            },
        );
        self
    }

    /// Whether `resource_type` has an ensurer.
    pub fn handles(&self, resource_type: &str) -> bool {
        self.entries.contains_key(resource_type)
    }

    /// Ensures every registered resource of `template` exists.
    ///
    /// Resources run sequentially in ascending priority, ties broken by
    /// logical name. Resources without a registered type are skipped.
    pub async fn ensure_resources_exist(
        &self,
        template: &TemplateData,
        ctx: &ProvisionContext<'_>,
    ) -> Result<()> {
        let mut pending: Vec<(u32, &String, &ResourceData, &Arc<dyn ResourceEnsurer>)> = template
            .resources
            .iter()
            .filter_map(|(name, resource)| {
                let entry = self.entries.get(resource.r#type.as_deref()?)?;
                Some((entry.priority, name, resource, &entry.ensurer))
            })
            .collect();
        pending.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));

        for (_, name, resource, ensurer) in pending {
            tracing::info!(
                "Ensuring {} {name} exists",
                resource.r#type.as_deref().unwrap_or_default()
            );
            ensurer
                .ensure_exists(name, resource, ctx)
                .await
                .with_context(|| format!("Failed to provision {name}"))?;
        }
        Ok(())
    }
}
