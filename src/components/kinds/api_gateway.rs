//! Local HTTP API gateway serving the functions beneath it.
//!
//! ```yaml
//! # api-gw.config.yml
//! name: orders
//! settings:
//!   port: 5000
//!   baseUrl: /api
//!   defaultLanguage: node
//!   template:
//!     Parameters: ...
//! ```
//!
//! Starting the gateway merges every fragment in its subtree into
//! `.tmp/template.yml`, resolves function environment variables into
//! `.tmp/environment.json` and runs `sam local start-api` in a container.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

use super::{ManagedContainer, read_config, slash_path};
use crate::components::environment::{find_environment_variables, value_parsers};
use crate::components::{
    ActionResult, Collaborators, Component, ComponentKind, ComponentType, HasHttpEndpoint, HasLogs,
    NeedsConfiguration, RequiredConfiguration, Startable, SuppliesCloudformationFragment, TreeContext,
    temp_dir,
};
use crate::config::ProjectSettings;
use crate::runner::{ContainerSpec, container_name};
use crate::template::{TemplateData, find_required_configurations};

/// Config file marking an API gateway.
pub const CONFIG_FILE: &str = "api-gw.config.yml";

const SAM_IMAGE: &str = "public.ecr.aws/sam/build-provided.al2023";
const CONTAINER_APP_DIR: &str = "/usr/src/app";
const ENVIRONMENT_FILE: &str = "environment.json";
const TEMPLATE_FILE: &str = "template.yml";

/// `api-gw.config.yml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiGatewayConfig {
    /// Gateway name.
    pub name: String,
    /// Gateway settings.
    pub settings: ApiGatewaySettings,
}

/// Settings of an API gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiGatewaySettings {
    /// Local port the API listens on.
    pub port: u16,
    /// Path the API is mounted under behind a proxy.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Language of functions created under the gateway.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_language: Option<String>,
    /// Template fragment of the gateway itself.
    #[serde(default)]
    pub template: TemplateData,
}

fn default_base_url() -> String {
    "/".to_string()
}

#[derive(Debug)]
pub struct ApiGateway {
    path: PathBuf,
    config: ApiGatewayConfig,
    container: ManagedContainer,
}

impl ApiGateway {
    /// Language of functions created under the gateway, if configured.
    pub fn default_language(&self) -> Option<&str> {
        self.config.settings.default_language.as_deref()
    }

    fn container_spec(&self, project_root: &Path, temp: &Path) -> ContainerSpec {
        let relative = slash_path(&ProjectSettings::relative_path(&self.path, project_root));
        let root = project_root.display().to_string();

        ContainerSpec::new(SAM_IMAGE)
            .detached()
            .docker_socket()
            .volume(&self.path, format!("{CONTAINER_APP_DIR}/{relative}"))
            .volume(temp.join(ENVIRONMENT_FILE), format!("{CONTAINER_APP_DIR}/{ENVIRONMENT_FILE}"))
            .volume(temp.join(TEMPLATE_FILE), format!("{CONTAINER_APP_DIR}/{TEMPLATE_FILE}"))
            // sam mounts function code into sibling containers by host path
            .volume(&self.path, self.path.display().to_string())
            .workdir(CONTAINER_APP_DIR)
            .entrypoint("sam")
            .port(self.config.settings.port, 3000)
            .command([
                "local",
                "start-api",
                "--env-vars",
                "./environment.json",
                "--docker-volume-basedir",
                root.as_str(),
                "--host",
                "0.0.0.0",
            ])
    }
}

impl Component for ApiGateway {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::ApiGateway
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn as_startable(&self) -> Option<&(dyn Startable + 'static)> {
        Some(self)
    }

    fn as_logs(&self) -> Option<&(dyn HasLogs + 'static)> {
        Some(self)
    }

    fn as_http_endpoint(&self) -> Option<&(dyn HasHttpEndpoint + 'static)> {
        Some(self)
    }

    fn as_fragment_supplier(&self) -> Option<&(dyn SuppliesCloudformationFragment + 'static)> {
        Some(self)
    }

    fn as_needs_configuration(&self) -> Option<&(dyn NeedsConfiguration + 'static)> {
        Some(self)
    }
}

#[async_trait]
impl Startable for ApiGateway {
    async fn start(&self, ctx: &TreeContext<'_>) -> Result<ActionResult> {
        let temp = temp_dir(&self.path);
        fs::create_dir_all(&temp).await.with_context(|| format!("Failed to create {}", temp.display()))?;

        let template = ctx.tree.merged_template(ctx.node, ctx.settings).await?;
        let parsers = value_parsers(ctx);
        let variables = find_environment_variables(&template, &parsers, ctx).await;

        let environment = temp.join(ENVIRONMENT_FILE);
        let content = serde_json::to_string_pretty(&variables).context("Failed to serialize environment")?;
        fs::write(&environment, content)
            .await
            .with_context(|| format!("Failed to write {}", environment.display()))?;
        template.save(&temp.join(TEMPLATE_FILE)).await?;

        tracing::debug!(
            "Starting API {} with {} function(s) on port {}",
            self.config.name,
            variables.len(),
            self.config.settings.port
        );
        let project_root = ctx.tree.path(ctx.tree.root());
        self.container.start(self.container_spec(project_root, &temp)).await
    }

    async fn stop(&self) -> Result<ActionResult> {
        let result = self.container.stop().await?;

        let temp = temp_dir(&self.path);
        if fs::try_exists(&temp).await.unwrap_or(false) {
            fs::remove_dir_all(&temp).await.with_context(|| format!("Failed to remove {}", temp.display()))?;
        }
        Ok(result)
    }
}

#[async_trait]
impl HasLogs for ApiGateway {
    async fn logs(&self) -> Result<ActionResult> {
        self.container.logs().await
    }
}

impl HasHttpEndpoint for ApiGateway {
    fn base_url(&self) -> &str {
        &self.config.settings.base_url
    }

    fn port(&self) -> u16 {
        self.config.settings.port
    }
}

#[async_trait]
impl SuppliesCloudformationFragment for ApiGateway {
    async fn fragment(&self, _ctx: &TreeContext<'_>) -> Result<TemplateData> {
        Ok(self.config.settings.template.clone())
    }
}

#[async_trait]
impl NeedsConfiguration for ApiGateway {
    async fn required_configurations(&self, _ctx: &TreeContext<'_>) -> Result<Vec<RequiredConfiguration>> {
        Ok(find_required_configurations(&self.config.settings.template))
    }
}

/// Finds `api-gw.config.yml`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ApiGatewayType;

#[async_trait]
impl ComponentType for ApiGatewayType {
    fn kind(&self) -> ComponentKind {
        ComponentKind::ApiGateway
    }

    async fn discover(
        &self,
        dir: &Path,
        settings: &ProjectSettings,
        collaborators: &Collaborators,
    ) -> Result<Vec<Arc<dyn Component>>> {
        let Some(config) = read_config::<ApiGatewayConfig>(&dir.join(CONFIG_FILE)).await? else {
            return Ok(Vec::new());
        };

        let name = container_name(settings.project_name(), &format!("api-{}", config.name));
        Ok(vec![Arc::new(ApiGateway {
            path: dir.to_path_buf(),
            container: ManagedContainer::new(name, collaborators.runner.clone()),
            config,
        })])
    }
}
