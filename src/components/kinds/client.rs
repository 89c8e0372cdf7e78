//! Front-end clients run with yarn in a node container.
//!
//! ```yaml
//! # js-client.config.yml
//! name: web
//! settings:
//!   port: 3001
//!   baseUrl: /
//!   template:
//!     Resources:
//!       WebApp:
//!         Type: AWS::Amplify::App
//!         Properties:
//!           EnvironmentVariables:
//!             - Name: API_URL
//!               Value: !GetAtt Api.Url
//! ```
//!
//! Scripts (`build`, `test`, `clean`) only run when `package.json` declares
//! them. Packaging zips `src/` into `amplify-app.zip`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use super::{ManagedContainer, read_config, slash_path};
use crate::components::environment::{parse_value, value_parsers};
use crate::components::language::has_npm_script;
use crate::components::{
    ActionResult, Buildable, Cleanable, Collaborators, Component, ComponentKind, ComponentType,
    HasHttpEndpoint, HasLogs, NeedsConfiguration, PackageResource, RequiredConfiguration, Restorable,
    Startable, SuppliesCloudformationFragment, SuppliesPackageResources, Testable, TreeContext,
};
use crate::config::ProjectSettings;
use crate::runner::{CommandRunner, ContainerSpec, container_name};
use crate::template::{TemplateData, find_required_configurations};

/// Config file marking a client.
pub const CONFIG_FILE: &str = "js-client.config.yml";

const NODE_IMAGE: &str = "node:20";
const CONTAINER_APP_DIR: &str = "/usr/src/app";
const AMPLIFY_APP: &str = "AWS::Amplify::App";
const PACKAGE_ARCHIVE: &str = "amplify-app.zip";
const SOURCE_DIR: &str = "src";

/// `js-client.config.yml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Client name.
    pub name: String,
    /// Client settings.
    pub settings: ClientSettings,
}

/// Settings of a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSettings {
    /// Local port of the dev server.
    pub port: u16,
    /// Path the client is served under behind a proxy.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Template fragment, usually an Amplify app.
    #[serde(default)]
    pub template: TemplateData,
}

fn default_base_url() -> String {
    "/".to_string()
}

#[derive(Debug)]
pub struct Client {
    path: PathBuf,
    config: ClientConfig,
    has_clean_script: bool,
    runner: Arc<dyn CommandRunner>,
    container: ManagedContainer,
}

impl Client {
    fn node(&self) -> ContainerSpec {
        ContainerSpec::new(NODE_IMAGE)
            .volume(&self.path, CONTAINER_APP_DIR)
            .workdir(CONTAINER_APP_DIR)
            .entrypoint("yarn")
    }

    async fn yarn(&self, args: &[&str]) -> Result<ActionResult> {
        let output = self.runner.run(self.node().command(args.iter().copied()).run_command()).await?;
        Ok(output.into())
    }

    /// Restores, then runs `script` when `package.json` declares it.
    async fn run_script(&self, script: &str) -> Result<ActionResult> {
        let restored = self.restore().await?;
        if !restored.success {
            return Ok(restored);
        }
        if !has_npm_script(&self.path, script).await? {
            return Ok(ActionResult::ok(format!("No {script} script")));
        }
        self.yarn(&["run", script]).await
    }

    /// `EnvironmentVariables` of the Amplify app, resolved from `ctx`.
    async fn environment(&self, ctx: &TreeContext<'_>) -> Vec<(String, String)> {
        let parsers = value_parsers(ctx);
        let template = &self.config.settings.template;

        let mut variables = Vec::new();
        for (_, app) in template.resources_of_type(AMPLIFY_APP) {
            let Some(Value::Sequence(entries)) = app.property("EnvironmentVariables") else {
                continue;
            };
            for entry in entries {
                let (Some(name), Some(value)) = (entry.get("Name").and_then(Value::as_str), entry.get("Value"))
                else {
                    continue;
                };
                let parsed = parse_value(&parsers, value, None, ctx).await.unwrap_or_default();
                variables.push((name.to_string(), parsed));
            }
        }
        variables
    }
}

impl Component for Client {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Client
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn as_buildable(&self) -> Option<&(dyn Buildable + 'static)> {
        Some(self)
    }

    fn as_testable(&self) -> Option<&(dyn Testable + 'static)> {
        Some(self)
    }

    fn as_restorable(&self) -> Option<&(dyn Restorable + 'static)> {
        Some(self)
    }

    fn as_cleanable(&self) -> Option<&(dyn Cleanable + 'static)> {
        if self.has_clean_script { Some(self) } else { None }
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

    fn as_package_resource_supplier(&self) -> Option<&(dyn SuppliesPackageResources + 'static)> {
        Some(self)
    }
}

#[async_trait]
impl Restorable for Client {
    async fn restore(&self) -> Result<ActionResult> {
        if !self.path.join("package.json").exists() {
            return Ok(ActionResult::ok("No package.json, nothing to restore"));
        }
        self.yarn(&["install"]).await
    }
}

#[async_trait]
impl Buildable for Client {
    async fn build(&self) -> Result<ActionResult> {
        self.run_script("build").await
    }
}

#[async_trait]
impl Testable for Client {
    async fn test(&self) -> Result<ActionResult> {
        self.run_script("test").await
    }
}

#[async_trait]
impl Cleanable for Client {
    async fn clean(&self) -> Result<ActionResult> {
        self.yarn(&["run", "clean"]).await
    }
}

#[async_trait]
impl Startable for Client {
    async fn start(&self, ctx: &TreeContext<'_>) -> Result<ActionResult> {
        let restored = self.restore().await?;
        if !restored.success {
            return Ok(restored);
        }

        let spec = self
            .environment(ctx)
            .await
            .into_iter()
            .fold(self.node(), |spec, (name, value)| spec.env(name, value))
            .detached()
            .port(self.config.settings.port, 3000)
            .command(["dev", "--hostname", "0.0.0.0"]);
        self.container.start(spec).await
    }

    async fn stop(&self) -> Result<ActionResult> {
        self.container.stop().await
    }
}

#[async_trait]
impl HasLogs for Client {
    async fn logs(&self) -> Result<ActionResult> {
        self.container.logs().await
    }
}

impl HasHttpEndpoint for Client {
    fn base_url(&self) -> &str {
        &self.config.settings.base_url
    }

    fn port(&self) -> u16 {
        self.config.settings.port
    }
}

#[async_trait]
impl SuppliesCloudformationFragment for Client {
    async fn fragment(&self, _ctx: &TreeContext<'_>) -> Result<TemplateData> {
        Ok(self.config.settings.template.clone())
    }
}

#[async_trait]
impl NeedsConfiguration for Client {
    async fn required_configurations(&self, _ctx: &TreeContext<'_>) -> Result<Vec<RequiredConfiguration>> {
        Ok(find_required_configurations(&self.config.settings.template))
    }
}

#[async_trait]
impl SuppliesPackageResources for Client {
    async fn package_resources(
        &self,
        _ctx: &TreeContext<'_>,
        package_root: &Path,
        _version: &str,
    ) -> Result<Vec<PackageResource>> {
        let source = self.path.join(SOURCE_DIR);
        let archive = tokio::task::spawn_blocking(move || zip_directory(&source))
            .await
            .context("Archiving task panicked")??;

        Ok(vec![PackageResource::relative(&self.path.join(PACKAGE_ARCHIVE), package_root, archive)])
    }
}

/// Zips every file under `source`, named relative to it.
fn zip_directory(source: &Path) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();

    if source.is_dir() {
        for entry in WalkDir::new(source).sort_by_file_name() {
            let entry = entry.with_context(|| format!("Failed to walk {}", source.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
            let content = std::fs::read(entry.path())
                .with_context(|| format!("Failed to read {}", entry.path().display()))?;
            writer.start_file(slash_path(relative), options)?;
            writer.write_all(&content)?;
        }
    }

    Ok(writer.finish()?.into_inner())
}

/// Finds `js-client.config.yml`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClientType;

#[async_trait]
impl ComponentType for ClientType {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Client
    }

    async fn discover(
        &self,
        dir: &Path,
        settings: &ProjectSettings,
        collaborators: &Collaborators,
    ) -> Result<Vec<Arc<dyn Component>>> {
        let Some(config) = read_config::<ClientConfig>(&dir.join(CONFIG_FILE)).await? else {
            return Ok(Vec::new());
        };

        let name = container_name(settings.project_name(), &format!("client-{}", config.name));
        Ok(vec![Arc::new(Client {
            path: dir.to_path_buf(),
            has_clean_script: has_npm_script(dir, "clean").await?,
            runner: collaborators.runner.clone(),
            container: ManagedContainer::new(name, collaborators.runner.clone()),
            config,
        })])
    }
}
