//! An emulated cloud stack running in a localstack container.
//!
//! ```yaml
//! # cloudformation-stack.config.yml
//! name: local
//! settings:
//!   services: [serverless, cognito]
//!   servicesPort: 4566
//!   awsRegion: us-east-1
//! ```
//!
//! Starting the stack runs the emulator, waits for every configured service
//! to report healthy and then creates the resources of the template merged
//! from the stack's subtree. The stack is also the value parser other
//! components ask for physical names and ids; answers that depend on a
//! running service wait for startup and provisioning to finish.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::fs;
use tokio::time::Instant;

use super::{ManagedContainer, ensure_absent, read_config, write_config};
use crate::components::{
    ActionResult, Collaborators, Component, ComponentKind, ComponentType, CreationData, HasLogs,
    NeedsConfiguration, PackageResource, ParsesCloudformationValues, RequiredConfiguration, Startable,
    SuppliesPackageResources, TreeContext,
};
use crate::config::{ConfigScope, ProjectSettings};
use crate::constants::{HEALTH_POLL_INTERVAL, STACK_READY_TIMEOUT, STACK_START_TIMEOUT};
use crate::runner::{ContainerSpec, container_name};
use crate::template::{
    ProvisionContext, ProvisionerRegistry, ResolveContext, ServiceEndpoint, ServiceMonitor, ServiceStatus,
    TemplateData, ValueResolver,
};

/// Config file marking a stack emulator.
pub const CONFIG_FILE: &str = "cloudformation-stack.config.yml";

/// Settings key of the optional localstack API key.
pub const API_KEY_SETTING: &str = "localstackApiKey";

const HEALTH_PATH: &str = "_localstack/health";
const PACKAGE_TEMPLATE: &str = "template.yml";
const DATA_DIR: &str = ".localstack";

const SERVICE_ALIASES: &[(&str, &[&str])] = &[
    ("serverless", &["iam", "lambda", "dynamodb", "apigateway", "s3", "sts"]),
    ("cognito", &["cognito-identity", "cognito-idp"]),
];

/// `cloudformation-stack.config.yml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackConfig {
    /// Stack name.
    pub name: String,
    /// Emulator settings.
    #[serde(default)]
    pub settings: StackSettings,
}

/// Settings of a stack emulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StackSettings {
    /// Host port of the emulator dashboard.
    pub main_port: u16,
    /// Host port of the service edge endpoint.
    pub services_port: u16,
    /// Region reported to clients.
    pub aws_region: String,
    /// Services to run; aliases are expanded.
    pub services: Vec<String>,
    /// Bucket holding deployment artifacts.
    pub deployment_bucket_name: String,
    /// Stack creating the deployment bucket.
    pub deployment_stack_name: String,
    /// Extra `host:container` port mappings.
    pub port_mappings: Vec<String>,
    /// `localstack/localstack` image tag.
    pub localstack_version: String,
}

impl Default for StackSettings {
    fn default() -> Self {
        Self {
            main_port: 8080,
            services_port: 4566,
            aws_region: "us-east-1".to_string(),
            services: Vec::new(),
            deployment_bucket_name: String::new(),
            deployment_stack_name: String::new(),
            port_mappings: Vec::new(),
            localstack_version: "latest".to_string(),
        }
    }
}

impl StackConfig {
    /// A config for `name` running `services`, other settings defaulted.
    pub fn new(name: &str, services: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            settings: StackSettings {
                services,
                deployment_bucket_name: format!("{name}-deployments"),
                deployment_stack_name: format!("{name}-deployments"),
                ..StackSettings::default()
            },
        }
    }

    /// Configured services with aliases expanded, in order, without duplicates.
    pub fn services(&self) -> Vec<String> {
        let mut services: Vec<String> = Vec::new();
        for service in &self.settings.services {
            let expanded = SERVICE_ALIASES
                .iter()
                .find(|(alias, _)| *alias == service.as_str())
                .map_or_else(|| vec![service.as_str()], |(_, members)| members.to_vec());
            for name in expanded {
                if !services.iter().any(|s| s == name) {
                    services.push(name.to_string());
                }
            }
        }
        services
    }

    fn port_mappings(&self) -> Vec<(u16, u16)> {
        self.settings
            .port_mappings
            .iter()
            .filter_map(|mapping| {
                let parsed: Option<(u16, u16)> = mapping
                    .split_once(':')
                    .and_then(|(host, container)| Some((host.trim().parse().ok()?, container.trim().parse().ok()?)));
                if parsed.is_none() {
                    tracing::warn!("Ignoring invalid port mapping '{mapping}' of stack {}", self.name);
                }
                parsed
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    #[serde(default)]
    services: BTreeMap<String, String>,
}

#[derive(Debug)]
pub struct CloudformationStack {
    path: PathBuf,
    config: StackConfig,
    container: ManagedContainer,
    http: reqwest::Client,
    resolver: Arc<ValueResolver>,
    provisioners: Arc<ProvisionerRegistry>,
    provisioning: AtomicBool,
}

/// Clears the provisioning flag when startup ends, however it ends.
struct ProvisioningGuard<'a>(&'a AtomicBool);

impl<'a> ProvisioningGuard<'a> {
    fn set(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for ProvisioningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl CloudformationStack {
    /// The stack's configuration.
    pub const fn config(&self) -> &StackConfig {
        &self.config
    }

    fn container_spec(&self, settings: &ProjectSettings, data_dir: &Path) -> ContainerSpec {
        let services = self.config.services();
        let stack = &self.config.settings;

        let mut spec = ContainerSpec::new(format!("localstack/localstack:{}", stack.localstack_version))
            .detached()
            .volume(data_dir, "/tmp/localstack")
            .docker_socket()
            .port(stack.main_port, 8080)
            .port(stack.services_port, 4566)
            .env("SERVICES", services.join(","))
            .env("DATA_DIR", "/tmp/localstack/data")
            .env("LAMBDA_REMOTE_DOCKER", "0")
            .env("DEBUG", "1");
        if let Some(key) = settings.get_opt(API_KEY_SETTING).filter(|key| !key.is_empty()) {
            spec = spec.env("LOCALSTACK_API_KEY", key);
        }
        for (host, container) in self.config.port_mappings() {
            spec = spec.port(host, container);
        }
        spec
    }

    async fn health(&self) -> Result<HealthResponse> {
        let url = format!("http://localhost:{}/{HEALTH_PATH}", self.config.settings.services_port);
        let response = self.http.get(&url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    /// Polls the health endpoint until every configured service is up.
    async fn wait_for_health(&self, timeout: Duration) -> bool {
        let required = self.config.services();
        let deadline = Instant::now() + timeout;

        loop {
            match self.health().await {
                Ok(health) => {
                    let up = required.iter().all(|service| {
                        matches!(health.services.get(service).map(String::as_str), Some("running" | "available"))
                    });
                    if up {
                        tracing::info!("Stack {} is running: {}", self.config.name, required.join(", "));
                        return true;
                    }
                }
                Err(e) => tracing::debug!("Stack {} is not answering yet: {e}", self.config.name),
            }

            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(HEALTH_POLL_INTERVAL).await;
        }
    }

    /// Waits for the emulator to be healthy and for a running startup to
    /// finish provisioning.
    async fn wait_until_ready(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        if !self.wait_for_health(timeout).await {
            return false;
        }
        while self.provisioning.load(Ordering::SeqCst) && Instant::now() < deadline {
            tokio::time::sleep(HEALTH_POLL_INTERVAL).await;
        }
        !self.provisioning.load(Ordering::SeqCst)
    }

    fn is_configured(&self, service: &str) -> bool {
        self.config.services().iter().any(|s| s == service)
    }
}

/// Reports configured services as up, for use right after a healthy start.
struct ReadyServices<'a> {
    stack: &'a CloudformationStack,
}

#[async_trait]
impl ServiceMonitor for ReadyServices<'_> {
    async fn status(&self, service: &str) -> ServiceStatus {
        ServiceStatus {
            running: self.stack.is_configured(service),
            port: self.stack.config.settings.services_port,
        }
    }
}

/// Waits for configured services before reporting them up.
struct StackServices<'a> {
    stack: &'a CloudformationStack,
}

#[async_trait]
impl ServiceMonitor for StackServices<'_> {
    async fn status(&self, service: &str) -> ServiceStatus {
        let port = self.stack.config.settings.services_port;
        if !self.stack.is_configured(service) {
            return ServiceStatus {
                running: false,
                port,
            };
        }
        ServiceStatus {
            running: self.stack.wait_until_ready(STACK_READY_TIMEOUT).await,
            port,
        }
    }
}

impl Component for CloudformationStack {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::CloudformationStack
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

    fn as_needs_configuration(&self) -> Option<&(dyn NeedsConfiguration + 'static)> {
        Some(self)
    }

    fn as_package_resource_supplier(&self) -> Option<&(dyn SuppliesPackageResources + 'static)> {
        Some(self)
    }

    fn as_value_parser(&self) -> Option<&(dyn ParsesCloudformationValues + 'static)> {
        Some(self)
    }
}

#[async_trait]
impl Startable for CloudformationStack {
    async fn start(&self, ctx: &TreeContext<'_>) -> Result<ActionResult> {
        let services = self.config.services();
        if services.is_empty() {
            return Ok(ActionResult::ok(format!("Stack {} has no services configured", self.config.name)));
        }

        let _guard = ProvisioningGuard::set(&self.provisioning);

        let data_dir = ctx.settings.rooted_path(&format!("./{DATA_DIR}/{}", self.config.name));
        fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("Failed to create {}", data_dir.display()))?;

        let started = self.container.start(self.container_spec(ctx.settings, &data_dir)).await?;
        if !started.success {
            return Ok(started);
        }

        tracing::info!("Waiting for stack {} to start", self.config.name);
        if !self.wait_for_health(STACK_START_TIMEOUT).await {
            return Ok(ActionResult::failed(format!(
                "Stack {} did not become healthy within {} seconds",
                self.config.name,
                STACK_START_TIMEOUT.as_secs()
            )));
        }

        let template = ctx.tree.merged_template(ctx.node, ctx.settings).await?;
        let monitor = ReadyServices {
            stack: self,
        };
        let region = self.config.settings.aws_region.as_str();
        let endpoint = ServiceEndpoint::local(self.config.settings.services_port, region);
        let provision = ProvisionContext {
            resolve: ResolveContext {
                template: &template,
                settings: ctx.settings,
                monitor: &monitor,
                region,
            },
            resolver: &self.resolver,
            services: &services,
            endpoint: &endpoint,
        };
        self.provisioners.ensure_resources_exist(&template, &provision).await?;

        Ok(started)
    }

    async fn stop(&self) -> Result<ActionResult> {
        self.container.stop().await
    }
}

#[async_trait]
impl HasLogs for CloudformationStack {
    async fn logs(&self) -> Result<ActionResult> {
        self.container.logs().await
    }
}

#[async_trait]
impl NeedsConfiguration for CloudformationStack {
    async fn required_configurations(&self, _ctx: &TreeContext<'_>) -> Result<Vec<RequiredConfiguration>> {
        Ok(vec![RequiredConfiguration::new(
            API_KEY_SETTING,
            "Enter your localstack api key if you have any:",
            ConfigScope::User,
        )])
    }
}

#[async_trait]
impl SuppliesPackageResources for CloudformationStack {
    async fn package_resources(
        &self,
        ctx: &TreeContext<'_>,
        package_root: &Path,
        _version: &str,
    ) -> Result<Vec<PackageResource>> {
        let template = ctx.tree.merged_template(ctx.node, ctx.settings).await?;
        Ok(vec![PackageResource::relative(
            &self.path.join(PACKAGE_TEMPLATE),
            package_root,
            template.to_yaml()?.into_bytes(),
        )])
    }
}

#[async_trait]
impl ParsesCloudformationValues for CloudformationStack {
    async fn parse(
        &self,
        value: &Value,
        template: Option<&TemplateData>,
        ctx: &TreeContext<'_>,
    ) -> Result<Option<String>> {
        let merged;
        let template = match template {
            Some(template) => template,
            None => {
                merged = ctx.tree.merged_template(ctx.node, ctx.settings).await?;
                &merged
            }
        };

        let monitor = StackServices {
            stack: self,
        };
        let resolve = ResolveContext {
            template,
            settings: ctx.settings,
            monitor: &monitor,
            region: &self.config.settings.aws_region,
        };
        Ok(self.resolver.resolve(value, &resolve).await)
    }
}

/// Finds `cloudformation-stack.config.yml`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CloudformationStackType;

impl CloudformationStackType {
    fn stack(
        dir: &Path,
        config: StackConfig,
        settings: &ProjectSettings,
        collaborators: &Collaborators,
    ) -> CloudformationStack {
        let name = container_name(settings.project_name(), &format!("localstack-{}", config.name));
        CloudformationStack {
            path: dir.to_path_buf(),
            container: ManagedContainer::new(name, collaborators.runner.clone()),
            http: reqwest::Client::new(),
            resolver: collaborators.resolver.clone(),
            provisioners: collaborators.provisioners.clone(),
            provisioning: AtomicBool::new(false),
            config,
        }
    }
}

#[async_trait]
impl ComponentType for CloudformationStackType {
    fn kind(&self) -> ComponentKind {
        ComponentKind::CloudformationStack
    }

    async fn discover(
        &self,
        dir: &Path,
        settings: &ProjectSettings,
        collaborators: &Collaborators,
    ) -> Result<Vec<Arc<dyn Component>>> {
        Ok(read_config::<StackConfig>(&dir.join(CONFIG_FILE))
            .await?
            .map(|config| Arc::new(Self::stack(dir, config, settings, collaborators)) as Arc<dyn Component>)
            .into_iter()
            .collect())
    }

    async fn materialize(
        &self,
        dir: &Path,
        data: &CreationData,
        settings: &ProjectSettings,
        collaborators: &Collaborators,
    ) -> Result<Option<Arc<dyn Component>>> {
        let CreationData::CloudformationStack {
            name,
            services,
        } = data
        else {
            return Ok(None);
        };

        let file = dir.join(CONFIG_FILE);
        ensure_absent(&file, self.kind(), name)?;

        let config = StackConfig::new(name, services.clone());
        write_config(&file, &config).await?;
        Ok(Some(Arc::new(Self::stack(dir, config, settings, collaborators))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{ComponentTree, Direction};
    use crate::test_utils::{FakeComponent, RecordingRunner, test_collaborators, test_collaborators_with};
    use tempfile::TempDir;

    fn stack_config(services: &[&str]) -> StackConfig {
        StackConfig::new("local", services.iter().map(ToString::to_string).collect())
    }

    #[test]
    fn test_service_aliases_expand() {
        let config = stack_config(&["serverless", "s3", "cognito"]);
        assert_eq!(
            config.services(),
            ["iam", "lambda", "dynamodb", "apigateway", "s3", "sts", "cognito-identity", "cognito-idp"]
        );
    }

    #[test]
    fn test_invalid_port_mappings_are_skipped() {
        let mut config = stack_config(&[]);
        config.settings.port_mappings = vec!["4510:4510".into(), "oops".into()];
        assert_eq!(config.port_mappings(), [(4510, 4510)]);
    }

    #[tokio::test]
    async fn test_materialize_writes_defaults() {
        let temp = TempDir::new().unwrap();
        let settings = ProjectSettings::new(temp.path(), "shop");
        let data = CreationData::CloudformationStack {
            name: "local".into(),
            services: vec!["serverless".into()],
        };

        CloudformationStackType.materialize(temp.path(), &data, &settings, &test_collaborators()).await.unwrap();
        let written: StackConfig =
            serde_yaml::from_str(&std::fs::read_to_string(temp.path().join(CONFIG_FILE)).unwrap()).unwrap();
        assert_eq!(written.settings.services_port, 4566);
        assert_eq!(written.settings.deployment_bucket_name, "local-deployments");

        let again = CloudformationStackType.materialize(temp.path(), &data, &settings, &test_collaborators()).await;
        assert!(again.is_err());
    }

    #[tokio::test]
    async fn test_start_without_services_is_a_no_op() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(CONFIG_FILE), "name: local\n").unwrap();
        let settings = ProjectSettings::new(temp.path(), "shop");
        let runner = Arc::new(RecordingRunner::default());
        let stack = CloudformationStackType
            .discover(temp.path(), &settings, &test_collaborators_with(runner.clone()))
            .await
            .unwrap()
            .remove(0);

        let tree = ComponentTree::new(temp.path());
        let result = stack.as_startable().unwrap().start(&TreeContext::new(&tree, tree.root(), &settings)).await;
        assert!(result.unwrap().success);
        assert!(runner.commands().is_empty());
    }

    #[test]
    fn test_container_spec() {
        let mut settings = ProjectSettings::new("/p", "shop");
        settings.set(API_KEY_SETTING, "secret", ConfigScope::User);
        let mut config = stack_config(&["cognito"]);
        config.settings.port_mappings = vec!["4510:4510".into()];
        let stack = CloudformationStackType::stack(Path::new("/p/infra"), config, &settings, &test_collaborators());

        let command = stack.container_spec(&settings, Path::new("/p/.localstack/local")).run_command().to_string();
        assert!(command.contains("-d --rm"));
        assert!(command.contains("-p 8080:8080 -p 4566:4566 -p 4510:4510"));
        assert!(command.contains("-v /p/.localstack/local:/tmp/localstack"));
        assert!(command.contains("-e SERVICES=cognito-identity,cognito-idp"));
        assert!(command.contains("-e LOCALSTACK_API_KEY=secret"));
        assert!(command.ends_with("localstack/localstack:latest"));
    }

    #[tokio::test]
    async fn test_parse_resolves_names_without_running_services() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(CONFIG_FILE), "name: local\nsettings:\n  services: [s3]\n").unwrap();
        std::fs::write(
            temp.path().join("tables.cf.yml"),
            "Resources:\n  Orders:\n    Type: AWS::DynamoDB::Table\n    Properties:\n      TableName: orders\n  Users:\n    Type: AWS::Cognito::UserPool\n",
        )
        .unwrap();
        let settings = ProjectSettings::new(temp.path(), "shop");
        let collaborators = test_collaborators();

        let mut tree = ComponentTree::new(temp.path());
        let root = tree.root();
        for component in crate::components::kinds::builtin_types() {
            for found in component.discover(temp.path(), &settings, &collaborators).await.unwrap() {
                tree.add_component(root, found);
            }
        }
        tree.add_component(root, FakeComponent::new("unrelated").into_arc());

        let stack = tree.find_first::<dyn ParsesCloudformationValues>(root, Direction::In, None).unwrap();
        let ctx = TreeContext::new(&tree, root, &settings);

        let table: Value = serde_yaml::from_str("!Ref Orders").unwrap();
        assert_eq!(stack.component.parse(&table, None, &ctx).await.unwrap().as_deref(), Some("orders"));

        // cognito-idp is not part of this stack, so the pool has no id
        let pool: Value = serde_yaml::from_str("!Ref Users").unwrap();
        assert_eq!(stack.component.parse(&pool, None, &ctx).await.unwrap(), None);
    }
}
