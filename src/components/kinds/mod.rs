//! The built-in component kinds.
//!
//! Each kind recognizes its own configuration file (or file name pattern) in
//! a directory:
//!
//! | Kind | Marker |
//! |---|---|
//! | API gateway | `api-gw.config.yml` |
//! | Function | `lambda-func.config.yml` |
//! | Client | `js-client.config.yml` |
//! | CloudFormation template | `*.cf.yml` |
//! | Stack emulator | `cloudformation-stack.config.yml` |
//! | Local proxy | `proxy.config.yml` |
//! | Terraform module | `*.tf` |
//! | Terraform root module | `*.main.tf` |
//! | PowerShell script | `*.ps1` |
//! | Lambda layer | `lambda-layer.config.yml` |
//! | Child config | `*.childconfig.yml` |
//! | Package file | files containing `.include.` |
//! | Package directory | directories ending in `.include` |
//! | Application | `app.package.yml` |

pub mod api_gateway;
pub mod application;
pub mod child_config;
pub mod client;
pub mod cloudformation;
pub mod function;
pub mod lambda_layer;
pub mod package_files;
pub mod proxy;
pub mod stack;
pub mod terraform;

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

use super::{ActionResult, ComponentKind, ComponentType};
use crate::core::DcError;
use crate::runner::{CommandRunner, ContainerSpec};

pub use api_gateway::ApiGatewayType;
pub use application::ApplicationType;
pub use child_config::ChildConfigType;
pub use client::ClientType;
pub use cloudformation::CloudformationTemplateType;
pub use function::FunctionType;
pub use lambda_layer::LambdaLayerType;
pub use package_files::{PackageDirectoryType, PackageFileType, PowershellScriptType};
pub use proxy::{LocalProxyType, auto_proxy};
pub use stack::CloudformationStackType;
pub use terraform::{TerraformResourceType, TerraformRootType};

/// Every built-in type, in registration order.
pub fn builtin_types() -> Vec<Box<dyn ComponentType>> {
    vec![
        Box::new(ApiGatewayType),
        Box::new(FunctionType),
        Box::new(ClientType),
        Box::new(CloudformationTemplateType),
        Box::new(CloudformationStackType),
        Box::new(LocalProxyType),
        Box::new(TerraformResourceType),
        Box::new(TerraformRootType),
        Box::new(PowershellScriptType),
        Box::new(LambdaLayerType),
        Box::new(ChildConfigType),
        Box::new(PackageFileType),
        Box::new(PackageDirectoryType),
        Box::new(ApplicationType),
    ]
}

/// Reads and parses the YAML config at `path`; `None` if it does not exist.
pub(crate) async fn read_config<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };

    serde_yaml::from_str(&content).map(Some).map_err(|e| {
        DcError::TemplateParseError {
            file: path.display().to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

/// Serializes `config` as YAML to `path`.
pub(crate) async fn write_config<T: Serialize>(path: &Path, config: &T) -> Result<()> {
    let content = serde_yaml::to_string(config).context("Failed to serialize component config")?;
    fs::write(path, content).await.with_context(|| format!("Failed to write {}", path.display()))
}

/// Fails with [`DcError::ComponentExists`] when `path` exists.
pub(crate) fn ensure_absent(path: &Path, kind: ComponentKind, name: &str) -> Result<()> {
    if path.exists() {
        return Err(DcError::ComponentExists {
            kind: kind.to_string(),
            name: name.to_string(),
            path: path.display().to_string(),
        }
        .into());
    }
    Ok(())
}

/// Entries of `dir` accepted by `accept`, sorted by path.
pub(crate) async fn entries_matching<F>(dir: &Path, accept: F) -> Result<Vec<PathBuf>>
where
    F: Fn(&Path, &std::fs::FileType) -> bool,
{
    let mut entries = fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read directory {}", dir.display()))?;

    let mut matching = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let file_type = entry.file_type().await?;
        if accept(&path, &file_type) {
            matching.push(path);
        }
    }
    matching.sort();
    Ok(matching)
}

/// File name of `path` as a string, empty when it has none.
pub(crate) fn file_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}

/// `path` with `/` separators, as used inside containers and packages.
pub(crate) fn slash_path(path: &Path) -> String {
    path.components().map(|c| c.as_os_str().to_string_lossy()).collect::<Vec<_>>().join("/")
}

/// A named long-running container owned by a component.
#[derive(Debug, Clone)]
pub(crate) struct ManagedContainer {
    name: String,
    runner: Arc<dyn CommandRunner>,
}

impl ManagedContainer {
    pub(crate) fn new(name: String, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            name,
            runner,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Runs `spec` under this container's name, replacing a stale container
    /// left over from an earlier run.
    pub(crate) async fn start(&self, spec: ContainerSpec) -> Result<ActionResult> {
        self.runner.run(ContainerSpec::remove_command(&self.name)).await?;
        let output = self.runner.run(spec.name(self.name.clone()).run_command()).await?;
        Ok(output.into())
    }

    pub(crate) async fn stop(&self) -> Result<ActionResult> {
        let output = self.runner.run(ContainerSpec::remove_command(&self.name)).await?;
        if output.success {
            Ok(ActionResult::ok(format!("Removed container {}", self.name)))
        } else {
            // nothing to stop
            tracing::debug!("Container {} was not running: {}", self.name, output.combined());
            Ok(ActionResult::ok(format!("Container {} is not running", self.name)))
        }
    }

    pub(crate) async fn logs(&self) -> Result<ActionResult> {
        let output = self.runner.run(ContainerSpec::logs_command(&self.name)).await?;
        Ok(output.into())
    }
}
