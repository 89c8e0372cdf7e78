//! Serverless functions built with a language toolchain.
//!
//! ```yaml
//! # lambda-func.config.yml
//! name: get-order
//! settings:
//!   language: go:1.22
//!   template:
//!     Resources:
//!       GetOrderFunction:
//!         Type: AWS::Serverless::Function
//!         Properties:
//!           CodeUri: ./api/get-order/.out
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::read_config;
use crate::components::language::Toolchain;
use crate::components::{
    ActionResult, Buildable, Collaborators, Component, ComponentKind, ComponentType, NeedsConfiguration,
    RequiredConfiguration, Restorable, Startable, SuppliesCloudformationFragment, Testable, TreeContext,
};
use crate::config::ProjectSettings;
use crate::runner::CommandRunner;
use crate::template::{TemplateData, find_required_configurations};

/// Config file marking a function.
pub const CONFIG_FILE: &str = "lambda-func.config.yml";

const DEFAULT_LANGUAGE: &str = "node";

/// `lambda-func.config.yml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionConfig {
    /// Function name.
    pub name: String,
    /// Function settings.
    #[serde(default)]
    pub settings: FunctionSettings,
}

/// Settings of a function.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionSettings {
    /// `language[:version]`, `node` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Template fragment declaring the function.
    #[serde(default)]
    pub template: TemplateData,
}

#[derive(Debug)]
pub struct Function {
    path: PathBuf,
    config: FunctionConfig,
    toolchain: Toolchain,
    runner: Arc<dyn CommandRunner>,
}

impl Function {
    /// The toolchain the function builds with.
    pub const fn toolchain(&self) -> &Toolchain {
        &self.toolchain
    }
}

impl Component for Function {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Function
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

    fn as_startable(&self) -> Option<&(dyn Startable + 'static)> {
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
impl Restorable for Function {
    async fn restore(&self) -> Result<ActionResult> {
        self.toolchain.restore(self.runner.as_ref(), &self.path).await
    }
}

#[async_trait]
impl Buildable for Function {
    async fn build(&self) -> Result<ActionResult> {
        self.toolchain.build(self.runner.as_ref(), &self.path).await
    }
}

#[async_trait]
impl Testable for Function {
    async fn test(&self) -> Result<ActionResult> {
        self.toolchain.test(self.runner.as_ref(), &self.path).await
    }
}

/// Functions run inside the API gateway; starting one only builds it.
#[async_trait]
impl Startable for Function {
    async fn start(&self, _ctx: &TreeContext<'_>) -> Result<ActionResult> {
        self.build().await
    }

    async fn stop(&self) -> Result<ActionResult> {
        Ok(ActionResult::ok(""))
    }
}

#[async_trait]
impl SuppliesCloudformationFragment for Function {
    async fn fragment(&self, _ctx: &TreeContext<'_>) -> Result<TemplateData> {
        Ok(self.config.settings.template.clone())
    }
}

#[async_trait]
impl NeedsConfiguration for Function {
    async fn required_configurations(&self, _ctx: &TreeContext<'_>) -> Result<Vec<RequiredConfiguration>> {
        Ok(find_required_configurations(&self.config.settings.template))
    }
}

/// Finds `lambda-func.config.yml`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FunctionType;

#[async_trait]
impl ComponentType for FunctionType {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Function
    }

    async fn discover(
        &self,
        dir: &Path,
        _settings: &ProjectSettings,
        collaborators: &Collaborators,
    ) -> Result<Vec<Arc<dyn Component>>> {
        let Some(config) = read_config::<FunctionConfig>(&dir.join(CONFIG_FILE)).await? else {
            return Ok(Vec::new());
        };

        let toolchain = Toolchain::parse(config.settings.language.as_deref().unwrap_or(DEFAULT_LANGUAGE))?;
        Ok(vec![Arc::new(Function {
            path: dir.to_path_buf(),
            config,
            toolchain,
            runner: collaborators.runner.clone(),
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{RecordingRunner, test_collaborators_with};
    use tempfile::TempDir;

    async fn discover(config: &str, runner: Arc<RecordingRunner>) -> (TempDir, Result<Vec<Arc<dyn Component>>>) {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(CONFIG_FILE), config).unwrap();
        let settings = ProjectSettings::new(temp.path(), "shop");
        let found = FunctionType.discover(temp.path(), &settings, &test_collaborators_with(runner)).await;
        (temp, found)
    }

    #[tokio::test]
    async fn test_go_function_builds_in_container() {
        let runner = Arc::new(RecordingRunner::default());
        let (_temp, found) = discover("name: get-order\nsettings:\n  language: go\n", runner.clone()).await;
        let function = found.unwrap().remove(0);

        let result = function.as_startable().unwrap().stop().await.unwrap();
        assert!(result.success);
        assert!(runner.commands().is_empty());

        function.as_buildable().unwrap().build().await.unwrap();
        let commands = runner.commands();
        assert_eq!(commands.len(), 2);
        assert!(commands[0].ends_with("golang:1.22 mod download"));
        assert!(commands[1].ends_with("golang:1.22 build -o ./.out/main -v ."));
    }

    #[tokio::test]
    async fn test_language_defaults_to_node() {
        let (_temp, found) = discover("name: list-orders\n", Arc::new(RecordingRunner::default())).await;
        assert_eq!(found.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_language_fails_discovery() {
        let (_temp, found) =
            discover("name: legacy\nsettings:\n  language: cobol\n", Arc::new(RecordingRunner::default())).await;
        assert!(found.is_err());
    }
}
