//! Lambda layers shared between functions.
//!
//! A layer builds like a function but only contributes its template
//! fragment; nothing runs it locally.
//!
//! ```yaml
//! # lambda-layer.config.yml
//! name: shared-models
//! settings:
//!   language: python
//!   template:
//!     Resources:
//!       SharedModelsLayer:
//!         Type: AWS::Serverless::LayerVersion
//!         Properties:
//!           LayerName: shared-models
//!           ContentUri: ./layers/shared-models/.out
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{ensure_absent, read_config, slash_path, write_config};
use crate::components::language::Toolchain;
use crate::components::{
    ActionResult, Buildable, Collaborators, Component, ComponentKind, ComponentType, CreationData, NeedsConfiguration,
    RequiredConfiguration, Restorable, SuppliesCloudformationFragment, Testable, TreeContext,
};
use crate::config::ProjectSettings;
use crate::runner::CommandRunner;
use crate::template::{ResourceData, TemplateData, find_required_configurations, logical_id};

/// Config file marking a layer.
pub const CONFIG_FILE: &str = "lambda-layer.config.yml";

const LAYER_RESOURCE_TYPE: &str = "AWS::Serverless::LayerVersion";
const BUILD_OUTPUT_DIR: &str = ".out";

/// `lambda-layer.config.yml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerConfig {
    pub name: String,
    #[serde(default)]
    pub settings: LayerSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerSettings {
    /// `language[:version]`, `node` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default)]
    pub template: TemplateData,
}

#[derive(Debug)]
pub struct LambdaLayer {
    path: PathBuf,
    config: LayerConfig,
    toolchain: Toolchain,
    runner: Arc<dyn CommandRunner>,
}

impl Component for LambdaLayer {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::LambdaLayer
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

    fn as_fragment_supplier(&self) -> Option<&(dyn SuppliesCloudformationFragment + 'static)> {
        Some(self)
    }

    fn as_needs_configuration(&self) -> Option<&(dyn NeedsConfiguration + 'static)> {
        Some(self)
    }
}

#[async_trait]
impl Restorable for LambdaLayer {
    async fn restore(&self) -> Result<ActionResult> {
        self.toolchain.restore(self.runner.as_ref(), &self.path).await
    }
}

#[async_trait]
impl Buildable for LambdaLayer {
    async fn build(&self) -> Result<ActionResult> {
        self.toolchain.build(self.runner.as_ref(), &self.path).await
    }
}

#[async_trait]
impl Testable for LambdaLayer {
    async fn test(&self) -> Result<ActionResult> {
        self.toolchain.test(self.runner.as_ref(), &self.path).await
    }
}

#[async_trait]
impl SuppliesCloudformationFragment for LambdaLayer {
    async fn fragment(&self, _ctx: &TreeContext<'_>) -> Result<TemplateData> {
        Ok(self.config.settings.template.clone())
    }
}

#[async_trait]
impl NeedsConfiguration for LambdaLayer {
    async fn required_configurations(&self, _ctx: &TreeContext<'_>) -> Result<Vec<RequiredConfiguration>> {
        Ok(find_required_configurations(&self.config.settings.template))
    }
}

/// Template declaring a single layer whose content is the build output in `dir`.
fn layer_template(name: &str, dir: &Path, project_root: &Path) -> TemplateData {
    let relative = slash_path(&ProjectSettings::relative_path(dir, project_root));
    let content_uri = if relative.is_empty() {
        format!("./{BUILD_OUTPUT_DIR}")
    } else {
        format!("./{relative}/{BUILD_OUTPUT_DIR}")
    };

    let mut properties = Mapping::new();
    properties.insert(Value::from("LayerName"), Value::from(name));
    properties.insert(Value::from("ContentUri"), Value::from(content_uri));

    let mut template = TemplateData::default();
    template
        .resources
        .insert(format!("{}Layer", logical_id(name)), ResourceData::new(LAYER_RESOURCE_TYPE, properties));
    template
}

/// Finds `lambda-layer.config.yml`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LambdaLayerType;

#[async_trait]
impl ComponentType for LambdaLayerType {
    fn kind(&self) -> ComponentKind {
        ComponentKind::LambdaLayer
    }

    async fn discover(
        &self,
        dir: &Path,
        _settings: &ProjectSettings,
        collaborators: &Collaborators,
    ) -> Result<Vec<Arc<dyn Component>>> {
        let Some(config) = read_config::<LayerConfig>(&dir.join(CONFIG_FILE)).await? else {
            return Ok(Vec::new());
        };

        let toolchain = Toolchain::parse(config.settings.language.as_deref().unwrap_or("node"))?;
        Ok(vec![Arc::new(LambdaLayer {
            path: dir.to_path_buf(),
            config,
            toolchain,
            runner: collaborators.runner.clone(),
        })])
    }

    async fn materialize(
        &self,
        dir: &Path,
        data: &CreationData,
        settings: &ProjectSettings,
        collaborators: &Collaborators,
    ) -> Result<Option<Arc<dyn Component>>> {
        let CreationData::LambdaLayer { name, language } = data else {
            return Ok(None);
        };

        let file = dir.join(CONFIG_FILE);
        ensure_absent(&file, self.kind(), name)?;
        let toolchain = Toolchain::parse(language)?;

        let config = LayerConfig {
            name: name.clone(),
            settings: LayerSettings {
                language: Some(language.clone()),
                template: layer_template(name, dir, settings.root()),
            },
        };
        write_config(&file, &config).await?;
        tracing::debug!("Wrote {}", file.display());

        Ok(Some(Arc::new(LambdaLayer {
            path: dir.to_path_buf(),
            config,
            toolchain,
            runner: collaborators.runner.clone(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::ComponentTree;
    use crate::core::DcError;
    use crate::test_utils::{RecordingRunner, test_collaborators, test_collaborators_with};
    use tempfile::TempDir;

    fn layer_data(language: &str) -> CreationData {
        CreationData::LambdaLayer {
            name: "shared-models".into(),
            language: language.into(),
        }
    }

    #[tokio::test]
    async fn test_materialized_layer_points_at_build_output() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("layers/shared-models");
        std::fs::create_dir_all(&dir).unwrap();
        let settings = ProjectSettings::new(temp.path(), "shop");

        let created =
            LambdaLayerType.materialize(&dir, &layer_data("python"), &settings, &test_collaborators()).await.unwrap();
        assert_eq!(created.unwrap().name(), "shared-models");

        let written: LayerConfig = serde_yaml::from_str(&std::fs::read_to_string(dir.join(CONFIG_FILE)).unwrap())
            .unwrap();
        assert_eq!(written.settings.language.as_deref(), Some("python"));
        let layer = &written.settings.template.resources["SharedModelsLayer"];
        assert!(layer.is_type("AWS::Serverless::LayerVersion"));
        assert_eq!(layer.property("LayerName"), Some(&Value::from("shared-models")));
        assert_eq!(layer.property("ContentUri"), Some(&Value::from("./layers/shared-models/.out")));
    }

    #[tokio::test]
    async fn test_materialize_rejects_unknown_language_and_existing_layer() {
        let temp = TempDir::new().unwrap();
        let settings = ProjectSettings::new(temp.path(), "shop");
        let collaborators = test_collaborators();

        let err = LambdaLayerType.materialize(temp.path(), &layer_data("cobol"), &settings, &collaborators).await;
        assert!(err.is_err());
        assert!(!temp.path().join(CONFIG_FILE).exists());

        LambdaLayerType.materialize(temp.path(), &layer_data("node"), &settings, &collaborators).await.unwrap();
        let err = LambdaLayerType
            .materialize(temp.path(), &layer_data("node"), &settings, &collaborators)
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<DcError>().is_some_and(DcError::is_conflict));
    }

    #[tokio::test]
    async fn test_layer_builds_and_supplies_its_fragment() {
        let temp = TempDir::new().unwrap();
        let settings = ProjectSettings::new(temp.path(), "shop");
        let runner = Arc::new(RecordingRunner::default());
        let collaborators = test_collaborators_with(runner.clone());
        LambdaLayerType.materialize(temp.path(), &layer_data("go"), &settings, &collaborators).await.unwrap();

        let layer = LambdaLayerType.discover(temp.path(), &settings, &collaborators).await.unwrap().remove(0);
        assert!(layer.as_startable().is_none());

        layer.as_buildable().unwrap().build().await.unwrap();
        assert!(runner.commands().iter().any(|c| c.contains("golang")));

        let tree = ComponentTree::new(temp.path());
        let ctx = TreeContext::new(&tree, tree.root(), &settings);
        let fragment = layer.as_fragment_supplier().unwrap().fragment(&ctx).await.unwrap();
        assert_eq!(fragment.resources_of_type("AWS::Serverless::LayerVersion").count(), 1);
        assert_eq!(
            fragment.resources["SharedModelsLayer"].property("ContentUri"),
            Some(&Value::from("./.out"))
        );
    }
}
