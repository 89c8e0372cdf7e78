//! Property overrides for the resources declared beneath a directory.
//!
//! ```yaml
//! # local.childconfig.yml
//! name: local
//! overrides:
//!   - type: AWS::DynamoDB::Table
//!     properties:
//!       BillingMode: PAY_PER_REQUEST
//! ```
//!
//! Every resource of an overridden type found in the subtree is re-emitted
//! with the override properties in place of its own. Overrides take effect
//! where the child config is merged ahead of the resources it replaces, i.e.
//! from a directory above them.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{ensure_absent, entries_matching, file_name, read_config, write_config};
use crate::components::{
    Collaborators, Component, ComponentKind, ComponentType, CreationData, NeedsConfiguration,
    RequiredConfiguration, SuppliesCloudformationFragment, TreeContext,
};
use crate::config::ProjectSettings;
use crate::core::DcError;
use crate::template::{self, ResourceData, TemplateData, find_required_configurations};

/// Suffix of child config files.
pub const FILE_SUFFIX: &str = ".childconfig.yml";

/// `*.childconfig.yml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildConfiguration {
    pub name: String,
    #[serde(default)]
    pub overrides: Vec<Override>,
}

/// Replacement properties for every resource of `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Override {
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub properties: Mapping,
}

#[derive(Debug)]
pub struct ChildConfig {
    path: PathBuf,
    config: ChildConfiguration,
}

impl ChildConfig {
    async fn subtree(&self, ctx: &TreeContext<'_>) -> Result<TemplateData> {
        ctx.tree.merged_template_excluding(ctx.node, ctx.settings, &[ComponentKind::ChildConfig]).await
    }

    fn overridden_types(&self) -> Vec<&str> {
        self.config.overrides.iter().map(|o| o.resource_type.as_str()).collect()
    }

    fn apply(&self, subtree: TemplateData) -> TemplateData {
        let types = self.overridden_types();
        let matching = template::merge([subtree], Some(types.as_slice()));

        let mut overridden = TemplateData::default();
        for (name, resource) in matching.resources {
            let Some(resource_type) = resource.r#type.as_deref() else {
                continue;
            };
            let Some(found) = self.config.overrides.iter().find(|o| o.resource_type == resource_type) else {
                continue;
            };
            tracing::debug!("{} overrides {name} ({resource_type})", self.config.name);
            overridden.resources.insert(name, ResourceData::new(resource_type, found.properties.clone()));
        }
        overridden
    }
}

impl Component for ChildConfig {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::ChildConfig
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn as_fragment_supplier(&self) -> Option<&(dyn SuppliesCloudformationFragment + 'static)> {
        Some(self)
    }

    fn as_needs_configuration(&self) -> Option<&(dyn NeedsConfiguration + 'static)> {
        Some(self)
    }
}

#[async_trait]
impl SuppliesCloudformationFragment for ChildConfig {
    async fn fragment(&self, ctx: &TreeContext<'_>) -> Result<TemplateData> {
        if self.config.overrides.is_empty() {
            return Ok(TemplateData::default());
        }
        Ok(self.apply(self.subtree(ctx).await?))
    }
}

#[async_trait]
impl NeedsConfiguration for ChildConfig {
    async fn required_configurations(&self, ctx: &TreeContext<'_>) -> Result<Vec<RequiredConfiguration>> {
        if self.config.overrides.is_empty() {
            return Ok(Vec::new());
        }
        // overrides may reference parameters declared beneath
        let subtree = self.subtree(ctx).await?;
        let parameters = subtree.parameters.clone();
        let mut fragment = self.apply(subtree);
        fragment.parameters = parameters;
        Ok(find_required_configurations(&fragment))
    }
}

/// One component per `*.childconfig.yml` file.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChildConfigType;

#[async_trait]
impl ComponentType for ChildConfigType {
    fn kind(&self) -> ComponentKind {
        ComponentKind::ChildConfig
    }

    async fn discover(
        &self,
        dir: &Path,
        _settings: &ProjectSettings,
        _collaborators: &Collaborators,
    ) -> Result<Vec<Arc<dyn Component>>> {
        let files =
            entries_matching(dir, |path, file_type| file_type.is_file() && file_name(path).ends_with(FILE_SUFFIX))
                .await?;

        let mut found: Vec<Arc<dyn Component>> = Vec::with_capacity(files.len());
        for file in files {
            let config = read_config::<ChildConfiguration>(&file).await?.ok_or_else(|| DcError::Other {
                message: format!("{} disappeared during discovery", file.display()),
            })?;
            found.push(Arc::new(ChildConfig {
                path: dir.to_path_buf(),
                config,
            }));
        }
        Ok(found)
    }

    async fn materialize(
        &self,
        dir: &Path,
        data: &CreationData,
        _settings: &ProjectSettings,
        _collaborators: &Collaborators,
    ) -> Result<Option<Arc<dyn Component>>> {
        let CreationData::ChildConfig {
            name,
        } = data
        else {
            return Ok(None);
        };

        let file = dir.join(format!("{name}{FILE_SUFFIX}"));
        ensure_absent(&file, self.kind(), name)?;

        let config = ChildConfiguration {
            name: name.clone(),
            overrides: Vec::new(),
        };
        write_config(&file, &config).await?;
        Ok(Some(Arc::new(ChildConfig {
            path: dir.to_path_buf(),
            config,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{ComponentTree, Direction, kinds::CloudformationTemplateType};
    use crate::test_utils::test_collaborators;
    use tempfile::TempDir;

    const OVERRIDES: &str = r"name: local
overrides:
  - type: AWS::DynamoDB::Table
    properties:
      BillingMode: PAY_PER_REQUEST
  - type: AWS::Serverless::Function
    properties:
      Environment:
        Variables:
          TABLE: !Ref LocalTableName
";

    const TABLES: &str = r"Parameters:
  LocalTableName:
    Type: String
Resources:
  Orders:
    Type: AWS::DynamoDB::Table
    Properties:
      BillingMode: PROVISIONED
  Assets:
    Type: AWS::S3::Bucket
  ListOrders:
    Type: AWS::Serverless::Function
    Properties:
      Handler: index.handler
";

    async fn project() -> (TempDir, ComponentTree, ProjectSettings) {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join("infra")).unwrap();
        std::fs::write(root.join("local.childconfig.yml"), OVERRIDES).unwrap();
        std::fs::write(root.join("infra/tables.cf.yml"), TABLES).unwrap();
        let settings = ProjectSettings::new(root, "shop");
        let collaborators = test_collaborators();

        let mut tree = ComponentTree::new(root);
        let infra = tree.add_child(tree.root(), root.join("infra"));
        for config in ChildConfigType.discover(root, &settings, &collaborators).await.unwrap() {
            tree.add_component(tree.root(), config);
        }
        for template in
            CloudformationTemplateType.discover(&root.join("infra"), &settings, &collaborators).await.unwrap()
        {
            tree.add_component(infra, template);
        }
        (temp, tree, settings)
    }

    #[tokio::test]
    async fn test_fragment_replaces_properties_of_matching_types() {
        let (_temp, tree, settings) = project().await;
        let config = tree.find_first::<dyn SuppliesCloudformationFragment>(tree.root(), Direction::In, None).unwrap();
        assert_eq!(config.component.kind(), ComponentKind::ChildConfig);

        let ctx = TreeContext::new(&tree, tree.root(), &settings);
        let fragment = config.component.fragment(&ctx).await.unwrap();
        assert_eq!(fragment.resources.len(), 2);
        assert!(fragment.parameters.is_empty());
        assert!(fragment.resources["ListOrders"].property("Handler").is_none());
        let orders = &fragment.resources["Orders"];
        assert!(orders.is_type("AWS::DynamoDB::Table"));
        assert_eq!(orders.property("BillingMode").and_then(|v| v.as_str()), Some("PAY_PER_REQUEST"));

        // the override is merged first, so it wins over the original
        let merged = tree.merged_template(tree.root(), &settings).await.unwrap();
        assert_eq!(merged.resources["Orders"].property("BillingMode").and_then(|v| v.as_str()), Some("PAY_PER_REQUEST"));
        assert!(merged.resources.contains_key("Assets"));
    }

    #[tokio::test]
    async fn test_requirements_come_from_overrides() {
        let (_temp, tree, settings) = project().await;
        let config = tree.find_first::<dyn NeedsConfiguration>(tree.root(), Direction::In, None).unwrap();
        let ctx = TreeContext::new(&tree, tree.root(), &settings);

        let required = config.component.required_configurations(&ctx).await.unwrap();
        assert_eq!(required.len(), 1);
        assert!(required[0].key.ends_with(":LocalTableName"));
    }

    #[tokio::test]
    async fn test_materialize_writes_empty_overrides() {
        let temp = TempDir::new().unwrap();
        let settings = ProjectSettings::new(temp.path(), "shop");
        let data = CreationData::ChildConfig {
            name: "staging".into(),
        };

        let created =
            ChildConfigType.materialize(temp.path(), &data, &settings, &test_collaborators()).await.unwrap();
        assert_eq!(created.unwrap().name(), "staging");

        let found = ChildConfigType.discover(temp.path(), &settings, &test_collaborators()).await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(ChildConfigType.materialize(temp.path(), &data, &settings, &test_collaborators()).await.is_err());
    }
}
