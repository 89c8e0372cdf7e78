//! Plain `*.cf.yml` template fragments.

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{ensure_absent, entries_matching, file_name};
use crate::components::{
    Collaborators, Component, ComponentKind, ComponentType, CreationData, NeedsConfiguration,
    RequiredConfiguration, SuppliesCloudformationFragment, TreeContext,
};
use crate::config::ProjectSettings;
use crate::template::{TemplateData, find_required_configurations};

/// Suffix of template fragment files.
pub const FILE_SUFFIX: &str = ".cf.yml";

#[derive(Debug)]
pub struct CloudformationTemplate {
    name: String,
    path: PathBuf,
    template: TemplateData,
}

impl Component for CloudformationTemplate {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::CloudformationTemplate
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
impl SuppliesCloudformationFragment for CloudformationTemplate {
    async fn fragment(&self, _ctx: &TreeContext<'_>) -> Result<TemplateData> {
        Ok(self.template.clone())
    }
}

#[async_trait]
impl NeedsConfiguration for CloudformationTemplate {
    async fn required_configurations(&self, _ctx: &TreeContext<'_>) -> Result<Vec<RequiredConfiguration>> {
        Ok(find_required_configurations(&self.template))
    }
}

/// One component per `*.cf.yml` file.
#[derive(Debug, Default, Clone, Copy)]
pub struct CloudformationTemplateType;

#[async_trait]
impl ComponentType for CloudformationTemplateType {
    fn kind(&self) -> ComponentKind {
        ComponentKind::CloudformationTemplate
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
            let name = file_name(&file).trim_end_matches(FILE_SUFFIX).to_string();
            found.push(Arc::new(CloudformationTemplate {
                name,
                path: dir.to_path_buf(),
                template: TemplateData::load(&file).await?,
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
        let CreationData::CloudformationTemplate {
            name,
        } = data
        else {
            return Ok(None);
        };

        let file = dir.join(format!("{name}{FILE_SUFFIX}"));
        ensure_absent(&file, self.kind(), name)?;

        let template = TemplateData::default();
        template.save(&file).await?;
        Ok(Some(Arc::new(CloudformationTemplate {
            name: name.clone(),
            path: dir.to_path_buf(),
            template,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DcError;
    use crate::test_utils::test_collaborators;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_one_component_per_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("tables.cf.yml"), "Resources:\n  Orders:\n    Type: AWS::DynamoDB::Table\n")
            .unwrap();
        std::fs::write(temp.path().join("buckets.cf.yml"), "").unwrap();
        std::fs::write(temp.path().join("notes.yml"), "").unwrap();
        let settings = ProjectSettings::new(temp.path(), "shop");

        let found =
            CloudformationTemplateType.discover(temp.path(), &settings, &test_collaborators()).await.unwrap();
        let names: Vec<&str> = found.iter().map(|c| c.name()).collect();
        assert_eq!(names, ["buckets", "tables"]);
    }

    #[tokio::test]
    async fn test_invalid_template_fails_discovery() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("broken.cf.yml"), "Resources: [").unwrap();
        let settings = ProjectSettings::new(temp.path(), "shop");

        let err = CloudformationTemplateType
            .discover(temp.path(), &settings, &test_collaborators())
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<DcError>(), Some(DcError::TemplateParseError { .. })));
    }

    #[tokio::test]
    async fn test_materialize_conflicts_with_existing_file() {
        let temp = TempDir::new().unwrap();
        let settings = ProjectSettings::new(temp.path(), "shop");
        let data = CreationData::CloudformationTemplate {
            name: "queues".into(),
        };

        let created = CloudformationTemplateType
            .materialize(temp.path(), &data, &settings, &test_collaborators())
            .await
            .unwrap();
        assert_eq!(created.unwrap().name(), "queues");
        assert!(temp.path().join("queues.cf.yml").exists());

        let err = CloudformationTemplateType
            .materialize(temp.path(), &data, &settings, &test_collaborators())
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<DcError>().is_some_and(DcError::is_conflict));

        let other = CreationData::ChildConfig {
            name: "queues".into(),
        };
        let ignored = CloudformationTemplateType
            .materialize(temp.path(), &other, &settings, &test_collaborators())
            .await
            .unwrap();
        assert!(ignored.is_none());
    }
}
