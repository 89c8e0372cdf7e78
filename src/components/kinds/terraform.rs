//! Terraform modules shipped as application packages.
//!
//! A `*.main.tf` file marks a root module. Packaging at its directory
//! collects every `*.tf` file beneath it (plus any other package resources)
//! and adds the root file itself as `main.tf`:
//!
//! ```text
//! infra/
//!   shop.main.tf        -> shop.<version>.zip: main.tf
//!   network.tf          ->                     network.tf
//!   dns/records.tf      ->                     dns/records.tf
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

use super::package_files::{PackageFile, create_empty_file, files_with_suffix};
use super::{entries_matching, file_name};
use crate::components::{
    Collaborators, Component, ComponentKind, ComponentType, CreationData, PackageResource, PackageResult,
    PackagesApplication,
};
use crate::config::ProjectSettings;

const MODULE_EXTENSION: &str = ".tf";
const ROOT_SUFFIX: &str = ".main.tf";
const ROOT_PACKAGE_ENTRY: &str = "main.tf";

/// One component per `*.tf` file that is not a root module.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerraformResourceType;

#[async_trait]
impl ComponentType for TerraformResourceType {
    fn kind(&self) -> ComponentKind {
        ComponentKind::TerraformResource
    }

    async fn discover(
        &self,
        dir: &Path,
        _settings: &ProjectSettings,
        _collaborators: &Collaborators,
    ) -> Result<Vec<Arc<dyn Component>>> {
        files_with_suffix(dir, self.kind(), MODULE_EXTENSION, Some(ROOT_SUFFIX)).await
    }

    async fn materialize(
        &self,
        dir: &Path,
        data: &CreationData,
        _settings: &ProjectSettings,
        _collaborators: &Collaborators,
    ) -> Result<Option<Arc<dyn Component>>> {
        let CreationData::TerraformResource { name } = data else {
            return Ok(None);
        };

        let file = create_empty_file(dir, self.kind(), name, MODULE_EXTENSION).await?;
        Ok(Some(Arc::new(PackageFile::new(self.kind(), name.clone(), dir, file))))
    }
}

/// A Terraform root module.
#[derive(Debug)]
pub struct TerraformRoot {
    name: String,
    path: PathBuf,
    file: PathBuf,
}

impl Component for TerraformRoot {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::TerraformRoot
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn as_application_packager(&self) -> Option<&(dyn PackagesApplication + 'static)> {
        Some(self)
    }
}

#[async_trait]
impl PackagesApplication for TerraformRoot {
    async fn package(&self, mut resources: Vec<PackageResource>, version: &str) -> Result<PackageResult> {
        let main = fs::read(&self.file).await.with_context(|| format!("Failed to read {}", self.file.display()))?;
        resources.push(PackageResource::new(ROOT_PACKAGE_ENTRY, main));

        Ok(PackageResult {
            package_name: format!("{}.{version}.zip", self.name),
            resources,
        })
    }
}

/// One component per `*.main.tf` file.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerraformRootType;

impl TerraformRootType {
    async fn roots(dir: &Path) -> Result<Vec<TerraformRoot>> {
        let files = entries_matching(dir, |path, file_type| {
            let name = file_name(path);
            file_type.is_file() && name.len() > ROOT_SUFFIX.len() && name.ends_with(ROOT_SUFFIX)
        })
        .await?;

        Ok(files
            .into_iter()
            .map(|file| {
                let name = file_name(&file);
                TerraformRoot {
                    name: name.strip_suffix(ROOT_SUFFIX).unwrap_or(&name).to_string(),
                    path: dir.to_path_buf(),
                    file,
                }
            })
            .collect())
    }
}

#[async_trait]
impl ComponentType for TerraformRootType {
    fn kind(&self) -> ComponentKind {
        ComponentKind::TerraformRoot
    }

    async fn discover(
        &self,
        dir: &Path,
        _settings: &ProjectSettings,
        _collaborators: &Collaborators,
    ) -> Result<Vec<Arc<dyn Component>>> {
        Ok(Self::roots(dir).await?.into_iter().map(|root| Arc::new(root) as Arc<dyn Component>).collect())
    }

    async fn materialize(
        &self,
        dir: &Path,
        data: &CreationData,
        _settings: &ProjectSettings,
        _collaborators: &Collaborators,
    ) -> Result<Option<Arc<dyn Component>>> {
        let CreationData::TerraformRoot { name } = data else {
            return Ok(None);
        };

        let file = create_empty_file(dir, self.kind(), name, ROOT_SUFFIX).await?;
        Ok(Some(Arc::new(TerraformRoot {
            name: name.clone(),
            path: dir.to_path_buf(),
            file,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{ComponentTree, TreeContext};
    use crate::core::DcError;
    use crate::test_utils::test_collaborators;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_root_and_resources_are_told_apart() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        std::fs::write(dir.join("shop.main.tf"), "terraform {}").unwrap();
        std::fs::write(dir.join("network.tf"), "resource {}").unwrap();
        std::fs::write(dir.join("variables.tf.json"), "{}").unwrap();
        let settings = ProjectSettings::new(dir, "shop");
        let collaborators = test_collaborators();

        let resources = TerraformResourceType.discover(dir, &settings, &collaborators).await.unwrap();
        let names: Vec<&str> = resources.iter().map(|c| c.name()).collect();
        assert_eq!(names, ["network"]);

        let roots = TerraformRootType.discover(dir, &settings, &collaborators).await.unwrap();
        let names: Vec<&str> = roots.iter().map(|c| c.name()).collect();
        assert_eq!(names, ["shop"]);
        assert!(roots[0].as_application_packager().is_some());
        assert!(roots[0].as_package_resource_supplier().is_none());
    }

    #[tokio::test]
    async fn test_root_packages_itself_as_main_tf() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        std::fs::write(dir.join("shop.main.tf"), "terraform {}").unwrap();
        std::fs::create_dir_all(dir.join("dns")).unwrap();
        std::fs::write(dir.join("dns/records.tf"), "records").unwrap();
        let settings = ProjectSettings::new(dir, "shop");
        let collaborators = test_collaborators();
        let tree = ComponentTree::new(dir);
        let ctx = TreeContext::new(&tree, tree.root(), &settings);

        let nested = TerraformResourceType.discover(&dir.join("dns"), &settings, &collaborators).await.unwrap();
        let resources =
            nested[0].as_package_resource_supplier().unwrap().package_resources(&ctx, dir, "1.0.0").await.unwrap();

        let root = TerraformRootType.discover(dir, &settings, &collaborators).await.unwrap().remove(0);
        let result = root.as_application_packager().unwrap().package(resources, "1.0.0").await.unwrap();

        assert_eq!(result.package_name, "shop.1.0.0.zip");
        assert_eq!(
            result.resources,
            [PackageResource::new("dns/records.tf", "records"), PackageResource::new("main.tf", "terraform {}")]
        );
    }

    #[tokio::test]
    async fn test_materialize_conflicts_with_existing_module() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        let settings = ProjectSettings::new(dir, "shop");
        let collaborators = test_collaborators();

        let root = CreationData::TerraformRoot {
            name: "shop".into(),
        };
        let created = TerraformRootType.materialize(dir, &root, &settings, &collaborators).await.unwrap().unwrap();
        assert_eq!(created.name(), "shop");
        assert!(dir.join("shop.main.tf").is_file());

        let module = CreationData::TerraformResource {
            name: "network".into(),
        };
        let created = TerraformResourceType.materialize(dir, &module, &settings, &collaborators).await.unwrap().unwrap();
        assert_eq!(created.kind(), ComponentKind::TerraformResource);
        assert!(dir.join("network.tf").is_file());

        let err = TerraformRootType.materialize(dir, &root, &settings, &collaborators).await.unwrap_err();
        assert!(err.downcast_ref::<DcError>().is_some_and(DcError::is_conflict));
        assert!(TerraformRootType.materialize(dir, &module, &settings, &collaborators).await.unwrap().is_none());
    }
}
