//! Application package definitions.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{ensure_absent, read_config, write_config};
use crate::components::{
    Collaborators, Component, ComponentKind, ComponentType, CreationData, PackageResource, PackageResult,
    PackagesApplication,
};
use crate::config::ProjectSettings;

/// Config file defining an application package.
pub const CONFIG_FILE: &str = "app.package.yml";

/// `app.package.yml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationConfig {
    /// Archive name prefix.
    pub name: String,
}

#[derive(Debug)]
pub struct Application {
    path: PathBuf,
    config: ApplicationConfig,
}

impl Component for Application {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Application
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn as_application_packager(&self) -> Option<&(dyn PackagesApplication + 'static)> {
        Some(self)
    }
}

#[async_trait]
impl PackagesApplication for Application {
    async fn package(&self, resources: Vec<PackageResource>, version: &str) -> Result<PackageResult> {
        Ok(PackageResult {
            package_name: format!("{}-{version}.zip", self.config.name),
            resources,
        })
    }
}

/// Finds `app.package.yml`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ApplicationType;

#[async_trait]
impl ComponentType for ApplicationType {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Application
    }

    async fn discover(
        &self,
        dir: &Path,
        _settings: &ProjectSettings,
        _collaborators: &Collaborators,
    ) -> Result<Vec<Arc<dyn Component>>> {
        Ok(read_config::<ApplicationConfig>(&dir.join(CONFIG_FILE))
            .await?
            .map(|config| {
                Arc::new(Application {
                    path: dir.to_path_buf(),
                    config,
                }) as Arc<dyn Component>
            })
            .into_iter()
            .collect())
    }

    async fn materialize(
        &self,
        dir: &Path,
        data: &CreationData,
        _settings: &ProjectSettings,
        _collaborators: &Collaborators,
    ) -> Result<Option<Arc<dyn Component>>> {
        let CreationData::Application {
            name,
        } = data
        else {
            return Ok(None);
        };

        let file = dir.join(CONFIG_FILE);
        ensure_absent(&file, self.kind(), name)?;
        let config = ApplicationConfig {
            name: name.clone(),
        };
        write_config(&file, &config).await?;

        Ok(Some(Arc::new(Application {
            path: dir.to_path_buf(),
            config,
        })))
    }
}
