//! Component types: how components are found on disk and created.
//!
//! A [`ComponentType`] knows one kind of component. During tree discovery
//! every registered type is asked, in registration order, what components
//! exist in each directory; the order therefore fixes the order of
//! components within a node. `dc add` asks the types producing the requested
//! kind to materialize a new component from [`CreationData`].

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use super::{Collaborators, Component, ComponentKind};
use crate::config::ProjectSettings;

/// Parameters for creating a new component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreationData {
    /// A `{name}.cf.yml` template.
    CloudformationTemplate {
        /// Template name.
        name: String,
    },
    /// A `{name}.childconfig.yml` override file.
    ChildConfig {
        /// Config name.
        name: String,
    },
    /// An empty `{name}` package file; `.include.` is inserted when missing.
    PackageFile {
        /// File name.
        name: String,
    },
    /// A `{name}.include` package directory.
    PackageDirectory {
        /// Directory name, without the `.include` suffix.
        name: String,
    },
    /// A stack emulator configuration.
    CloudformationStack {
        /// Stack name.
        name: String,
        /// Services to emulate; aliases like `serverless` are allowed.
        services: Vec<String>,
    },
    /// A local proxy configuration.
    LocalProxy {
        /// Proxy name.
        name: String,
        /// Port to listen on; prompted for when absent.
        port: Option<u16>,
    },
    /// An empty `{name}.tf` Terraform file.
    TerraformResource {
        /// Module file name, without `.tf`.
        name: String,
    },
    /// An empty `{name}.main.tf` Terraform root module.
    TerraformRoot {
        /// Root module name, used for the package name.
        name: String,
    },
    /// An empty `{name}.ps1` script.
    PowershellScript {
        /// Script name, without `.ps1`.
        name: String,
    },
    /// A layer configuration built with `language`.
    LambdaLayer {
        /// Layer name.
        name: String,
        /// `language[:version]`, as for functions.
        language: String,
    },
    /// An application package definition.
    Application {
        /// Application name.
        name: String,
    },
}

impl CreationData {
    /// The kind of component this creates.
    pub const fn kind(&self) -> ComponentKind {
        match self {
            Self::CloudformationTemplate { .. } => ComponentKind::CloudformationTemplate,
            Self::ChildConfig { .. } => ComponentKind::ChildConfig,
            Self::PackageFile { .. } => ComponentKind::PackageFile,
            Self::PackageDirectory { .. } => ComponentKind::PackageDirectory,
            Self::CloudformationStack { .. } => ComponentKind::CloudformationStack,
            Self::LocalProxy { .. } => ComponentKind::LocalProxy,
            Self::TerraformResource { .. } => ComponentKind::TerraformResource,
            Self::TerraformRoot { .. } => ComponentKind::TerraformRoot,
            Self::PowershellScript { .. } => ComponentKind::PowershellScript,
            Self::LambdaLayer { .. } => ComponentKind::LambdaLayer,
            Self::Application { .. } => ComponentKind::Application,
        }
    }

    /// Name of the component to create.
    pub fn name(&self) -> &str {
        match self {
            Self::CloudformationTemplate { name }
            | Self::ChildConfig { name }
            | Self::PackageFile { name }
            | Self::PackageDirectory { name }
            | Self::CloudformationStack { name, .. }
            | Self::LocalProxy { name, .. }
            | Self::TerraformResource { name }
            | Self::TerraformRoot { name }
            | Self::PowershellScript { name }
            | Self::LambdaLayer { name, .. }
            | Self::Application { name } => name,
        }
    }
}

/// Discovers and materializes components of one kind.
#[async_trait]
pub trait ComponentType: Send + Sync {
    /// The kind this type produces.
    fn kind(&self) -> ComponentKind;

    /// Components of this kind present in `dir`.
    async fn discover(
        &self,
        dir: &Path,
        settings: &ProjectSettings,
        collaborators: &Collaborators,
    ) -> Result<Vec<Arc<dyn Component>>>;

    /// Creates a new component in `dir` from `data`.
    ///
    /// Returns `Ok(None)` when `data` is not for this type. Fails with
    /// [`DcError::ComponentExists`](crate::core::DcError::ComponentExists)
    /// when the target already exists.
    async fn materialize(
        &self,
        _dir: &Path,
        _data: &CreationData,
        _settings: &ProjectSettings,
        _collaborators: &Collaborators,
    ) -> Result<Option<Arc<dyn Component>>> {
        Ok(None)
    }
}

/// The ordered list of registered component types.
pub struct ComponentTypes {
    types: Vec<Box<dyn ComponentType>>,
}

impl ComponentTypes {
    /// A registry of exactly `types`, in order.
    pub fn new(types: Vec<Box<dyn ComponentType>>) -> Self {
        Self {
            types,
        }
    }

    /// The built-in kinds in their registration order.
    pub fn builtin() -> Self {
        Self::new(super::kinds::builtin_types())
    }

    /// All types, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &(dyn ComponentType + 'static)> {
        self.types.iter().map(AsRef::as_ref)
    }

    /// Types producing `kind`.
    pub fn producing(
        &self,
        kind: ComponentKind,
    ) -> impl Iterator<Item = &(dyn ComponentType + 'static)> {
        self.iter().filter(move |t| t.kind() == kind)
    }
}

impl std::fmt::Debug for ComponentTypes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.types.iter().map(|t| t.kind())).finish()
    }
}
