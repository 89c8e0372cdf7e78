//! Components and the tree that holds them.
//!
//! A dc project is a directory tree. Every directory may hold components
//! (an API gateway, a function, a stack emulator, ...), each implementing a
//! subset of the capability traits in [`capabilities`]. The [`tree`] module
//! mirrors the directory hierarchy as a [`ComponentTree`] and answers
//! capability queries over it; [`orchestrate`] runs operations such as build
//! or start across every matching component.
//!
//! # Module Organization
//!
//! - [`capabilities`] - capability traits and the [`Capability`] selector
//! - [`registry`] - component types: discovery and materialization
//! - [`tree`] - node arena and direction-qualified queries
//! - [`discovery`] - building a tree from disk, ignore rules
//! - [`orchestrate`] - aggregate operations, packaging, configure, initialize
//! - [`retry`] - retry policy around individual invocations
//! - [`environment`] - resolving function environment variables
//! - [`kinds`] - the built-in component kinds

pub mod capabilities;
pub mod discovery;
pub mod environment;
pub mod kinds;
mod language;
pub mod orchestrate;
pub mod registry;
pub mod retry;
pub mod tree;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{ProjectSettings, Prompter};
use crate::runner::CommandRunner;
use crate::template::{ProvisionerRegistry, ResourceProvisioner, ValueResolver};

pub use crate::config::RequiredConfiguration;
pub use capabilities::{
    Buildable, Capability, Cleanable, HasHttpEndpoint, HasLogs, NeedsConfiguration,
    PackagesApplication, ParsesCloudformationValues, Restorable, Startable, SuppliesCloudformationFragment,
    SuppliesPackageResources, Testable,
};
pub use discovery::{IgnoreRules, build_tree};
pub use orchestrate::{AggregateResult, InvocationOutcome, Operation};
pub use registry::{ComponentType, ComponentTypes, CreationData};
pub use retry::RetryPolicy;
pub use tree::{ComponentTree, Direction, Found, NodeId};

/// The built-in component kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    /// HTTP API serving functions locally.
    ApiGateway,
    /// A serverless function.
    Function,
    /// A front-end client application.
    Client,
    /// A `*.cf.yml` template fragment.
    CloudformationTemplate,
    /// An emulated cloud stack.
    CloudformationStack,
    /// A local reverse proxy.
    LocalProxy,
    /// A `*.tf` Terraform file shipped in packages.
    TerraformResource,
    /// A `*.main.tf` Terraform root module packaging everything beneath it.
    TerraformRoot,
    /// A `*.ps1` script shipped in packages.
    PowershellScript,
    /// A serverless layer built with a language toolchain.
    LambdaLayer,
    /// Overrides applied to the templates beneath it.
    ChildConfig,
    /// A single file included in packages.
    PackageFile,
    /// A directory included in packages.
    PackageDirectory,
    /// A packaged application.
    Application,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ApiGateway => "api-gateway",
            Self::Function => "function",
            Self::Client => "client",
            Self::CloudformationTemplate => "cloudformation-template",
            Self::CloudformationStack => "cloudformation-stack",
            Self::LocalProxy => "local-proxy",
            Self::TerraformResource => "terraform-resource",
            Self::TerraformRoot => "terraform-root",
            Self::PowershellScript => "powershell-script",
            Self::LambdaLayer => "lambda-layer",
            Self::ChildConfig => "child-config",
            Self::PackageFile => "package-file",
            Self::PackageDirectory => "package-directory",
            Self::Application => "application",
        };
        f.write_str(name)
    }
}

/// A unit of project functionality found at one directory.
///
/// Capabilities are advertised through the `as_*` accessors; the defaults
/// report "not implemented". Implementors override the accessors for the
/// capabilities they provide:
///
/// ```rust,ignore
/// fn as_buildable(&self) -> Option<&(dyn Buildable + 'static)> {
///     Some(self)
/// }
/// ```
pub trait Component: Send + Sync + fmt::Debug + 'static {
    /// Stable component name.
    fn name(&self) -> &str;

    /// Which kind of component this is.
    fn kind(&self) -> ComponentKind;

    /// Directory the component was found in.
    fn path(&self) -> &Path;

    /// This component as a [`Buildable`], if it can be built.
    ///
    /// Every accessor returns `None` unless the component overrides it.
    fn as_buildable(&self) -> Option<&(dyn Buildable + 'static)> {
        None
    }
    /// This component as a [`Testable`], if it has tests.
    fn as_testable(&self) -> Option<&(dyn Testable + 'static)> {
        None
    }
    /// This component as a [`Restorable`], if it has dependencies to restore.
    fn as_restorable(&self) -> Option<&(dyn Restorable + 'static)> {
        None
    }
    /// This component as a [`Cleanable`], if it leaves build output behind.
    fn as_cleanable(&self) -> Option<&(dyn Cleanable + 'static)> {
        None
    }
    /// This component as a [`Startable`], if it runs locally.
    fn as_startable(&self) -> Option<&(dyn Startable + 'static)> {
        None
    }
    /// This component as a [`HasLogs`], if it writes logs while running.
    fn as_logs(&self) -> Option<&(dyn HasLogs + 'static)> {
        None
    }
    /// This component as a [`HasHttpEndpoint`], if it serves HTTP.
    fn as_http_endpoint(&self) -> Option<&(dyn HasHttpEndpoint + 'static)> {
        None
    }
    /// This component as a [`SuppliesCloudformationFragment`].
    fn as_fragment_supplier(&self) -> Option<&(dyn SuppliesCloudformationFragment + 'static)> {
        None
    }
    /// This component as a [`NeedsConfiguration`], if it needs settings.
    fn as_needs_configuration(&self) -> Option<&(dyn NeedsConfiguration + 'static)> {
        None
    }
    /// This component as a [`SuppliesPackageResources`].
    fn as_package_resource_supplier(&self) -> Option<&(dyn SuppliesPackageResources + 'static)> {
        None
    }
    /// This component as a [`PackagesApplication`].
    fn as_application_packager(&self) -> Option<&(dyn PackagesApplication + 'static)> {
        None
    }
    /// This component as a [`ParsesCloudformationValues`].
    fn as_value_parser(&self) -> Option<&(dyn ParsesCloudformationValues + 'static)> {
        None
    }
}

/// Success flag and output of one capability invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionResult {
    /// Whether the action succeeded.
    pub success: bool,
    /// Output to show the user.
    pub output: String,
}

impl ActionResult {
    /// A successful result.
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    /// A failed result.
    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

impl From<crate::runner::CommandOutput> for ActionResult {
    fn from(output: crate::runner::CommandOutput) -> Self {
        Self {
            success: output.success,
            output: output.combined(),
        }
    }
}

/// A file destined for a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageResource {
    /// Path inside the package, `/`-separated.
    pub name: String,
    /// File contents.
    pub content: Vec<u8>,
}

impl PackageResource {
    /// Creates a resource from a package path and contents.
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// A resource named by `path` relative to `root`.
    pub fn relative(path: &Path, root: &Path, content: Vec<u8>) -> Self {
        let relative = ProjectSettings::relative_path(path, root);
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        Self::new(name, content)
    }
}

/// An assembled application package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageResult {
    /// Archive file name, e.g. `shop-2024.5.1.3600.zip`.
    pub package_name: String,
    /// Files in the archive.
    pub resources: Vec<PackageResource>,
}

/// Where a capability is being invoked: the tree, the node the component
/// lives at and the project settings.
#[derive(Clone, Copy)]
pub struct TreeContext<'a> {
    /// The whole project tree.
    pub tree: &'a ComponentTree,
    /// Node of the component being invoked.
    pub node: NodeId,
    /// Project settings.
    pub settings: &'a ProjectSettings,
}

impl<'a> TreeContext<'a> {
    /// Context for `node` in `tree`.
    pub const fn new(tree: &'a ComponentTree, node: NodeId, settings: &'a ProjectSettings) -> Self {
        Self {
            tree,
            node,
            settings,
        }
    }

    /// The same context moved to `node`.
    #[must_use]
    pub const fn at(self, node: NodeId) -> Self {
        Self {
            node,
            ..self
        }
    }

    /// Directory of the current node.
    pub fn path(&self) -> &'a Path {
        self.tree.path(self.node)
    }
}

/// External collaborators handed to components when they are created.
#[derive(Clone)]
pub struct Collaborators {
    /// Process and container runner.
    pub runner: Arc<dyn CommandRunner>,
    /// Interactive prompts.
    pub prompter: Arc<dyn Prompter>,
    /// Cloud API for resource creation and lookups.
    pub provisioner: Arc<dyn ResourceProvisioner>,
    /// `Ref`/`GetAtt` handlers.
    pub resolver: Arc<ValueResolver>,
    /// Resource ensurers for stack provisioning.
    pub provisioners: Arc<ProvisionerRegistry>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("runner", &self.runner)
            .field("resolver", &self.resolver)
            .field("provisioners", &self.provisioners)
            .finish_non_exhaustive()
    }
}

impl Collaborators {
    /// Collaborators wired with the built-in AWS handlers around `runner`
    /// and `prompter`.
    pub fn new(runner: Arc<dyn CommandRunner>, prompter: Arc<dyn Prompter>) -> Self {
        let provisioner: Arc<dyn ResourceProvisioner> =
            Arc::new(crate::template::aws::AwsCliProvisioner::new(runner.clone()));
        Self::with_provisioner(runner, prompter, provisioner)
    }

    /// Collaborators using `provisioner` for cloud API calls.
    pub fn with_provisioner(
        runner: Arc<dyn CommandRunner>,
        prompter: Arc<dyn Prompter>,
        provisioner: Arc<dyn ResourceProvisioner>,
    ) -> Self {
        let mut resolver = ValueResolver::new();
        crate::template::aws::register_ref_handlers(&mut resolver, &provisioner);
        let mut provisioners = ProvisionerRegistry::new();
        crate::template::aws::register_ensurers(&mut provisioners, &provisioner);

        Self {
            runner,
            prompter,
            provisioner,
            resolver: Arc::new(resolver),
            provisioners: Arc::new(provisioners),
        }
    }

    /// The same collaborators answering prompts through `prompter`.
    #[must_use]
    pub fn with_prompter(mut self, prompter: Arc<dyn Prompter>) -> Self {
        self.prompter = prompter;
        self
    }

    /// Real processes and console prompts.
    pub fn system() -> Self {
        Self::new(
            Arc::new(crate::runner::ProcessRunner),
            Arc::new(crate::config::ConsolePrompter),
        )
    }
}

/// Scratch directory for generated files of the component at `dir`.
pub fn temp_dir(dir: &Path) -> PathBuf {
    dir.join(crate::constants::COMPONENT_TEMP_DIR)
}
