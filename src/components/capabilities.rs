//! Capability contracts a component may implement.
//!
//! A [`Component`] advertises each capability through an `as_*` accessor that
//! returns `Some` when implemented. The [`Capability`] trait ties a capability
//! trait object (for example `dyn Buildable`) to its accessor so tree queries
//! can be written generically:
//!
//! ```rust,ignore
//! let buildable = tree.find_all::<dyn Buildable>(node, Direction::In);
//! ```
//!
//! Every method reports ordinary failure through its return value
//! ([`ActionResult::success`], `Ok(None)` for an absent value). An `Err` is
//! reserved for unexpected collaborator failures and is what the retry policy
//! reacts to.

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

use super::{
    ActionResult, Component, PackageResource, PackageResult, RequiredConfiguration, TreeContext,
};
use crate::template::TemplateData;

/// Compiles, bundles or otherwise builds the component.
#[async_trait]
pub trait Buildable: Component {
    /// Build the component.
    async fn build(&self) -> Result<ActionResult>;
}

/// Runs the component's test suite.
#[async_trait]
pub trait Testable: Component {
    /// Run tests.
    async fn test(&self) -> Result<ActionResult>;
}

/// Restores dependencies (packages, modules) of the component.
#[async_trait]
pub trait Restorable: Component {
    /// Restore dependencies.
    async fn restore(&self) -> Result<ActionResult>;
}

/// Removes build output.
#[async_trait]
pub trait Cleanable: Component {
    /// Clean build output.
    async fn clean(&self) -> Result<ActionResult>;
}

/// Runs locally, usually as a detached container.
#[async_trait]
pub trait Startable: Component {
    /// Start the component. `ctx.node` is the node the component lives at.
    async fn start(&self, ctx: &TreeContext<'_>) -> Result<ActionResult>;

    /// Stop the component.
    async fn stop(&self) -> Result<ActionResult>;
}

/// Exposes logs of a running component.
#[async_trait]
pub trait HasLogs: Component {
    /// Fetch logs; the output carries the log text.
    async fn logs(&self) -> Result<ActionResult>;
}

/// Serves HTTP locally.
pub trait HasHttpEndpoint: Component {
    /// Base path the endpoint is mounted under, e.g. `/api`.
    fn base_url(&self) -> &str;

    /// Local port.
    fn port(&self) -> u16;
}

/// Contributes a partial CloudFormation template.
#[async_trait]
pub trait SuppliesCloudformationFragment: Component {
    /// The fragment this component contributes.
    async fn fragment(&self, ctx: &TreeContext<'_>) -> Result<TemplateData>;
}

/// Requires configuration entries before it can run.
#[async_trait]
pub trait NeedsConfiguration: Component {
    /// Entries the user must supply.
    async fn required_configurations(
        &self,
        ctx: &TreeContext<'_>,
    ) -> Result<Vec<RequiredConfiguration>>;
}

/// Contributes files to an application package.
#[async_trait]
pub trait SuppliesPackageResources: Component {
    /// Resources for the package assembled at `package_root`.
    ///
    /// Resource names are relative to `package_root`.
    async fn package_resources(
        &self,
        ctx: &TreeContext<'_>,
        package_root: &Path,
        version: &str,
    ) -> Result<Vec<PackageResource>>;
}

/// Assembles resources into a named application archive.
#[async_trait]
pub trait PackagesApplication: Component {
    /// Assemble the package.
    async fn package(&self, resources: Vec<PackageResource>, version: &str)
    -> Result<PackageResult>;
}

/// Resolves template values (references, parameters) to concrete strings.
#[async_trait]
pub trait ParsesCloudformationValues: Component {
    /// Resolve `value`. `Ok(None)` means "not available (yet)".
    ///
    /// When `template` is `None` the parser uses the template merged from
    /// its own subtree.
    async fn parse(
        &self,
        value: &serde_yaml::Value,
        template: Option<&TemplateData>,
        ctx: &TreeContext<'_>,
    ) -> Result<Option<String>>;
}

/// Links a capability trait object to the [`Component`] accessor exposing it.
pub trait Capability {
    /// Human-readable capability name, used in logs and errors.
    const NAME: &'static str;

    /// Returns the capability view of `component` if it implements it.
    fn select(component: &dyn Component) -> Option<&Self>;
}

macro_rules! capability {
    ($trait:ident, $accessor:ident, $name:literal) => {
        impl Capability for dyn $trait {
            const NAME: &'static str = $name;

            fn select(component: &dyn Component) -> Option<&Self> {
                component.$accessor()
            }
        }
    };
}

capability!(Buildable, as_buildable, "Buildable");
capability!(Testable, as_testable, "Testable");
capability!(Restorable, as_restorable, "Restorable");
capability!(Cleanable, as_cleanable, "Cleanable");
capability!(Startable, as_startable, "Startable");
capability!(HasLogs, as_logs, "HasLogs");
capability!(HasHttpEndpoint, as_http_endpoint, "HasHttpEndpoint");
capability!(SuppliesCloudformationFragment, as_fragment_supplier, "SuppliesCloudformationFragment");
capability!(NeedsConfiguration, as_needs_configuration, "NeedsConfiguration");
capability!(SuppliesPackageResources, as_package_resource_supplier, "SuppliesPackageResources");
capability!(PackagesApplication, as_application_packager, "PackagesApplication");
capability!(ParsesCloudformationValues, as_value_parser, "ParsesCloudformationValues");

/// Names of every capability `component` implements, in declaration order.
#[must_use]
pub fn capability_names(component: &dyn Component) -> Vec<&'static str> {
    let mut names = Vec::new();
    let mut check = |present: bool, name: &'static str| {
        if present {
            names.push(name);
        }
    };

    check(component.as_buildable().is_some(), <dyn Buildable>::NAME);
    check(component.as_testable().is_some(), <dyn Testable>::NAME);
    check(component.as_restorable().is_some(), <dyn Restorable>::NAME);
    check(component.as_cleanable().is_some(), <dyn Cleanable>::NAME);
    check(component.as_startable().is_some(), <dyn Startable>::NAME);
    check(component.as_logs().is_some(), <dyn HasLogs>::NAME);
    check(component.as_http_endpoint().is_some(), <dyn HasHttpEndpoint>::NAME);
    check(component.as_fragment_supplier().is_some(), <dyn SuppliesCloudformationFragment>::NAME);
    check(component.as_needs_configuration().is_some(), <dyn NeedsConfiguration>::NAME);
    check(
        component.as_package_resource_supplier().is_some(),
        <dyn SuppliesPackageResources>::NAME,
    );
    check(component.as_application_packager().is_some(), <dyn PackagesApplication>::NAME);
    check(component.as_value_parser().is_some(), <dyn ParsesCloudformationValues>::NAME);

    names
}
