//! Configurable fake components and component types.

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::components::kinds::{ensure_absent, file_name};
use crate::components::{
    ActionResult, Buildable, Collaborators, Component, ComponentKind, ComponentType, CreationData,
    HasHttpEndpoint, NeedsConfiguration, PackageResource, PackageResult, PackagesApplication,
    ParsesCloudformationValues, RequiredConfiguration, Restorable, Startable, SuppliesCloudformationFragment,
    SuppliesPackageResources, TreeContext,
};
use crate::config::ProjectSettings;
use crate::template::TemplateData;

/// A component whose capabilities are switched on by builder methods.
///
/// Every build, restore, start and stop increments a shared counter (see
/// [`calls`](Self::calls)); clones share it.
///
/// ```rust,ignore
/// let api = FakeComponent::new("api").buildable().http(5000);
/// let calls = api.calls();
/// tree.add_component(root, api.into_arc());
/// ```
#[derive(Debug, Clone)]
pub struct FakeComponent {
    name: String,
    kind: ComponentKind,
    path: PathBuf,
    buildable: bool,
    restorable: bool,
    startable: bool,
    http: Option<u16>,
    failures: usize,
    calls: Arc<AtomicUsize>,
    requires: Vec<RequiredConfiguration>,
    resources: Vec<PackageResource>,
    packager: bool,
    fragment: Option<TemplateData>,
    values: Option<BTreeMap<String, String>>,
}

impl FakeComponent {
    /// A component with no capabilities.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ComponentKind::Function,
            path: PathBuf::new(),
            buildable: false,
            restorable: false,
            startable: false,
            http: None,
            failures: 0,
            calls: Arc::new(AtomicUsize::new(0)),
            requires: Vec::new(),
            resources: Vec::new(),
            packager: false,
            fragment: None,
            values: None,
        }
    }

    #[must_use]
    pub fn at(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    #[must_use]
    pub const fn kind_of(mut self, kind: ComponentKind) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub const fn buildable(mut self) -> Self {
        self.buildable = true;
        self
    }

    #[must_use]
    pub const fn restorable(mut self) -> Self {
        self.restorable = true;
        self
    }

    #[must_use]
    pub const fn startable(mut self) -> Self {
        self.startable = true;
        self
    }

    /// Serves HTTP on `port`, mounted under its name.
    #[must_use]
    pub const fn http(mut self, port: u16) -> Self {
        self.http = Some(port);
        self
    }

    /// Every invocation fails.
    #[must_use]
    pub const fn failing(self) -> Self {
        self.failing_times(usize::MAX)
    }

    /// The first `times` invocations fail.
    #[must_use]
    pub const fn failing_times(mut self, times: usize) -> Self {
        self.failures = times;
        self
    }

    /// Invocation counter shared by every clone.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    #[must_use]
    pub fn requires(mut self, entry: RequiredConfiguration) -> Self {
        self.requires.push(entry);
        self
    }

    /// Supplies a package resource named `name`.
    #[must_use]
    pub fn resource(mut self, name: &str, content: &str) -> Self {
        self.resources.push(PackageResource::new(name, content));
        self
    }

    /// Packages `<name>-<version>.zip`.
    #[must_use]
    pub const fn packager(mut self) -> Self {
        self.packager = true;
        self
    }

    #[must_use]
    pub fn fragment(mut self, template: TemplateData) -> Self {
        self.fragment = Some(template);
        self
    }

    /// Parses plain string values found among `values`.
    #[must_use]
    pub fn parser<'a>(mut self, values: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        self.values =
            Some(values.into_iter().map(|(key, value)| (key.to_string(), value.to_string())).collect());
        self
    }

    #[must_use]
    pub fn renamed(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn into_arc(self) -> Arc<dyn Component> {
        Arc::new(self)
    }

    fn invoke(&self, verb: &str) -> Result<ActionResult> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            bail!("{} could not be {verb} (attempt {attempt})", self.name);
        }
        Ok(ActionResult::ok(format!("{verb} {}", self.name)))
    }
}

impl Component for FakeComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ComponentKind {
        self.kind
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn as_buildable(&self) -> Option<&(dyn Buildable + 'static)> {
        if self.buildable { Some(self) } else { None }
    }

    fn as_restorable(&self) -> Option<&(dyn Restorable + 'static)> {
        if self.restorable { Some(self) } else { None }
    }

    fn as_startable(&self) -> Option<&(dyn Startable + 'static)> {
        if self.startable { Some(self) } else { None }
    }

    fn as_http_endpoint(&self) -> Option<&(dyn HasHttpEndpoint + 'static)> {
        if self.http.is_some() { Some(self) } else { None }
    }

    fn as_fragment_supplier(&self) -> Option<&(dyn SuppliesCloudformationFragment + 'static)> {
        if self.fragment.is_some() { Some(self) } else { None }
    }

    fn as_needs_configuration(&self) -> Option<&(dyn NeedsConfiguration + 'static)> {
        if self.requires.is_empty() { None } else { Some(self) }
    }

    fn as_package_resource_supplier(&self) -> Option<&(dyn SuppliesPackageResources + 'static)> {
        if self.resources.is_empty() { None } else { Some(self) }
    }

    fn as_application_packager(&self) -> Option<&(dyn PackagesApplication + 'static)> {
        if self.packager { Some(self) } else { None }
    }

    fn as_value_parser(&self) -> Option<&(dyn ParsesCloudformationValues + 'static)> {
        if self.values.is_some() { Some(self) } else { None }
    }
}

#[async_trait]
impl Buildable for FakeComponent {
    async fn build(&self) -> Result<ActionResult> {
        self.invoke("built")
    }
}

#[async_trait]
impl Restorable for FakeComponent {
    async fn restore(&self) -> Result<ActionResult> {
        self.invoke("restored")
    }
}

#[async_trait]
impl Startable for FakeComponent {
    async fn start(&self, _ctx: &TreeContext<'_>) -> Result<ActionResult> {
        self.invoke("started")
    }

    async fn stop(&self) -> Result<ActionResult> {
        self.invoke("stopped")
    }
}

impl HasHttpEndpoint for FakeComponent {
    fn base_url(&self) -> &str {
        &self.name
    }

    fn port(&self) -> u16 {
        self.http.unwrap_or_default()
    }
}

#[async_trait]
impl SuppliesCloudformationFragment for FakeComponent {
    async fn fragment(&self, _ctx: &TreeContext<'_>) -> Result<TemplateData> {
        Ok(self.fragment.clone().unwrap_or_default())
    }
}

#[async_trait]
impl NeedsConfiguration for FakeComponent {
    async fn required_configurations(&self, _ctx: &TreeContext<'_>) -> Result<Vec<RequiredConfiguration>> {
        Ok(self.requires.clone())
    }
}

#[async_trait]
impl SuppliesPackageResources for FakeComponent {
    async fn package_resources(
        &self,
        _ctx: &TreeContext<'_>,
        _package_root: &Path,
        _version: &str,
    ) -> Result<Vec<PackageResource>> {
        Ok(self.resources.clone())
    }
}

#[async_trait]
impl PackagesApplication for FakeComponent {
    async fn package(&self, resources: Vec<PackageResource>, version: &str) -> Result<PackageResult> {
        Ok(PackageResult {
            package_name: format!("{}-{version}.zip", self.name),
            resources,
        })
    }
}

#[async_trait]
impl ParsesCloudformationValues for FakeComponent {
    async fn parse(
        &self,
        value: &Value,
        _template: Option<&TemplateData>,
        _ctx: &TreeContext<'_>,
    ) -> Result<Option<String>> {
        // `!Ref Name` and `{ Ref: Name }` look up `Name`
        let key = match value {
            Value::Tagged(tagged) if tagged.tag == "Ref" => tagged.value.as_str(),
            Value::Mapping(map) => map.get("Ref").and_then(Value::as_str),
            other => other.as_str(),
        };
        let values = self.values.as_ref();
        Ok(key.and_then(|key| values.and_then(|v| v.get(key))).cloned())
    }
}

/// A component type keyed on a marker file.
///
/// Discovers one buildable component, named after the directory, wherever
/// the marker file exists. Materializing writes `<name>.<marker>`.
#[derive(Debug, Clone)]
pub struct FakeComponentType {
    marker: String,
    kind: ComponentKind,
    prototype: Option<FakeComponent>,
}

impl FakeComponentType {
    pub fn new(marker: &str) -> Self {
        Self {
            marker: marker.to_string(),
            kind: ComponentKind::Function,
            prototype: None,
        }
    }

    #[must_use]
    pub const fn producing(mut self, kind: ComponentKind) -> Self {
        self.kind = kind;
        self
    }

    /// Components are clones of `prototype`, sharing its counter.
    #[must_use]
    pub fn with_prototype(mut self, prototype: FakeComponent) -> Self {
        self.prototype = Some(prototype);
        self
    }

    fn component(&self, name: &str, dir: &Path) -> FakeComponent {
        self.prototype
            .clone()
            .unwrap_or_else(|| FakeComponent::new(name).buildable())
            .renamed(name)
            .kind_of(self.kind)
            .at(dir)
    }
}

#[async_trait]
impl ComponentType for FakeComponentType {
    fn kind(&self) -> ComponentKind {
        self.kind
    }

    async fn discover(
        &self,
        dir: &Path,
        _settings: &ProjectSettings,
        _collaborators: &Collaborators,
    ) -> Result<Vec<Arc<dyn Component>>> {
        if !dir.join(&self.marker).is_file() {
            return Ok(Vec::new());
        }
        Ok(vec![self.component(&file_name(dir), dir).into_arc()])
    }

    async fn materialize(
        &self,
        dir: &Path,
        data: &CreationData,
        _settings: &ProjectSettings,
        _collaborators: &Collaborators,
    ) -> Result<Option<Arc<dyn Component>>> {
        if data.kind() != self.kind {
            return Ok(None);
        }
        let file = dir.join(format!("{}.{}", data.name(), self.marker));
        ensure_absent(&file, self.kind, data.name())?;
        tokio::fs::write(&file, "").await?;
        Ok(Some(self.component(data.name(), dir).into_arc()))
    }
}
