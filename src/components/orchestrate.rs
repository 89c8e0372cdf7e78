//! Operations over a component tree.
//!
//! Aggregate operations (build, test, restore, clean, start, stop, logs)
//! collect every component under a node that implements the matching
//! capability, run each invocation concurrently under the tree's
//! [`RetryPolicy`](super::RetryPolicy) and report all outcomes together. A
//! failing component never stops its siblings: every invocation runs to
//! completion so one pass surfaces every failure.
//!
//! Packaging, configuration and initialization are sequential and live here
//! too, since they are driven by the same tree queries.

use anyhow::{Context, Result};
use futures::future::{BoxFuture, join_all, try_join_all};
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::capabilities::{
    Buildable, Capability, Cleanable, HasLogs, NeedsConfiguration, PackagesApplication, Restorable,
    Startable, SuppliesCloudformationFragment, SuppliesPackageResources, Testable,
};
use super::registry::{ComponentTypes, CreationData};
use super::tree::{ComponentTree, Direction, Found, NodeId};
use super::{ActionResult, Collaborators, Component, ComponentKind, PackageResult, TreeContext};
use crate::config::{ProjectSettings, Prompter, RequiredConfiguration};
use crate::core::DcError;
use crate::template::{self, TemplateData};

/// The aggregate operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// [`Buildable::build`]
    Build,
    /// [`Testable::test`]
    Test,
    /// [`Restorable::restore`]
    Restore,
    /// [`Cleanable::clean`]
    Clean,
    /// [`Startable::start`]
    Start,
    /// [`Startable::stop`]
    Stop,
    /// [`HasLogs::logs`]
    Logs,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Build => "Build",
            Self::Test => "Test",
            Self::Restore => "Restore",
            Self::Clean => "Clean",
            Self::Start => "Start",
            Self::Stop => "Stop",
            Self::Logs => "Logs",
        };
        f.write_str(name)
    }
}

/// Result of one component's invocation, after retries.
#[derive(Debug)]
pub struct InvocationOutcome {
    /// Component name.
    pub component: String,
    /// Directory of the component's node.
    pub path: PathBuf,
    /// The action result, or the error left after every attempt failed.
    pub result: Result<ActionResult>,
}

impl InvocationOutcome {
    /// Whether the invocation returned a successful result.
    pub fn succeeded(&self) -> bool {
        matches!(&self.result, Ok(result) if result.success)
    }

    /// Output of the invocation, or the error message.
    pub fn output(&self) -> String {
        match &self.result {
            Ok(result) => result.output.clone(),
            Err(e) => format!("{e:#}"),
        }
    }
}

/// Outcomes of an aggregate operation, in tree order.
#[derive(Debug)]
pub struct AggregateResult {
    /// The operation that ran.
    pub operation: Operation,
    /// One outcome per matched component.
    pub outcomes: Vec<InvocationOutcome>,
}

impl AggregateResult {
    /// True when every invocation succeeded. An operation that matched no
    /// component succeeds.
    pub fn success(&self) -> bool {
        self.outcomes.iter().all(InvocationOutcome::succeeded)
    }

    /// Outcomes that failed.
    pub fn failures(&self) -> impl Iterator<Item = &InvocationOutcome> {
        self.outcomes.iter().filter(|outcome| !outcome.succeeded())
    }

    /// Converts overall failure into [`DcError::OperationFailed`] for `path`.
    pub fn ensure_success(&self, path: &Path) -> Result<()> {
        if self.success() {
            return Ok(());
        }
        Err(DcError::OperationFailed {
            operation: self.operation.to_string(),
            path: path.display().to_string(),
        }
        .into())
    }
}

impl ComponentTree {
    async fn run_all<'t, C, F, Fut>(&'t self, node: NodeId, operation: Operation, invoke: F) -> AggregateResult
    where
        C: Capability + Component + ?Sized + 't,
        F: Fn(Found<'t, C>) -> Fut,
        Fut: Future<Output = Result<ActionResult>>,
    {
        let found = self.find_all::<C>(node, Direction::In);
        tracing::info!(
            "{operation}: {} {} component(s) under {}",
            found.len(),
            C::NAME,
            self.path(node).display()
        );

        let retry = self.retry_policy();
        let invoke = &invoke;
        let invocations = found.into_iter().map(|f| async move {
            let label = format!("{}.{operation}", f.component.name());
            let result = retry.run(&label, || invoke(f)).await;
            InvocationOutcome {
                component: f.component.name().to_string(),
                path: self.path(f.node).to_path_buf(),
                result,
            }
        });

        AggregateResult {
            operation,
            outcomes: join_all(invocations).await,
        }
    }

    /// Builds every [`Buildable`] component under `node`.
    pub async fn build(&self, node: NodeId) -> AggregateResult {
        self.run_all::<dyn Buildable, _, _>(node, Operation::Build, |f| f.component.build()).await
    }

    /// Tests every [`Testable`] component under `node`.
    pub async fn test(&self, node: NodeId) -> AggregateResult {
        self.run_all::<dyn Testable, _, _>(node, Operation::Test, |f| f.component.test()).await
    }

    /// Restores every [`Restorable`] component under `node`.
    pub async fn restore(&self, node: NodeId) -> AggregateResult {
        self.run_all::<dyn Restorable, _, _>(node, Operation::Restore, |f| f.component.restore()).await
    }

    /// Cleans every [`Cleanable`] component under `node`.
    pub async fn clean(&self, node: NodeId) -> AggregateResult {
        self.run_all::<dyn Cleanable, _, _>(node, Operation::Clean, |f| f.component.clean()).await
    }

    /// Starts every [`Startable`] component under `node`.
    pub async fn start(&self, node: NodeId, settings: &ProjectSettings) -> AggregateResult {
        self.run_all::<dyn Startable, _, _>(node, Operation::Start, |f| async move {
            let ctx = TreeContext::new(self, f.node, settings);
            f.component.start(&ctx).await
        })
        .await
    }

    /// Stops every [`Startable`] component under `node`.
    pub async fn stop(&self, node: NodeId) -> AggregateResult {
        self.run_all::<dyn Startable, _, _>(node, Operation::Stop, |f| f.component.stop()).await
    }

    /// Fetches logs of every [`HasLogs`] component under `node`.
    pub async fn logs(&self, node: NodeId) -> AggregateResult {
        self.run_all::<dyn HasLogs, _, _>(node, Operation::Logs, |f| f.component.logs()).await
    }

    /// Assembles the application packages defined at `node` and below.
    ///
    /// Each [`PackagesApplication`] component receives the resources of every
    /// [`SuppliesPackageResources`] component in its node's subtree, named
    /// relative to that node.
    pub fn package<'a>(
        &'a self,
        node: NodeId,
        settings: &'a ProjectSettings,
        version: &'a str,
    ) -> BoxFuture<'a, Result<Vec<PackageResult>>> {
        Box::pin(async move {
            let mut packages = Vec::new();
            let package_root = self.path(node);

            let packagers: Vec<&(dyn PackagesApplication + 'static)> =
                self.components(node).iter().filter_map(|c| c.as_application_packager()).collect();

            for packager in packagers {
                let suppliers = self.find_all::<dyn SuppliesPackageResources>(node, Direction::In);
                let gathered = try_join_all(suppliers.iter().map(|s| async move {
                    let ctx = TreeContext::new(self, s.node, settings);
                    s.component
                        .package_resources(&ctx, package_root, version)
                        .await
                        .with_context(|| format!("Failed to collect package resources of {}", s.component.name()))
                }))
                .await?;

                let resources = gathered.into_iter().flatten().collect::<Vec<_>>();
                tracing::info!(
                    "Packaging {} with {} resource(s) at {}",
                    packager.name(),
                    resources.len(),
                    package_root.display()
                );
                packages.push(packager.package(resources, version).await?);
            }

            for &child in self.children(node) {
                packages.extend(self.package(child, settings, version).await?);
            }

            Ok(packages)
        })
    }

    /// Prompts for the configuration required by the components at `node`.
    ///
    /// Keys required by several components are asked once and stored in the
    /// lower scope. Keys already present are skipped unless `overwrite`.
    /// With `recursive`, every descendant node is configured as well. Returns
    /// the number of values set; the caller persists `settings`.
    pub fn configure<'a>(
        &'a self,
        node: NodeId,
        settings: &'a mut ProjectSettings,
        prompter: &'a dyn Prompter,
        recursive: bool,
        overwrite: bool,
    ) -> BoxFuture<'a, Result<usize>> {
        Box::pin(async move {
            let required = self.required_configurations(node, settings).await?;

            let mut answered = 0;
            for entry in required {
                if !overwrite && settings.has(&entry.key) {
                    tracing::debug!("{} is already configured", entry.key);
                    continue;
                }
                let answer = prompter.ask(&entry.prompt)?;
                settings.set(&entry.key, &answer, entry.scope);
                answered += 1;
            }

            if recursive {
                for &child in self.children(node) {
                    answered += self.configure(child, settings, prompter, true, overwrite).await?;
                }
            }

            Ok(answered)
        })
    }

    async fn required_configurations(
        &self,
        node: NodeId,
        settings: &ProjectSettings,
    ) -> Result<Vec<RequiredConfiguration>> {
        let ctx = TreeContext::new(self, node, settings);
        let mut required: Vec<RequiredConfiguration> = Vec::new();

        for component in self.components(node) {
            let Some(needs) = component.as_needs_configuration() else {
                continue;
            };
            let entries = needs
                .required_configurations(&ctx)
                .await
                .with_context(|| format!("Failed to read required configuration of {}", component.name()))?;

            for entry in entries {
                match required.iter_mut().find(|existing| existing.key == entry.key) {
                    Some(existing) if entry.scope < existing.scope => existing.scope = entry.scope,
                    Some(_) => {}
                    None => required.push(entry),
                }
            }
        }

        Ok(required)
    }

    /// Creates new components of `data`'s kind at `node`.
    ///
    /// Every registered type producing the kind is asked to materialize. If
    /// any new component needs configuration, the node is configured (not
    /// recursively, keeping existing values) and `settings` saved. New
    /// restorable components are then restored.
    ///
    /// # Errors
    ///
    /// [`DcError::NoComponentType`] when no type produces the kind, and any
    /// conflict raised by a type when the component already exists.
    pub async fn initialize(
        &mut self,
        node: NodeId,
        data: &CreationData,
        types: &ComponentTypes,
        settings: &mut ProjectSettings,
        collaborators: &Collaborators,
    ) -> Result<Vec<Arc<dyn Component>>> {
        let kind = data.kind();
        let producers: Vec<_> = types.producing(kind).collect();
        if producers.is_empty() {
            return Err(DcError::NoComponentType {
                kind: kind.to_string(),
            }
            .into());
        }

        let dir = self.path(node).to_path_buf();
        let mut created = Vec::new();
        for producer in producers {
            if let Some(component) = producer.materialize(&dir, data, settings, collaborators).await? {
                tracing::info!("Created {kind} '{}' at {}", component.name(), dir.display());
                self.add_component(node, component.clone());
                created.push(component);
            }
        }

        if created.iter().any(|c| c.as_needs_configuration().is_some()) {
            self.configure(node, settings, collaborators.prompter.as_ref(), false, false).await?;
            settings.save().await?;
        }

        let retry = self.retry_policy();
        for component in &created {
            let Some(restorable) = component.as_restorable() else {
                continue;
            };
            let label = format!("{}.{}", component.name(), Operation::Restore);
            match retry.run(&label, || restorable.restore()).await {
                Ok(result) if result.success => {}
                Ok(result) => tracing::warn!("Restore of {} failed: {}", component.name(), result.output),
                Err(e) => tracing::warn!("Restore of {} failed: {e:#}", component.name()),
            }
        }

        Ok(created)
    }

    /// The template merged from every fragment supplier under `node`.
    pub async fn merged_template(&self, node: NodeId, settings: &ProjectSettings) -> Result<TemplateData> {
        self.merged_template_excluding(node, settings, &[]).await
    }

    /// Like [`merged_template`](Self::merged_template), skipping components
    /// of the `excluded` kinds.
    pub async fn merged_template_excluding(
        &self,
        node: NodeId,
        settings: &ProjectSettings,
        excluded: &[ComponentKind],
    ) -> Result<TemplateData> {
        let suppliers = self.find_all::<dyn SuppliesCloudformationFragment>(node, Direction::In);
        let fragments = try_join_all(
            suppliers.into_iter().filter(|s| !excluded.contains(&s.component.kind())).map(|s| async move {
                let ctx = TreeContext::new(self, s.node, settings);
                s.component
                    .fragment(&ctx)
                    .await
                    .with_context(|| format!("Failed to read template of {}", s.component.name()))
            }),
        )
        .await?;

        Ok(template::merge(fragments, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::RetryPolicy;
    use crate::config::ConfigScope;
    use crate::template::ResourceData;
    use crate::test_utils::{FakeComponent, FakeComponentType, ScriptedPrompter, init_test_logging, test_collaborators};
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    fn tree() -> ComponentTree {
        ComponentTree::new("/p").with_retry_policy(RetryPolicy::immediate(5))
    }

    #[tokio::test]
    async fn test_build_runs_every_component_despite_failure() {
        let mut tree = tree();
        let root = tree.root();
        let a = tree.add_child(root, "/p/a");
        let b = tree.add_child(root, "/p/b");

        let ok_a = FakeComponent::new("a").buildable();
        let broken = FakeComponent::new("broken").buildable().failing();
        let ok_b = FakeComponent::new("b").buildable();
        let counters = [ok_a.calls(), broken.calls(), ok_b.calls()];
        tree.add_component(a, ok_a.into_arc());
        tree.add_component(a, broken.into_arc());
        tree.add_component(b, ok_b.into_arc());

        let result = tree.build(root).await;

        assert!(!result.success());
        assert_eq!(result.outcomes.len(), 3);
        assert_eq!(counters[0].load(Ordering::SeqCst), 1);
        assert_eq!(counters[1].load(Ordering::SeqCst), 5);
        assert_eq!(counters[2].load(Ordering::SeqCst), 1);

        let outputs: Vec<String> =
            result.outcomes.iter().filter(|o| o.succeeded()).map(InvocationOutcome::output).collect();
        assert_eq!(outputs, ["built a", "built b"]);

        let failures: Vec<&str> = result.failures().map(|o| o.component.as_str()).collect();
        assert_eq!(failures, ["broken"]);
        assert!(result.ensure_success(Path::new("/p")).is_err());
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        init_test_logging(None);
        let mut tree = tree();
        let root = tree.root();
        let flaky = FakeComponent::new("flaky").buildable().failing_times(2);
        let calls = flaky.calls();
        tree.add_component(root, flaky.into_arc());

        let result = tree.build(root).await;
        assert!(result.success());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_operation_without_matches_succeeds() {
        let tree = tree();
        let result = tree.test(tree.root()).await;
        assert!(result.success());
        assert!(result.outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_start_only_covers_subtree() {
        let mut tree = tree();
        let root = tree.root();
        let api = tree.add_child(root, "/p/api");
        let web = FakeComponent::new("web").startable();
        let api_gw = FakeComponent::new("api").startable();
        let web_calls = web.calls();
        tree.add_component(root, web.into_arc());
        tree.add_component(api, api_gw.into_arc());

        let settings = ProjectSettings::new("/p", "shop");
        let result = tree.start(api, &settings).await;

        assert!(result.success());
        assert_eq!(result.outcomes.len(), 1);
        assert_eq!(result.outcomes[0].component, "api");
        assert_eq!(web_calls.load(Ordering::SeqCst), 0);
    }

    fn configurable_tree() -> ComponentTree {
        let mut tree = tree();
        let root = tree.root();
        tree.add_component(
            root,
            FakeComponent::new("a")
                .requires(RequiredConfiguration::new("apiKey", "API key?", ConfigScope::User))
                .requires(RequiredConfiguration::new("region", "Region?", ConfigScope::User))
                .into_arc(),
        );
        tree.add_component(
            root,
            FakeComponent::new("b")
                .requires(RequiredConfiguration::new("region", "Region?", ConfigScope::Project))
                .into_arc(),
        );
        tree
    }

    #[tokio::test]
    async fn test_configure_without_overwrite_keeps_existing_keys() {
        let tree = configurable_tree();
        let mut settings = ProjectSettings::new("/p", "shop");
        settings.set("apiKey", "secret", ConfigScope::User);
        let prompter = ScriptedPrompter::new(["eu-north-1"]);

        let answered = tree.configure(tree.root(), &mut settings, &prompter, false, false).await.unwrap();

        assert_eq!(answered, 1);
        assert_eq!(prompter.asked(), ["Region?"]);
        assert_eq!(settings.get("apiKey", ""), "secret");
        assert_eq!(settings.get("region", ""), "eu-north-1");
    }

    #[tokio::test]
    async fn test_configure_with_overwrite_prompts_every_key() {
        let tree = configurable_tree();
        let mut settings = ProjectSettings::new("/p", "shop");
        settings.set("apiKey", "secret", ConfigScope::User);
        settings.set("region", "us-east-1", ConfigScope::Project);
        let prompter = ScriptedPrompter::new(["rotated", "eu-west-1"]);

        let answered = tree.configure(tree.root(), &mut settings, &prompter, false, true).await.unwrap();

        assert_eq!(answered, 2);
        assert_eq!(prompter.asked(), ["API key?", "Region?"]);
        assert_eq!(settings.get("apiKey", ""), "rotated");
        assert_eq!(settings.get("region", ""), "eu-west-1");
    }

    #[tokio::test]
    async fn test_duplicate_key_keeps_lower_scope() {
        let tree = configurable_tree();
        let temp = TempDir::new().unwrap();
        let mut settings = ProjectSettings::new(temp.path(), "shop");
        let prompter = ScriptedPrompter::new(["k", "eu-north-1"]);

        tree.configure(tree.root(), &mut settings, &prompter, false, false).await.unwrap();
        settings.save().await.unwrap();

        let project_file =
            std::fs::read_to_string(temp.path().join(crate::constants::PROJECT_SETTINGS_FILE)).unwrap();
        assert!(project_file.contains("eu-north-1"));
        assert!(!project_file.contains("apiKey"));

        let reloaded = ProjectSettings::load(temp.path()).await.unwrap();
        assert_eq!(reloaded.get("region", ""), "eu-north-1");
        assert_eq!(reloaded.get("apiKey", ""), "k");
    }

    #[tokio::test]
    async fn test_reconfigured_key_moves_out_of_user_file() {
        let tree = configurable_tree();
        let temp = TempDir::new().unwrap();
        let mut settings = ProjectSettings::new(temp.path(), "shop");
        settings.set("region", "us-east-1", ConfigScope::User);
        settings.save().await.unwrap();

        let prompter = ScriptedPrompter::new(["k", "eu-west-1"]);
        tree.configure(tree.root(), &mut settings, &prompter, false, true).await.unwrap();
        settings.save().await.unwrap();

        let reloaded = ProjectSettings::load(temp.path()).await.unwrap();
        assert_eq!(reloaded.get("region", ""), "eu-west-1");
    }

    #[tokio::test]
    async fn test_configure_recursive_visits_children() {
        let mut tree = tree();
        let root = tree.root();
        let child = tree.add_child(root, "/p/child");
        tree.add_component(
            child,
            FakeComponent::new("c")
                .requires(RequiredConfiguration::new("childKey", "Child?", ConfigScope::User))
                .into_arc(),
        );
        let mut settings = ProjectSettings::new("/p", "shop");

        let prompter = ScriptedPrompter::new(["v"]);
        assert_eq!(tree.configure(root, &mut settings, &prompter, false, false).await.unwrap(), 0);
        assert_eq!(tree.configure(root, &mut settings, &prompter, true, false).await.unwrap(), 1);
        assert_eq!(settings.get("childKey", ""), "v");
    }

    #[tokio::test]
    async fn test_package_collects_subtree_resources() {
        let mut tree = tree();
        let root = tree.root();
        let app = tree.add_child(root, "/p/app");
        let web = tree.add_child(app, "/p/app/web");
        tree.add_component(root, FakeComponent::new("outside").resource("outside.txt", "x").into_arc());
        tree.add_component(app, FakeComponent::new("shop").packager().into_arc());
        tree.add_component(app, FakeComponent::new("config").resource("config.json", "{}").into_arc());
        tree.add_component(web, FakeComponent::new("web").resource("web/app.zip", "zip").into_arc());

        let settings = ProjectSettings::new("/p", "shop");
        let packages = tree.package(root, &settings, "1.0.0").await.unwrap();

        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].package_name, "shop-1.0.0.zip");
        let names: Vec<&str> = packages[0].resources.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["config.json", "web/app.zip"]);
    }

    #[tokio::test]
    async fn test_merged_template_first_writer_wins() {
        let mut tree = tree();
        let root = tree.root();
        let child = tree.add_child(root, "/p/child");

        let mut first = TemplateData::default();
        first.resources.insert("Orders".into(), ResourceData::new("AWS::DynamoDB::Table", Default::default()));
        let mut second = TemplateData::default();
        second.resources.insert("Orders".into(), ResourceData::new("AWS::S3::Bucket", Default::default()));
        second.resources.insert("Assets".into(), ResourceData::new("AWS::S3::Bucket", Default::default()));
        tree.add_component(root, FakeComponent::new("first").fragment(first).into_arc());
        tree.add_component(child, FakeComponent::new("second").fragment(second).into_arc());

        let settings = ProjectSettings::new("/p", "shop");
        let merged = tree.merged_template(root, &settings).await.unwrap();
        assert_eq!(merged.resources.len(), 2);
        assert!(merged.resources["Orders"].is_type("AWS::DynamoDB::Table"));
    }

    #[tokio::test]
    async fn test_initialize_configures_and_restores() {
        let temp = TempDir::new().unwrap();
        let mut settings = ProjectSettings::new(temp.path(), "shop");
        let prototype = FakeComponent::new("proto")
            .restorable()
            .requires(RequiredConfiguration::new("token", "Token?", ConfigScope::User));
        let restores = prototype.calls();
        let types = ComponentTypes::new(vec![Box::new(
            FakeComponentType::new("cf.yml")
                .producing(ComponentKind::CloudformationTemplate)
                .with_prototype(prototype),
        )]);
        let collaborators = test_collaborators().with_prompter(Arc::new(ScriptedPrompter::new(["abc"])));

        let mut tree = ComponentTree::new(temp.path()).with_retry_policy(RetryPolicy::immediate(2));
        let root = tree.root();
        let data = CreationData::CloudformationTemplate {
            name: "orders".into(),
        };
        let created = tree.initialize(root, &data, &types, &mut settings, &collaborators).await.unwrap();

        assert_eq!(created.len(), 1);
        assert_eq!(tree.components(root).len(), 1);
        assert!(temp.path().join("orders.cf.yml").exists());
        assert_eq!(restores.load(Ordering::SeqCst), 1);
        let reloaded = ProjectSettings::load(temp.path()).await.unwrap();
        assert_eq!(reloaded.get("token", ""), "abc");

        // a second attempt conflicts and is not retried
        let err = tree.initialize(root, &data, &types, &mut settings, &collaborators).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<DcError>(), Some(DcError::ComponentExists { .. })));
    }

    #[tokio::test]
    async fn test_initialize_unknown_kind() {
        let temp = TempDir::new().unwrap();
        let mut settings = ProjectSettings::new(temp.path(), "shop");
        let types = ComponentTypes::new(Vec::new());
        let mut tree = ComponentTree::new(temp.path());
        let root = tree.root();

        let err = tree
            .initialize(
                root,
                &CreationData::Application {
                    name: "shop".into(),
                },
                &types,
                &mut settings,
                &test_collaborators(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<DcError>(), Some(DcError::NoComponentType { .. })));
    }
}
