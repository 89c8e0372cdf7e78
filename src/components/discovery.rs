//! Building a [`ComponentTree`] from the project directory.
//!
//! The whole project is walked from its root, regardless of where the command
//! was started, so ancestor and sibling lookups resolve. Each directory is
//! offered to every registered component type in order; sibling directories
//! are discovered concurrently. The node for the starting directory becomes
//! the tree's focus.
//!
//! Directories are pruned by `.dcignore` at the project root:
//!
//! ```text
//! # dependencies
//! node_modules
//! **/.tmp
//! .packages
//! ```
//!
//! A rule matches a directory's project-relative path or its bare name. `.git`
//! is always pruned.

use anyhow::{Context, Result};
use futures::future::{BoxFuture, try_join_all};
use glob::{MatchOptions, Pattern};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

use super::capabilities::capability_names;
use super::registry::ComponentTypes;
use super::tree::{ComponentTree, NodeId};
use super::{Collaborators, Component};
use crate::config::ProjectSettings;
use crate::constants::{ALWAYS_IGNORED, IGNORE_FILE};
use crate::core::DcError;

/// Glob rules for directories excluded from discovery.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    patterns: Vec<Pattern>,
}

impl IgnoreRules {
    /// Parses one glob per line, skipping blank lines and `#` comments.
    ///
    /// Invalid globs are skipped with a warning.
    pub fn parse(content: &str) -> Self {
        let patterns = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let line = line.trim_end_matches('/');
                match Pattern::new(line) {
                    Ok(pattern) => Some(pattern),
                    Err(e) => {
                        tracing::warn!("Ignoring invalid {IGNORE_FILE} rule '{line}': {e}");
                        None
                    }
                }
            })
            .collect();
        Self {
            patterns,
        }
    }

    /// Reads `.dcignore` from `root`; a missing file means no rules.
    pub async fn load(root: &Path) -> Result<Self> {
        let path = root.join(IGNORE_FILE);
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(Self::parse(&content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    /// Whether the directory at project-relative `relative` is pruned.
    pub fn is_ignored(&self, relative: &Path) -> bool {
        let name = relative.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        if ALWAYS_IGNORED.contains(&name.as_ref()) {
            return true;
        }

        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let options = MatchOptions {
            require_literal_separator: true,
            ..MatchOptions::default()
        };
        self.patterns.iter().any(|pattern| {
            pattern.matches_with(&relative, options) || pattern.matches_with(&name, options)
        })
    }
}

struct DiscoveredDir {
    path: PathBuf,
    components: Vec<Arc<dyn Component>>,
    children: Vec<DiscoveredDir>,
}

struct Walk<'a> {
    root: &'a Path,
    rules: &'a IgnoreRules,
    types: &'a ComponentTypes,
    settings: &'a ProjectSettings,
    collaborators: &'a Collaborators,
}

/// Discovers the project of `settings` and focuses the tree on `start`.
///
/// `start` may be absolute or relative to the project root; it is created if
/// it does not exist yet.
///
/// # Errors
///
/// Fails when a directory cannot be read, a component configuration cannot
/// be parsed, or `start` lies outside the project or in an ignored directory.
pub async fn build_tree(
    settings: &ProjectSettings,
    start: &Path,
    types: &ComponentTypes,
    collaborators: &Collaborators,
) -> Result<ComponentTree> {
    let start = settings.rooted_path(&start.to_string_lossy());
    fs::create_dir_all(&start)
        .await
        .with_context(|| format!("Failed to create {}", start.display()))?;

    let root = fs::canonicalize(settings.root())
        .await
        .with_context(|| format!("Failed to resolve {}", settings.root().display()))?;
    let start = fs::canonicalize(&start)
        .await
        .with_context(|| format!("Failed to resolve {}", start.display()))?;

    let rules = IgnoreRules::load(&root).await?;
    let walk = Walk {
        root: &root,
        rules: &rules,
        types,
        settings,
        collaborators,
    };

    let discovered = discover_dir(root.clone(), &walk).await?;

    let mut tree = ComponentTree::new(discovered.path.clone());
    let tree_root = tree.root();
    insert(&mut tree, tree_root, discovered);

    let focus = tree.find(&start).ok_or_else(|| DcError::Other {
        message: format!(
            "{} is not part of the project at {} (is it ignored?)",
            start.display(),
            root.display()
        ),
    })?;
    tree.set_focus(focus);

    tracing::debug!("Discovered {} directories under {}", tree.len(), root.display());
    Ok(tree)
}

fn insert(tree: &mut ComponentTree, node: NodeId, discovered: DiscoveredDir) {
    for component in discovered.components {
        tree.add_component(node, component);
    }
    for child in discovered.children {
        let id = tree.add_child(node, child.path.clone());
        insert(tree, id, child);
    }
}

fn discover_dir<'a>(dir: PathBuf, walk: &'a Walk<'a>) -> BoxFuture<'a, Result<DiscoveredDir>> {
    Box::pin(async move {
        let mut components = Vec::new();
        for component_type in walk.types.iter() {
            let found = component_type
                .discover(&dir, walk.settings, walk.collaborators)
                .await
                .with_context(|| {
                    format!("Failed to discover {} components in {}", component_type.kind(), dir.display())
                })?;
            for component in &found {
                tracing::debug!(
                    "Found {} '{}' at {} [{}]",
                    component.kind(),
                    component.name(),
                    dir.display(),
                    capability_names(component.as_ref()).join(", ")
                );
            }
            components.extend(found);
        }

        let subdirs = subdirectories(&dir, walk).await?;
        let children = try_join_all(subdirs.into_iter().map(|sub| discover_dir(sub, walk))).await?;

        Ok(DiscoveredDir {
            path: dir,
            components,
            children,
        })
    })
}

async fn subdirectories(dir: &Path, walk: &Walk<'_>) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read directory {}", dir.display()))?;

    let mut dirs = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("Failed to read directory {}", dir.display()))?
    {
        let file_type = entry.file_type().await?;
        if !file_type.is_dir() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(walk.root).unwrap_or(&path);
        if walk.rules.is_ignored(relative) {
            tracing::debug!("Skipping ignored directory {}", relative.display());
            continue;
        }
        dirs.push(path);
    }

    dirs.sort();
    Ok(dirs)
}
