//! Shared plumbing for commands that operate on an existing project.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::{Path, PathBuf};

use crate::components::{AggregateResult, Collaborators, ComponentTree, ComponentTypes, build_tree};
use crate::config::ProjectSettings;

/// An opened project: settings, the discovered tree focused on the start
/// directory, and everything components are created with.
pub struct Project {
    pub settings: ProjectSettings,
    pub tree: ComponentTree,
    pub types: ComponentTypes,
    pub collaborators: Collaborators,
}

impl Project {
    /// Opens the project containing `path` (default: the current directory)
    /// with the built-in kinds and real collaborators.
    ///
    /// A relative `path` is resolved against the project root.
    pub async fn open(path: Option<&Path>) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to read current directory")?;
        let search_from = match path {
            Some(path) if path.is_absolute() => path.to_path_buf(),
            _ => cwd.clone(),
        };
        let settings = ProjectSettings::discover(&search_from).await?;
        let start = path.map_or(cwd, Path::to_path_buf);
        Self::open_at(settings, &start, ComponentTypes::builtin(), Collaborators::system()).await
    }

    /// Opens the project of `settings` focused on `start`.
    pub async fn open_at(
        settings: ProjectSettings,
        start: &Path,
        types: ComponentTypes,
        collaborators: Collaborators,
    ) -> Result<Self> {
        let tree = build_tree(&settings, start, &types, &collaborators).await?;
        Ok(Self {
            settings,
            tree,
            types,
            collaborators,
        })
    }

    /// Directory the tree is focused on.
    pub fn focus_path(&self) -> PathBuf {
        self.tree.path(self.tree.focus()).to_path_buf()
    }
}

/// Prints every outcome of `result` and fails if any component failed.
pub fn report(result: &AggregateResult, path: &Path) -> Result<()> {
    if result.outcomes.is_empty() {
        println!("{} Nothing to {} under {}", "-".dimmed(), result.operation.to_string().to_lowercase(), path.display());
        return Ok(());
    }

    for outcome in &result.outcomes {
        let marker = if outcome.succeeded() { "✓".green() } else { "✗".red() };
        println!("{marker} {} {}", outcome.component.bold(), format!("({})", outcome.path.display()).dimmed());

        let output = outcome.output();
        if !output.trim().is_empty() {
            for line in output.lines() {
                println!("    {line}");
            }
        }
    }

    let failed = result.failures().count();
    if failed == 0 {
        println!("\n{} {} succeeded for {} component(s)", "✓".green(), result.operation, result.outcomes.len());
    } else {
        println!("\n{} {} failed for {failed} of {} component(s)", "✗".red(), result.operation, result.outcomes.len());
    }

    result.ensure_success(path)
}
