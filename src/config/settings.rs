//! Two-scope project settings store.
//!
//! Settings live beside the project root in two JSON files:
//!
//! - `.project.settings` - project scope, committed with the project. Its
//!   presence marks the project root.
//! - `.user.settings` - user scope, local to a developer machine (API keys,
//!   local parameter values). Only written once it has entries.
//!
//! Lookups check the user scope first, then the project scope, then fall back
//! to the caller's default.
//!
//! ```json
//! {
//!   "cloudformation-parameters:TableName": "orders",
//!   "projectName": "shop"
//! }
//! ```

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

use crate::constants::{
    PROJECT_NAME_KEY, PROJECT_ROOT_PLACEHOLDER, PROJECT_SETTINGS_FILE, USER_SETTINGS_FILE,
};
use crate::core::DcError;

/// Which settings file a value is persisted to.
///
/// Ordering reflects precedence when two components require the same key:
/// the lower class (`Project`) is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConfigScope {
    /// Committed project settings.
    Project,
    /// Machine-local user settings.
    User,
}

/// Configuration store for one project.
#[derive(Debug, Clone)]
pub struct ProjectSettings {
    root: PathBuf,
    project: BTreeMap<String, String>,
    user: BTreeMap<String, String>,
}

impl ProjectSettings {
    /// Creates settings for a new project rooted at `root`.
    ///
    /// Nothing is written until [`save`](Self::save) is called.
    pub fn new(root: impl Into<PathBuf>, project_name: &str) -> Self {
        let mut project = BTreeMap::new();
        project.insert(PROJECT_NAME_KEY.to_string(), project_name.to_string());
        Self {
            root: root.into(),
            project,
            user: BTreeMap::new(),
        }
    }

    /// Finds the project containing `start` and loads its settings.
    ///
    /// Walks from `start` through its ancestors to the first directory that
    /// contains `.project.settings`.
    ///
    /// # Errors
    ///
    /// Returns [`DcError::ProjectNotFound`] when no ancestor is a project root,
    /// or an error if either settings file cannot be read or parsed.
    pub async fn discover(start: &Path) -> Result<Self> {
        let start = if start.is_absolute() {
            start.to_path_buf()
        } else {
            std::env::current_dir().context("Failed to read current directory")?.join(start)
        };

        let mut current = Some(start.as_path());
        while let Some(dir) = current {
            if fs::try_exists(dir.join(PROJECT_SETTINGS_FILE)).await.unwrap_or(false) {
                tracing::debug!("Found project root at {}", dir.display());
                return Self::load(dir).await;
            }
            current = dir.parent();
        }

        Err(DcError::ProjectNotFound {
            start: start.display().to_string(),
        }
        .into())
    }

    /// Loads settings from the project rooted at `root`.
    ///
    /// A missing user settings file is treated as empty.
    pub async fn load(root: &Path) -> Result<Self> {
        let project = read_scope(&root.join(PROJECT_SETTINGS_FILE)).await?.unwrap_or_default();
        let user = read_scope(&root.join(USER_SETTINGS_FILE)).await?.unwrap_or_default();

        Ok(Self {
            root: root.to_path_buf(),
            project,
            user,
        })
    }

    /// Persists both scopes.
    ///
    /// An empty user scope is not written; a user file left over from an
    /// earlier save is removed so it cannot shadow project values.
    pub async fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("Failed to create project root {}", self.root.display()))?;

        write_scope(&self.root.join(PROJECT_SETTINGS_FILE), &self.project).await?;

        let user_file = self.root.join(USER_SETTINGS_FILE);
        if !self.user.is_empty() {
            write_scope(&user_file, &self.user).await?;
        } else if fs::try_exists(&user_file).await.unwrap_or(false) {
            fs::remove_file(&user_file)
                .await
                .with_context(|| format!("Failed to remove {}", user_file.display()))?;
        }
        Ok(())
    }

    /// The project root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The project name stored under `projectName`.
    pub fn project_name(&self) -> &str {
        self.get_opt(PROJECT_NAME_KEY).unwrap_or_default()
    }

    /// Looks up `key`, user scope first.
    pub fn get_opt(&self, key: &str) -> Option<&str> {
        self.user.get(key).or_else(|| self.project.get(key)).map(String::as_str)
    }

    /// Looks up `key`, returning `default` when neither scope has it.
    pub fn get(&self, key: &str, default: &str) -> String {
        self.get_opt(key).unwrap_or(default).to_string()
    }

    /// Whether either scope holds `key`.
    pub fn has(&self, key: &str) -> bool {
        self.get_opt(key).is_some()
    }

    /// Stores `value` under `key` in `scope`.
    ///
    /// The key is removed from the other scope so the new value is the one
    /// that lookups see.
    pub fn set(&mut self, key: &str, value: &str, scope: ConfigScope) {
        let (target, other) = match scope {
            ConfigScope::Project => (&mut self.project, &mut self.user),
            ConfigScope::User => (&mut self.user, &mut self.project),
        };
        other.remove(key);
        target.insert(key.to_string(), value.to_string());
    }

    /// All entries whose key starts with `namespace`, with the prefix stripped.
    ///
    /// User scope values win over project scope values.
    pub fn get_all(&self, namespace: &str) -> BTreeMap<String, String> {
        let mut entries = BTreeMap::new();
        for scope in [&self.project, &self.user] {
            for (key, value) in scope {
                if let Some(name) = key.strip_prefix(namespace) {
                    entries.insert(name.to_string(), value.clone());
                }
            }
        }
        entries
    }

    /// Resolves a user supplied path against the project root.
    ///
    /// `[[PROJECT_ROOT]]` is expanded, a leading `./` is dropped and relative
    /// paths are joined onto the root.
    pub fn rooted_path(&self, path: &str) -> PathBuf {
        let root = self.root.to_string_lossy();
        let expanded = path.replace(PROJECT_ROOT_PLACEHOLDER, &root);
        let trimmed = expanded.strip_prefix("./").unwrap_or(&expanded);

        let candidate = Path::new(trimmed);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        }
    }

    /// Path of `path` relative to `from`, using `..` where needed.
    pub fn relative_path(path: &Path, from: &Path) -> PathBuf {
        if let Ok(stripped) = path.strip_prefix(from) {
            return stripped.to_path_buf();
        }

        let path_parts: Vec<Component<'_>> = path.components().collect();
        let from_parts: Vec<Component<'_>> = from.components().collect();
        let common = path_parts.iter().zip(&from_parts).take_while(|(a, b)| a == b).count();

        let mut relative = PathBuf::new();
        for _ in common..from_parts.len() {
            relative.push("..");
        }
        for part in &path_parts[common..] {
            relative.push(part.as_os_str());
        }
        relative
    }
}

async fn read_scope(path: &Path) -> Result<Option<BTreeMap<String, String>>> {
    match fs::read_to_string(path).await {
        Ok(content) => {
            let entries = serde_json::from_str(&content).map_err(|e| DcError::ConfigParseError {
                file: path.display().to_string(),
                reason: e.to_string(),
            })?;
            Ok(Some(entries))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => {
            Err(e).with_context(|| format!("Failed to read settings from {}", path.display()))
        }
    }
}

async fn write_scope(path: &Path, entries: &BTreeMap<String, String>) -> Result<()> {
    let content =
        serde_json::to_string_pretty(entries).context("Failed to serialize settings")?;
    fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write settings to {}", path.display()))
}
