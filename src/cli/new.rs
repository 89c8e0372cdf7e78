//! `dc new`: create a project.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::config::ProjectSettings;
use crate::constants::{IGNORE_FILE, PROJECT_SETTINGS_FILE};
use crate::core::DcError;

const DEFAULT_IGNORE: &str = "node_modules\n**/.tmp\n.packages\n.localstack\n";

/// Create a new dc project in the target directory.
#[derive(Args, Debug)]
pub struct NewCommand {
    /// Project name, used to prefix container names
    pub name: String,
}

impl NewCommand {
    /// Writes `.project.settings` and a default `.dcignore` in `dir`.
    ///
    /// An existing `.dcignore` is kept.
    ///
    /// # Errors
    ///
    /// Fails when `dir` already is a project root.
    pub async fn execute(self, dir: Option<PathBuf>) -> Result<()> {
        let dir = match dir {
            Some(dir) => dir,
            None => std::env::current_dir().context("Failed to read current directory")?,
        };
        self.create_at(&dir).await?;

        println!("{} Created project {} at {}", "✓".green(), self.name.bold(), dir.display());
        println!("\n{}", "Next steps:".cyan());
        println!("  Add a stack emulator with {}", "dc add stack local --services serverless".bright_white());
        println!("  Then run {} to start everything", "dc start".bright_white());
        Ok(())
    }

    async fn create_at(&self, dir: &Path) -> Result<ProjectSettings> {
        if fs::try_exists(dir.join(PROJECT_SETTINGS_FILE)).await.unwrap_or(false) {
            return Err(DcError::Other {
                message: format!("{} already is a dc project", dir.display()),
            }
            .into());
        }

        let settings = ProjectSettings::new(dir, &self.name);
        settings.save().await?;

        let ignore = dir.join(IGNORE_FILE);
        if !fs::try_exists(&ignore).await.unwrap_or(false) {
            fs::write(&ignore, DEFAULT_IGNORE).await.with_context(|| format!("Failed to write {}", ignore.display()))?;
        }

        tracing::info!("Created project {} at {}", self.name, dir.display());
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_new_writes_settings_and_ignore_file() {
        let temp = TempDir::new().unwrap();
        let cmd = NewCommand {
            name: "shop".into(),
        };

        cmd.create_at(temp.path()).await.unwrap();

        let settings = ProjectSettings::load(temp.path()).await.unwrap();
        assert_eq!(settings.project_name(), "shop");
        let ignore = std::fs::read_to_string(temp.path().join(IGNORE_FILE)).unwrap();
        assert!(ignore.lines().any(|l| l == "node_modules"));

        let again = cmd.create_at(temp.path()).await;
        assert!(again.is_err());
    }

    #[tokio::test]
    async fn test_new_keeps_existing_ignore_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(IGNORE_FILE), "vendor\n").unwrap();

        NewCommand {
            name: "shop".into(),
        }
        .create_at(temp.path())
        .await
        .unwrap();

        assert_eq!(std::fs::read_to_string(temp.path().join(IGNORE_FILE)).unwrap(), "vendor\n");
    }
}
