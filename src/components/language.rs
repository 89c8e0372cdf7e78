//! Language toolchains used by functions and clients.
//!
//! Every toolchain runs in a throwaway container with the component
//! directory mounted, so nothing but the container engine has to be
//! installed locally.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tokio::fs;

use super::ActionResult;
use crate::core::DcError;
use crate::runner::{CommandRunner, ContainerSpec};

const NODE_DEFAULT_TAG: &str = "20";
const GO_DEFAULT_TAG: &str = "1.22";
const PYTHON_DEFAULT_TAG: &str = "3.12";

/// A language and the image tag its toolchain runs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Toolchain {
    /// Node.js with yarn.
    Node {
        /// `node` image tag.
        tag: String,
    },
    /// Go modules.
    Go {
        /// `golang` image tag.
        tag: String,
    },
    /// Python with pip.
    Python {
        /// `python` image tag.
        tag: String,
    },
}

impl fmt::Display for Toolchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node {
                tag,
            } => write!(f, "node:{tag}"),
            Self::Go {
                tag,
            } => write!(f, "go:{tag}"),
            Self::Python {
                tag,
            } => write!(f, "python:{tag}"),
        }
    }
}

impl Toolchain {
    /// Parses `language[:version]`, e.g. `node`, `node:18` or `python:3.11`.
    pub fn parse(language: &str) -> Result<Self> {
        let (name, version) = match language.split_once(':') {
            Some((name, version)) => (name, Some(version)),
            None => (language, None),
        };
        let tag = |default: &str| version.unwrap_or(default).to_string();

        match name.trim().to_ascii_lowercase().as_str() {
            "node" | "nodejs" => Ok(Self::Node {
                tag: tag(NODE_DEFAULT_TAG),
            }),
            "go" | "golang" => Ok(Self::Go {
                tag: tag(GO_DEFAULT_TAG),
            }),
            "python" => Ok(Self::Python {
                tag: tag(PYTHON_DEFAULT_TAG),
            }),
            other => Err(DcError::Other {
                message: format!("Unsupported function language '{other}'"),
            }
            .into()),
        }
    }

    fn container(&self, dir: &Path) -> ContainerSpec {
        match self {
            Self::Node {
                tag,
            } => ContainerSpec::new(format!("node:{tag}"))
                .volume(dir, "/usr/src/app")
                .workdir("/usr/src/app")
                .entrypoint("yarn"),
            Self::Go {
                tag,
            } => ContainerSpec::new(format!("golang:{tag}"))
                .volume(dir, "/usr/local/src")
                .workdir("/usr/local/src")
                .env("GOPATH", "/usr/local/src/.go")
                .entrypoint("go"),
            Self::Python {
                tag,
            } => ContainerSpec::new(format!("python:{tag}"))
                .volume(dir, "/usr/src/app")
                .workdir("/usr/src/app")
                .entrypoint("python"),
        }
    }

    async fn run(
        &self,
        runner: &dyn CommandRunner,
        container: ContainerSpec,
        args: &[&str],
    ) -> Result<ActionResult> {
        let output = runner.run(container.command(args.iter().copied()).run_command()).await?;
        Ok(output.into())
    }

    /// Installs dependencies.
    pub async fn restore(&self, runner: &dyn CommandRunner, dir: &Path) -> Result<ActionResult> {
        match self {
            Self::Node { .. } => {
                if !dir.join("package.json").exists() {
                    return Ok(ActionResult::ok("No package.json, nothing to restore"));
                }
                self.run(runner, self.container(dir), &["install"]).await
            }
            Self::Go { .. } => {
                fs::create_dir_all(dir.join(".go")).await.context("Failed to create GOPATH")?;
                self.run(runner, self.container(dir), &["mod", "download"]).await
            }
            Self::Python { .. } => {
                if !dir.join("requirements.txt").exists() {
                    return Ok(ActionResult::ok("No requirements.txt, nothing to restore"));
                }
                let pip = self.container(dir).entrypoint("pip");
                self.run(runner, pip, &["install", "-r", "requirements.txt", "--target", "./.out", "--upgrade"])
                    .await
            }
        }
    }

    /// Builds the function into its output directory.
    pub async fn build(&self, runner: &dyn CommandRunner, dir: &Path) -> Result<ActionResult> {
        match self {
            Self::Node { .. } => {
                if has_npm_script(dir, "build").await? {
                    self.run(runner, self.container(dir), &["run", "build"]).await
                } else {
                    Ok(ActionResult::ok(""))
                }
            }
            Self::Go { .. } => {
                let restored = self.restore(runner, dir).await?;
                if !restored.success {
                    return Ok(restored);
                }
                self.run(runner, self.container(dir), &["build", "-o", "./.out/main", "-v", "."]).await
            }
            Self::Python { .. } => {
                let restored = self.restore(runner, dir).await?;
                if !restored.success {
                    return Ok(restored);
                }
                copy_sources(dir, "py").await?;
                Ok(ActionResult::ok(""))
            }
        }
    }

    /// Runs the test suite.
    pub async fn test(&self, runner: &dyn CommandRunner, dir: &Path) -> Result<ActionResult> {
        match self {
            Self::Node { .. } => {
                if has_npm_script(dir, "test").await? {
                    self.run(runner, self.container(dir), &["run", "test"]).await
                } else {
                    Ok(ActionResult::ok("No test script"))
                }
            }
            Self::Go { .. } => self.run(runner, self.container(dir), &["test", "./..."]).await,
            Self::Python { .. } => self.run(runner, self.container(dir), &["-m", "unittest", "discover"]).await,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct PackageJson {
    #[serde(default)]
    scripts: BTreeMap<String, String>,
}

/// Whether `dir/package.json` declares `script`. No `package.json` means no.
pub async fn has_npm_script(dir: &Path, script: &str) -> Result<bool> {
    let path = dir.join("package.json");
    let content = match fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };
    let package: PackageJson = serde_json::from_str(&content).map_err(|e| DcError::ConfigParseError {
        file: path.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(package.scripts.contains_key(script))
}

async fn copy_sources(dir: &Path, extension: &str) -> Result<()> {
    let out = dir.join(".out");
    fs::create_dir_all(&out).await.with_context(|| format!("Failed to create {}", out.display()))?;

    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|e| e == extension) {
            let target = out.join(entry.file_name());
            fs::copy(&path, &target)
                .await
                .with_context(|| format!("Failed to copy {} to {}", path.display(), target.display()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::RecordingRunner;
    use tempfile::TempDir;

    #[test]
    fn test_parse_language() {
        assert_eq!(
            Toolchain::parse("node").unwrap(),
            Toolchain::Node {
                tag: NODE_DEFAULT_TAG.into()
            }
        );
        assert_eq!(Toolchain::parse("python:3.11").unwrap().to_string(), "python:3.11");
        assert!(Toolchain::parse("cobol").is_err());
    }

    #[tokio::test]
    async fn test_node_skips_missing_scripts() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("package.json"), r#"{"scripts":{"test":"jest"}}"#).unwrap();
        let runner = RecordingRunner::default();
        let node = Toolchain::parse("node").unwrap();

        assert!(node.build(&runner, temp.path()).await.unwrap().success);
        assert!(runner.commands().is_empty());

        node.test(&runner, temp.path()).await.unwrap();
        let commands = runner.commands();
        assert_eq!(commands.len(), 1);
        assert!(commands[0].contains("--entrypoint yarn node:20 run test"));
    }

    #[tokio::test]
    async fn test_python_build_copies_sources() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("handler.py"), "def handler(e, c): pass").unwrap();
        let runner = RecordingRunner::default();

        let result = Toolchain::parse("python").unwrap().build(&runner, temp.path()).await.unwrap();
        assert!(result.success);
        assert!(temp.path().join(".out/handler.py").exists());
    }
}
