//! Shared helpers for integration tests.

use anyhow::Result;
use assert_cmd::Command;
use dc_cli::cli::common::Project;
use dc_cli::components::{Collaborators, ComponentTypes};
use dc_cli::config::ProjectSettings;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A dc project in a temporary directory.
pub struct TestProject {
    _temp: TempDir,
    root: PathBuf,
}

impl TestProject {
    /// Creates a project named `name` with a `.dcignore` ignoring `node_modules`.
    pub async fn new(name: &str) -> Result<Self> {
        let project = Self::empty()?;
        ProjectSettings::new(&project.root, name).save().await?;
        project.write(".dcignore", "node_modules\n.packages\n").await?;
        Ok(project)
    }

    /// A temporary directory that is not a project.
    pub fn empty() -> Result<Self> {
        dc_cli::test_utils::init_test_logging(None);
        let temp = TempDir::new()?;
        let root = temp.path().canonicalize()?;
        Ok(Self {
            _temp: temp,
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes `content` to the project-relative `path`, creating parents.
    pub async fn write(&self, path: &str, content: &str) -> Result<PathBuf> {
        let file = self.root.join(path);
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&file, content).await?;
        Ok(file)
    }

    pub async fn mkdir(&self, path: &str) -> Result<PathBuf> {
        let dir = self.root.join(path);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Opens the project focused on the project-relative directory `at`.
    pub async fn open(&self, at: &str, collaborators: Collaborators) -> Result<Project> {
        let settings = ProjectSettings::load(&self.root).await?;
        Project::open_at(settings, &self.root.join(at), ComponentTypes::builtin(), collaborators).await
    }

    /// The `dc` binary running in the project root.
    pub fn dc(&self) -> Command {
        let mut cmd = Command::cargo_bin("dc").unwrap();
        cmd.current_dir(&self.root).env("NO_COLOR", "1").env_remove("RUST_LOG");
        cmd
    }
}

pub const GO_FUNCTION: &str = "name: get-order\nsettings:\n  language: go\n";

pub const ORDERS_TEMPLATE: &str = r"
Parameters:
  OrdersTableName:
    Type: String
Resources:
  OrdersTable:
    Type: AWS::DynamoDB::Table
    Properties:
      TableName: !Ref OrdersTableName
      BillingMode: PROVISIONED
  GetOrder:
    Type: AWS::Serverless::Function
    Properties:
      Handler: main
      Environment:
        Variables:
          TABLE_NAME: !Ref OrdersTableName
";

pub const USERS_TEMPLATE: &str = r"
Resources:
  UsersBucket:
    Type: AWS::S3::Bucket
    Properties:
      BucketName: users
";
