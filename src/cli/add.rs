//! `dc add`: create components in the target directory.

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;

use super::common::Project;
use crate::components::CreationData;

/// Add a component to the target directory.
#[derive(Args, Debug)]
pub struct AddCommand {
    #[command(subcommand)]
    kind: AddKind,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum AddKind {
    /// A `<name>.cf.yml` CloudFormation template
    CfTemplate {
        name: String,
    },
    /// A `<name>.childconfig.yml` with overrides for the templates beneath it
    ChildConfig {
        name: String,
    },
    /// An empty file included in packages
    PackageFile {
        name: String,
    },
    /// A `<name>.include` directory included in packages
    PackageDir {
        name: String,
    },
    /// A local cloud stack emulator
    Stack {
        name: String,
        /// Services to emulate, e.g. `serverless,cognito`
        #[arg(short, long, value_delimiter = ',')]
        services: Vec<String>,
    },
    /// An nginx proxy
    Proxy {
        name: String,
        /// Port to listen on; asked for when omitted
        #[arg(long)]
        port: Option<u16>,
    },
    /// An empty `<name>.tf` Terraform module
    TfModule {
        name: String,
    },
    /// An empty `<name>.main.tf` Terraform root module, packaged as an application
    TfRoot {
        name: String,
    },
    /// An empty `<name>.ps1` script included in packages
    PsScript {
        name: String,
    },
    /// A Lambda layer built with a language toolchain
    Layer {
        name: String,
        /// `go`, `python` or `node`, optionally with `:version`
        #[arg(short, long, default_value = "node")]
        language: String,
    },
    /// An application package definition
    App {
        name: String,
    },
}

impl From<AddKind> for CreationData {
    fn from(kind: AddKind) -> Self {
        match kind {
            AddKind::CfTemplate {
                name,
            } => Self::CloudformationTemplate {
                name,
            },
            AddKind::ChildConfig {
                name,
            } => Self::ChildConfig {
                name,
            },
            AddKind::PackageFile {
                name,
            } => Self::PackageFile {
                name,
            },
            AddKind::PackageDir {
                name,
            } => Self::PackageDirectory {
                name,
            },
            AddKind::Stack {
                name,
                services,
            } => Self::CloudformationStack {
                name,
                services,
            },
            AddKind::Proxy {
                name,
                port,
            } => Self::LocalProxy {
                name,
                port,
            },
            AddKind::TfModule {
                name,
            } => Self::TerraformResource {
                name,
            },
            AddKind::TfRoot {
                name,
            } => Self::TerraformRoot {
                name,
            },
            AddKind::PsScript {
                name,
            } => Self::PowershellScript {
                name,
            },
            AddKind::Layer {
                name,
                language,
            } => Self::LambdaLayer {
                name,
                language,
            },
            AddKind::App {
                name,
            } => Self::Application {
                name,
            },
        }
    }
}

impl AddCommand {
    pub async fn execute(self, project: &mut Project) -> Result<()> {
        let data = CreationData::from(self.kind);
        let focus = project.tree.focus();
        let created = project
            .tree
            .initialize(focus, &data, &project.types, &mut project.settings, &project.collaborators)
            .await?;

        for component in created {
            println!(
                "{} Added {} {} at {}",
                "✓".green(),
                component.kind(),
                component.name().bold(),
                component.path().display()
            );
        }
        Ok(())
    }
}
