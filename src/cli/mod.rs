//! Command-line interface for dc.
//!
//! Every verb is a thin wrapper: it opens the project containing the target
//! directory, builds the component tree focused on it and delegates to the
//! tree.
//!
//! # Available Commands
//!
//! ## Project setup
//! - `new` - Create `.project.settings` and a default `.dcignore`
//! - `add` - Create a component in the target directory
//! - `configure` - Ask for the settings components need
//! - `auto-proxy` - Put local proxies in front of nested HTTP endpoints
//!
//! ## Lifecycle
//! - `restore`, `build`, `test`, `clean` - Run the matching capability of
//!   every component at or below the target directory
//! - `start`, `stop`, `logs` - Manage the local environment
//!
//! ## Packaging
//! - `package` - Write one zip archive per application
//!
//! # Example
//!
//! ```bash
//! dc new shop
//! dc add stack local --services serverless,cognito
//! dc --path services/orders add cf-template orders
//! dc configure
//! dc start
//! dc --path services/orders test
//! dc package --package-version 1.0.0
//! ```

mod add;
pub mod common;
mod configure;
mod new;
mod package;
mod proxy;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use common::{Project, report};

pub use package::default_version;

/// Runtime configuration derived from the global flags.
///
/// Kept separate from [`Cli`] so tests can check flag handling without
/// installing a subscriber.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliConfig {
    /// Log filter directive. `None` defers to `RUST_LOG`, falling back to
    /// `info`.
    pub log_level: Option<String>,
}

impl CliConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the global tracing subscriber.
    ///
    /// Safe to call more than once; later calls are ignored.
    pub fn init_logging(&self) {
        let filter = match &self.log_level {
            Some(level) => EnvFilter::new(level),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    }
}

/// Scaffold and orchestrate local development environments.
#[derive(Parser, Debug)]
#[command(
    name = "dc",
    about = "Scaffold and orchestrate local development environments for composable serverless applications",
    version,
    author
)]
pub struct Cli {
    #[command(subcommand)]
    pub(crate) command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Directory to operate on, relative to the project root (default: the
    /// current directory)
    #[arg(short, long, global = true)]
    path: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Create a new project in the current directory
    New(new::NewCommand),

    /// Build every component at or below the target directory
    Build,

    /// Run the tests of every component at or below the target directory
    Test,

    /// Restore dependencies of every component at or below the target directory
    Restore,

    /// Remove build output of every component at or below the target directory
    Clean,

    /// Start every component at or below the target directory
    Start,

    /// Stop every component at or below the target directory
    Stop,

    /// Print the logs of every running component at or below the target directory
    Logs,

    /// Ask for the configuration components need
    Configure(configure::ConfigureCommand),

    /// Package applications into zip archives
    Package(package::PackageCommand),

    /// Add a component
    Add(add::AddCommand),

    /// Create local proxies for nested HTTP endpoints
    AutoProxy(proxy::AutoProxyCommand),
}

impl Cli {
    /// Initializes logging from the global flags and runs the command.
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        config.init_logging();
        self.execute_with_config(config).await
    }

    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            Some("debug".to_string())
        } else if self.quiet {
            Some("error".to_string())
        } else {
            None
        };

        CliConfig {
            log_level,
        }
    }

    /// Runs the command without touching the global subscriber.
    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        tracing::debug!("Running with {:?}", config);

        if let Commands::New(cmd) = self.command {
            return cmd.execute(self.path).await;
        }

        let mut project = Project::open(self.path.as_deref()).await?;
        let focus = project.tree.focus();
        let path = project.focus_path();

        let result = match self.command {
            Commands::Build => project.tree.build(focus).await,
            Commands::Test => project.tree.test(focus).await,
            Commands::Restore => project.tree.restore(focus).await,
            Commands::Clean => project.tree.clean(focus).await,
            Commands::Start => project.tree.start(focus, &project.settings).await,
            Commands::Stop => project.tree.stop(focus).await,
            Commands::Logs => project.tree.logs(focus).await,
            Commands::Configure(cmd) => return cmd.execute(&mut project).await,
            Commands::Package(cmd) => return cmd.execute(&project).await,
            Commands::Add(cmd) => return cmd.execute(&mut project).await,
            Commands::AutoProxy(cmd) => return cmd.execute(&mut project).await,
            Commands::New(cmd) => return cmd.execute(self.path).await,
        };

        report(&result, &path)
    }
}
