//! dc: scaffold and orchestrate local development environments for
//! composable serverless applications.
//!
//! A project is a directory tree marked by `.project.settings` at its root.
//! Each directory may hold components (functions, API gateways, web clients,
//! CloudFormation templates, a local stack emulator, proxies, package inputs)
//! recognized by their configuration files. The library discovers them into a
//! [`components::ComponentTree`] and runs lifecycle operations over any
//! subtree:
//!
//! - restore, build, test and clean through the language toolchains
//! - start and stop containers, with the stack emulator provisioned from the
//!   merged CloudFormation template of the whole project
//! - package applications into versioned archives
//!
//! # Modules
//!
//! - [`config`] - project and user settings, interactive prompts
//! - [`core`] - error types and user-facing error formatting
//! - [`runner`] - external process and container execution
//! - [`template`] - CloudFormation template model, merging and value resolution
//! - [`components`] - capabilities, the component tree, discovery and
//!   orchestration, and the built-in component kinds
//! - [`cli`] - the `dc` command-line verbs
//!
//! # Example
//!
//! ```rust,no_run
//! use dc_cli::components::{Collaborators, ComponentTypes, build_tree};
//! use dc_cli::config::ProjectSettings;
//! use std::path::Path;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let settings = ProjectSettings::discover(Path::new(".")).await?;
//! let tree = build_tree(&settings, Path::new("."), &ComponentTypes::builtin(), &Collaborators::system()).await?;
//!
//! let result = tree.build(tree.focus()).await;
//! result.ensure_success(tree.path(tree.focus()))?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod components;
pub mod config;
pub mod constants;
pub mod core;
pub mod runner;
pub mod template;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
