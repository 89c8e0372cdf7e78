//! Configuration store for dc projects.
//!
//! A project is any directory holding a `.project.settings` file. Values are
//! split across a committed project scope and a local user scope; see
//! [`ProjectSettings`] for lookup rules and [`Prompter`] for how missing values
//! are gathered interactively during `dc configure`.

mod prompt;
mod settings;

pub use prompt::{ConsolePrompter, Prompter};
pub use settings::{ConfigScope, ProjectSettings};

/// A configuration entry a component needs before it can run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredConfiguration {
    /// Settings key.
    pub key: String,
    /// Question shown when prompting.
    pub prompt: String,
    /// Scope the answer is stored in.
    pub scope: ConfigScope,
}

impl RequiredConfiguration {
    /// Creates a requirement for `key`.
    pub fn new(key: impl Into<String>, prompt: impl Into<String>, scope: ConfigScope) -> Self {
        Self {
            key: key.into(),
            prompt: prompt.into(),
            scope,
        }
    }
}
