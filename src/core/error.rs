//! Error handling for dc
//!
//! This module provides the error type shared by every layer of dc and the
//! user-friendly reporting used by the CLI. The error system follows two rules:
//! 1. **Strongly-typed errors** where callers need to tell failure kinds apart
//!    (a conflict is fatal, a failed invocation is retried)
//! 2. **User-friendly messages** with actionable suggestions for CLI users
//!
//! # Error Categories
//!
//! - **Project**: [`DcError::ProjectNotFound`], [`DcError::ConfigParseError`]
//! - **Components**: [`DcError::ComponentExists`], [`DcError::NoComponentType`],
//!   [`DcError::ComponentNotFound`], [`DcError::InvalidCreationData`]
//! - **Templates**: [`DcError::TemplateParseError`]
//! - **Execution**: [`DcError::ContainerEngineNotFound`], [`DcError::CommandFailed`],
//!   [`DcError::RetriesExhausted`], [`DcError::OperationFailed`]
//!
//! # Examples
//!
//! ```rust,no_run
//! use dc_cli::core::{DcError, user_friendly_error};
//!
//! let error = DcError::ProjectNotFound {
//!     start: "/tmp/somewhere".to_string(),
//! };
//! let ctx = user_friendly_error(anyhow::Error::from(error));
//! ctx.display();
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for dc operations.
#[derive(Error, Debug)]
pub enum DcError {
    /// No `.project.settings` was found in the start directory or any ancestor.
    #[error("No dc project found at or above {start}")]
    ProjectNotFound {
        /// Directory the search started from
        start: String,
    },

    /// A component already exists where a new one was to be materialized.
    ///
    /// Conflicts are always fatal and are never retried.
    #[error("There is already a {kind} named '{name}' at {path}")]
    ComponentExists {
        /// Component kind, e.g. "cloudformation template"
        kind: String,
        /// Name of the component that was requested
        name: String,
        /// Directory the component was to be created in
        path: String,
    },

    /// No registered component type can materialize the requested kind.
    #[error("No component type is registered for '{kind}'")]
    NoComponentType {
        /// The requested component kind
        kind: String,
    },

    /// A component required by an operation could not be found in the tree.
    #[error("No {capability} component{} found", .name.as_deref().map(|n| format!(" named '{n}'")).unwrap_or_default())]
    ComponentNotFound {
        /// Capability that was searched for
        capability: String,
        /// Optional component name
        name: Option<String>,
    },

    /// Creation data was rejected by a component type.
    #[error("Invalid creation data for {kind}: {reason}")]
    InvalidCreationData {
        /// Component kind
        kind: String,
        /// Why the data was rejected
        reason: String,
    },

    /// A settings file could not be parsed.
    #[error("Failed to parse settings file {file}: {reason}")]
    ConfigParseError {
        /// Settings file path
        file: String,
        /// Parser message
        reason: String,
    },

    /// A component configuration or template file could not be parsed.
    #[error("Failed to parse {file}: {reason}")]
    TemplateParseError {
        /// File path
        file: String,
        /// Parser message
        reason: String,
    },

    /// The container engine executable is not available.
    #[error("Container engine '{engine}' is not installed or not found in PATH")]
    ContainerEngineNotFound {
        /// Executable name
        engine: String,
    },

    /// An external command exited unsuccessfully.
    #[error("Command '{program}' failed with exit code {code}")]
    CommandFailed {
        /// Program that was run
        program: String,
        /// Exit code, -1 when terminated by a signal
        code: i32,
        /// Captured output
        output: String,
    },

    /// A component operation failed on every attempt.
    #[error("Action '{action}' failed {attempts} times")]
    RetriesExhausted {
        /// `<component>.<operation>` label
        action: String,
        /// Number of attempts made
        attempts: usize,
        /// Message of the last failure
        last_error: String,
    },

    /// An aggregate operation reported at least one failed invocation.
    #[error("{operation} failed at: {path}")]
    OperationFailed {
        /// Operation name, e.g. "Build"
        operation: String,
        /// Node path the operation was run from
        path: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Other error
    #[error("{message}")]
    Other {
        /// Generic error message
        message: String,
    },
}

impl Clone for DcError {
    fn clone(&self) -> Self {
        match self {
            Self::ProjectNotFound {
                start,
            } => Self::ProjectNotFound {
                start: start.clone(),
            },
            Self::ComponentExists {
                kind,
                name,
                path,
            } => Self::ComponentExists {
                kind: kind.clone(),
                name: name.clone(),
                path: path.clone(),
            },
            Self::NoComponentType {
                kind,
            } => Self::NoComponentType {
                kind: kind.clone(),
            },
            Self::ComponentNotFound {
                capability,
                name,
            } => Self::ComponentNotFound {
                capability: capability.clone(),
                name: name.clone(),
            },
            Self::InvalidCreationData {
                kind,
                reason,
            } => Self::InvalidCreationData {
                kind: kind.clone(),
                reason: reason.clone(),
            },
            Self::ConfigParseError {
                file,
                reason,
            } => Self::ConfigParseError {
                file: file.clone(),
                reason: reason.clone(),
            },
            Self::TemplateParseError {
                file,
                reason,
            } => Self::TemplateParseError {
                file: file.clone(),
                reason: reason.clone(),
            },
            Self::ContainerEngineNotFound {
                engine,
            } => Self::ContainerEngineNotFound {
                engine: engine.clone(),
            },
            Self::CommandFailed {
                program,
                code,
                output,
            } => Self::CommandFailed {
                program: program.clone(),
                code: *code,
                output: output.clone(),
            },
            Self::RetriesExhausted {
                action,
                attempts,
                last_error,
            } => Self::RetriesExhausted {
                action: action.clone(),
                attempts: *attempts,
                last_error: last_error.clone(),
            },
            Self::OperationFailed {
                operation,
                path,
            } => Self::OperationFailed {
                operation: operation.clone(),
                path: path.clone(),
            },
            // io::Error is not Clone, keep the message
            Self::IoError(e) => Self::Other {
                message: format!("IO error: {e}"),
            },
            Self::Other {
                message,
            } => Self::Other {
                message: message.clone(),
            },
        }
    }
}

impl DcError {
    /// Whether this error must abort immediately instead of being retried.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::ComponentExists { .. })
    }
}

/// Error context wrapper that provides user-friendly error information.
///
/// `ErrorContext` wraps a [`DcError`] and adds an optional suggestion and
/// details. This is how the CLI presents errors.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: DcError,
    /// What the user can do about it
    pub suggestion: Option<String>,
    /// Additional background
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new context for an error.
    #[must_use]
    pub const fn new(error: DcError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Attach a suggestion.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Attach details.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr with colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error to a user-friendly [`ErrorContext`] with actionable suggestions.
///
/// Recognizes [`DcError`] anywhere in the error chain, [`std::io::Error`]
/// kinds and YAML/JSON parse failures. Everything else keeps its full cause
/// chain in the message.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(dc_error) = error.chain().find_map(|e| e.downcast_ref::<DcError>()) {
        return create_error_context(dc_error.clone());
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        match io_error.kind() {
            std::io::ErrorKind::PermissionDenied => {
                return ErrorContext::new(DcError::Other {
                    message: format!("Permission denied: {io_error}"),
                })
                .with_suggestion("Check file ownership and permissions in the project directory");
            }
            std::io::ErrorKind::NotFound => {
                return ErrorContext::new(DcError::Other {
                    message: format!("Not found: {io_error}"),
                })
                .with_suggestion("Check that the file or directory exists and the path is correct");
            }
            _ => {}
        }
    }

    if let Some(yaml_error) = error.downcast_ref::<serde_yaml::Error>() {
        return ErrorContext::new(DcError::TemplateParseError {
            file: "unknown".to_string(),
            reason: yaml_error.to_string(),
        })
        .with_suggestion("Check the YAML syntax of your component configuration files");
    }

    let mut message = error.to_string();
    let chain: Vec<String> = error.chain().skip(1).map(std::string::ToString::to_string).collect();

    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(DcError::Other {
        message,
    })
}

fn create_error_context(error: DcError) -> ErrorContext {
    match &error {
        DcError::ProjectNotFound { .. } => ErrorContext::new(error)
            .with_suggestion("Run 'dc new <name>' to create a project, or run dc from inside one")
            .with_details("dc looks for .project.settings in the current directory and its parents"),

        DcError::ComponentExists { .. } => ErrorContext::new(error)
            .with_suggestion("Pick a different name or remove the existing component first"),

        DcError::ContainerEngineNotFound { .. } => ErrorContext::new(error)
            .with_suggestion("Install Docker and make sure the 'docker' command is on your PATH")
            .with_details("Components run their toolchains and emulators inside containers"),

        DcError::CommandFailed { output, .. } => {
            let details = output.clone();
            ErrorContext::new(error).with_details(details)
        }

        DcError::RetriesExhausted { last_error, .. } => {
            let details = format!("Last failure: {last_error}");
            ErrorContext::new(error)
                .with_suggestion("Run with --verbose to see every attempt")
                .with_details(details)
        }

        DcError::OperationFailed { .. } => ErrorContext::new(error)
            .with_suggestion("Scroll up for the output of the components that failed"),

        DcError::ConfigParseError { .. } => ErrorContext::new(error)
            .with_suggestion("Settings files are flat JSON objects of string values"),

        _ => ErrorContext::new(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_is_detected() {
        let error = DcError::ComponentExists {
            kind: "cloudformation template".to_string(),
            name: "db".to_string(),
            path: "/project".to_string(),
        };
        assert!(error.is_conflict());
        assert!(!DcError::Other { message: "x".into() }.is_conflict());
    }

    #[test]
    fn test_clone_io_error_keeps_message() {
        let error = DcError::from(std::io::Error::other("disk gone"));
        match error.clone() {
            DcError::Other {
                message,
            } => assert!(message.contains("disk gone")),
            other => panic!("Expected Other, got {other:?}"),
        }
    }

    #[test]
    fn test_user_friendly_error_finds_dc_error_in_chain() {
        let error = anyhow::Error::from(DcError::ProjectNotFound {
            start: "/tmp".to_string(),
        })
        .context("while building");

        let ctx = user_friendly_error(error);
        assert!(matches!(ctx.error, DcError::ProjectNotFound { .. }));
        assert!(ctx.suggestion.unwrap().contains("dc new"));
    }

    #[test]
    fn test_user_friendly_error_generic_keeps_chain() {
        let error = anyhow::anyhow!("root cause").context("outer");
        let ctx = user_friendly_error(error);
        let message = ctx.to_string();
        assert!(message.contains("outer"));
        assert!(message.contains("root cause"));
    }

    #[test]
    fn test_component_not_found_message() {
        let error = DcError::ComponentNotFound {
            capability: "api gateway".to_string(),
            name: Some("public".to_string()),
        };
        assert_eq!(error.to_string(), "No api gateway component named 'public' found");
    }
}
