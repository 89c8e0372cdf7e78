//! Test utilities for dc
//!
//! Fakes for components and component types, plus stand-ins for every
//! external collaborator, so trees can be built and operated on without
//! containers, a cloud or a terminal.
//!
//! # Example
//!
//! ```rust,ignore
//! use dc_cli::components::ComponentTree;
//! use dc_cli::test_utils::FakeComponent;
//!
//! let mut tree = ComponentTree::new("/project");
//! let api = FakeComponent::new("api").buildable();
//! let calls = api.calls();
//! tree.add_component(tree.root(), api.into_arc());
//! ```

pub mod doubles;
pub mod fakes;

pub use doubles::{NullProvisioner, RecordingRunner, ScriptedPrompter};
pub use fakes::{FakeComponent, FakeComponentType};

use std::sync::{Arc, Once};
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::components::Collaborators;
use crate::runner::CommandRunner;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Only the first call has an effect. `level` wins over `RUST_LOG`; with
/// neither, nothing is logged.
///
/// ```bash
/// RUST_LOG=dc_cli=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .try_init();
    });
}

/// Collaborators recording commands, with no scripted prompt answers and a
/// cloud that knows no physical ids.
pub fn test_collaborators() -> Collaborators {
    test_collaborators_with(Arc::new(RecordingRunner::default()))
}

/// Like [`test_collaborators`], running commands through `runner`.
pub fn test_collaborators_with(runner: Arc<dyn CommandRunner>) -> Collaborators {
    Collaborators::with_provisioner(runner, Arc::new(ScriptedPrompter::default()), Arc::new(NullProvisioner))
}
