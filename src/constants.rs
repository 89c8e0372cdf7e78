//! Global constants used throughout the dc codebase.
//!
//! This module contains retry parameters, poll intervals, well-known file
//! names and configuration namespaces that are shared across modules.

use std::time::Duration;

/// Maximum number of attempts for a single component operation invocation.
///
/// Invocations shell out to the container engine and language toolchains, which
/// fail transiently (container name collisions, image pull races). The first
/// attempt counts, so this allows four retries.
pub const MAX_OPERATION_ATTEMPTS: usize = 5;

/// Starting delay for exponential backoff between attempts (10ms).
pub const STARTING_BACKOFF_DELAY_MS: u64 = 10;

/// Maximum backoff delay between attempts (500ms).
pub const MAX_BACKOFF_DELAY_MS: u64 = 500;

/// Interval between health polls of an emulated cloud stack.
pub const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How long `start` waits for an emulated stack to report healthy.
pub const STACK_START_TIMEOUT: Duration = Duration::from_secs(60);

/// How long value resolution waits for an emulated stack to finish starting
/// and provisioning before reporting the service as unavailable.
pub const STACK_READY_TIMEOUT: Duration = Duration::from_secs(120);

/// Project-scoped settings file, committed with the project.
pub const PROJECT_SETTINGS_FILE: &str = ".project.settings";

/// User-scoped settings file, local to a developer machine.
pub const USER_SETTINGS_FILE: &str = ".user.settings";

/// Ignore rules applied while walking the project tree.
pub const IGNORE_FILE: &str = ".dcignore";

/// Directories that are never walked, regardless of ignore rules.
pub const ALWAYS_IGNORED: &[&str] = &[".git"];

/// Settings key holding the project name.
pub const PROJECT_NAME_KEY: &str = "projectName";

/// Settings namespace for CloudFormation parameter values.
pub const CLOUDFORMATION_PARAMETER_PREFIX: &str = "cloudformation-parameters:";

/// Placeholder expanded to the project root in user supplied paths.
pub const PROJECT_ROOT_PLACEHOLDER: &str = "[[PROJECT_ROOT]]";

/// Default output directory for `dc package`.
pub const DEFAULT_PACKAGE_OUTPUT: &str = "[[PROJECT_ROOT]]/.packages";

/// Scratch directory components use for generated files.
pub const COMPONENT_TEMP_DIR: &str = ".tmp";

/// Container engine executable.
pub const CONTAINER_ENGINE: &str = "docker";
