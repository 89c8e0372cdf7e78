//! External process execution.
//!
//! Components never spawn processes directly. They describe a command with
//! [`CommandSpec`] (or a container run with [`ContainerSpec`]) and hand it to
//! the injected [`CommandRunner`], which reports a success flag and the
//! captured output. A command exiting non-zero is an ordinary result, not an
//! error; `Err` is reserved for failing to run the command at all.
//!
//! ```rust,ignore
//! let spec = ContainerSpec::new("node:20")
//!     .name("shop-web")
//!     .volume(&source_dir, "/usr/src/app")
//!     .workdir("/usr/src/app")
//!     .command(["npm", "ci"]);
//! let output = runner.run(spec.run_command()).await?;
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;

use crate::constants::CONTAINER_ENGINE;
use crate::core::DcError;

/// A process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    env: Vec<(String, String)>,
    timeout: Option<Duration>,
}

impl CommandSpec {
    /// Starts describing an invocation of `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            env: Vec::new(),
            timeout: None,
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Working directory for the process.
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Sets an environment variable for the process.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Kills the process if it runs longer than `duration`.
    pub const fn with_timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// The program to run.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments in order.
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Configured working directory.
    pub fn working_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Outcome of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Whether the process exited with status zero.
    pub success: bool,
    /// Exit code, `None` when terminated by a signal.
    pub exit_code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// A successful output carrying `stdout`.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed output carrying `stderr`.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Standard output followed by standard error.
    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr.trim_end()),
            (false, true) => self.stdout.trim_end().to_string(),
            (true, false) => self.stderr.trim_end().to_string(),
            (true, true) => String::new(),
        }
    }

    /// Converts an unsuccessful exit into [`DcError::CommandFailed`].
    pub fn into_result(self, program: &str) -> Result<Self> {
        if self.success {
            Ok(self)
        } else {
            Err(DcError::CommandFailed {
                program: program.to_string(),
                code: self.exit_code.unwrap_or(-1),
                output: self.combined(),
            }
            .into())
        }
    }
}

/// Runs external commands on behalf of components.
#[async_trait]
pub trait CommandRunner: Send + Sync + fmt::Debug {
    /// Runs `command` to completion and captures its output.
    async fn run(&self, command: CommandSpec) -> Result<CommandOutput>;
}

/// [`CommandRunner`] spawning real processes with `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, command: CommandSpec) -> Result<CommandOutput> {
        let executable = which::which(&command.program).map_err(|_| {
            if command.program == CONTAINER_ENGINE {
                anyhow::Error::from(DcError::ContainerEngineNotFound {
                    engine: command.program.clone(),
                })
            } else {
                anyhow::anyhow!("'{}' was not found in PATH", command.program)
            }
        })?;

        let start = Instant::now();
        tracing::debug!(target: "runner", "Executing command: {command}");

        let mut cmd = Command::new(executable);
        cmd.args(&command.args).stdout(Stdio::piped()).stderr(Stdio::piped()).kill_on_drop(true);
        if let Some(dir) = &command.current_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &command.env {
            cmd.env(key, value);
        }

        let output_future = cmd.output();
        let output = match command.timeout {
            Some(duration) => match timeout(duration, output_future).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(
                        target: "runner",
                        "Command timed out after {} seconds: {command}",
                        duration.as_secs()
                    );
                    return Ok(CommandOutput::failed(
                        -1,
                        format!("Timed out after {} seconds", duration.as_secs()),
                    ));
                }
            },
            None => output_future.await,
        }
        .with_context(|| format!("Failed to execute {command}"))?;

        let result = CommandOutput {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        if result.success {
            tracing::debug!(
                target: "runner",
                "{} finished in {}ms",
                command.program,
                start.elapsed().as_millis()
            );
        } else {
            tracing::debug!(
                target: "runner",
                "Command failed with exit code {:?}: {}",
                result.exit_code,
                result.stderr.trim()
            );
        }

        Ok(result)
    }
}

/// Description of a `docker run` invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSpec {
    image: String,
    name: Option<String>,
    detached: bool,
    remove_on_exit: bool,
    ports: Vec<(u16, u16)>,
    volumes: Vec<(String, String)>,
    env: Vec<(String, String)>,
    workdir: Option<String>,
    entrypoint: Option<String>,
    network: Option<String>,
    command: Vec<String>,
}

impl ContainerSpec {
    /// Starts describing a container running `image`.
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            remove_on_exit: true,
            ..Self::default()
        }
    }

    /// Container name, used later for `stop` and `logs`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Runs in the background.
    pub const fn detached(mut self) -> Self {
        self.detached = true;
        self
    }

    /// Keeps the container after it exits so its logs stay readable.
    pub const fn keep_on_exit(mut self) -> Self {
        self.remove_on_exit = false;
        self
    }

    /// Publishes `container` on host port `host`.
    pub fn port(mut self, host: u16, container: u16) -> Self {
        self.ports.push((host, container));
        self
    }

    /// Mounts `host` at `container`.
    pub fn volume(mut self, host: impl AsRef<Path>, container: impl Into<String>) -> Self {
        self.volumes.push((host.as_ref().display().to_string(), container.into()));
        self
    }

    /// Mounts the host's docker socket, for containers that start siblings.
    pub fn docker_socket(self) -> Self {
        self.volume("/var/run/docker.sock", "/var/run/docker.sock")
    }

    /// Sets an environment variable inside the container.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Working directory inside the container.
    pub fn workdir(mut self, dir: impl Into<String>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    /// Overrides the image entrypoint.
    pub fn entrypoint(mut self, entrypoint: impl Into<String>) -> Self {
        self.entrypoint = Some(entrypoint.into());
        self
    }

    /// Attaches the container to `network`.
    pub fn network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    /// Command and arguments passed after the image.
    pub fn command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    /// The `docker run` command for this container.
    pub fn run_command(&self) -> CommandSpec {
        let mut spec = CommandSpec::new(CONTAINER_ENGINE).arg("run");
        if self.detached {
            spec = spec.arg("-d");
        }
        if self.remove_on_exit {
            spec = spec.arg("--rm");
        }
        if let Some(name) = &self.name {
            spec = spec.args(["--name", name.as_str()]);
        }
        if let Some(network) = &self.network {
            spec = spec.args(["--network", network.as_str()]);
        }
        for (host, container) in &self.ports {
            spec = spec.args(["-p".to_string(), format!("{host}:{container}")]);
        }
        for (host, container) in &self.volumes {
            spec = spec.args(["-v".to_string(), format!("{host}:{container}")]);
        }
        for (key, value) in &self.env {
            spec = spec.args(["-e".to_string(), format!("{key}={value}")]);
        }
        if let Some(workdir) = &self.workdir {
            spec = spec.args(["-w", workdir.as_str()]);
        }
        if let Some(entrypoint) = &self.entrypoint {
            spec = spec.args(["--entrypoint", entrypoint.as_str()]);
        }
        spec.arg(&self.image).args(self.command.iter().cloned())
    }

    /// Force-removes the container `name`, stopping it first if running.
    pub fn remove_command(name: &str) -> CommandSpec {
        CommandSpec::new(CONTAINER_ENGINE).args(["rm", "-f", name])
    }

    /// Fetches logs of the container `name`.
    pub fn logs_command(name: &str) -> CommandSpec {
        CommandSpec::new(CONTAINER_ENGINE).args(["logs", name])
    }
}

/// Container name for `component` in `project`.
///
/// Lowercased and restricted to characters the container engine accepts.
pub fn container_name(project: &str, component: &str) -> String {
    format!("{project}-{component}")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect()
}
