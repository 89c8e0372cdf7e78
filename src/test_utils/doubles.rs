//! Stand-ins for the runner, prompter and cloud provisioner.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_yaml::Mapping;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::config::Prompter;
use crate::runner::{CommandOutput, CommandRunner, CommandSpec};
use crate::template::{ResourceProvisioner, ServiceEndpoint};

/// Records every command instead of running it.
///
/// Commands succeed with empty output unless a scripted output matches.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    commands: Mutex<Vec<String>>,
    outputs: Vec<(String, CommandOutput)>,
}

impl RecordingRunner {
    /// Answers commands containing `pattern` with `output`.
    ///
    /// The first matching pattern wins.
    #[must_use]
    pub fn with_output(mut self, pattern: &str, output: CommandOutput) -> Self {
        self.outputs.push((pattern.to_string(), output));
        self
    }

    /// Command lines run so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, command: CommandSpec) -> Result<CommandOutput> {
        let line = command.to_string();
        let output = self
            .outputs
            .iter()
            .find(|(pattern, _)| line.contains(pattern.as_str()))
            .map_or_else(|| CommandOutput::ok(""), |(_, output)| output.clone());
        if let Ok(mut commands) = self.commands.lock() {
            commands.push(line);
        }
        Ok(output)
    }
}

/// Answers prompts from a fixed list and remembers the questions.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<String>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new<S: Into<String>>(answers: impl IntoIterator<Item = S>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Questions asked so far.
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

impl Prompter for ScriptedPrompter {
    fn ask(&self, question: &str) -> Result<String> {
        if let Ok(mut asked) = self.asked.lock() {
            asked.push(question.to_string());
        }
        self.answers
            .lock()
            .ok()
            .and_then(|mut answers| answers.pop_front())
            .ok_or_else(|| anyhow!("No scripted answer for '{question}'"))
    }
}

/// A cloud where every resource exists and none has a physical id.
#[derive(Debug, Default)]
pub struct NullProvisioner;

#[async_trait]
impl ResourceProvisioner for NullProvisioner {
    async fn ensure(
        &self,
        _resource_type: &str,
        _name: &str,
        _properties: &Mapping,
        _endpoint: &ServiceEndpoint,
    ) -> Result<()> {
        Ok(())
    }

    async fn physical_id(
        &self,
        _resource_type: &str,
        _name: &str,
        _endpoint: &ServiceEndpoint,
    ) -> Result<Option<String>> {
        Ok(None)
    }
}
