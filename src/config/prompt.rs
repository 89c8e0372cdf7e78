//! Interactive prompting for configuration values.

use anyhow::{Context, Result};
use colored::Colorize;
use std::io::{BufRead, Write};

/// Source of answers to configuration questions.
pub trait Prompter: Send + Sync {
    /// Asks `question` and returns the trimmed answer.
    fn ask(&self, question: &str) -> Result<String>;
}

/// Prompts on stdout and reads answers from stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsolePrompter;

impl Prompter for ConsolePrompter {
    fn ask(&self, question: &str) -> Result<String> {
        let mut stdout = std::io::stdout().lock();
        write!(stdout, "{} ", question.cyan()).context("Failed to write prompt")?;
        stdout.flush().context("Failed to flush prompt")?;

        let mut answer = String::new();
        std::io::stdin().lock().read_line(&mut answer).context("Failed to read answer")?;
        Ok(answer.trim().to_string())
    }
}
