//! `dc configure`: ask for the values components need.

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::common::Project;

/// Prompt for every configuration value required at or below the target
/// directory and save the answers.
#[derive(Args, Debug)]
pub struct ConfigureCommand {
    /// Ask again for values that are already set
    #[arg(short, long)]
    pub force: bool,
}

impl ConfigureCommand {
    pub async fn execute(self, project: &mut Project) -> Result<()> {
        let answered = configure_project(project, self.force).await?;
        if answered == 0 {
            println!("{} Nothing left to configure", "✓".green());
        } else {
            println!("{} Saved {answered} setting(s)", "✓".green());
        }
        Ok(())
    }
}

/// Configures the focused subtree and persists the settings.
pub async fn configure_project(project: &mut Project, force: bool) -> Result<usize> {
    let focus = project.tree.focus();
    let prompter = project.collaborators.prompter.clone();
    let answered = project.tree.configure(focus, &mut project.settings, prompter.as_ref(), true, force).await?;
    project.settings.save().await?;
    Ok(answered)
}
