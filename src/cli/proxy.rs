//! `dc auto-proxy`: put a local proxy in front of nested HTTP endpoints.

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::common::Project;
use crate::components::kinds::auto_proxy;

/// Create proxies for every endpoint that has other endpoints beneath it.
#[derive(Args, Debug)]
pub struct AutoProxyCommand {
    /// Pick free ports for new proxies instead of asking
    #[arg(long)]
    pub assign_ports: bool,
}

impl AutoProxyCommand {
    pub async fn execute(self, project: &mut Project) -> Result<()> {
        let focus = project.tree.focus();
        let written = auto_proxy(
            &mut project.tree,
            focus,
            &project.types,
            &mut project.settings,
            &project.collaborators,
            self.assign_ports,
        )
        .await?;

        if written == 0 {
            println!("{} Proxy paths are up to date", "✓".green());
        } else {
            println!("{} Wrote {written} proxy path(s)", "✓".green());
        }
        Ok(())
    }
}
