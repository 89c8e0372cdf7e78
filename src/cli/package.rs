//! `dc package`: assemble application archives.

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Timelike, Utc};
use clap::Args;
use colored::Colorize;
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use super::common::Project;
use crate::components::{PackageResource, PackageResult};
use crate::constants::DEFAULT_PACKAGE_OUTPUT;

/// Package every application defined at or below the target directory.
#[derive(Args, Debug)]
pub struct PackageCommand {
    /// Package version (default: `YYYY.M.D.<seconds since midnight UTC>`)
    #[arg(long = "package-version")]
    pub package_version: Option<String>,

    /// Directory the archives are written to
    #[arg(short, long, default_value = DEFAULT_PACKAGE_OUTPUT)]
    pub output: String,
}

impl PackageCommand {
    pub async fn execute(self, project: &Project) -> Result<()> {
        let version = self.package_version.unwrap_or_else(|| default_version(Utc::now()));
        let written = package_project(project, &version, &project.settings.rooted_path(&self.output)).await?;

        if written.is_empty() {
            println!("{} No application packages defined under {}", "-".dimmed(), project.focus_path().display());
        }
        for archive in written {
            println!("{} Packaged {}", "✓".green(), archive.display());
        }
        Ok(())
    }
}

/// Packages the focused subtree at `version` into `output`, returning the
/// archives written.
pub async fn package_project(project: &Project, version: &str, output: &Path) -> Result<Vec<PathBuf>> {
    let packages = project.tree.package(project.tree.focus(), &project.settings, version).await?;

    tokio::fs::create_dir_all(output)
        .await
        .with_context(|| format!("Failed to create output directory {}", output.display()))?;

    let mut written = Vec::with_capacity(packages.len());
    for package in packages {
        let archive = output.join(&package.package_name);
        let target = archive.clone();
        tokio::task::spawn_blocking(move || write_archive(&target, package))
            .await
            .context("Archiving task panicked")??;
        tracing::info!("Wrote {}", archive.display());
        written.push(archive);
    }
    Ok(written)
}

/// The version used when none is given.
pub fn default_version(now: DateTime<Utc>) -> String {
    format!("{}.{}.{}.{}", now.year(), now.month(), now.day(), now.num_seconds_from_midnight())
}

fn write_archive(path: &Path, package: PackageResult) -> Result<()> {
    let file = std::fs::File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    for PackageResource {
        name,
        content,
    } in package.resources
    {
        writer.start_file(name, options)?;
        writer.write_all(&content)?;
    }
    writer.finish()?;
    Ok(())
}
