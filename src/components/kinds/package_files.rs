//! Files and directories copied verbatim into application packages.
//!
//! A file is included when its name contains `.include.`
//! (`settings.include.json`); a directory when its name ends in `.include`,
//! in which case every file beneath it is included. PowerShell scripts
//! (`*.ps1`) are always included. Package paths are relative to the
//! directory the package is assembled at.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use walkdir::WalkDir;

use super::{ensure_absent, entries_matching, file_name};
use crate::components::{
    Collaborators, Component, ComponentKind, ComponentType, CreationData, PackageResource,
    SuppliesPackageResources, TreeContext,
};
use crate::config::ProjectSettings;
use crate::core::DcError;

const FILE_MARKER: &str = ".include.";
const DIRECTORY_SUFFIX: &str = ".include";
const POWERSHELL_EXTENSION: &str = ".ps1";

/// A single file shipped in packages.
#[derive(Debug)]
pub struct PackageFile {
    kind: ComponentKind,
    name: String,
    path: PathBuf,
    file: PathBuf,
}

impl PackageFile {
    /// A `kind` component named `name` supplying `file`, found in `dir`.
    pub(crate) fn new(kind: ComponentKind, name: impl Into<String>, dir: &Path, file: PathBuf) -> Self {
        Self {
            kind,
            name: name.into(),
            path: dir.to_path_buf(),
            file,
        }
    }
}

impl Component for PackageFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ComponentKind {
        self.kind
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn as_package_resource_supplier(&self) -> Option<&(dyn SuppliesPackageResources + 'static)> {
        Some(self)
    }
}

#[async_trait]
impl SuppliesPackageResources for PackageFile {
    async fn package_resources(
        &self,
        _ctx: &TreeContext<'_>,
        package_root: &Path,
        _version: &str,
    ) -> Result<Vec<PackageResource>> {
        let content =
            fs::read(&self.file).await.with_context(|| format!("Failed to read {}", self.file.display()))?;
        Ok(vec![PackageResource::relative(&self.file, package_root, content)])
    }
}

fn package_file(dir: &Path, file: PathBuf) -> PackageFile {
    let name = file.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    PackageFile::new(ComponentKind::PackageFile, name, dir, file)
}

/// Files in `dir` whose name ends in `suffix`, each named by the part before it.
///
/// `skip` filters out names that end in `suffix` but belong to another kind.
pub(crate) async fn files_with_suffix(
    dir: &Path,
    kind: ComponentKind,
    suffix: &str,
    skip: Option<&str>,
) -> Result<Vec<Arc<dyn Component>>> {
    let files = entries_matching(dir, |path, file_type| {
        let name = file_name(path);
        file_type.is_file()
            && name.len() > suffix.len()
            && name.ends_with(suffix)
            && skip.is_none_or(|skip| !name.ends_with(skip))
    })
    .await?;

    Ok(files
        .into_iter()
        .map(|file| {
            let name = file_name(&file);
            let stem = name.strip_suffix(suffix).unwrap_or(&name).to_string();
            Arc::new(PackageFile::new(kind, stem, dir, file)) as Arc<dyn Component>
        })
        .collect())
}

/// Creates the empty file `{name}{suffix}` in `dir`.
pub(crate) async fn create_empty_file(
    dir: &Path,
    kind: ComponentKind,
    name: &str,
    suffix: &str,
) -> Result<PathBuf> {
    let file = dir.join(format!("{name}{suffix}"));
    ensure_absent(&file, kind, name)?;
    fs::write(&file, "").await.with_context(|| format!("Failed to create {}", file.display()))?;
    Ok(file)
}

/// `some.include.json` for `some.json`; names already carrying the marker
/// are kept.
fn include_file_name(name: &str) -> Option<String> {
    if name.contains(FILE_MARKER) {
        return Some(name.to_string());
    }
    let (stem, extension) = name.rsplit_once('.')?;
    if stem.is_empty() || extension.is_empty() {
        return None;
    }
    Some(format!("{stem}{FILE_MARKER}{extension}"))
}

/// One component per file whose name contains `.include.`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PackageFileType;

#[async_trait]
impl ComponentType for PackageFileType {
    fn kind(&self) -> ComponentKind {
        ComponentKind::PackageFile
    }

    async fn discover(
        &self,
        dir: &Path,
        _settings: &ProjectSettings,
        _collaborators: &Collaborators,
    ) -> Result<Vec<Arc<dyn Component>>> {
        let files =
            entries_matching(dir, |path, file_type| file_type.is_file() && file_name(path).contains(FILE_MARKER))
                .await?;
        Ok(files.into_iter().map(|file| Arc::new(package_file(dir, file)) as Arc<dyn Component>).collect())
    }

    async fn materialize(
        &self,
        dir: &Path,
        data: &CreationData,
        _settings: &ProjectSettings,
        _collaborators: &Collaborators,
    ) -> Result<Option<Arc<dyn Component>>> {
        let CreationData::PackageFile {
            name,
        } = data
        else {
            return Ok(None);
        };

        let file_name = include_file_name(name).ok_or_else(|| DcError::InvalidCreationData {
            kind: self.kind().to_string(),
            reason: format!("'{name}' needs a file extension"),
        })?;
        let file = dir.join(file_name);
        ensure_absent(&file, self.kind(), name)?;
        fs::write(&file, "").await.with_context(|| format!("Failed to create {}", file.display()))?;

        Ok(Some(Arc::new(package_file(dir, file))))
    }
}

#[derive(Debug)]
pub struct PackageDirectory {
    name: String,
    path: PathBuf,
    directory: PathBuf,
}

impl Component for PackageDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::PackageDirectory
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn as_package_resource_supplier(&self) -> Option<&(dyn SuppliesPackageResources + 'static)> {
        Some(self)
    }
}

#[async_trait]
impl SuppliesPackageResources for PackageDirectory {
    async fn package_resources(
        &self,
        _ctx: &TreeContext<'_>,
        package_root: &Path,
        _version: &str,
    ) -> Result<Vec<PackageResource>> {
        let directory = self.directory.clone();
        let files = tokio::task::spawn_blocking(move || -> Result<Vec<PathBuf>> {
            let mut files = Vec::new();
            for entry in WalkDir::new(&directory).sort_by_file_name() {
                let entry = entry.with_context(|| format!("Failed to walk {}", directory.display()))?;
                if entry.file_type().is_file() {
                    files.push(entry.into_path());
                }
            }
            Ok(files)
        })
        .await
        .context("Directory walk panicked")??;

        let mut resources = Vec::with_capacity(files.len());
        for file in files {
            let content = fs::read(&file).await.with_context(|| format!("Failed to read {}", file.display()))?;
            resources.push(PackageResource::relative(&file, package_root, content));
        }
        Ok(resources)
    }
}

fn package_directory(dir: &Path, directory: PathBuf) -> PackageDirectory {
    PackageDirectory {
        name: file_name(&directory).trim_end_matches(DIRECTORY_SUFFIX).to_string(),
        path: dir.to_path_buf(),
        directory,
    }
}

/// One component per subdirectory whose name ends in `.include`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PackageDirectoryType;

#[async_trait]
impl ComponentType for PackageDirectoryType {
    fn kind(&self) -> ComponentKind {
        ComponentKind::PackageDirectory
    }

    async fn discover(
        &self,
        dir: &Path,
        _settings: &ProjectSettings,
        _collaborators: &Collaborators,
    ) -> Result<Vec<Arc<dyn Component>>> {
        let directories = entries_matching(dir, |path, file_type| {
            file_type.is_dir() && file_name(path).ends_with(DIRECTORY_SUFFIX)
        })
        .await?;
        Ok(directories
            .into_iter()
            .map(|directory| Arc::new(package_directory(dir, directory)) as Arc<dyn Component>)
            .collect())
    }

    async fn materialize(
        &self,
        dir: &Path,
        data: &CreationData,
        _settings: &ProjectSettings,
        _collaborators: &Collaborators,
    ) -> Result<Option<Arc<dyn Component>>> {
        let CreationData::PackageDirectory {
            name,
        } = data
        else {
            return Ok(None);
        };

        let directory = dir.join(format!("{name}{DIRECTORY_SUFFIX}"));
        ensure_absent(&directory, self.kind(), name)?;
        fs::create_dir_all(&directory)
            .await
            .with_context(|| format!("Failed to create {}", directory.display()))?;

        Ok(Some(Arc::new(package_directory(dir, directory))))
    }
}

/// One component per `*.ps1` script.
#[derive(Debug, Default, Clone, Copy)]
pub struct PowershellScriptType;

#[async_trait]
impl ComponentType for PowershellScriptType {
    fn kind(&self) -> ComponentKind {
        ComponentKind::PowershellScript
    }

    async fn discover(
        &self,
        dir: &Path,
        _settings: &ProjectSettings,
        _collaborators: &Collaborators,
    ) -> Result<Vec<Arc<dyn Component>>> {
        files_with_suffix(dir, self.kind(), POWERSHELL_EXTENSION, None).await
    }

    async fn materialize(
        &self,
        dir: &Path,
        data: &CreationData,
        _settings: &ProjectSettings,
        _collaborators: &Collaborators,
    ) -> Result<Option<Arc<dyn Component>>> {
        let CreationData::PowershellScript { name } = data else {
            return Ok(None);
        };

        let file = create_empty_file(dir, self.kind(), name, POWERSHELL_EXTENSION).await?;
        Ok(Some(Arc::new(PackageFile::new(self.kind(), name.clone(), dir, file))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::ComponentTree;
    use crate::test_utils::test_collaborators;
    use tempfile::TempDir;

    #[test]
    fn test_include_file_name() {
        assert_eq!(include_file_name("settings.json").as_deref(), Some("settings.include.json"));
        assert_eq!(include_file_name("app.include.yml").as_deref(), Some("app.include.yml"));
        assert_eq!(include_file_name("web.config.xml").as_deref(), Some("web.config.include.xml"));
        assert_eq!(include_file_name("README"), None);
        assert_eq!(include_file_name(".env"), None);
    }

    #[tokio::test]
    async fn test_files_and_directories_are_named_from_package_root() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let app = root.join("app");
        std::fs::create_dir_all(app.join("static.include/css")).unwrap();
        std::fs::write(app.join("settings.include.json"), "{}").unwrap();
        std::fs::write(app.join("notes.json"), "").unwrap();
        std::fs::write(app.join("static.include/index.html"), "<html/>").unwrap();
        std::fs::write(app.join("static.include/css/site.css"), "body{}").unwrap();
        let settings = ProjectSettings::new(root, "shop");
        let collaborators = test_collaborators();
        let tree = ComponentTree::new(root);
        let ctx = TreeContext::new(&tree, tree.root(), &settings);

        let files = PackageFileType.discover(&app, &settings, &collaborators).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name(), "settings.include");
        let resources =
            files[0].as_package_resource_supplier().unwrap().package_resources(&ctx, root, "1").await.unwrap();
        assert_eq!(resources, [PackageResource::new("app/settings.include.json", "{}")]);

        let directories = PackageDirectoryType.discover(&app, &settings, &collaborators).await.unwrap();
        assert_eq!(directories.len(), 1);
        assert_eq!(directories[0].name(), "static");
        let resources = directories[0]
            .as_package_resource_supplier()
            .unwrap()
            .package_resources(&ctx, &app, "1")
            .await
            .unwrap();
        let names: Vec<&str> = resources.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["static.include/css/site.css", "static.include/index.html"]);
    }

    #[tokio::test]
    async fn test_materialize() {
        let temp = TempDir::new().unwrap();
        let settings = ProjectSettings::new(temp.path(), "shop");
        let collaborators = test_collaborators();

        let file = PackageFileType
            .materialize(
                temp.path(),
                &CreationData::PackageFile {
                    name: "appsettings.json".into(),
                },
                &settings,
                &collaborators,
            )
            .await
            .unwrap();
        assert!(file.is_some());
        assert!(temp.path().join("appsettings.include.json").is_file());

        let bare = CreationData::PackageFile {
            name: "LICENSE".into(),
        };
        let err = PackageFileType.materialize(temp.path(), &bare, &settings, &collaborators).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<DcError>(), Some(DcError::InvalidCreationData { .. })));

        let data = CreationData::PackageDirectory {
            name: "assets".into(),
        };
        PackageDirectoryType.materialize(temp.path(), &data, &settings, &collaborators).await.unwrap();
        assert!(temp.path().join("assets.include").is_dir());
        let err = PackageDirectoryType.materialize(temp.path(), &data, &settings, &collaborators).await.unwrap_err();
        assert!(err.downcast_ref::<DcError>().is_some_and(DcError::is_conflict));
    }

    #[tokio::test]
    async fn test_powershell_scripts_are_packaged() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join("ops")).unwrap();
        std::fs::write(root.join("ops/deploy.ps1"), "Write-Host deploy").unwrap();
        std::fs::write(root.join("ops/.ps1"), "").unwrap();
        std::fs::write(root.join("ops/notes.txt"), "").unwrap();
        let settings = ProjectSettings::new(root, "shop");
        let collaborators = test_collaborators();
        let tree = ComponentTree::new(root);
        let ctx = TreeContext::new(&tree, tree.root(), &settings);

        let scripts = PowershellScriptType.discover(&root.join("ops"), &settings, &collaborators).await.unwrap();
        assert_eq!(scripts.len(), 1);
        assert_eq!(scripts[0].name(), "deploy");
        assert_eq!(scripts[0].kind(), ComponentKind::PowershellScript);
        let resources =
            scripts[0].as_package_resource_supplier().unwrap().package_resources(&ctx, root, "1").await.unwrap();
        assert_eq!(resources, [PackageResource::new("ops/deploy.ps1", "Write-Host deploy")]);

        let data = CreationData::PowershellScript {
            name: "seed".into(),
        };
        PowershellScriptType.materialize(root, &data, &settings, &collaborators).await.unwrap();
        assert!(root.join("seed.ps1").is_file());
        let err = PowershellScriptType.materialize(root, &data, &settings, &collaborators).await.unwrap_err();
        assert!(err.downcast_ref::<DcError>().is_some_and(DcError::is_conflict));
    }
}
