//! Document locations: global flags layered over an optional `stagehand.yaml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use stagehand_batch::{paths, BatchError, Workspace};
use stagehand_core::Repository;
use stagehand_sequence::TaskSequences;

use crate::builtin;
use crate::GlobalArgs;

pub const PROJECT_FILE: &str = "stagehand.yaml";

/// Contents of a project file. Relative paths are relative to the file.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectFile {
    pub packages: Option<PathBuf>,
    pub objects: Option<PathBuf>,
    pub tasks: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

impl ProjectFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read project file {}", path.display()))?;
        let file: Self = serde_yaml::from_str(&text)
            .with_context(|| format!("invalid project file {}", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Ok(file.rebased(base))
    }

    fn rebased(self, base: &Path) -> Self {
        let join = |p: Option<PathBuf>| p.map(|p| base.join(p));
        Self {
            packages: join(self.packages),
            objects: join(self.objects),
            tasks: join(self.tasks),
            log_dir: join(self.log_dir),
        }
    }
}

/// Resolved document locations; flags win over the project file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    pub packages: Option<PathBuf>,
    pub objects: Option<PathBuf>,
    pub tasks: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

impl Settings {
    pub fn resolve(args: &GlobalArgs) -> Result<Self> {
        let base = args.dir.clone().unwrap_or_default();
        let project = match &args.config {
            Some(path) => ProjectFile::load(&base.join(path))?,
            None => {
                let path = base.join(PROJECT_FILE);
                if path.is_file() {
                    ProjectFile::load(&path)?
                } else {
                    ProjectFile::default()
                }
            }
        };
        let flag = |p: &Option<PathBuf>| p.as_ref().map(|p| base.join(p));
        Ok(Self {
            packages: flag(&args.packages).or(project.packages),
            objects: flag(&args.objects).or(project.objects),
            tasks: flag(&args.tasks).or(project.tasks),
            log_dir: project.log_dir,
        })
    }

    pub fn packages(&self) -> Result<&Path> {
        required(&self.packages, "packages", 'p')
    }

    pub fn objects(&self) -> Result<&Path> {
        required(&self.objects, "objects", 'o')
    }

    pub fn tasks(&self) -> Result<&Path> {
        required(&self.tasks, "tasks", 't')
    }

    /// Configured log directory, else `~/.stagehand/batch`.
    pub fn log_dir(&self) -> Result<PathBuf> {
        match &self.log_dir {
            Some(dir) => Ok(dir.clone()),
            None => {
                let home = dirs::home_dir().context("could not determine home directory")?;
                Ok(paths::batch_root(&home))
            }
        }
    }

    pub fn load_repository(&self) -> Result<Repository> {
        Ok(load_repository(self.packages()?, self.objects()?)?)
    }

    pub fn load_sequences(&self) -> Result<TaskSequences> {
        Ok(TaskSequences::load_file(self.tasks()?)?)
    }

    /// Paths of a full workspace, checked up front.
    pub fn workspace_paths(&self) -> Result<WorkspacePaths> {
        Ok(WorkspacePaths {
            packages: self.packages()?.to_path_buf(),
            objects: self.objects()?.to_path_buf(),
            tasks: self.tasks()?.to_path_buf(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    pub packages: PathBuf,
    pub objects: PathBuf,
    pub tasks: PathBuf,
}

impl WorkspacePaths {
    pub fn load(&self) -> Result<Workspace, BatchError> {
        Ok(Workspace {
            repository: load_repository(&self.packages, &self.objects)?,
            sequences: TaskSequences::load_file(&self.tasks)?,
        })
    }
}

fn load_repository(
    packages: &Path,
    objects: &Path,
) -> Result<Repository, stagehand_core::RepositoryError> {
    let mut repo = Repository::new(builtin::implementations());
    repo.load_packages_file(packages)?;
    repo.load_objects_file(objects)?;
    Ok(repo)
}

fn required<'a>(path: &'a Option<PathBuf>, name: &str, flag: char) -> Result<&'a Path> {
    path.as_deref().with_context(|| {
        format!("no {name} documents given; pass -{flag}/--{name}-file or set `{name}` in {PROJECT_FILE}")
    })
}
