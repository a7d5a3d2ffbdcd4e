use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use super::{DependencyRef, InputFile, ProjectError, ProjectModel, Target, TargetFilter, TargetId};

/// A workspace file: the root project files to open.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceFile {
  pub projects: Vec<String>,
}

/// One project file. Nested projects are paths relative to this file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectFile {
  /// Project handed to the build tool, relative to this file. Defaults to the file itself.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub build_file: Option<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub projects: Vec<String>,
  #[serde(default)]
  pub targets: Vec<Target>,
}

#[derive(Debug)]
struct LoadedProject {
  path: PathBuf,
  file: ProjectFile,
  nested: Vec<usize>,
  dirty: bool,
}

impl LoadedProject {
  fn dir(&self) -> PathBuf {
    self.path.parent().map(Path::to_path_buf).unwrap_or_default()
  }
}

/// Every project file reachable from a workspace, flattened into one list.
///
/// Each file is loaded once even when several projects nest it.
#[derive(Debug, Default)]
pub struct Workspace {
  projects: Vec<LoadedProject>,
}

impl Workspace {
  /// Open a workspace file, or a single project file, plus every project nested below it.
  pub fn open(path: &Path) -> Result<Self, ProjectError> {
    let path = dunce::canonicalize(path).map_err(|source| ProjectError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let value: serde_json::Value = read_json(&path)?;

    let mut workspace = Workspace::default();
    let mut index = HashMap::new();
    if value.get("targets").is_some() {
      workspace.load(path.clone(), &mut index)?;
    } else {
      let file: WorkspaceFile = serde_json::from_value(value).map_err(|source| ProjectError::Parse {
        path: path.clone(),
        source,
      })?;
      let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
      for rel in &file.projects {
        workspace.load(normalize(&dir.join(rel)), &mut index)?;
      }
    }

    info!(
      path = %path.display(),
      projects = workspace.projects.len(),
      "loaded workspace"
    );
    Ok(workspace)
  }

  fn load(&mut self, path: PathBuf, index: &mut HashMap<PathBuf, usize>) -> Result<usize, ProjectError> {
    if let Some(&existing) = index.get(&path) {
      return Ok(existing);
    }

    let file: ProjectFile = read_json(&path)?;
    let position = self.projects.len();
    index.insert(path.clone(), position);
    let nested_refs = file.projects.clone();
    debug!(path = %path.display(), targets = file.targets.len(), "loaded project");
    self.projects.push(LoadedProject {
      path,
      file,
      nested: Vec::new(),
      dirty: false,
    });

    let dir = self.projects[position].dir();
    let mut nested = Vec::with_capacity(nested_refs.len());
    for rel in &nested_refs {
      nested.push(self.load(normalize(&dir.join(rel)), index)?);
    }
    self.projects[position].nested = nested;
    Ok(position)
  }

  /// Assemble a workspace from already-parsed project files. Nested references
  /// must point at other entries of the list.
  pub fn from_projects(projects: Vec<(PathBuf, ProjectFile)>) -> Result<Self, ProjectError> {
    let paths: Vec<PathBuf> = projects.iter().map(|(path, _)| normalize(path)).collect();

    let mut loaded = Vec::with_capacity(projects.len());
    for (path, (_, file)) in paths.iter().zip(projects) {
      let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
      let nested = file
        .projects
        .iter()
        .map(|rel| {
          let wanted = normalize(&dir.join(rel));
          paths
            .iter()
            .position(|p| *p == wanted)
            .ok_or_else(|| ProjectError::UnknownProject {
              parent: path.clone(),
              reference: rel.clone(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
      loaded.push(LoadedProject {
        path: path.clone(),
        file,
        nested,
        dirty: false,
      });
    }

    Ok(Self { projects: loaded })
  }

  pub fn project_count(&self) -> usize {
    self.projects.len()
  }

  pub fn project_path(&self, index: usize) -> Option<&Path> {
    self.projects.get(index).map(|p| p.path.as_path())
  }

  pub fn project_file(&self, index: usize) -> Option<&ProjectFile> {
    self.projects.get(index).map(|p| &p.file)
  }

  /// Every target of every loaded project, in load order.
  pub fn target_ids(&self) -> impl Iterator<Item = TargetId> + '_ {
    self.projects.iter().enumerate().flat_map(|(project, loaded)| {
      (0..loaded.file.targets.len()).map(move |target| TargetId { project, target })
    })
  }

  /// The origin project, the projects nested below it, then everything else.
  fn search_order(&self, origin: usize) -> Vec<usize> {
    let mut order = vec![origin];
    let mut cursor = 0;
    while cursor < order.len() {
      for &nested in &self.projects[order[cursor]].nested {
        if !order.contains(&nested) {
          order.push(nested);
        }
      }
      cursor += 1;
    }
    for project in 0..self.projects.len() {
      if !order.contains(&project) {
        order.push(project);
      }
    }
    order
  }

  /// All targets `reference` could mean when written in project `origin`, best match first.
  fn candidates(&self, origin: usize, reference: &DependencyRef) -> Vec<TargetId> {
    let projects = match reference {
      DependencyRef::Target {
        project: Some(rel), ..
      } => {
        let wanted = normalize(&self.projects[origin].dir().join(rel));
        self
          .projects
          .iter()
          .position(|p| p.path == wanted || p.path.ends_with(rel))
          .map(|p| vec![p])
          .unwrap_or_default()
      }
      _ => self.search_order(origin),
    };

    projects
      .into_iter()
      .flat_map(|project| {
        self.projects[project]
          .file
          .targets
          .iter()
          .enumerate()
          .filter(|(_, t)| t.matches(reference))
          .map(move |(target, _)| TargetId { project, target })
      })
      .collect()
  }

  /// The target one declaration on `id` resolves to: the first candidate `filter` accepts.
  ///
  /// `None` when every candidate is filtered out. A declaration naming the target
  /// itself resolves to itself so the graph reports the cycle.
  fn resolve_reference(
    &self,
    id: TargetId,
    reference: &DependencyRef,
    filter: &TargetFilter,
  ) -> Result<Option<TargetId>, ProjectError> {
    let candidates = self.candidates(id.project, reference);
    if candidates.is_empty() {
      return Err(ProjectError::UnresolvedDependency {
        target: self.target(id)?.name.clone(),
        reference: reference.to_string(),
      });
    }
    for candidate in candidates {
      if filter.accepts(self.target(candidate)?) {
        return Ok(Some(candidate));
      }
    }
    Ok(None)
  }

  fn loaded(&self, id: TargetId) -> Result<&LoadedProject, ProjectError> {
    self.projects.get(id.project).ok_or(ProjectError::UnknownTarget(id))
  }

  fn target_mut(&mut self, id: TargetId) -> Result<&mut Target, ProjectError> {
    self
      .projects
      .get_mut(id.project)
      .and_then(|p| p.file.targets.get_mut(id.target))
      .ok_or(ProjectError::UnknownTarget(id))
  }

  fn mark_dirty(&mut self, id: TargetId) {
    if let Some(project) = self.projects.get_mut(id.project) {
      project.dirty = true;
    }
  }
}

impl ProjectModel for Workspace {
  fn find_target(&self, name: &str) -> Option<TargetId> {
    self.target_ids().find(|&id| {
      self
        .target(id)
        .map(|t| t.name == name || t.product.file_name() == name)
        .unwrap_or(false)
    })
  }

  fn target(&self, id: TargetId) -> Result<&Target, ProjectError> {
    self
      .projects
      .get(id.project)
      .and_then(|p| p.file.targets.get(id.target))
      .ok_or(ProjectError::UnknownTarget(id))
  }

  fn resolve_dependencies(&self, id: TargetId, filter: &TargetFilter) -> Result<Vec<TargetId>, ProjectError> {
    let target = self.target(id)?;
    let mut resolved = Vec::with_capacity(target.dependencies.len());

    for reference in &target.dependencies {
      match self.resolve_reference(id, reference, filter)? {
        Some(dep) => resolved.push(dep),
        None => trace!(module = %target.name, dependency = %reference, "skipping dependency outside filter"),
      }
    }

    Ok(resolved)
  }

  fn build_file(&self, id: TargetId) -> Result<PathBuf, ProjectError> {
    let project = self.loaded(id)?;
    Ok(match &project.file.build_file {
      Some(rel) => normalize(&project.dir().join(rel)),
      None => project.path.clone(),
    })
  }

  fn input_files(&self, id: TargetId) -> Result<Vec<InputFile>, ProjectError> {
    let dir = self.loaded(id)?.dir();
    Ok(
      self
        .target(id)?
        .inputs
        .iter()
        .map(|rel| InputFile {
          relative: rel.clone(),
          path: dir.join(rel),
        })
        .collect(),
    )
  }

  fn setting(&self, id: TargetId, configuration: &str, key: &str) -> Result<Option<String>, ProjectError> {
    Ok(
      self
        .target(id)?
        .settings
        .get(configuration)
        .and_then(|settings| settings.get(key))
        .cloned(),
    )
  }

  fn set_setting(&mut self, id: TargetId, configuration: &str, key: &str, value: String) -> Result<(), ProjectError> {
    self
      .target_mut(id)?
      .settings
      .entry(configuration.to_string())
      .or_default()
      .insert(key.to_string(), value);
    self.mark_dirty(id);
    Ok(())
  }

  fn remove_dependencies_on(
    &mut self,
    id: TargetId,
    dependency: TargetId,
    filter: &TargetFilter,
  ) -> Result<usize, ProjectError> {
    let doomed: Vec<usize> = self
      .target(id)?
      .dependencies
      .iter()
      .enumerate()
      .filter(|(_, reference)| {
        matches!(self.resolve_reference(id, reference, filter), Ok(Some(dep)) if dep == dependency)
      })
      .map(|(position, _)| position)
      .collect();
    if doomed.is_empty() {
      return Ok(0);
    }

    let target = self.target_mut(id)?;
    let mut position = 0;
    target.dependencies.retain(|_| {
      let keep = !doomed.contains(&position);
      position += 1;
      keep
    });
    self.mark_dirty(id);
    Ok(doomed.len())
  }

  fn save(&mut self) -> Result<(), ProjectError> {
    for project in self.projects.iter_mut().filter(|p| p.dirty) {
      let content = serde_json::to_string_pretty(&project.file).map_err(|source| ProjectError::Serialize {
        path: project.path.clone(),
        source,
      })?;
      write_atomic(&project.path, content.as_bytes())?;
      project.dirty = false;
      info!(path = %project.path.display(), "saved project");
    }
    Ok(())
  }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ProjectError> {
  let content = fs::read_to_string(path).map_err(|source| ProjectError::Read {
    path: path.to_path_buf(),
    source,
  })?;
  serde_json::from_str(&content).map_err(|source| ProjectError::Parse {
    path: path.to_path_buf(),
    source,
  })
}

// Write to a sibling temp file, then rename over the target.
fn write_atomic(path: &Path, content: &[u8]) -> Result<(), ProjectError> {
  let write_err = |source| ProjectError::Write {
    path: path.to_path_buf(),
    source,
  };
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).map_err(write_err)?;
  }
  let temp_path = path.with_extension("json.tmp");
  fs::write(&temp_path, content).map_err(write_err)?;
  fs::rename(&temp_path, path).map_err(write_err)
}

/// Lexically resolve `.` and `..` so equal locations compare equal.
fn normalize(path: &Path) -> PathBuf {
  let mut out = PathBuf::new();
  for component in path.components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => {
        if !out.pop() {
          out.push("..");
        }
      }
      other => out.push(other.as_os_str()),
    }
  }
  out
}
