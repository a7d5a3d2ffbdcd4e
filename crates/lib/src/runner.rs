//! Per-target orchestration of the cache pipeline.
//!
//! For every configured target and each of its cached dependencies:
//!
//! 1. build the dependency graph rooted at the dependency
//! 2. load build settings for every module through the build tool
//! 3. fingerprint bottom-up and check the store
//! 4. unpack hits, then rebuild misses in one build and store their products
//! 5. link every module of the graph into the target as a prebuilt product
//!
//! A failed build aborts before anything is stored or linked.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::RunConfig;
use crate::evaluate::{EvaluateError, RebuildEvaluator};
use crate::executor::{BuildExecutor, ExecutorError, SettingsSnapshot};
use crate::extract::{ArtifactExtractor, ExtractError, unpacked_location};
use crate::fingerprint::{FingerprintCalculator, FingerprintError};
use crate::fixer::{FixError, SettingsFixer};
use crate::graph::{Graph, GraphBuilder, GraphError};
use crate::product::{LocateError, ProductLocator};
use crate::project::{ProjectError, ProjectModel, TargetId};
use crate::store::{ArtifactStore, CacheKey, StoreError};
use crate::util::fs::{copy_recursive, reset_dir};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
  BuildGraph,
  LoadSettings,
  Fingerprint,
  Evaluate,
  Extract,
  FixSettings,
  Build,
  LocateProducts,
  Store,
  SaveProject,
}

impl fmt::Display for Step {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Step::BuildGraph => "building the dependency graph",
      Step::LoadSettings => "loading build settings",
      Step::Fingerprint => "fingerprinting",
      Step::Evaluate => "evaluating cache state",
      Step::Extract => "unpacking cached modules",
      Step::FixSettings => "fixing target settings",
      Step::Build => "building",
      Step::LocateProducts => "locating build products",
      Step::Store => "storing artifacts",
      Step::SaveProject => "saving the project",
    };
    f.write_str(name)
  }
}

#[derive(Debug, Error)]
pub enum StepError {
  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error(transparent)]
  Fingerprint(#[from] FingerprintError),

  #[error(transparent)]
  Evaluate(#[from] EvaluateError),

  #[error(transparent)]
  Extract(#[from] ExtractError),

  #[error(transparent)]
  Fix(#[from] FixError),

  #[error(transparent)]
  Executor(#[from] ExecutorError),

  #[error(transparent)]
  Locate(#[from] LocateError),

  #[error(transparent)]
  Store(#[from] StoreError),

  #[error(transparent)]
  Project(#[from] ProjectError),

  #[error("build tool reported no settings for module '{0}'")]
  MissingSettings(String),

  #[error("failed to copy product into {path}: {source}")]
  CopyProduct {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

#[derive(Debug, Error)]
pub enum RunError {
  #[error("target '{0}' not found in the project model")]
  TargetNotFound(String),

  #[error("{step} failed for '{dependency}' (cached dependency of '{target}'): {source}")]
  Step {
    target: String,
    dependency: String,
    step: Step,
    #[source]
    source: StepError,
  },
}

impl RunError {
  pub fn step(&self) -> Option<Step> {
    match self {
      RunError::Step { step, .. } => Some(*step),
      RunError::TargetNotFound(_) => None,
    }
  }
}

/// Cache state of one module as seen by `plan`.
#[derive(Debug, Clone, Serialize)]
pub struct ModulePlan {
  pub name: String,
  pub fingerprint: String,
  pub cached: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DependencyPlan {
  pub target: String,
  pub dependency: String,
  /// Dependencies before dependents.
  pub modules: Vec<ModulePlan>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
  pub dependencies: usize,
  pub modules: usize,
  pub cache_hits: usize,
  pub rebuilt: usize,
  pub builds: usize,
}

struct StepContext<'c> {
  target: &'c str,
  dependency: &'c str,
}

impl StepContext<'_> {
  fn at<E: Into<StepError>>(&self, step: Step) -> impl FnOnce(E) -> RunError + '_ {
    move |e| RunError::Step {
      target: self.target.to_string(),
      dependency: self.dependency.to_string(),
      step,
      source: e.into(),
    }
  }
}

/// The read-only half of the pipeline: graph, settings, fingerprints and
/// store lookups. Never touches the project files or the store contents.
pub struct Planner<'a, E: BuildExecutor> {
  config: &'a RunConfig,
  project: &'a dyn ProjectModel,
  executor: &'a E,
  store: &'a dyn ArtifactStore,
}

impl<'a, E: BuildExecutor> Planner<'a, E> {
  pub fn new(
    config: &'a RunConfig,
    project: &'a dyn ProjectModel,
    executor: &'a E,
    store: &'a dyn ArtifactStore,
  ) -> Self {
    Self {
      config,
      project,
      executor,
      store,
    }
  }

  /// Report the cache state of every configured dependency without unpacking,
  /// building or editing anything.
  pub async fn plan(&self) -> Result<Vec<DependencyPlan>, RunError> {
    let mut plans = Vec::new();
    for target in &self.config.targets {
      if self.project.find_target(&target.name).is_none() {
        return Err(RunError::TargetNotFound(target.name.clone()));
      }
      for dependency in &target.cached_dependencies {
        let ctx = StepContext {
          target: &target.name,
          dependency,
        };
        let graph = self.prepare(&ctx).await?;
        let modules = graph
          .bottom_up_order()
          .map_err(ctx.at(Step::BuildGraph))?
          .into_iter()
          .map(|idx| {
            let node = graph.node(idx);
            ModulePlan {
              name: node.name().to_string(),
              fingerprint: node.fingerprint().map(|f| f.to_string()).unwrap_or_default(),
              cached: node.needs_rebuild() == Some(false),
            }
          })
          .collect();
        plans.push(DependencyPlan {
          target: target.name.clone(),
          dependency: dependency.clone(),
          modules,
        });
      }
    }
    Ok(plans)
  }

  /// Graph, settings, fingerprints and hit/miss flags for one dependency.
  async fn prepare(&self, ctx: &StepContext<'_>) -> Result<Graph, RunError> {
    let mut graph = GraphBuilder::new(self.project)
      .build_graph(ctx.dependency)
      .map_err(ctx.at(Step::BuildGraph))?;
    self
      .load_settings(&mut graph)
      .await
      .map_err(ctx.at(Step::LoadSettings))?;
    FingerprintCalculator::new()
      .calculate_all(&mut graph)
      .map_err(ctx.at(Step::Fingerprint))?;
    RebuildEvaluator::new(self.store)
      .evaluate_all(&mut graph)
      .map_err(ctx.at(Step::Evaluate))?;
    Ok(graph)
  }

  /// Query settings once per distinct project file in the graph.
  async fn load_settings(&self, graph: &mut Graph) -> Result<(), StepError> {
    let mut snapshots: BTreeMap<PathBuf, SettingsSnapshot> = BTreeMap::new();

    for idx in graph.node_indices().collect::<Vec<_>>() {
      let (name, target) = {
        let node = graph.node(idx);
        (node.name().to_string(), node.target())
      };
      let build_file = self.project.build_file(target)?;
      if !snapshots.contains_key(&build_file) {
        let snapshot = self
          .executor
          .load_settings(&build_file, &self.config.configuration)
          .await?;
        snapshots.insert(build_file.clone(), snapshot);
      }

      let settings = snapshots
        .get(&build_file)
        .and_then(|snapshot| snapshot.get(&name))
        .cloned()
        .ok_or_else(|| StepError::MissingSettings(name.clone()))?;
      graph.node_mut(idx).set_settings(settings);
    }
    Ok(())
  }
}

pub struct Runner<'a, E: BuildExecutor> {
  config: &'a RunConfig,
  project: &'a mut dyn ProjectModel,
  executor: &'a E,
  store: &'a dyn ArtifactStore,
}

impl<'a, E: BuildExecutor> Runner<'a, E> {
  pub fn new(
    config: &'a RunConfig,
    project: &'a mut dyn ProjectModel,
    executor: &'a E,
    store: &'a dyn ArtifactStore,
  ) -> Self {
    Self {
      config,
      project,
      executor,
      store,
    }
  }

  /// Run the full pipeline for every configured target.
  pub async fn run(&mut self) -> Result<RunSummary, RunError> {
    let config = self.config;
    let mut summary = RunSummary::default();

    for target in &config.targets {
      let consumer = self
        .project
        .find_target(&target.name)
        .ok_or_else(|| RunError::TargetNotFound(target.name.clone()))?;
      for dependency in &target.cached_dependencies {
        let ctx = StepContext {
          target: &target.name,
          dependency,
        };
        let outcome = self.handle_dependency(&ctx, consumer).await?;
        summary.dependencies += 1;
        summary.modules += outcome.modules;
        summary.cache_hits += outcome.modules - outcome.rebuilt;
        summary.rebuilt += outcome.rebuilt;
        if outcome.rebuilt > 0 {
          summary.builds += 1;
        }
      }
    }

    info!(
      dependencies = summary.dependencies,
      hits = summary.cache_hits,
      rebuilt = summary.rebuilt,
      "run complete"
    );
    Ok(summary)
  }

  fn planner(&self) -> Planner<'_, E> {
    Planner::new(self.config, &*self.project, self.executor, self.store)
  }

  async fn handle_dependency(&mut self, ctx: &StepContext<'_>, consumer: TargetId) -> Result<Outcome, RunError> {
    info!(consumer = ctx.target, dependency = ctx.dependency, "processing cached dependency");
    let graph = self.planner().prepare(ctx).await?;
    let unpacked_root = self.config.unpacked_dir();

    ArtifactExtractor::new(self.store, &unpacked_root)
      .unpack_available(&graph)
      .map_err(ctx.at(Step::Extract))?;

    let rebuilt = self.rebuild_missing(ctx, &graph).await?;

    let fixer = SettingsFixer::new(&self.config.configuration, &unpacked_root);
    for node in graph.nodes() {
      fixer
        .add_as_prebuilt_framework(&mut *self.project, node, consumer)
        .map_err(ctx.at(Step::FixSettings))?;
    }
    self.project.save().map_err(ctx.at(Step::SaveProject))?;

    Ok(Outcome {
      modules: graph.len(),
      rebuilt,
    })
  }

  /// Build every missing module in one invocation and store what it produced.
  async fn rebuild_missing(&mut self, ctx: &StepContext<'_>, graph: &Graph) -> Result<usize, RunError> {
    let rebuild = graph.rebuild_nodes();
    if rebuild.is_empty() {
      info!(dependency = ctx.dependency, "all modules cached");
      return Ok(0);
    }

    let configuration = &self.config.configuration;
    let derived_data = &self.config.derived_data_path;
    let unpacked_root = self.config.unpacked_dir();

    SettingsFixer::new(configuration, &unpacked_root)
      .fix(&mut *self.project, graph)
      .map_err(ctx.at(Step::FixSettings))?;
    self.project.save().map_err(ctx.at(Step::SaveProject))?;

    let root = graph.root_node();
    let build_file = self.project.build_file(root.target()).map_err(ctx.at(Step::Build))?;
    info!(dependency = ctx.dependency, modules = rebuild.len(), "rebuilding missing modules");
    self
      .executor
      .build(&build_file, configuration, root.name(), derived_data)
      .await
      .map_err(ctx.at(Step::Build))?;

    let locator = ProductLocator::new(derived_data, self.executor).skipping(&unpacked_root);
    for &idx in &rebuild {
      let node = graph.node(idx);
      let files = locator
        .list_product_contents(&*self.project, node)
        .await
        .map_err(ctx.at(Step::LocateProducts))?;
      if files.is_empty() {
        warn!(module = node.name(), "build produced no files");
      }

      let dir = unpacked_location(&unpacked_root, node.name());
      let copy_err = |source| StepError::CopyProduct {
        path: dir.clone(),
        source,
      };
      reset_dir(&dir).map_err(copy_err).map_err(ctx.at(Step::Store))?;
      for file in &files {
        let Some(file_name) = file.file_name() else { continue };
        copy_recursive(file, &dir.join(file_name))
          .map_err(copy_err)
          .map_err(ctx.at(Step::Store))?;
      }

      let key = CacheKey::for_node(node)
        .ok_or_else(|| EvaluateError::MissingFingerprint {
          node: node.name().to_string(),
        })
        .map_err(ctx.at(Step::Store))?;
      self.store.store(&key, &dir).map_err(ctx.at(Step::Store))?;
    }

    info!(dependency = ctx.dependency, rebuilt = rebuild.len(), "stored rebuilt modules");
    Ok(rebuild.len())
  }
}

struct Outcome {
  modules: usize,
  rebuilt: usize,
}
