use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const FRAMEWORK_PRODUCT_TYPE: &str = "com.apple.product-type.framework";
pub const STATIC_LIBRARY_PRODUCT_TYPE: &str = "com.apple.product-type.library.static";
pub const DYNAMIC_LIBRARY_PRODUCT_TYPE: &str = "com.apple.product-type.library.dynamic";
pub const TOOL_PRODUCT_TYPE: &str = "com.apple.product-type.tool";
pub const UNIT_TEST_PRODUCT_TYPE: &str = "com.apple.product-type.bundle.unit-test";
pub const UI_TEST_PRODUCT_TYPE: &str = "com.apple.product-type.bundle.ui-testing";

/// Key/value build settings of one target in one configuration.
pub type BuildSettings = BTreeMap<String, String>;

/// Stable handle to a target: index of its project file and of the target inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TargetId {
  pub project: usize,
  pub target: usize,
}

impl fmt::Display for TargetId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.project, self.target)
  }
}

/// The file a target produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductReference {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  pub path: String,
}

impl ProductReference {
  pub fn from_path(path: &str) -> Self {
    Self {
      name: None,
      path: path.to_string(),
    }
  }

  /// Base name of the product on disk: the explicit name when set, else the path's last component.
  pub fn file_name(&self) -> String {
    let raw = self.name.as_deref().unwrap_or(&self.path);
    Path::new(raw)
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_else(|| raw.to_string())
  }

  /// Product file name without its extension (`Core.framework` -> `Core`).
  pub fn stem(&self) -> String {
    let file_name = self.file_name();
    Path::new(&file_name)
      .file_stem()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or(file_name)
  }
}

/// A dependency declaration as written in a project file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyRef {
  /// By target name, optionally qualified with the nested project file holding it.
  Target {
    target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    project: Option<String>,
  },
  /// By the product it links against (a file reference).
  Product { product: String },
}

impl fmt::Display for DependencyRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      DependencyRef::Target { target, project: None } => write!(f, "{target}"),
      DependencyRef::Target {
        target,
        project: Some(project),
      } => write!(f, "{target} ({project})"),
      DependencyRef::Product { product } => write!(f, "product {product}"),
    }
  }
}

/// How a module's build output is shaped on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductKind {
  Framework,
  SingleFile,
  Unsupported(String),
}

impl ProductKind {
  pub fn classify(product_type: &str) -> Self {
    match product_type {
      FRAMEWORK_PRODUCT_TYPE => ProductKind::Framework,
      STATIC_LIBRARY_PRODUCT_TYPE | DYNAMIC_LIBRARY_PRODUCT_TYPE | TOOL_PRODUCT_TYPE => ProductKind::SingleFile,
      other => ProductKind::Unsupported(other.to_string()),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
  pub name: String,
  pub platform: String,
  pub product_type: String,
  pub product: ProductReference,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub dependencies: Vec<DependencyRef>,
  /// Source files relative to the project file's directory.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub inputs: Vec<String>,
  /// Per-configuration settings that can be edited in place.
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub settings: BTreeMap<String, BuildSettings>,
}

impl Target {
  pub fn product_kind(&self) -> ProductKind {
    ProductKind::classify(&self.product_type)
  }

  pub fn is_test(&self) -> bool {
    matches!(
      self.product_type.as_str(),
      UNIT_TEST_PRODUCT_TYPE | UI_TEST_PRODUCT_TYPE
    )
  }

  /// Whether this target is what `reference` points at, ignoring any project qualifier.
  pub fn matches(&self, reference: &DependencyRef) -> bool {
    match reference {
      DependencyRef::Target { target, .. } => &self.name == target,
      DependencyRef::Product { product } => {
        self.product.path == *product || self.product.file_name() == ProductReference::from_path(product).file_name()
      }
    }
  }
}

/// Narrows dependency resolution to targets buildable alongside the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFilter {
  pub platform: String,
}

impl TargetFilter {
  pub fn for_platform(platform: impl Into<String>) -> Self {
    Self {
      platform: platform.into(),
    }
  }

  pub fn accepts(&self, target: &Target) -> bool {
    !target.is_test() && target.platform == self.platform
  }
}

/// A source file contributing to a target, keyed by its project-relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
  pub relative: String,
  pub path: PathBuf,
}
