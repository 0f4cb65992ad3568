//! Analysis configuration types.

use std::path::{Path, PathBuf};

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, PatternError};
use crate::pattern::PatternSet;

/// Default bound on nested macro expansions for one include.
pub const DEFAULT_MAX_EXPANSION_DEPTH: usize = 64;

/// Default bound on alternative expansions for one include.
pub const DEFAULT_MAX_ALTERNATIVES: usize = 64;

/// Configuration for an incremental analysis pass.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct AnalysisConfig {
    /// Project root to snapshot.
    pub root: PathBuf,

    /// Root source files. Empty means every file under `root` with a
    /// source extension.
    #[builder(default)]
    #[serde(default)]
    pub sources: Vec<PathBuf>,

    /// Extensions (without the dot) identifying root source files.
    #[builder(default = "default_source_extensions()")]
    #[serde(default = "default_source_extensions")]
    pub source_extensions: Vec<String>,

    /// Search paths for `#include "..."` only, in declared order.
    #[builder(default)]
    #[serde(default)]
    pub quoted_include_paths: Vec<PathBuf>,

    /// Search paths for both include forms, in declared order.
    #[builder(default)]
    #[serde(default)]
    pub system_include_paths: Vec<PathBuf>,

    /// Snapshot include patterns (glob, relative to `root`).
    #[builder(default)]
    #[serde(default)]
    pub include_patterns: Vec<String>,

    /// Snapshot exclude patterns (glob, relative to `root`).
    #[builder(default)]
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Follow symbolic links while walking.
    #[builder(default = "false")]
    #[serde(default)]
    pub follow_symlinks: bool,

    /// Include hidden files (starting with .).
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub include_hidden: bool,

    /// Number of worker threads (0 = auto-detect).
    #[builder(default = "0")]
    #[serde(default)]
    pub threads: usize,

    /// Maximum nested macro expansions before giving up on an include.
    #[builder(default = "DEFAULT_MAX_EXPANSION_DEPTH")]
    #[serde(default = "default_max_expansion_depth")]
    pub max_expansion_depth: usize,

    /// Maximum alternative expansions of one include.
    #[builder(default = "DEFAULT_MAX_ALTERNATIVES")]
    #[serde(default = "default_max_alternatives")]
    pub max_alternatives: usize,

    /// Where the baseline of the previous pass is stored.
    #[builder(default)]
    #[serde(default)]
    pub baseline_path: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

fn default_max_expansion_depth() -> usize {
    DEFAULT_MAX_EXPANSION_DEPTH
}

fn default_max_alternatives() -> usize {
    DEFAULT_MAX_ALTERNATIVES
}

fn default_source_extensions() -> Vec<String> {
    ["c", "cc", "cpp", "cxx", "c++", "m", "mm"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl AnalysisConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(ref root) = self.root {
            if root.as_os_str().is_empty() {
                return Err("Root path cannot be empty".to_string());
            }
        } else {
            return Err("Root path is required".to_string());
        }
        if self.max_expansion_depth == Some(0) {
            return Err("max_expansion_depth must be at least 1".to_string());
        }
        if self.max_alternatives == Some(0) {
            return Err("max_alternatives must be at least 1".to_string());
        }
        Ok(())
    }
}

impl AnalysisConfig {
    /// Create a new config builder.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder::default()
    }

    /// Create a simple config for a project root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            sources: Vec::new(),
            source_extensions: default_source_extensions(),
            quoted_include_paths: Vec::new(),
            system_include_paths: Vec::new(),
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            follow_symlinks: false,
            include_hidden: true,
            threads: 0,
            max_expansion_depth: DEFAULT_MAX_EXPANSION_DEPTH,
            max_alternatives: DEFAULT_MAX_ALTERNATIVES,
            baseline_path: None,
        }
    }

    /// Parse a TOML document. Relative paths are kept as written.
    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        config.check()?;
        Ok(config)
    }

    /// Load a TOML config file; relative paths resolve against its directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text, path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(config.relative_to(base))
    }

    /// Resolve every relative path in this config against `base`.
    pub fn relative_to(mut self, base: &Path) -> Self {
        let anchor = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        anchor(&mut self.root);
        self.sources.iter_mut().for_each(anchor);
        self.quoted_include_paths.iter_mut().for_each(anchor);
        self.system_include_paths.iter_mut().for_each(anchor);
        if let Some(baseline) = self.baseline_path.as_mut() {
            anchor(baseline);
        }
        self
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.root.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                message: "root cannot be empty".to_string(),
            });
        }
        if self.max_expansion_depth == 0 || self.max_alternatives == 0 {
            return Err(ConfigError::Invalid {
                message: "expansion bounds must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Compile the snapshot include/exclude patterns.
    pub fn pattern_set(&self) -> Result<PatternSet, PatternError> {
        PatternSet::new(&self.include_patterns, &self.exclude_patterns)
    }

    /// Whether `path` has one of the configured source extensions.
    pub fn is_source_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.source_extensions.iter().any(|s| s == ext))
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self::new(".")
    }
}
