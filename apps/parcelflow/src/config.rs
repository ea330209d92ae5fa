//! # Configuration
//!
//! TOML configuration of the parcelflow binary.
//!
//! ```toml
//! [dataset]
//! base_dir = "/data/derivatives/freesurfer"
//! participants = ["01", "02"]
//!
//! [dataset.filters.anat]
//! ceagent = "corrected"
//!
//! [executor]
//! subjects_dir_var = "SUBJECTS_DIR"
//! jobs = 1
//!
//! [schemes.schemeX.hemispheric]
//! lookup_table = "/atlases/schemeX/schemeX.ctab"
//! left_atlas = "/atlases/schemeX/lh.schemeX.gcs"
//! right_atlas = "/atlases/schemeX/rh.schemeX.gcs"
//! ```
//!
//! Every section is optional. Filter keys are checked against the entity
//! registry when the file is loaded.

use parcelflow_core::{
    DataGrabber, EntityRegistry, LayoutFilters, PipelineError, SchemeDefinition, SchemeRegistry,
    default_filters, primitives::SUBJECTS_DIR_VAR,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// File looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "parcelflow.toml";

// =============================================================================
// SECTIONS
// =============================================================================

/// `[dataset]`: where the data lives and which of it to select.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatasetConfig {
    pub base_dir: Option<PathBuf>,
    /// Subject labels processed when none are requested on the command line.
    pub participants: Vec<String>,
    /// Per-directory entity filters for source discovery.
    pub filters: LayoutFilters,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            base_dir: None,
            participants: Vec::new(),
            filters: default_filters(),
        }
    }
}

/// `[executor]`: how external tools are run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutorConfig {
    /// Environment variable naming the tool's subjects directory.
    pub subjects_dir_var: String,
    /// Subjects processed concurrently.
    pub jobs: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            subjects_dir_var: SUBJECTS_DIR_VAR.to_string(),
            jobs: 1,
        }
    }
}

// =============================================================================
// CONFIG
// =============================================================================

/// The whole configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub dataset: DatasetConfig,
    pub executor: ExecutorConfig,
    /// Parcellation schemes by name.
    pub schemes: BTreeMap<String, SchemeDefinition>,
}

impl Config {
    /// Parse and validate a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, PipelineError> {
        let config: Self = toml::from_str(text)
            .map_err(|e| PipelineError::ConfigError(format!("Invalid configuration: {}", e)))?;
        config.validate(&EntityRegistry::standard()?)?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PipelineError::FileNotFound(path.to_path_buf()),
            _ => PipelineError::IoError(format!("{}: {}", path.display(), e)),
        })?;
        tracing::debug!(path = %path.display(), "Loading configuration");
        Self::from_toml_str(&text)
    }

    /// Load `path` if given, else the default file when it exists, else
    /// the built-in defaults.
    pub fn discover(path: Option<&Path>) -> Result<Self, PipelineError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    Self::load(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Check values serde cannot.
    pub fn validate(&self, registry: &EntityRegistry) -> Result<(), PipelineError> {
        for filters in self.dataset.filters.values() {
            for entity in filters.keys() {
                registry.ensure_known(entity)?;
            }
        }
        if self.executor.jobs == 0 {
            return Err(PipelineError::ConfigError(
                "executor.jobs must be at least 1".to_string(),
            ));
        }
        if self.executor.subjects_dir_var.is_empty() {
            return Err(PipelineError::ConfigError(
                "executor.subjects_dir_var must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Registry of the configured schemes.
    #[must_use]
    pub fn scheme_registry(&self) -> SchemeRegistry {
        let mut registry = SchemeRegistry::new();
        for (name, definition) in &self.schemes {
            registry.insert(name.clone(), definition.clone());
        }
        registry
    }

    /// Dataset grabber over `base_dir`, or the configured one.
    pub fn grabber(&self, base_dir: Option<&Path>) -> Result<DataGrabber, PipelineError> {
        let base_dir = base_dir
            .map(Path::to_path_buf)
            .or_else(|| self.dataset.base_dir.clone())
            .ok_or_else(|| {
                PipelineError::ConfigError(
                    "No dataset directory: pass --base-dir or set dataset.base_dir".to_string(),
                )
            })?;
        Ok(DataGrabber::new(base_dir).with_filters(self.dataset.filters.clone()))
    }
}
