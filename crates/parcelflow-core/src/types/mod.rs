//! # Core Type Definitions
//!
//! This module contains the types shared by every pipeline component:
//! - Pipeline stages (`Stage`)
//! - Error types (`PipelineError`)
//!
//! ## Error Classes
//!
//! Errors split in two classes:
//! - Validation errors are raised before any external process is spawned
//!   and abort the caller (misuse of the API or of the CLI).
//! - Recoverable errors are recorded against a unit or a subject and the
//!   dataset run moves on. See [`PipelineError::is_recoverable`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// STAGE
// =============================================================================

/// One of the three ordered computation phases.
///
/// Declaration order is dependency order: a stage may only run once every
/// stage before it has produced (or already had) its artifact.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Region labeling: project the scheme's atlas onto the subject.
    Labeling,
    /// Statistics extraction: summarize each labeled region.
    Statistics,
    /// Table export: one measure of the statistics as a table.
    #[default]
    Export,
}

impl Stage {
    /// All stages in dependency order.
    pub const ALL: [Stage; 3] = [Stage::Labeling, Stage::Statistics, Stage::Export];

    /// The stage that must complete before this one, if any.
    #[must_use]
    pub const fn upstream(self) -> Option<Stage> {
        match self {
            Self::Labeling => None,
            Self::Statistics => Some(Self::Labeling),
            Self::Export => Some(Self::Statistics),
        }
    }

    /// Human-readable stage name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Labeling => "labeling",
            Self::Statistics => "statistics",
            Self::Export => "export",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stage {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "labeling" | "label" => Ok(Self::Labeling),
            "statistics" | "stats" => Ok(Self::Statistics),
            "export" | "table" => Ok(Self::Export),
            other => Err(PipelineError::ConfigError(format!(
                "Unknown stage '{}' (expected labeling, statistics or export)",
                other
            ))),
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the parcelflow pipeline.
///
/// - No silent failures
/// - Use `Result<T, PipelineError>` for fallible operations
/// - The core never panics; every error is returned to the caller
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// An entity name outside the registry was used as override, filter
    /// or pattern placeholder.
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    /// A filename pattern referenced a registered entity with no value.
    #[error("Entity '{0}' has no value to render")]
    UnresolvedEntity(String),

    /// The measure is not permitted for the region group.
    #[error("Cannot run {region_group} statistics on '{measure}'")]
    InvalidMeasure {
        measure: String,
        region_group: String,
    },

    /// A region label outside the hemispheric and subcortical groups.
    #[error("Unsupported region group: {0}")]
    UnsupportedRegionGroup(String),

    /// No scheme is registered under the requested name.
    #[error("Unknown scheme: {0}")]
    UnknownScheme(String),

    /// The scheme lacks an entry required by the requested stage.
    #[error("Scheme '{scheme}' defines no {entry} for {region_group}")]
    MissingSchemeDefinition {
        scheme: String,
        region_group: String,
        entry: &'static str,
    },

    /// A command template was rendered without one of its parameters.
    #[error("Template '{template}' requires parameter '{parameter}'")]
    MissingParameter {
        template: &'static str,
        parameter: &'static str,
    },

    /// The external tool exited non-zero (or was killed by a signal).
    #[error("Command failed with exit code {exit_code:?}: {command}")]
    ExecutionError {
        command: String,
        exit_code: Option<i32>,
    },

    /// An expected file or directory does not exist.
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// A statistics report is absent, empty or malformed.
    #[error("Malformed statistics report {}: {reason}", path.display())]
    StatsParseError { path: PathBuf, reason: String },

    /// The run was cancelled while a unit was pending or running.
    #[error("Run cancelled")]
    Cancelled,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// The configuration is invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl PipelineError {
    /// Whether the error is recorded against a unit or subject and the
    /// dataset run continues.
    ///
    /// Everything else aborts the run: programming errors, caller misuse
    /// and cancellation.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InvalidMeasure { .. }
                | Self::MissingSchemeDefinition { .. }
                | Self::ExecutionError { .. }
                | Self::FileNotFound(_)
                | Self::StatsParseError { .. }
                | Self::IoError(_)
        )
    }

    /// Build an `IoError` naming the path the operation touched.
    pub(crate) fn io(path: &Path, err: &std::io::Error) -> Self {
        Self::IoError(format!("{}: {}", path.display(), err))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_upstream_chain() {
        assert_eq!(Stage::Export.upstream(), Some(Stage::Statistics));
        assert_eq!(Stage::Statistics.upstream(), Some(Stage::Labeling));
        assert_eq!(Stage::Labeling.upstream(), None);
    }

    #[test]
    fn stage_ordering_matches_dependencies() {
        let mut stages = vec![Stage::Export, Stage::Labeling, Stage::Statistics];
        stages.sort();
        assert_eq!(stages, Stage::ALL.to_vec());
    }

    #[test]
    fn stage_from_str_accepts_aliases() {
        assert!(matches!("stats".parse::<Stage>(), Ok(Stage::Statistics)));
        assert!(matches!("LABELING".parse::<Stage>(), Ok(Stage::Labeling)));
        assert!(matches!(
            "surface".parse::<Stage>(),
            Err(PipelineError::ConfigError(_))
        ));
    }

    #[test]
    fn recoverable_classification() {
        assert!(PipelineError::FileNotFound(PathBuf::from("x")).is_recoverable());
        assert!(
            PipelineError::ExecutionError {
                command: "false".into(),
                exit_code: Some(1)
            }
            .is_recoverable()
        );
        assert!(!PipelineError::UnknownEntity("foo".into()).is_recoverable());
        assert!(!PipelineError::Cancelled.is_recoverable());
        assert!(!PipelineError::UnsupportedRegionGroup("cerebellum".into()).is_recoverable());
    }
}
