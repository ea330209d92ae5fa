//! Pipeline units and their lifecycle.

use crate::PipelineError;
use crate::layout::SourceFile;
use crate::region::RegionGroup;
use crate::types::Stage;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// Lifecycle of one stage run for a unit.
///
/// ```text
/// NotStarted -> Cached
/// NotStarted -> Running -> Succeeded | Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    NotStarted,
    /// The artifact existed; nothing was executed.
    Cached,
    Running,
    Succeeded,
    Failed,
}

impl UnitState {
    /// Whether no further transition can happen.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Cached | Self::Succeeded | Self::Failed)
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Cached => "cached",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The (source, scheme, region group) a stage runs for.
///
/// Adding a measure gives the full unit identity.
#[derive(Debug, Clone, Copy)]
pub struct Target<'a> {
    pub source: &'a SourceFile,
    pub scheme: &'a str,
    pub group: RegionGroup,
}

/// Result of running (or skipping) one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutcome {
    pub stage: Stage,
    /// Canonical artifact path.
    pub path: PathBuf,
    pub state: UnitState,
}

/// Final record of one unit in a dataset run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub session: String,
    /// Source directory name.
    pub source: String,
    /// Region group label.
    pub region_group: String,
    /// Absent for units that stop at labeling.
    pub measure: Option<String>,
    pub state: UnitState,
    pub error: Option<String>,
}

/// Mutable state of one run over one subject.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    force: bool,
    refreshed: BTreeSet<PathBuf>,
    failed: BTreeMap<PathBuf, PipelineError>,
}

impl RunContext {
    #[must_use]
    pub fn new(force: bool) -> Self {
        Self {
            force,
            refreshed: BTreeSet::new(),
            failed: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn force(&self) -> bool {
        self.force
    }

    /// Remember an artifact produced during this run.
    pub fn mark_refreshed(&mut self, path: &Path) {
        self.refreshed.insert(path.to_path_buf());
    }

    /// Whether the artifact was produced during this run.
    ///
    /// Under force, such artifacts count as cached so an upstream stage is
    /// rebuilt once per run rather than once per downstream measure.
    #[must_use]
    pub fn is_refreshed(&self, path: &Path) -> bool {
        self.refreshed.contains(path)
    }

    /// Remember that producing an artifact failed during this run.
    pub fn mark_failed(&mut self, path: &Path, error: &PipelineError) {
        self.failed.insert(path.to_path_buf(), error.clone());
    }

    /// The error an earlier attempt at this artifact failed with.
    ///
    /// Downstream units sharing a failed upstream stage reuse the error
    /// instead of running the tool again.
    #[must_use]
    pub fn failure(&self, path: &Path) -> Option<&PipelineError> {
        self.failed.get(path)
    }
}
