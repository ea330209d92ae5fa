//! Run requests and their per-subject outcome reports.

use crate::pipeline::unit::{UnitRecord, UnitState};
use crate::region::RegionGroup;
use crate::table::Table;
use crate::types::Stage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What a dataset run should compute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// Scheme to parcellate by.
    pub scheme: String,
    /// Subject labels; empty means every discovered subject.
    pub participants: Vec<String>,
    /// Session labels; empty means every session.
    pub sessions: Vec<String>,
    /// Region groups; empty means all, in declared order.
    pub regions: Vec<RegionGroup>,
    /// Measures; empty means each group's full set.
    pub measures: Vec<String>,
    /// Topmost stage to run.
    pub stage: Stage,
    /// Recompute artifacts that already exist.
    pub force: bool,
    /// Subjects processed concurrently.
    pub jobs: usize,
}

impl RunRequest {
    /// Request the full cascade for every subject.
    #[must_use]
    pub fn new(scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            participants: Vec::new(),
            sessions: Vec::new(),
            regions: Vec::new(),
            measures: Vec::new(),
            stage: Stage::Export,
            force: false,
            jobs: 1,
        }
    }

    /// Requested groups in declared order, without duplicates.
    #[must_use]
    pub fn region_groups(&self) -> Vec<RegionGroup> {
        RegionGroup::ALL
            .into_iter()
            .filter(|g| self.regions.is_empty() || self.regions.contains(g))
            .collect()
    }

    /// Whether `session` is selected.
    #[must_use]
    pub fn includes_session(&self, session: &str) -> bool {
        self.sessions.is_empty() || self.sessions.iter().any(|s| s == session)
    }
}

/// Outcome of one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubjectReport {
    /// Every unit was attempted; individual units may still have failed.
    Completed { units: Vec<UnitRecord> },
    /// The subject was skipped.
    Failed { error: String },
}

impl SubjectReport {
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Units in the given state.
    #[must_use]
    pub fn count(&self, state: UnitState) -> usize {
        match self {
            Self::Completed { units } => units.iter().filter(|u| u.state == state).count(),
            Self::Failed { .. } => 0,
        }
    }
}

/// Outcome of a dataset run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetReport {
    /// Outcome per subject label.
    pub subjects: BTreeMap<String, SubjectReport>,
    /// Aggregated table of every completed unit.
    pub table: Table,
}

impl DatasetReport {
    /// Labels of the subjects that failed.
    pub fn failed_subjects(&self) -> impl Iterator<Item = &str> {
        self.subjects
            .iter()
            .filter(|(_, report)| report.is_failed())
            .map(|(label, _)| label.as_str())
    }

    /// Units in the given state across all subjects.
    #[must_use]
    pub fn count(&self, state: UnitState) -> usize {
        self.subjects.values().map(|r| r.count(state)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Hemisphere;

    #[test]
    fn region_groups_follow_declared_order() {
        let mut request = RunRequest::new("x");
        assert_eq!(request.region_groups(), RegionGroup::ALL.to_vec());

        request.regions = vec![
            RegionGroup::Subcortical,
            RegionGroup::Hemispheric(Hemisphere::Left),
            RegionGroup::Subcortical,
        ];
        assert_eq!(
            request.region_groups(),
            vec![
                RegionGroup::Hemispheric(Hemisphere::Left),
                RegionGroup::Subcortical
            ]
        );
    }

    #[test]
    fn session_selection() {
        let mut request = RunRequest::new("x");
        assert!(request.includes_session("01"));
        request.sessions = vec!["02".to_string()];
        assert!(!request.includes_session("01"));
        assert!(request.includes_session("02"));
    }
}
