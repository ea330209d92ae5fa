//! # Layout Module
//!
//! Discovery of reconstructed sources in a derivatives directory.
//!
//! ```text
//! <base>/sub-<label>/ses-<label>/anat/<source>/mri/brain.mgz
//! ```
//!
//! Each `<source>` directory is one reconstructed subject as the toolkit
//! sees it: its parent directory is the tool's subjects directory and its
//! name is the tool's subject identifier. Stage outputs are written
//! beneath it.

use crate::entity::{EntityMapping, EntityRegistry};
use crate::primitives::{ANATOMICAL_DIR, REFERENCE_IMAGE, SESSION_PREFIX, SUBJECT_PREFIX};
use crate::PipelineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Filters per datatype directory (`anat` → `{ceagent: corrected}`).
pub type LayoutFilters = BTreeMap<String, BTreeMap<String, String>>;

/// Sources of one subject, by session label.
pub type SubjectSources = BTreeMap<String, Vec<SourceFile>>;

/// Filters applied when none are configured.
#[must_use]
pub fn default_filters() -> LayoutFilters {
    let mut anat = BTreeMap::new();
    anat.insert("ceagent".to_string(), "corrected".to_string());
    let mut filters = BTreeMap::new();
    filters.insert(ANATOMICAL_DIR.to_string(), anat);
    filters
}

// =============================================================================
// SOURCE FILE
// =============================================================================

/// One reconstructed source of a subject session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Subject label without prefix.
    pub subject: String,
    /// Session label without prefix.
    pub session: String,
    /// The source directory.
    pub path: PathBuf,
    /// Entities parsed from the directory name.
    pub entities: EntityMapping,
}

impl SourceFile {
    /// Build a source, parsing entities from the directory name.
    #[must_use]
    pub fn new(
        registry: &EntityRegistry,
        subject: impl Into<String>,
        session: impl Into<String>,
        path: PathBuf,
    ) -> Self {
        let entities = registry.parse(&file_name(&path));
        Self {
            subject: subject.into(),
            session: session.into(),
            path,
            entities,
        }
    }

    /// Directory name; the tool's subject identifier.
    #[must_use]
    pub fn name(&self) -> String {
        file_name(&self.path)
    }

    /// Parent directory; the tool's subjects directory.
    #[must_use]
    pub fn input_dir(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new(""))
    }

    /// Path of the reference image, which must exist.
    pub fn require_reference(&self) -> Result<PathBuf, PipelineError> {
        let reference = self.path.join(REFERENCE_IMAGE);
        if reference.is_file() {
            Ok(reference)
        } else {
            Err(PipelineError::FileNotFound(reference))
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

// =============================================================================
// DATA GRABBER
// =============================================================================

/// Lists subjects, sessions and sources below a base directory.
#[derive(Debug, Clone)]
pub struct DataGrabber {
    base_dir: PathBuf,
    filters: LayoutFilters,
}

impl DataGrabber {
    /// Create a grabber with the default anatomical filter.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            filters: default_filters(),
        }
    }

    /// Replace the filters.
    #[must_use]
    pub fn with_filters(mut self, filters: LayoutFilters) -> Self {
        self.filters = filters;
        self
    }

    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[must_use]
    pub fn filters(&self) -> &LayoutFilters {
        &self.filters
    }

    /// Directory of a subject.
    #[must_use]
    pub fn subject_dir(&self, subject: &str) -> PathBuf {
        self.base_dir.join(format!("{SUBJECT_PREFIX}{subject}"))
    }

    /// Every subject with its sessions and sources, sorted by label.
    pub fn query_subjects(
        &self,
        registry: &EntityRegistry,
    ) -> Result<BTreeMap<String, SubjectSources>, PipelineError> {
        self.validate_filters(registry)?;
        let mut subjects = BTreeMap::new();
        for (label, dir) in prefixed_dirs(&self.base_dir, SUBJECT_PREFIX)? {
            let sessions = self.query_sessions(registry, &label, &dir)?;
            subjects.insert(label, sessions);
        }
        Ok(subjects)
    }

    /// Sessions and sources of one subject.
    ///
    /// Fails with `FileNotFound` when the subject directory is absent.
    pub fn query_subject(
        &self,
        registry: &EntityRegistry,
        subject: &str,
    ) -> Result<SubjectSources, PipelineError> {
        self.validate_filters(registry)?;
        let dir = self.subject_dir(subject);
        if !dir.is_dir() {
            return Err(PipelineError::FileNotFound(dir));
        }
        self.query_sessions(registry, subject, &dir)
    }

    fn validate_filters(&self, registry: &EntityRegistry) -> Result<(), PipelineError> {
        for filters in self.filters.values() {
            for name in filters.keys() {
                registry.ensure_known(name)?;
            }
        }
        Ok(())
    }

    fn query_sessions(
        &self,
        registry: &EntityRegistry,
        subject: &str,
        subject_dir: &Path,
    ) -> Result<SubjectSources, PipelineError> {
        let mut sessions = BTreeMap::new();
        for (session, dir) in prefixed_dirs(subject_dir, SESSION_PREFIX)? {
            let sources = self.query_sources(registry, subject, &session, &dir)?;
            sessions.insert(session, sources);
        }
        Ok(sessions)
    }

    fn query_sources(
        &self,
        registry: &EntityRegistry,
        subject: &str,
        session: &str,
        session_dir: &Path,
    ) -> Result<Vec<SourceFile>, PipelineError> {
        let anat = session_dir.join(ANATOMICAL_DIR);
        if !anat.is_dir() {
            return Ok(Vec::new());
        }
        let empty = BTreeMap::new();
        let filters = self.filters.get(ANATOMICAL_DIR).unwrap_or(&empty);

        let mut sources = Vec::new();
        for path in sorted_dirs(&anat)? {
            let source = SourceFile::new(registry, subject, session, path);
            if source.name().starts_with('.') {
                continue;
            }
            if registry.matches(&source.entities, filters)? {
                sources.push(source);
            } else {
                tracing::debug!(source = %source.path.display(), "Source filtered out");
            }
        }
        Ok(sources)
    }
}

fn sorted_dirs(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let entries = std::fs::read_dir(dir).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => PipelineError::FileNotFound(dir.to_path_buf()),
        _ => PipelineError::io(dir, &e),
    })?;
    let mut dirs = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| PipelineError::io(dir, &e))?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// `(label, path)` of every `<prefix><label>` directory, sorted by label.
fn prefixed_dirs(dir: &Path, prefix: &str) -> Result<Vec<(String, PathBuf)>, PipelineError> {
    let mut found: Vec<(String, PathBuf)> = sorted_dirs(dir)?
        .into_iter()
        .filter_map(|path| {
            let label = file_name(&path).strip_prefix(prefix)?.to_string();
            (!label.is_empty()).then_some((label, path))
        })
        .collect();
    found.sort();
    Ok(found)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn registry() -> EntityRegistry {
        EntityRegistry::standard().unwrap()
    }

    fn make_source(base: &Path, subject: &str, session: &str, name: &str) -> PathBuf {
        let dir = base
            .join(format!("sub-{subject}"))
            .join(format!("ses-{session}"))
            .join("anat")
            .join(name);
        std::fs::create_dir_all(dir.join("mri")).unwrap();
        std::fs::write(dir.join(REFERENCE_IMAGE), b"").unwrap();
        dir
    }

    #[test]
    fn discovers_sorted_filtered_sources() {
        let base = tempfile::tempdir().unwrap();
        make_source(base.path(), "02", "01", "sub-02_ses-01_ce-corrected_T1w");
        make_source(base.path(), "01", "02", "sub-01_ses-02_ce-corrected_T1w");
        make_source(base.path(), "01", "01", "sub-01_ses-01_ce-corrected_T1w");
        make_source(base.path(), "01", "01", "sub-01_ses-01_ce-raw_T1w");
        std::fs::create_dir_all(base.path().join("logs")).unwrap();

        let subjects = DataGrabber::new(base.path())
            .query_subjects(&registry())
            .unwrap();

        assert_eq!(subjects.keys().collect::<Vec<_>>(), vec!["01", "02"]);
        let sub01 = &subjects["01"];
        assert_eq!(sub01.keys().collect::<Vec<_>>(), vec!["01", "02"]);
        let sources = &sub01["01"];
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].name(), "sub-01_ses-01_ce-corrected_T1w");
        assert_eq!(sources[0].entities.get("ceagent"), Some("corrected"));
        assert_eq!(
            sources[0].input_dir(),
            base.path().join("sub-01").join("ses-01").join("anat")
        );
    }

    #[test]
    fn empty_filters_keep_every_source() {
        let base = tempfile::tempdir().unwrap();
        make_source(base.path(), "01", "01", "sub-01_ses-01_ce-raw_T1w");
        make_source(base.path(), "01", "01", "sub-01_ses-01_T1w");

        let sources = DataGrabber::new(base.path())
            .with_filters(LayoutFilters::new())
            .query_subject(&registry(), "01")
            .unwrap();
        assert_eq!(sources["01"].len(), 2);
    }

    #[test]
    fn unknown_filter_entity_rejected() {
        let base = tempfile::tempdir().unwrap();
        let mut filters = default_filters();
        if let Some(anat) = filters.get_mut("anat") {
            anat.insert("contrast".to_string(), "x".to_string());
        }
        let result = DataGrabber::new(base.path())
            .with_filters(filters)
            .query_subjects(&registry());
        assert!(matches!(result, Err(PipelineError::UnknownEntity(name)) if name == "contrast"));
    }

    #[test]
    fn absent_subject_is_file_not_found() {
        let base = tempfile::tempdir().unwrap();
        let result = DataGrabber::new(base.path()).query_subject(&registry(), "09");
        assert!(matches!(result, Err(PipelineError::FileNotFound(_))));
    }

    #[test]
    fn reference_image_is_required() {
        let base = tempfile::tempdir().unwrap();
        let dir = make_source(base.path(), "01", "01", "sub-01_ses-01_ce-corrected_T1w");
        let source = SourceFile::new(&registry(), "01", "01", dir.clone());
        assert_eq!(source.require_reference().unwrap(), dir.join(REFERENCE_IMAGE));

        std::fs::remove_file(dir.join(REFERENCE_IMAGE)).unwrap();
        assert!(matches!(
            source.require_reference(),
            Err(PipelineError::FileNotFound(path)) if path == dir.join(REFERENCE_IMAGE)
        ));
    }
}
