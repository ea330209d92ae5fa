//! # Path Templating Module
//!
//! Canonical output paths derived from a reference and entity overrides.
//!
//! Every stage uses the same operation and differs only in its destination
//! subdirectory, its filename pattern and the overrides it supplies. The
//! computation never touches the filesystem: identical inputs always give
//! identical paths.

use crate::entity::{EntityMapping, EntityRegistry};
use crate::primitives::PARTIAL_SUFFIX;
use crate::PipelineError;
use std::path::{Path, PathBuf};

/// What an output path is derived from.
#[derive(Debug, Clone, Copy)]
pub enum Reference<'a> {
    /// A raw file: entities are parsed from its name and outputs land
    /// under its parent directory.
    File(&'a Path),
    /// Already-parsed entities anchored at an explicit root directory.
    Entities {
        root: &'a Path,
        entities: &'a EntityMapping,
    },
}

/// Builds canonical paths with an entity registry.
#[derive(Debug, Clone)]
pub struct PathBuilder {
    registry: EntityRegistry,
}

impl PathBuilder {
    /// Create a builder over the given registry.
    #[must_use]
    pub fn new(registry: EntityRegistry) -> Self {
        Self { registry }
    }

    /// Create a builder over the standard registry.
    pub fn standard() -> Result<Self, PipelineError> {
        Ok(Self::new(EntityRegistry::standard()?))
    }

    /// The registry used for parsing and rendering.
    #[must_use]
    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    /// `root / destination / pattern(entities + overrides)`.
    pub fn build_path(
        &self,
        reference: Reference<'_>,
        destination: &str,
        pattern: &str,
        overrides: &EntityMapping,
    ) -> Result<PathBuf, PipelineError> {
        let (root, entities) = self.resolve(reference);
        let filename = self
            .registry
            .render_pattern(pattern, &entities, overrides)?;
        Ok(root.join(destination).join(filename))
    }

    /// `root / destination / canonical(entities + overrides)`.
    ///
    /// Used when the output keeps the reference's naming convention and only
    /// a few entities change (a derivative next to its source).
    pub fn build_canonical_path(
        &self,
        reference: Reference<'_>,
        destination: &str,
        overrides: &EntityMapping,
    ) -> Result<PathBuf, PipelineError> {
        let (root, entities) = self.resolve(reference);
        let filename = self.registry.render(&entities, overrides)?;
        Ok(root.join(destination).join(filename))
    }

    fn resolve(&self, reference: Reference<'_>) -> (PathBuf, EntityMapping) {
        match reference {
            Reference::File(path) => {
                let root = path.parent().map(Path::to_path_buf).unwrap_or_default();
                let entities = path
                    .file_name()
                    .map(|name| self.registry.parse(&name.to_string_lossy()))
                    .unwrap_or_default();
                (root, entities)
            }
            Reference::Entities { root, entities } => (root.to_path_buf(), entities.clone()),
        }
    }
}

/// Sibling temporary path a tool writes to before the output is committed.
///
/// The extension stays last, since tools pick the output format from it:
/// `stats/lh.x.stats` becomes `stats/.lh.x.partial.stats` and
/// `anat/t1.nii.gz` becomes `anat/.t1.partial.nii.gz`.
#[must_use]
pub fn partial_path(canonical: &Path) -> PathBuf {
    let name = canonical
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let split = name
        .strip_suffix(".gz")
        .and_then(|inner| inner.rfind('.'))
        .or_else(|| name.rfind('.'))
        .filter(|idx| *idx > 0);
    let (stem, extension) = match split {
        Some(idx) => name.split_at(idx),
        None => (name.as_str(), ""),
    };
    canonical.with_file_name(format!(".{stem}.{PARTIAL_SUFFIX}{extension}"))
}
