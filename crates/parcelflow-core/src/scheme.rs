//! # Scheme Module
//!
//! Named parcellation schemes and the reference files they supply.
//!
//! A scheme provides, per region category, the atlas consumed by region
//! labeling and the color lookup table consumed by statistics extraction
//! and by the statistics parser. Sections and entries are optional so that
//! a scheme may cover only the cortex or only the subcortex; asking for a
//! missing entry fails the unit with `MissingSchemeDefinition`.

use crate::PipelineError;
use crate::region::{Hemisphere, RegionGroup};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Cortical section of a scheme.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HemisphericDefinition {
    /// Color table of the cortical parcels.
    pub lookup_table: Option<PathBuf>,
    /// Classifier atlas of the left hemisphere.
    pub left_atlas: Option<PathBuf>,
    /// Classifier atlas of the right hemisphere.
    pub right_atlas: Option<PathBuf>,
}

/// Subcortical section of a scheme.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubcorticalDefinition {
    /// Color table of the subcortical structures.
    pub lookup_table: Option<PathBuf>,
    /// Classifier atlas of the subcortical segmentation.
    pub atlas: Option<PathBuf>,
}

/// The reference files of one scheme.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemeDefinition {
    #[serde(default)]
    pub hemispheric: Option<HemisphericDefinition>,
    #[serde(default)]
    pub subcortical: Option<SubcorticalDefinition>,
}

/// A scheme definition together with its registered name.
#[derive(Debug, Clone, Copy)]
pub struct Scheme<'a> {
    pub name: &'a str,
    pub definition: &'a SchemeDefinition,
}

impl Scheme<'_> {
    /// Atlas used to label `group`.
    pub fn atlas(&self, group: RegionGroup) -> Result<&Path, PipelineError> {
        let entry = match group {
            RegionGroup::Hemispheric(side) => {
                self.definition.hemispheric.as_ref().and_then(|h| match side {
                    Hemisphere::Left => h.left_atlas.as_deref(),
                    Hemisphere::Right => h.right_atlas.as_deref(),
                })
            }
            RegionGroup::Subcortical => self
                .definition
                .subcortical
                .as_ref()
                .and_then(|s| s.atlas.as_deref()),
        };
        entry.ok_or_else(|| self.missing(group, "atlas"))
    }

    /// Lookup table used to summarize `group`.
    pub fn lookup_table(&self, group: RegionGroup) -> Result<&Path, PipelineError> {
        let entry = match group {
            RegionGroup::Hemispheric(_) => self
                .definition
                .hemispheric
                .as_ref()
                .and_then(|h| h.lookup_table.as_deref()),
            RegionGroup::Subcortical => self
                .definition
                .subcortical
                .as_ref()
                .and_then(|s| s.lookup_table.as_deref()),
        };
        entry.ok_or_else(|| self.missing(group, "lookup table"))
    }

    fn missing(&self, group: RegionGroup, entry: &'static str) -> PipelineError {
        PipelineError::MissingSchemeDefinition {
            scheme: self.name.to_string(),
            region_group: group.label().to_string(),
            entry,
        }
    }
}

/// All configured schemes, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemeRegistry {
    schemes: BTreeMap<String, SchemeDefinition>,
}

impl SchemeRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a scheme.
    pub fn insert(&mut self, name: impl Into<String>, definition: SchemeDefinition) {
        self.schemes.insert(name.into(), definition);
    }

    /// Look up a scheme by name.
    pub fn get(&self, name: &str) -> Result<Scheme<'_>, PipelineError> {
        self.schemes
            .get_key_value(name)
            .map(|(name, definition)| Scheme { name, definition })
            .ok_or_else(|| PipelineError::UnknownScheme(name.to_string()))
    }

    /// Registered scheme names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemes.keys().map(String::as_str)
    }

    /// Number of registered schemes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.schemes.len()
    }

    /// Whether no scheme is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemes.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn cortical_only() -> SchemeRegistry {
        let mut registry = SchemeRegistry::new();
        registry.insert(
            "schemeX",
            SchemeDefinition {
                hemispheric: Some(HemisphericDefinition {
                    lookup_table: Some(PathBuf::from("/atlas/x.ctab")),
                    left_atlas: Some(PathBuf::from("/atlas/lh.x.gcs")),
                    right_atlas: None,
                }),
                subcortical: None,
            },
        );
        registry
    }

    #[test]
    fn resolves_present_entries() {
        let registry = cortical_only();
        let scheme = registry.get("schemeX").unwrap();
        let left = RegionGroup::Hemispheric(Hemisphere::Left);

        assert_eq!(scheme.atlas(left).unwrap(), Path::new("/atlas/lh.x.gcs"));
        assert_eq!(
            scheme.lookup_table(left).unwrap(),
            Path::new("/atlas/x.ctab")
        );
    }

    #[test]
    fn missing_entries_name_the_gap() {
        let registry = cortical_only();
        let scheme = registry.get("schemeX").unwrap();

        let right = scheme.atlas(RegionGroup::Hemispheric(Hemisphere::Right));
        assert!(matches!(
            right,
            Err(PipelineError::MissingSchemeDefinition { region_group, entry, .. })
                if region_group == "rh" && entry == "atlas"
        ));

        let sub = scheme.lookup_table(RegionGroup::Subcortical);
        assert!(matches!(
            sub,
            Err(PipelineError::MissingSchemeDefinition { entry: "lookup table", .. })
        ));
    }

    #[test]
    fn unknown_scheme() {
        let registry = cortical_only();
        assert!(matches!(
            registry.get("schemeY"),
            Err(PipelineError::UnknownScheme(name)) if name == "schemeY"
        ));
    }
}
