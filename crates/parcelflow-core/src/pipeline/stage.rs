//! Where each stage writes its artifact.
//!
//! | stage      | hemispheric                          | subcortical                          |
//! |------------|--------------------------------------|--------------------------------------|
//! | labeling   | `label/{region}.{scheme}.annot`      | `mri/{scheme}_subcortex.mgz`         |
//! | statistics | `stats/{region}.{scheme}.stats`      | `stats/{scheme}_subcortex.stats`     |
//! | export     | `stats/{region}_{measure}.{scheme}.csv` | `stats/{scheme}_subcortex_{measure}.csv` |
//!
//! Table fragments are cached beside the exports with a `.fragment`
//! extension.

use crate::entity::EntityMapping;
use crate::primitives::{LABEL_DIR, MRI_DIR, STATS_DIR};
use crate::region::{RegionCategory, RegionGroup};
use crate::types::Stage;

/// Destination subdirectory and filename pattern of one artifact kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSpec {
    pub destination: &'static str,
    pub pattern: &'static str,
}

impl OutputSpec {
    /// Output of `stage` for `category`.
    #[must_use]
    pub const fn for_stage(stage: Stage, category: RegionCategory) -> Self {
        let (destination, pattern) = match (stage, category) {
            (Stage::Labeling, RegionCategory::Hemispheric) => {
                (LABEL_DIR, "{region}.{scheme}.annot")
            }
            (Stage::Labeling, RegionCategory::Subcortical) => (MRI_DIR, "{scheme}_subcortex.mgz"),
            (Stage::Statistics, RegionCategory::Hemispheric) => {
                (STATS_DIR, "{region}.{scheme}.stats")
            }
            (Stage::Statistics, RegionCategory::Subcortical) => {
                (STATS_DIR, "{scheme}_subcortex.stats")
            }
            (Stage::Export, RegionCategory::Hemispheric) => {
                (STATS_DIR, "{region}_{measure}.{scheme}.csv")
            }
            (Stage::Export, RegionCategory::Subcortical) => {
                (STATS_DIR, "{scheme}_subcortex_{measure}.csv")
            }
        };
        Self {
            destination,
            pattern,
        }
    }

    /// Cached table fragment for `category`.
    #[must_use]
    pub const fn fragment(category: RegionCategory) -> Self {
        let pattern = match category {
            RegionCategory::Hemispheric => "{region}_{measure}.{scheme}.fragment",
            RegionCategory::Subcortical => "{scheme}_subcortex_{measure}.fragment",
        };
        Self {
            destination: STATS_DIR,
            pattern,
        }
    }
}

/// Entity overrides of a unit: region and scheme, plus the measure for
/// exports and fragments.
#[must_use]
pub fn overrides(group: RegionGroup, scheme: &str, measure: Option<&str>) -> EntityMapping {
    let mapping = EntityMapping::new()
        .with("region", group.label())
        .with("scheme", scheme);
    match measure {
        Some(measure) => mapping.with("measure", measure),
        None => mapping,
    }
}
