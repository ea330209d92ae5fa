//! # Region Module
//!
//! Region groups and their permitted measures.
//!
//! A region group is either one cortical hemisphere or the subcortical
//! segmentation. The two categories carry disjoint, fixed measure sets;
//! a measure is valid only against the set of its own category, even when
//! both sets share a literal name (`volume`).

use crate::PipelineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// MEASURES
// =============================================================================

/// A measure a region group may be summarized by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasureDefinition {
    /// Name used on the command line and in filenames.
    pub name: &'static str,
    /// Column of the statistics report holding this measure, if any.
    pub stats_column: Option<&'static str>,
}

const fn measure(name: &'static str, stats_column: Option<&'static str>) -> MeasureDefinition {
    MeasureDefinition { name, stats_column }
}

/// Measures permitted for a cortical hemisphere, in declared order.
pub const HEMISPHERIC_MEASURES: &[MeasureDefinition] = &[
    measure("area", Some("SurfArea")),
    measure("volume", Some("GrayVol")),
    measure("thickness", Some("ThickAvg")),
    measure("thicknessstd", Some("ThickStd")),
    // Sampled from the T1 intensity table, absent from the surface report.
    measure("thickness.T1", None),
    measure("meancurv", Some("MeanCurv")),
    measure("gauscurv", Some("GausCurv")),
    measure("foldind", Some("FoldInd")),
    measure("curvind", Some("CurvInd")),
];

/// Measures permitted for the subcortical segmentation, in declared order.
pub const SUBCORTICAL_MEASURES: &[MeasureDefinition] = &[
    measure("volume", Some("Volume_mm3")),
    measure("std", Some("normStdDev")),
    measure("mean", Some("normMean")),
];

// =============================================================================
// REGION CATEGORY
// =============================================================================

/// The two mutually exclusive region categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionCategory {
    Hemispheric,
    Subcortical,
}

impl RegionCategory {
    /// Category name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Hemispheric => "hemispheric",
            Self::Subcortical => "subcortical",
        }
    }

    /// The fixed measure set of this category.
    #[must_use]
    pub const fn measures(self) -> &'static [MeasureDefinition] {
        match self {
            Self::Hemispheric => HEMISPHERIC_MEASURES,
            Self::Subcortical => SUBCORTICAL_MEASURES,
        }
    }

    /// Look up a measure in this category's set.
    #[must_use]
    pub fn measure(self, name: &str) -> Option<&'static MeasureDefinition> {
        self.measures().iter().find(|m| m.name == name)
    }

    /// Fail with `InvalidMeasure` unless `measure` belongs to this category.
    pub fn validate(self, measure: &str) -> Result<(), PipelineError> {
        match self.measure(measure) {
            Some(_) => Ok(()),
            None => Err(PipelineError::InvalidMeasure {
                measure: measure.to_string(),
                region_group: self.name().to_string(),
            }),
        }
    }
}

impl fmt::Display for RegionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RegionCategory {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hemispheric" | "cortical" => Ok(Self::Hemispheric),
            "subcortical" => Ok(Self::Subcortical),
            _ => Err(PipelineError::UnsupportedRegionGroup(s.to_string())),
        }
    }
}

// =============================================================================
// REGION GROUP
// =============================================================================

/// Cortical hemisphere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hemisphere {
    Left,
    Right,
}

impl Hemisphere {
    /// Toolkit side label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Left => "lh",
            Self::Right => "rh",
        }
    }
}

/// A region group: one hemisphere, or the subcortical segmentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RegionGroup {
    Hemispheric(Hemisphere),
    Subcortical,
}

impl RegionGroup {
    /// All region groups in declared iteration order.
    pub const ALL: [RegionGroup; 3] = [
        RegionGroup::Hemispheric(Hemisphere::Left),
        RegionGroup::Hemispheric(Hemisphere::Right),
        RegionGroup::Subcortical,
    ];

    /// Label used in filenames and table rows (`lh`, `rh`, `subcortex`).
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Hemispheric(side) => side.label(),
            Self::Subcortical => "subcortex",
        }
    }

    /// The category this group belongs to.
    #[must_use]
    pub const fn category(self) -> RegionCategory {
        match self {
            Self::Hemispheric(_) => RegionCategory::Hemispheric,
            Self::Subcortical => RegionCategory::Subcortical,
        }
    }

    /// Fail with `InvalidMeasure` unless `measure` is permitted here.
    pub fn validate(self, measure: &str) -> Result<(), PipelineError> {
        self.category().validate(measure)
    }

    /// Resolve a measure selection for this group.
    ///
    /// An empty selection means every declared measure, in declared order.
    /// Otherwise every requested measure is validated and kept in the
    /// category's declared order.
    pub fn resolve_measures(self, requested: &[String]) -> Result<Vec<String>, PipelineError> {
        let measures = self.category().measures();
        if requested.is_empty() {
            return Ok(measures.iter().map(|m| m.name.to_string()).collect());
        }
        for name in requested {
            self.validate(name)?;
        }
        Ok(measures
            .iter()
            .filter(|m| requested.iter().any(|r| r == m.name))
            .map(|m| m.name.to_string())
            .collect())
    }
}

impl fmt::Display for RegionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for RegionGroup {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lh" | "left" => Ok(Self::Hemispheric(Hemisphere::Left)),
            "rh" | "right" => Ok(Self::Hemispheric(Hemisphere::Right)),
            "subcortex" | "subcortical" => Ok(Self::Subcortical),
            _ => Err(PipelineError::UnsupportedRegionGroup(s.to_string())),
        }
    }
}

/// Validate a measure against a region group given by name.
///
/// `region_group` may be a category (`hemispheric`, `subcortical`) or a
/// group label (`lh`, `rh`, `subcortex`). Any other name fails with
/// `UnsupportedRegionGroup` rather than passing silently.
pub fn validate(region_group: &str, measure: &str) -> Result<(), PipelineError> {
    let category = match region_group.parse::<RegionCategory>() {
        Ok(category) => category,
        Err(_) => region_group.parse::<RegionGroup>()?.category(),
    };
    category.validate(measure)
}

// =============================================================================
// TESTS
// =============================================================================
