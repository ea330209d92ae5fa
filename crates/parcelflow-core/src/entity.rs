//! # Entity Module
//!
//! Filesystem-embedded semantic entities.
//!
//! A filename such as `sub-01_ses-02_ce-corrected_T1w.nii.gz` carries a set
//! of `key-value` components separated by `_`, an optional trailing suffix
//! and an extension. The [`EntityRegistry`] owns the recognized entity names,
//! their filename keys and their matching rules; it parses filenames into an
//! [`EntityMapping`] and renders mappings back into filenames, either in
//! canonical order or through a `{entity}` filename pattern.

use crate::PipelineError;
use crate::primitives::{ENTITY_DELIMITER, KEY_VALUE_DELIMITER};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// ENTITY DEFINITIONS
// =============================================================================

/// How an entity is located inside a filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    /// A `key-value` component whose value matches the pattern.
    Keyed {
        key: &'static str,
        pattern: &'static str,
    },
    /// The last `_`-separated component when it carries no key.
    Suffix,
    /// Everything from the first `.` of the filename.
    Extension,
}

/// A registered entity: its name and matching rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityDefinition {
    pub name: &'static str,
    pub kind: EntityKind,
}

const ALNUM: &str = "[a-zA-Z0-9]+";

const fn keyed(name: &'static str, key: &'static str) -> EntityDefinition {
    EntityDefinition {
        name,
        kind: EntityKind::Keyed {
            key,
            pattern: ALNUM,
        },
    }
}

/// The standard registry, in canonical rendering order.
pub const STANDARD_ENTITIES: &[EntityDefinition] = &[
    keyed("subject", "sub"),
    keyed("session", "ses"),
    keyed("task", "task"),
    keyed("acquisition", "acq"),
    keyed("ceagent", "ce"),
    keyed("reconstruction", "rec"),
    keyed("run", "run"),
    keyed("from", "from"),
    keyed("to", "to"),
    keyed("mode", "mode"),
    EntityDefinition {
        name: "hemi",
        kind: EntityKind::Keyed {
            key: "hemi",
            pattern: "L|R",
        },
    },
    keyed("space", "space"),
    keyed("atlas", "atlas"),
    keyed("roi", "roi"),
    keyed("den", "den"),
    keyed("resolution", "res"),
    keyed("label", "label"),
    keyed("model", "model"),
    keyed("subset", "subset"),
    keyed("desc", "desc"),
    // Derivative entities addressed by stage filename patterns.
    keyed("region", "region"),
    keyed("scheme", "scheme"),
    keyed("measure", "measure"),
    EntityDefinition {
        name: "suffix",
        kind: EntityKind::Suffix,
    },
    EntityDefinition {
        name: "extension",
        kind: EntityKind::Extension,
    },
];

// =============================================================================
// ENTITY MAPPING
// =============================================================================

/// Mapping from registered entity name to its opaque string value.
///
/// Values are never coerced: `run-01` keeps the value `"01"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMapping {
    entries: BTreeMap<String, String>,
}

impl EntityMapping {
    /// Create an empty mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the value of an entity.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    /// Set the value of an entity, replacing any previous one.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(name.into(), value.into());
    }

    /// Builder-style [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Number of entities present.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entity is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EntityMapping {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

// =============================================================================
// ENTITY REGISTRY
// =============================================================================

/// The registry of recognized entities and their compiled matchers.
#[derive(Debug, Clone)]
pub struct EntityRegistry {
    definitions: Vec<EntityDefinition>,
    /// One matcher per definition; `None` for positional entities.
    matchers: Vec<Option<Regex>>,
}

impl EntityRegistry {
    /// Build the standard registry.
    pub fn standard() -> Result<Self, PipelineError> {
        Self::with_definitions(STANDARD_ENTITIES)
    }

    /// Build a registry from definitions given in canonical order.
    pub fn with_definitions(definitions: &[EntityDefinition]) -> Result<Self, PipelineError> {
        let matchers = definitions
            .iter()
            .map(|def| match def.kind {
                EntityKind::Keyed { key, pattern } => {
                    Regex::new(&format!("^{key}{KEY_VALUE_DELIMITER}({pattern})$"))
                        .map(Some)
                        .map_err(|e| {
                            PipelineError::ConfigError(format!(
                                "Invalid pattern for entity '{}': {}",
                                def.name, e
                            ))
                        })
                }
                EntityKind::Suffix | EntityKind::Extension => Ok(None),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            definitions: definitions.to_vec(),
            matchers,
        })
    }

    /// Whether `name` is a registered entity.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.definitions.iter().any(|def| def.name == name)
    }

    /// Fail with `UnknownEntity` unless `name` is registered.
    pub fn ensure_known(&self, name: &str) -> Result<(), PipelineError> {
        if self.contains(name) {
            Ok(())
        } else {
            Err(PipelineError::UnknownEntity(name.to_string()))
        }
    }

    /// Registered definitions in canonical order.
    #[must_use]
    pub fn definitions(&self) -> &[EntityDefinition] {
        &self.definitions
    }

    /// Extract every registered entity found in `filename`.
    ///
    /// Components that match no registered entity are ignored; entities that
    /// do not appear are simply absent. When a key appears twice the first
    /// occurrence wins.
    #[must_use]
    pub fn parse(&self, filename: &str) -> EntityMapping {
        let mut mapping = EntityMapping::new();

        let (stem, extension) = match filename.find('.') {
            Some(idx) => (&filename[..idx], Some(&filename[idx..])),
            None => (filename, None),
        };

        let components: Vec<&str> = stem
            .split(ENTITY_DELIMITER)
            .filter(|part| !part.is_empty())
            .collect();

        for (position, component) in components.iter().enumerate() {
            if !component.contains(KEY_VALUE_DELIMITER) {
                if position + 1 == components.len() && self.contains("suffix") {
                    mapping.insert("suffix", *component);
                }
                continue;
            }
            for (def, matcher) in self.definitions.iter().zip(&self.matchers) {
                let Some(re) = matcher else { continue };
                if mapping.get(def.name).is_some() {
                    continue;
                }
                if let Some(value) = re.captures(component).and_then(|c| c.get(1)) {
                    mapping.insert(def.name, value.as_str());
                    break;
                }
            }
        }

        if let Some(ext) = extension {
            if self.contains("extension") {
                mapping.insert("extension", ext);
            }
        }

        mapping
    }

    /// Merge `overrides` on top of `base`; overrides win.
    ///
    /// Fails with `UnknownEntity` on the first name, in either mapping,
    /// outside the registry.
    pub fn merge(
        &self,
        base: &EntityMapping,
        overrides: &EntityMapping,
    ) -> Result<EntityMapping, PipelineError> {
        for (name, _) in base.iter() {
            self.ensure_known(name)?;
        }
        let mut merged = base.clone();
        for (name, value) in overrides.iter() {
            self.ensure_known(name)?;
            merged.insert(name, value);
        }
        Ok(merged)
    }

    /// Serialize `mapping` plus `overrides` into canonical filename form.
    ///
    /// Keyed entities come first in registry order, then the suffix, then
    /// the extension.
    pub fn render(
        &self,
        mapping: &EntityMapping,
        overrides: &EntityMapping,
    ) -> Result<String, PipelineError> {
        let merged = self.merge(mapping, overrides)?;

        let mut parts: Vec<String> = Vec::new();
        let mut suffix = None;
        let mut extension = None;

        for def in &self.definitions {
            let Some(value) = merged.get(def.name) else {
                continue;
            };
            match def.kind {
                EntityKind::Keyed { key, .. } => {
                    parts.push(format!("{key}{KEY_VALUE_DELIMITER}{value}"));
                }
                EntityKind::Suffix => suffix = Some(value),
                EntityKind::Extension => extension = Some(value),
            }
        }

        if let Some(suffix) = suffix {
            parts.push(suffix.to_string());
        }
        let delimiter = ENTITY_DELIMITER.to_string();
        let mut rendered = parts.join(delimiter.as_str());
        if let Some(ext) = extension {
            rendered.push_str(ext);
        }
        Ok(rendered)
    }

    /// Render a `{entity}` filename pattern from `mapping` plus `overrides`.
    ///
    /// - Placeholders outside the registry fail with `UnknownEntity`.
    /// - Registered placeholders with no value fail with `UnresolvedEntity`.
    /// - Text outside placeholders is copied verbatim.
    pub fn render_pattern(
        &self,
        pattern: &str,
        mapping: &EntityMapping,
        overrides: &EntityMapping,
    ) -> Result<String, PipelineError> {
        let merged = self.merge(mapping, overrides)?;
        let mut rendered = String::with_capacity(pattern.len());
        let mut rest = pattern;

        while let Some(open) = rest.find('{') {
            rendered.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let close = after.find('}').ok_or_else(|| {
                PipelineError::ConfigError(format!("Unclosed placeholder in pattern '{pattern}'"))
            })?;
            let name = &after[..close];
            self.ensure_known(name)?;
            let value = merged
                .get(name)
                .ok_or_else(|| PipelineError::UnresolvedEntity(name.to_string()))?;
            rendered.push_str(value);
            rest = &after[close + 1..];
        }
        rendered.push_str(rest);

        Ok(rendered)
    }

    /// Whether `mapping` satisfies every `entity = value` filter.
    ///
    /// Fails with `UnknownEntity` if a filter names an unregistered entity.
    pub fn matches(
        &self,
        mapping: &EntityMapping,
        filters: &BTreeMap<String, String>,
    ) -> Result<bool, PipelineError> {
        for name in filters.keys() {
            self.ensure_known(name)?;
        }
        Ok(filters
            .iter()
            .all(|(name, value)| mapping.get(name) == Some(value.as_str())))
    }
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

    #[test]
    fn parse_extracts_keyed_suffix_and_extension() {
        let mapping = registry().parse("sub-01_ses-02_ce-corrected_T1w.nii.gz");

        assert_eq!(mapping.get("subject"), Some("01"));
        assert_eq!(mapping.get("session"), Some("02"));
        assert_eq!(mapping.get("ceagent"), Some("corrected"));
        assert_eq!(mapping.get("suffix"), Some("T1w"));
        assert_eq!(mapping.get("extension"), Some(".nii.gz"));
        assert_eq!(mapping.len(), 5);
    }

    #[test]
    fn parse_ignores_unregistered_components() {
        let mapping = registry().parse("sub-01_foo-bar_T1w");

        assert_eq!(mapping.get("subject"), Some("01"));
        assert_eq!(mapping.get("suffix"), Some("T1w"));
        assert_eq!(mapping.len(), 2);
    }

    #[test]
    fn parse_respects_value_patterns() {
        // hemi only admits L or R
        let mapping = registry().parse("sub-01_hemi-lh_midthickness.surf.gii");
        assert_eq!(mapping.get("hemi"), None);

        let mapping = registry().parse("sub-01_hemi-L_midthickness.surf.gii");
        assert_eq!(mapping.get("hemi"), Some("L"));
    }

    #[test]
    fn render_canonical_roundtrip() {
        let reg = registry();
        let name = "sub-01_ses-02_acq-mprage_ce-corrected_T1w.nii.gz";
        let rendered = reg.render(&reg.parse(name), &EntityMapping::new()).unwrap();
        assert_eq!(rendered, name);
    }

    #[test]
    fn render_orders_by_registry() {
        let reg = registry();
        let mapping = EntityMapping::new()
            .with("desc", "brain")
            .with("subject", "01")
            .with("suffix", "mask");
        let rendered = reg.render(&mapping, &EntityMapping::new()).unwrap();
        assert_eq!(rendered, "sub-01_desc-brain_mask");
    }

    #[test]
    fn overrides_win() {
        let reg = registry();
        let mapping = reg.parse("sub-01_ses-02_T1w.nii.gz");
        let overrides = EntityMapping::new().with("session", "03").with("desc", "x");
        let rendered = reg.render(&mapping, &overrides).unwrap();
        assert_eq!(rendered, "sub-01_ses-03_desc-x_T1w.nii.gz");
    }

    #[test]
    fn unknown_override_rejected() {
        let reg = registry();
        let overrides = EntityMapping::new().with("colour", "blue");
        let result = reg.render(&EntityMapping::new(), &overrides);
        assert!(matches!(result, Err(PipelineError::UnknownEntity(name)) if name == "colour"));
    }

    #[test]
    fn unknown_base_entity_rejected() {
        let reg = registry();
        let mapping = EntityMapping::new()
            .with("subject", "01")
            .with("colour", "blue")
            .with("suffix", "T1w");
        let empty = EntityMapping::new();

        assert!(matches!(
            reg.render(&mapping, &empty),
            Err(PipelineError::UnknownEntity(name)) if name == "colour"
        ));
        assert!(matches!(
            reg.render_pattern("sub-{subject}.txt", &mapping, &empty),
            Err(PipelineError::UnknownEntity(name)) if name == "colour"
        ));
    }

    #[test]
    fn pattern_substitutes_placeholders() {
        let reg = registry();
        let overrides = EntityMapping::new()
            .with("region", "lh")
            .with("scheme", "schemeX")
            .with("measure", "thickness.T1");
        let rendered = reg
            .render_pattern(
                "{region}_{measure}.{scheme}.csv",
                &EntityMapping::new(),
                &overrides,
            )
            .unwrap();
        assert_eq!(rendered, "lh_thickness.T1.schemeX.csv");
    }

    #[test]
    fn pattern_rejects_unknown_and_unresolved() {
        let reg = registry();
        let empty = EntityMapping::new();

        let unknown = reg.render_pattern("{planet}.txt", &empty, &empty);
        assert!(matches!(unknown, Err(PipelineError::UnknownEntity(_))));

        let unresolved = reg.render_pattern("{scheme}.txt", &empty, &empty);
        assert!(matches!(unresolved, Err(PipelineError::UnresolvedEntity(name)) if name == "scheme"));

        let unclosed = reg.render_pattern("{scheme.txt", &empty, &empty);
        assert!(matches!(unclosed, Err(PipelineError::ConfigError(_))));
    }

    #[test]
    fn filters_match_on_values() {
        let reg = registry();
        let mapping = reg.parse("sub-01_ce-corrected_T1w");
        let mut filters = BTreeMap::new();
        filters.insert("ceagent".to_string(), "corrected".to_string());
        assert!(reg.matches(&mapping, &filters).unwrap());

        filters.insert("ceagent".to_string(), "raw".to_string());
        assert!(!reg.matches(&mapping, &filters).unwrap());

        filters.insert("flavour".to_string(), "x".to_string());
        assert!(matches!(
            reg.matches(&mapping, &filters),
            Err(PipelineError::UnknownEntity(_))
        ));
    }

    #[test]
    fn invalid_definition_pattern_reported() {
        let defs = [EntityDefinition {
            name: "broken",
            kind: EntityKind::Keyed {
                key: "b",
                pattern: "(",
            },
        }];
        assert!(matches!(
            EntityRegistry::with_definitions(&defs),
            Err(PipelineError::ConfigError(_))
        ));
    }
}
