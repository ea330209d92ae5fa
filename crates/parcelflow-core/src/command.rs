//! # Command Module
//!
//! The six external-tool command templates and their renderer.
//!
//! Templates are whitespace-separated tokens with `{param}` placeholders.
//! Rendering substitutes each token separately, so a parameter value that
//! contains spaces remains a single argument of the resulting
//! [`CommandLine`]. Every required parameter must be supplied; a missing
//! one fails fast with `MissingParameter` instead of leaving a placeholder
//! or an empty argument behind.

use crate::PipelineError;
use crate::region::RegionCategory;
use crate::types::Stage;
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// PARAMETERS
// =============================================================================

/// A named template parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Param {
    /// Directory holding the reconstructed subject (tool subjects dir).
    InputDir,
    /// Name of the reconstructed subject inside `InputDir`.
    SubjectId,
    /// Hemisphere label (`lh`, `rh`).
    Hemi,
    /// Scheme name.
    Scheme,
    /// Classifier atlas of the scheme.
    Atlas,
    /// Color lookup table of the scheme.
    LookupTable,
    /// Cortical annotation produced by labeling.
    Annotation,
    /// Subcortical segmentation produced by labeling.
    Segmentation,
    /// Measure to export.
    Measure,
    /// Statistics report produced by extraction.
    StatsFile,
    /// Path the tool writes its artifact to.
    Output,
}

impl Param {
    pub const ALL: [Param; 11] = [
        Param::InputDir,
        Param::SubjectId,
        Param::Hemi,
        Param::Scheme,
        Param::Atlas,
        Param::LookupTable,
        Param::Annotation,
        Param::Segmentation,
        Param::Measure,
        Param::StatsFile,
        Param::Output,
    ];

    /// Placeholder name inside templates.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::InputDir => "input_dir",
            Self::SubjectId => "subject_id",
            Self::Hemi => "hemi",
            Self::Scheme => "scheme",
            Self::Atlas => "atlas",
            Self::LookupTable => "lookup_table",
            Self::Annotation => "annotation",
            Self::Segmentation => "segmentation",
            Self::Measure => "measure",
            Self::StatsFile => "stats_file",
            Self::Output => "output",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }
}

/// Parameter values for one rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandParams {
    values: BTreeMap<Param, String>,
}

impl CommandParams {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter, replacing any previous value.
    pub fn set(&mut self, param: Param, value: impl Into<String>) {
        self.values.insert(param, value.into());
    }

    /// Builder-style [`set`](Self::set).
    #[must_use]
    pub fn with(mut self, param: Param, value: impl Into<String>) -> Self {
        self.set(param, value);
        self
    }

    #[must_use]
    pub fn get(&self, param: Param) -> Option<&str> {
        self.values.get(&param).map(String::as_str)
    }
}

// =============================================================================
// TEMPLATES
// =============================================================================

const LABEL_HEMISPHERIC: &str = "mris_ca_label -sdir {input_dir} -seed 42 \
     -l {input_dir}/{subject_id}/label/{hemi}.cortex.label \
     {subject_id} {hemi} {input_dir}/{subject_id}/surf/{hemi}.sphere.reg \
     {atlas} {output}";

const LABEL_SUBCORTICAL: &str = "mri_ca_label {input_dir}/{subject_id}/mri/brain.mgz \
     {input_dir}/{subject_id}/mri/transforms/talairach.m3z {atlas} {output}";

const STATS_HEMISPHERIC: &str = "mris_anatomical_stats -mgz \
     -cortex {input_dir}/{subject_id}/label/{hemi}.cortex.label -f {output} -b \
     -a {annotation} -c {lookup_table} {subject_id} {hemi} white";

const STATS_SUBCORTICAL: &str = "mri_segstats --seg {segmentation} --ctab {lookup_table} \
     --excludeid 0 --i {input_dir}/{subject_id}/mri/norm.mgz --sum {output}";

const EXPORT_HEMISPHERIC: &str = "aparcstats2table --subjects {subject_id} --hemi {hemi} \
     --parc {scheme} --meas {measure} --delimiter comma --tablefile {output}";

const EXPORT_SUBCORTICAL: &str = "asegstats2table --inputs {stats_file} --meas {measure} \
     --delimiter comma --tablefile {output}";

/// Identifies one of the six command templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TemplateId {
    LabelHemispheric,
    LabelSubcortical,
    StatsHemispheric,
    StatsSubcortical,
    ExportHemispheric,
    ExportSubcortical,
}

impl TemplateId {
    pub const ALL: [TemplateId; 6] = [
        TemplateId::LabelHemispheric,
        TemplateId::LabelSubcortical,
        TemplateId::StatsHemispheric,
        TemplateId::StatsSubcortical,
        TemplateId::ExportHemispheric,
        TemplateId::ExportSubcortical,
    ];

    /// The template of `stage` for `category`.
    #[must_use]
    pub const fn for_stage(stage: Stage, category: RegionCategory) -> Self {
        match (stage, category) {
            (Stage::Labeling, RegionCategory::Hemispheric) => Self::LabelHemispheric,
            (Stage::Labeling, RegionCategory::Subcortical) => Self::LabelSubcortical,
            (Stage::Statistics, RegionCategory::Hemispheric) => Self::StatsHemispheric,
            (Stage::Statistics, RegionCategory::Subcortical) => Self::StatsSubcortical,
            (Stage::Export, RegionCategory::Hemispheric) => Self::ExportHemispheric,
            (Stage::Export, RegionCategory::Subcortical) => Self::ExportSubcortical,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::LabelHemispheric => "label-hemispheric",
            Self::LabelSubcortical => "label-subcortical",
            Self::StatsHemispheric => "stats-hemispheric",
            Self::StatsSubcortical => "stats-subcortical",
            Self::ExportHemispheric => "export-hemispheric",
            Self::ExportSubcortical => "export-subcortical",
        }
    }

    /// The raw template text.
    #[must_use]
    pub const fn template(self) -> &'static str {
        match self {
            Self::LabelHemispheric => LABEL_HEMISPHERIC,
            Self::LabelSubcortical => LABEL_SUBCORTICAL,
            Self::StatsHemispheric => STATS_HEMISPHERIC,
            Self::StatsSubcortical => STATS_SUBCORTICAL,
            Self::ExportHemispheric => EXPORT_HEMISPHERIC,
            Self::ExportSubcortical => EXPORT_SUBCORTICAL,
        }
    }

    /// Parameters the template cannot be rendered without.
    #[must_use]
    pub const fn required(self) -> &'static [Param] {
        use Param::{
            Annotation, Atlas, Hemi, InputDir, LookupTable, Measure, Output, Scheme, Segmentation,
            StatsFile, SubjectId,
        };
        match self {
            Self::LabelHemispheric => &[InputDir, SubjectId, Hemi, Atlas, Output],
            Self::LabelSubcortical => &[InputDir, SubjectId, Atlas, Output],
            Self::StatsHemispheric => {
                &[InputDir, SubjectId, Hemi, Annotation, LookupTable, Output]
            }
            Self::StatsSubcortical => &[InputDir, SubjectId, Segmentation, LookupTable, Output],
            Self::ExportHemispheric => &[SubjectId, Hemi, Scheme, Measure, Output],
            Self::ExportSubcortical => &[StatsFile, Measure, Output],
        }
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// COMMAND LINE
// =============================================================================

/// A rendered invocation: program plus arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Render `template` with `params`.
pub fn render(template: TemplateId, params: &CommandParams) -> Result<CommandLine, PipelineError> {
    for &param in template.required() {
        if params.get(param).is_none() {
            return Err(PipelineError::MissingParameter {
                template: template.name(),
                parameter: param.name(),
            });
        }
    }

    let mut tokens = template
        .template()
        .split_whitespace()
        .map(|token| substitute(template, token, params));

    let program = match tokens.next() {
        Some(program) => program?,
        None => {
            return Err(PipelineError::ConfigError(format!(
                "Template '{}' is empty",
                template
            )));
        }
    };
    let args = tokens.collect::<Result<Vec<_>, _>>()?;

    Ok(CommandLine { program, args })
}

fn substitute(
    template: TemplateId,
    token: &str,
    params: &CommandParams,
) -> Result<String, PipelineError> {
    let mut out = String::with_capacity(token.len());
    let mut rest = token;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            return Err(PipelineError::ConfigError(format!(
                "Template '{}' has an unclosed placeholder in '{}'",
                template, token
            )));
        };
        let name = &after[..close];
        let param = Param::from_name(name).ok_or_else(|| {
            PipelineError::ConfigError(format!(
                "Template '{}' has unknown placeholder '{}'",
                template, name
            ))
        })?;
        let value = params
            .get(param)
            .ok_or(PipelineError::MissingParameter {
                template: template.name(),
                parameter: param.name(),
            })?;
        out.push_str(value);
        rest = &after[close + 1..];
    }
    out.push_str(rest);

    Ok(out)
}

// =============================================================================
// TESTS
// =============================================================================
