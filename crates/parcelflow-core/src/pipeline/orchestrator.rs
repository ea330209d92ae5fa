//! # Cascading Orchestrator
//!
//! Walks subject → session → source → region group → measure and runs
//! each stage only when its artifact is missing (or `force` is set).
//!
//! Every public stage entry point first checks everything the cascade will
//! need (scheme entries, measure validity) so that validation failures
//! happen before any tool is spawned. Each stage then calls its upstream
//! stage, which is idempotent through the same cache rule, so asking for an
//! export transitively produces the annotation and the statistics report.
//!
//! Subjects are independent. With `jobs > 1` they run on a worker pool;
//! their tables are merged afterwards by a single writer in sorted subject
//! order, so the result does not depend on scheduling.

use crate::PipelineError;
use crate::cache::CacheProbe;
use crate::command::{self, CommandParams, Param, TemplateId};
use crate::executor::{self, CancellationToken, Invocation, StageExecutor};
use crate::formats::{read_fragment, write_fragment};
use crate::layout::{DataGrabber, SourceFile, SubjectSources};
use crate::path::{PathBuilder, Reference, partial_path};
use crate::pipeline::report::{DatasetReport, RunRequest, SubjectReport};
use crate::pipeline::stage::{OutputSpec, overrides};
use crate::pipeline::unit::{RunContext, StageOutcome, Target, UnitRecord, UnitState};
use crate::primitives::SUBJECT_PREFIX;
use crate::region::RegionGroup;
use crate::scheme::SchemeRegistry;
use crate::stats::{LookupTable, StatsParser, StatsTable};
use crate::table::{RowKey, Table};
use crate::types::Stage;
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// Region groups of a run with their resolved measures.
type GroupPlan = Vec<(RegionGroup, Vec<String>)>;

/// Drives the stage cascade over a dataset.
pub struct Orchestrator<'a> {
    paths: PathBuilder,
    schemes: &'a SchemeRegistry,
    executor: &'a dyn StageExecutor,
    cache: &'a dyn CacheProbe,
    parser: &'a dyn StatsParser,
    cancel: CancellationToken,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        paths: PathBuilder,
        schemes: &'a SchemeRegistry,
        executor: &'a dyn StageExecutor,
        cache: &'a dyn CacheProbe,
        parser: &'a dyn StatsParser,
    ) -> Self {
        Self {
            paths,
            schemes,
            executor,
            cache,
            parser,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally controlled cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    #[must_use]
    pub fn paths(&self) -> &PathBuilder {
        &self.paths
    }

    // =========================================================================
    // CANONICAL PATHS
    // =========================================================================

    /// Canonical artifact of `stage` for a target.
    ///
    /// Exports need a measure; the other stages ignore it.
    pub fn output_path(
        &self,
        target: Target<'_>,
        stage: Stage,
        measure: Option<&str>,
    ) -> Result<PathBuf, PipelineError> {
        let measure = if stage == Stage::Export { measure } else { None };
        self.build(
            target,
            OutputSpec::for_stage(stage, target.group.category()),
            measure,
        )
    }

    /// Canonical cached fragment of a unit.
    pub fn fragment_path(&self, target: Target<'_>, measure: &str) -> Result<PathBuf, PipelineError> {
        self.build(
            target,
            OutputSpec::fragment(target.group.category()),
            Some(measure),
        )
    }

    fn build(
        &self,
        target: Target<'_>,
        spec: OutputSpec,
        measure: Option<&str>,
    ) -> Result<PathBuf, PipelineError> {
        self.paths.build_path(
            Reference::Entities {
                root: &target.source.path,
                entities: &target.source.entities,
            },
            spec.destination,
            spec.pattern,
            &overrides(target.group, target.scheme, measure),
        )
    }

    // =========================================================================
    // STAGES
    // =========================================================================

    /// Fail unless the cascade up to `stage` has everything it needs.
    fn preflight(
        &self,
        target: Target<'_>,
        stage: Stage,
        measure: Option<&str>,
    ) -> Result<(), PipelineError> {
        if let Some(measure) = measure {
            target.group.validate(measure)?;
        }
        let scheme = self.schemes.get(target.scheme)?;
        scheme.atlas(target.group)?;
        if stage >= Stage::Statistics {
            scheme.lookup_table(target.group)?;
        }
        Ok(())
    }

    /// Region labeling for a target.
    pub fn run_labeling(
        &self,
        ctx: &mut RunContext,
        target: Target<'_>,
    ) -> Result<StageOutcome, PipelineError> {
        self.preflight(target, Stage::Labeling, None)?;
        self.labeling(ctx, target)
    }

    /// Statistics extraction for a target, labeling first.
    pub fn run_statistics(
        &self,
        ctx: &mut RunContext,
        target: Target<'_>,
    ) -> Result<StageOutcome, PipelineError> {
        self.preflight(target, Stage::Statistics, None)?;
        self.statistics(ctx, target)
    }

    /// Table export of one measure, statistics first.
    pub fn run_export(
        &self,
        ctx: &mut RunContext,
        target: Target<'_>,
        measure: &str,
    ) -> Result<StageOutcome, PipelineError> {
        self.preflight(target, Stage::Export, Some(measure))?;
        self.export(ctx, target, measure)
    }

    fn labeling(
        &self,
        ctx: &mut RunContext,
        target: Target<'_>,
    ) -> Result<StageOutcome, PipelineError> {
        let scheme = self.schemes.get(target.scheme)?;
        let params = base_params(target).with(Param::Atlas, display(scheme.atlas(target.group)?));
        self.run_step(ctx, target, Stage::Labeling, None, params)
    }

    fn statistics(
        &self,
        ctx: &mut RunContext,
        target: Target<'_>,
    ) -> Result<StageOutcome, PipelineError> {
        let labels = self.labeling(ctx, target)?;
        let scheme = self.schemes.get(target.scheme)?;
        let labels_param = match target.group {
            RegionGroup::Hemispheric(_) => Param::Annotation,
            RegionGroup::Subcortical => Param::Segmentation,
        };
        let params = base_params(target)
            .with(Param::LookupTable, display(scheme.lookup_table(target.group)?))
            .with(labels_param, display(&labels.path));
        self.run_step(ctx, target, Stage::Statistics, None, params)
    }

    fn export(
        &self,
        ctx: &mut RunContext,
        target: Target<'_>,
        measure: &str,
    ) -> Result<StageOutcome, PipelineError> {
        let stats = self.statistics(ctx, target)?;
        let params = base_params(target)
            .with(Param::Measure, measure)
            .with(Param::StatsFile, display(&stats.path));
        self.run_step(ctx, target, Stage::Export, Some(measure), params)
    }

    /// Run one stage unless its artifact is cached.
    fn run_step(
        &self,
        ctx: &mut RunContext,
        target: Target<'_>,
        stage: Stage,
        measure: Option<&str>,
        mut params: CommandParams,
    ) -> Result<StageOutcome, PipelineError> {
        self.cancel.checkpoint()?;
        let output = self.output_path(target, stage, measure)?;

        if let Some(e) = ctx.failure(&output) {
            tracing::debug!(stage = %stage, path = %output.display(), "Stage already failed in this run");
            return Err(e.clone());
        }

        if ctx.is_refreshed(&output) || (!ctx.force() && self.cache.is_cached(&output)) {
            tracing::debug!(stage = %stage, path = %output.display(), "Stage output cached");
            return Ok(StageOutcome {
                stage,
                path: output,
                state: UnitState::Cached,
            });
        }

        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, &e))?;
        }
        let partial = partial_path(&output);
        params.set(Param::Output, display(&partial));
        let template = TemplateId::for_stage(stage, target.group.category());
        let invocation = Invocation {
            stage,
            template,
            command: command::render(template, &params)?,
            subjects_dir: target.source.input_dir().to_path_buf(),
            partial,
            output,
        };

        tracing::info!(
            stage = %stage,
            subject = %target.source.subject,
            session = %target.source.session,
            region = %target.group,
            state = %UnitState::Running,
            command = %invocation.command,
            "Running stage"
        );

        let result = self
            .executor
            .execute(&invocation, &self.cancel)
            .and_then(|_| executor::commit_output(&invocation));
        if let Err(e) = result {
            executor::discard_output(&invocation);
            if e.is_recoverable() {
                ctx.mark_failed(&invocation.output, &e);
            }
            tracing::warn!(
                stage = %stage,
                path = %invocation.output.display(),
                state = %UnitState::Failed,
                error = %e,
                "Stage failed"
            );
            return Err(e);
        }

        ctx.mark_refreshed(&invocation.output);
        Ok(StageOutcome {
            stage,
            path: invocation.output,
            state: UnitState::Succeeded,
        })
    }

    // =========================================================================
    // TABLE FRAGMENTS
    // =========================================================================

    /// Table fragment of one unit.
    ///
    /// A cached fragment is loaded before anything else runs, unless the
    /// run is forced. Otherwise the cascade runs up to `top` (statistics or
    /// export) and the statistics report is parsed and cached. An unreadable
    /// cached fragment is recomputed.
    pub fn collect_fragment(
        &self,
        ctx: &mut RunContext,
        target: Target<'_>,
        measure: &str,
        top: Stage,
    ) -> Result<(Table, UnitState), PipelineError> {
        let top = top.max(Stage::Statistics);
        self.preflight(target, top, Some(measure))?;

        let fragment_path = self.fragment_path(target, measure)?;
        if ctx.is_refreshed(&fragment_path)
            || (!ctx.force() && self.cache.is_cached(&fragment_path))
        {
            match read_fragment(&fragment_path) {
                Ok(fragment) => {
                    tracing::debug!(path = %fragment_path.display(), "Fragment cached");
                    return Ok((fragment, UnitState::Cached));
                }
                Err(e) => tracing::warn!(
                    path = %fragment_path.display(),
                    error = %e,
                    "Recomputing unreadable fragment"
                ),
            }
        }

        if top == Stage::Export {
            self.export(ctx, target, measure)?;
        } else {
            self.statistics(ctx, target)?;
        }

        let scheme = self.schemes.get(target.scheme)?;
        let lookup = LookupTable::read(scheme.lookup_table(target.group)?)?;
        let report = self.output_path(target, Stage::Statistics, None)?;
        let stats = self.parser.parse(&report, &lookup)?;
        let fragment = build_fragment(target, measure, &stats);

        write_fragment(&fragment_path, &fragment)?;
        ctx.mark_refreshed(&fragment_path);
        Ok((fragment, UnitState::Succeeded))
    }

    // =========================================================================
    // SUBJECTS AND DATASETS
    // =========================================================================

    fn run_source(
        &self,
        ctx: &mut RunContext,
        source: &SourceFile,
        request: &RunRequest,
        plan: &GroupPlan,
        units: &mut Vec<UnitRecord>,
        table: &mut Table,
    ) -> Result<(), PipelineError> {
        for (group, measures) in plan {
            let target = Target {
                source,
                scheme: &request.scheme,
                group: *group,
            };
            if request.stage == Stage::Labeling {
                let result = self.run_labeling(ctx, target).map(|o| o.state);
                units.push(record(target, None, result)?);
                continue;
            }
            for measure in measures {
                let result = self
                    .collect_fragment(ctx, target, measure, request.stage)
                    .map(|(fragment, state)| {
                        table.merge(&fragment);
                        state
                    });
                units.push(record(target, Some(measure.as_str()), result)?);
            }
        }
        Ok(())
    }

    /// Run every selected unit of one subject.
    ///
    /// A source without its reference image fails the whole subject before
    /// any tool runs. Recoverable unit errors are recorded and the run goes
    /// on; anything else is returned.
    pub fn run_subject(
        &self,
        subject: &str,
        sessions: &SubjectSources,
        request: &RunRequest,
    ) -> Result<(SubjectReport, Table), PipelineError> {
        let plan = resolve_plan(request)?;
        let sources: Vec<&SourceFile> = sessions
            .iter()
            .filter(|(session, _)| request.includes_session(session))
            .flat_map(|(_, sources)| sources.iter())
            .collect();

        for source in &sources {
            if let Err(e) = source.require_reference() {
                tracing::warn!(subject = %subject, error = %e, "Skipping subject");
                return Ok((
                    SubjectReport::Failed {
                        error: e.to_string(),
                    },
                    Table::new(),
                ));
            }
        }
        if sources.is_empty() {
            tracing::warn!(subject = %subject, "No sources matched");
        }

        let mut ctx = RunContext::new(request.force);
        let mut units = Vec::new();
        let mut table = Table::new();
        for source in sources {
            self.run_source(&mut ctx, source, request, &plan, &mut units, &mut table)?;
        }
        tracing::info!(subject = %subject, units = units.len(), "Subject finished");
        Ok((SubjectReport::Completed { units }, table))
    }

    /// Run a request over a dataset.
    ///
    /// Validation errors (unknown scheme, invalid measure, unknown filter
    /// entity) are returned before any tool runs. Missing subjects and
    /// subjects without a reference image are reported as failed.
    pub fn run_dataset(
        &self,
        grabber: &DataGrabber,
        request: &RunRequest,
    ) -> Result<DatasetReport, PipelineError> {
        self.schemes.get(&request.scheme)?;
        resolve_plan(request)?;

        let registry = self.paths.registry();
        let pending: Vec<(String, Result<SubjectSources, PipelineError>)> =
            if request.participants.is_empty() {
                grabber
                    .query_subjects(registry)?
                    .into_iter()
                    .map(|(label, sessions)| (label, Ok(sessions)))
                    .collect()
            } else {
                let mut labels: Vec<String> = request
                    .participants
                    .iter()
                    .map(|l| l.strip_prefix(SUBJECT_PREFIX).unwrap_or(l.as_str()).to_string())
                    .collect();
                labels.sort();
                labels.dedup();
                labels
                    .into_iter()
                    .map(|label| {
                        let sessions = grabber.query_subject(registry, &label);
                        (label, sessions)
                    })
                    .collect()
            };

        tracing::info!(
            scheme = %request.scheme,
            subjects = pending.len(),
            stage = %request.stage,
            force = request.force,
            jobs = request.jobs,
            "Starting dataset run"
        );

        let outcomes: Vec<(String, Result<(SubjectReport, Table), PipelineError>)> =
            if request.jobs > 1 {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(request.jobs)
                    .build()
                    .map_err(|e| {
                        PipelineError::ConfigError(format!("Cannot build worker pool: {}", e))
                    })?;
                pool.install(|| {
                    pending
                        .into_par_iter()
                        .map(|(label, sessions)| self.run_entry(label, sessions, request))
                        .collect()
                })
            } else {
                pending
                    .into_iter()
                    .map(|(label, sessions)| self.run_entry(label, sessions, request))
                    .collect()
            };

        let mut report = DatasetReport::default();
        for (label, outcome) in outcomes {
            let (subject, table) = outcome?;
            report.table.merge(&table);
            report.subjects.insert(label, subject);
        }

        tracing::info!(
            subjects = report.subjects.len(),
            failed = report.failed_subjects().count(),
            rows = report.table.row_count(),
            "Dataset run finished"
        );
        Ok(report)
    }

    fn run_entry(
        &self,
        label: String,
        sessions: Result<SubjectSources, PipelineError>,
        request: &RunRequest,
    ) -> (String, Result<(SubjectReport, Table), PipelineError>) {
        let outcome = match sessions {
            Ok(sessions) => self.run_subject(&label, &sessions, request),
            Err(e) if e.is_recoverable() => {
                tracing::warn!(subject = %label, error = %e, "Skipping subject");
                Ok((
                    SubjectReport::Failed {
                        error: e.to_string(),
                    },
                    Table::new(),
                ))
            }
            Err(e) => Err(e),
        };
        (label, outcome)
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn display(path: &Path) -> String {
    path.display().to_string()
}

fn base_params(target: Target<'_>) -> CommandParams {
    let params = CommandParams::new()
        .with(Param::InputDir, display(target.source.input_dir()))
        .with(Param::SubjectId, target.source.name())
        .with(Param::Scheme, target.scheme);
    match target.group {
        RegionGroup::Hemispheric(side) => params.with(Param::Hemi, side.label()),
        RegionGroup::Subcortical => params,
    }
}

/// Region groups of the request with their validated measures.
fn resolve_plan(request: &RunRequest) -> Result<GroupPlan, PipelineError> {
    request
        .region_groups()
        .into_iter()
        .map(|group| Ok((group, group.resolve_measures(&request.measures)?)))
        .collect()
}

/// Rows of one measure, one per region of the report.
fn build_fragment(target: Target<'_>, measure: &str, stats: &StatsTable) -> Table {
    let column = target
        .group
        .category()
        .measure(measure)
        .and_then(|m| m.stats_column);
    let source = target.source.name();

    let mut fragment = Table::new();
    for region in stats.regions() {
        let key = RowKey {
            subject: target.source.subject.clone(),
            session: target.source.session.clone(),
            source: source.clone(),
            region_group: target.group.label().to_string(),
            region: region.to_string(),
        };
        let value = column
            .and_then(|c| stats.get(region, c))
            .map(str::to_string);
        fragment.set(key, measure, value);
    }
    fragment
}

fn record(
    target: Target<'_>,
    measure: Option<&str>,
    result: Result<UnitState, PipelineError>,
) -> Result<UnitRecord, PipelineError> {
    let (state, error) = match result {
        Ok(state) => (state, None),
        Err(e) if e.is_recoverable() => {
            tracing::warn!(
                subject = %target.source.subject,
                session = %target.source.session,
                region = %target.group,
                measure = ?measure,
                error = %e,
                "Unit failed"
            );
            (UnitState::Failed, Some(e.to_string()))
        }
        Err(e) => return Err(e),
    };
    Ok(UnitRecord {
        session: target.source.session.clone(),
        source: target.source.name(),
        region_group: target.group.label().to_string(),
        measure: measure.map(str::to_string),
        state,
        error,
    })
}
