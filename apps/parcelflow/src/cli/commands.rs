//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use super::TableFormat;
use crate::config::Config;
use parcelflow_core::{
    CancellationToken, DatasetReport, EntityRegistry, ExistenceProbe, FreeSurferStatsParser,
    Orchestrator, PathBuilder, PipelineError, ProcessExecutor, RegionGroup, RunRequest,
    SourceFile, Stage, SubjectReport, Table, Target, UnitState, validate,
};
use std::path::{Path, PathBuf};

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, PipelineError> {
    serde_json::to_string_pretty(value).map_err(|e| PipelineError::SerializationError(e.to_string()))
}

// =============================================================================
// SUBJECTS COMMAND
// =============================================================================

/// List the subjects, sessions and sources the dataset layout yields.
pub fn cmd_subjects(
    config: &Config,
    base_dir: Option<&Path>,
    json_mode: bool,
) -> Result<(), PipelineError> {
    let grabber = config.grabber(base_dir)?;
    let registry = EntityRegistry::standard()?;
    let subjects = grabber.query_subjects(&registry)?;

    if json_mode {
        println!("{}", to_json(&subjects)?);
        return Ok(());
    }

    println!("Dataset: {}", grabber.base_dir().display());
    println!("Subjects: {}", subjects.len());
    for (subject, sessions) in &subjects {
        println!("  sub-{}", subject);
        for (session, sources) in sessions {
            println!("    ses-{} ({} sources)", session, sources.len());
            for source in sources {
                println!("      {}", source.path.display());
            }
        }
    }
    Ok(())
}

// =============================================================================
// PATHS COMMAND
// =============================================================================

/// Print where each stage would put its artifact for one source.
///
/// Pure path computation: the source does not need to exist.
pub fn cmd_paths(
    config: &Config,
    source: &Path,
    scheme: &str,
    region: Option<RegionGroup>,
    measure: Option<&str>,
    json_mode: bool,
) -> Result<(), PipelineError> {
    let paths = PathBuilder::standard()?;
    let entities = paths.registry().parse(
        &source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    );
    let source = SourceFile::new(
        paths.registry(),
        entities.get("subject").unwrap_or_default(),
        entities.get("session").unwrap_or_default(),
        source.to_path_buf(),
    );

    let schemes = config.scheme_registry();
    let executor = ProcessExecutor::new();
    let cache = ExistenceProbe;
    let parser = FreeSurferStatsParser;
    let orchestrator = Orchestrator::new(paths, &schemes, &executor, &cache, &parser);

    let groups: Vec<RegionGroup> = match (region, measure) {
        (Some(group), Some(m)) => {
            group.validate(m)?;
            vec![group]
        }
        (Some(group), None) => vec![group],
        (None, Some(m)) => {
            let groups: Vec<RegionGroup> = RegionGroup::ALL
                .into_iter()
                .filter(|g| g.validate(m).is_ok())
                .collect();
            if groups.is_empty() {
                return Err(PipelineError::InvalidMeasure {
                    measure: m.to_string(),
                    region_group: "any region group".to_string(),
                });
            }
            groups
        }
        (None, None) => RegionGroup::ALL.to_vec(),
    };

    let mut entries: Vec<(String, Stage, Option<String>, PathBuf)> = Vec::new();
    for group in groups {
        let target = Target {
            source: &source,
            scheme,
            group,
        };
        let measures: Vec<String> = match measure {
            Some(m) => vec![m.to_string()],
            None => group
                .category()
                .measures()
                .iter()
                .map(|m| m.name.to_string())
                .collect(),
        };

        for stage in [Stage::Labeling, Stage::Statistics] {
            let path = orchestrator.output_path(target, stage, None)?;
            entries.push((group.label().to_string(), stage, None, path));
        }
        for m in measures {
            let path = orchestrator.output_path(target, Stage::Export, Some(&m))?;
            entries.push((group.label().to_string(), Stage::Export, Some(m), path));
        }
    }

    if json_mode {
        let output: Vec<serde_json::Value> = entries
            .iter()
            .map(|(group, stage, measure, path)| {
                serde_json::json!({
                    "region_group": group,
                    "stage": stage,
                    "measure": measure,
                    "path": path.to_string_lossy(),
                })
            })
            .collect();
        println!("{}", to_json(&output)?);
        return Ok(());
    }

    for (group, stage, measure, path) in &entries {
        match measure {
            Some(m) => println!(
                "{:<10} {:<10} {:<13} {}",
                group,
                stage.to_string(),
                m,
                path.display()
            ),
            None => println!(
                "{:<10} {:<10} {:<13} {}",
                group,
                stage.to_string(),
                "-",
                path.display()
            ),
        }
    }
    Ok(())
}

// =============================================================================
// VALIDATE COMMAND
// =============================================================================

/// Check that a measure may be computed for a region group.
pub fn cmd_validate(region: &str, measure: &str, json_mode: bool) -> Result<(), PipelineError> {
    validate(region, measure)?;

    if json_mode {
        let output = serde_json::json!({
            "region_group": region,
            "measure": measure,
            "valid": true
        });
        println!("{}", to_json(&output)?);
    } else {
        println!("'{}' is a valid {} measure", measure, region);
    }
    Ok(())
}

// =============================================================================
// RUN COMMAND
// =============================================================================

/// Arguments of `parcelflow run`.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub scheme: String,
    pub participants: Vec<String>,
    pub sessions: Vec<String>,
    pub regions: Vec<RegionGroup>,
    pub measures: Vec<String>,
    pub stage: Stage,
    pub force: bool,
    pub jobs: Option<usize>,
    pub output: Option<PathBuf>,
    pub format: TableFormat,
}

impl RunOptions {
    /// Request for the core, with configured fallbacks applied.
    pub fn request(&self, config: &Config) -> Result<RunRequest, PipelineError> {
        let jobs = self.jobs.unwrap_or(config.executor.jobs);
        if jobs == 0 {
            return Err(PipelineError::ConfigError(
                "--jobs must be at least 1".to_string(),
            ));
        }

        let mut request = RunRequest::new(self.scheme.clone());
        request.participants = if self.participants.is_empty() {
            config.dataset.participants.clone()
        } else {
            self.participants.clone()
        };
        request.sessions = self.sessions.clone();
        request.regions = self.regions.clone();
        request.measures = self.measures.clone();
        request.stage = self.stage;
        request.force = self.force;
        request.jobs = jobs;
        Ok(request)
    }
}

/// Run the cascade over the dataset and export the aggregated table.
///
/// The pipeline runs on a blocking worker; Ctrl-C cancels it, killing the
/// tool that is running and leaving no partial artifact behind.
pub async fn cmd_run(
    config: &Config,
    base_dir: Option<&Path>,
    options: RunOptions,
    verbose: bool,
    json_mode: bool,
) -> Result<(), PipelineError> {
    let grabber = config.grabber(base_dir)?;
    let request = options.request(config)?;
    let schemes = config.scheme_registry();
    let executor =
        ProcessExecutor::new().with_subjects_dir_var(config.executor.subjects_dir_var.clone());

    let cancel = CancellationToken::new();
    let worker_cancel = cancel.clone();
    let mut handle = tokio::task::spawn_blocking(move || {
        let paths = PathBuilder::standard()?;
        let cache = ExistenceProbe;
        let parser = FreeSurferStatsParser;
        Orchestrator::new(paths, &schemes, &executor, &cache, &parser)
            .with_cancellation(worker_cancel)
            .run_dataset(&grabber, &request)
    });

    let joined = tokio::select! {
        joined = &mut handle => joined,
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => {
                    tracing::warn!("Interrupt received, cancelling run");
                    cancel.cancel();
                }
                Err(e) => tracing::warn!(error = %e, "Cannot listen for interrupts"),
            }
            handle.await
        }
    };
    let report = joined
        .map_err(|e| PipelineError::IoError(format!("Pipeline worker failed: {}", e)))??;

    let table = if options.stage >= Stage::Statistics {
        Some(render_table(&report.table, options.format)?)
    } else {
        None
    };

    if let (Some(path), Some(table)) = (&options.output, &table) {
        write_table(path, table)?;
        tracing::info!(path = %path.display(), rows = report.table.row_count(), "Table written");
    }

    let inline = if options.output.is_none() { table } else { None };
    if json_mode {
        print_json_summary(&report, inline)?;
    } else {
        print_summary(&report, verbose)?;
        if let Some(table) = inline {
            println!();
            print!("{}", table);
        }
    }
    Ok(())
}

fn render_table(table: &Table, format: TableFormat) -> Result<String, PipelineError> {
    match format {
        TableFormat::Csv => table.to_csv(),
        TableFormat::Json => to_json(&table.records()).map(|mut s| {
            s.push('\n');
            s
        }),
    }
}

/// Write through a sibling temporary file so readers never see a torn table.
fn write_table(path: &Path, contents: &str) -> Result<(), PipelineError> {
    let partial = parcelflow_core::partial_path(path);
    std::fs::write(&partial, contents)
        .map_err(|e| PipelineError::IoError(format!("{}: {}", partial.display(), e)))?;
    std::fs::rename(&partial, path)
        .map_err(|e| PipelineError::IoError(format!("{}: {}", path.display(), e)))
}

fn print_summary(report: &DatasetReport, verbose: bool) -> Result<(), PipelineError> {
    println!("parcelflow Run Summary");
    println!("======================");
    for (subject, outcome) in &report.subjects {
        match outcome {
            SubjectReport::Completed { units } => {
                println!(
                    "sub-{:<12} completed  succeeded={} cached={} failed={}",
                    subject,
                    outcome.count(UnitState::Succeeded),
                    outcome.count(UnitState::Cached),
                    outcome.count(UnitState::Failed),
                );
                if verbose {
                    for unit in units {
                        println!(
                            "    ses-{} {} {} {:<13} {}{}",
                            unit.session,
                            unit.source,
                            unit.region_group,
                            unit.measure.as_deref().unwrap_or("-"),
                            unit.state,
                            unit.error
                                .as_deref()
                                .map(|e| format!(" ({})", e))
                                .unwrap_or_default(),
                        );
                    }
                }
            }
            SubjectReport::Failed { error } => {
                println!("sub-{:<12} failed     {}", subject, error);
            }
        }
    }
    println!();
    println!("Subjects: {}", report.subjects.len());
    println!("Failed:   {}", report.failed_subjects().count());
    println!("Rows:     {}", report.table.row_count());
    println!("Checksum: blake3:{}", report.table.blake3_hex()?);
    Ok(())
}

fn print_json_summary(report: &DatasetReport, table: Option<String>) -> Result<(), PipelineError> {
    let failed: Vec<&str> = report.failed_subjects().collect();
    let checksum = report.table.blake3_hex()?;
    let output = serde_json::json!({
        "subjects": report.subjects,
        "failed_subjects": failed,
        "units": {
            "succeeded": report.count(UnitState::Succeeded),
            "cached": report.count(UnitState::Cached),
            "failed": report.count(UnitState::Failed),
        },
        "rows": report.table.row_count(),
        "checksum": format!("blake3:{}", checksum),
        "table": table,
    });
    println!("{}", to_json(&output)?);
    Ok(())
}
