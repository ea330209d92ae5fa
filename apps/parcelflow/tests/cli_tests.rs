//! Tests for CLI argument parsing and command execution.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use clap::Parser;
use parcelflow::cli::{
    Cli, Commands, RunOptions, TableFormat, cmd_paths, cmd_run, cmd_subjects, cmd_validate,
};
use parcelflow::config::Config;
use parcelflow_core::{Hemisphere, PipelineError, RegionGroup, Stage};
use std::path::{Path, PathBuf};

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("parcelflow").chain(args.iter().copied())).unwrap()
}

fn run_options(scheme: &str) -> RunOptions {
    RunOptions {
        scheme: scheme.to_string(),
        participants: Vec::new(),
        sessions: Vec::new(),
        regions: Vec::new(),
        measures: Vec::new(),
        stage: Stage::Export,
        force: false,
        jobs: None,
        output: None,
        format: TableFormat::Csv,
    }
}

fn config_with_scheme() -> Config {
    Config::from_toml_str(
        r#"
[schemes.schemeX.hemispheric]
lookup_table = "/atlases/schemeX.ctab"
left_atlas = "/atlases/lh.schemeX.gcs"
right_atlas = "/atlases/rh.schemeX.gcs"
"#,
    )
    .unwrap()
}

// =============================================================================
// ARGUMENT PARSING
// =============================================================================

#[test]
fn test_no_subcommand() {
    let cli = parse(&[]);
    assert!(cli.command.is_none());
    assert!(!cli.verbose);
    assert!(!cli.json_mode);
}

#[test]
fn test_global_flags_after_subcommand() {
    let cli = parse(&["subjects", "--base-dir", "/data", "--json-mode", "-v"]);
    assert!(matches!(cli.command, Some(Commands::Subjects)));
    assert_eq!(cli.base_dir.as_deref(), Some(Path::new("/data")));
    assert!(cli.json_mode);
    assert!(cli.verbose);
}

#[test]
fn test_run_defaults() {
    let cli = parse(&["run", "--scheme", "schemeX"]);
    match cli.command {
        Some(Commands::Run {
            scheme,
            participants,
            regions,
            stage,
            force,
            jobs,
            output,
            format,
            ..
        }) => {
            assert_eq!(scheme, "schemeX");
            assert!(participants.is_empty());
            assert!(regions.is_empty());
            assert_eq!(stage, Stage::Export);
            assert!(!force);
            assert_eq!(jobs, None);
            assert_eq!(output, None);
            assert_eq!(format, TableFormat::Csv);
        }
        other => panic!("unexpected command: {:?}", other),
    }
}

#[test]
fn test_run_repeated_selections() {
    let cli = parse(&[
        "run", "-s", "schemeX", "-p", "01", "--participant", "sub-02", "--session", "01", "-r",
        "lh", "-r", "subcortex", "-m", "volume", "--stage", "statistics", "-f", "-j", "4", "-o",
        "table.json", "--format", "json",
    ]);
    match cli.command {
        Some(Commands::Run {
            participants,
            sessions,
            regions,
            measures,
            stage,
            force,
            jobs,
            output,
            format,
            ..
        }) => {
            assert_eq!(participants, vec!["01", "sub-02"]);
            assert_eq!(sessions, vec!["01"]);
            assert_eq!(
                regions,
                vec![
                    RegionGroup::Hemispheric(Hemisphere::Left),
                    RegionGroup::Subcortical
                ]
            );
            assert_eq!(measures, vec!["volume"]);
            assert_eq!(stage, Stage::Statistics);
            assert!(force);
            assert_eq!(jobs, Some(4));
            assert_eq!(output, Some(PathBuf::from("table.json")));
            assert_eq!(format, TableFormat::Json);
        }
        other => panic!("unexpected command: {:?}", other),
    }
}

#[test]
fn test_invalid_values_rejected() {
    let args = |extra: &[&str]| {
        let mut args = vec!["parcelflow", "run", "--scheme", "x"];
        args.extend_from_slice(extra);
        Cli::try_parse_from(args)
    };
    assert!(args(&["--stage", "render"]).is_err());
    assert!(args(&["--region", "cerebellum"]).is_err());
    assert!(args(&["--format", "xml"]).is_err());
    assert!(args(&["--jobs", "many"]).is_err());
    assert!(Cli::try_parse_from(["parcelflow", "run"]).is_err());
}

#[test]
fn test_paths_and_validate_arguments() {
    let cli = parse(&["paths", "--source", "/d/sub-01_ses-01_ce-corrected_T1w", "-s", "x"]);
    assert!(matches!(
        cli.command,
        Some(Commands::Paths { region: None, measure: None, .. })
    ));

    let cli = parse(&["validate", "-r", "subcortical", "-m", "mean"]);
    match cli.command {
        Some(Commands::Validate { region, measure }) => {
            assert_eq!(region, "subcortical");
            assert_eq!(measure, "mean");
        }
        other => panic!("unexpected command: {:?}", other),
    }
}

// =============================================================================
// COMMANDS
// =============================================================================

#[test]
fn test_cmd_validate() {
    assert!(cmd_validate("lh", "thickness", false).is_ok());
    assert!(cmd_validate("subcortical", "volume", true).is_ok());
    assert!(matches!(
        cmd_validate("subcortex", "thickness", false),
        Err(PipelineError::InvalidMeasure { .. })
    ));
    assert!(matches!(
        cmd_validate("cerebellum", "volume", false),
        Err(PipelineError::UnsupportedRegionGroup(_))
    ));
}

#[test]
fn test_cmd_paths_needs_no_disk() {
    let config = Config::default();
    let source = Path::new("/nowhere/sub-01_ses-01_ce-corrected_T1w");

    assert!(cmd_paths(&config, source, "schemeX", None, None, false).is_ok());
    assert!(
        cmd_paths(
            &config,
            source,
            "schemeX",
            Some(RegionGroup::Subcortical),
            Some("mean"),
            true
        )
        .is_ok()
    );
    assert!(matches!(
        cmd_paths(
            &config,
            source,
            "schemeX",
            Some(RegionGroup::Subcortical),
            Some("area"),
            false
        ),
        Err(PipelineError::InvalidMeasure { .. })
    ));
    assert!(matches!(
        cmd_paths(&config, source, "schemeX", None, Some("curvature"), false),
        Err(PipelineError::InvalidMeasure { .. })
    ));
}

#[test]
fn test_cmd_subjects_lists_dataset() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(
        dir.path()
            .join("sub-01/ses-01/anat/sub-01_ses-01_ce-corrected_T1w"),
    )
    .unwrap();

    let config = Config::default();
    assert!(cmd_subjects(&config, Some(dir.path()), false).is_ok());
    assert!(cmd_subjects(&config, Some(dir.path()), true).is_ok());
    assert!(matches!(
        cmd_subjects(&config, None, false),
        Err(PipelineError::ConfigError(_))
    ));
}

#[tokio::test]
async fn test_cmd_run_unknown_scheme_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_with_scheme();

    let result = cmd_run(&config, Some(dir.path()), run_options("nope"), false, false).await;
    assert!(matches!(result, Err(PipelineError::UnknownScheme(name)) if name == "nope"));
}

#[tokio::test]
async fn test_cmd_run_zero_jobs_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_with_scheme();
    let mut options = run_options("schemeX");
    options.jobs = Some(0);

    let result = cmd_run(&config, Some(dir.path()), options, false, false).await;
    assert!(matches!(result, Err(PipelineError::ConfigError(_))));
}

#[tokio::test]
async fn test_cmd_run_missing_participant_writes_empty_table() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("table.csv");
    let config = config_with_scheme();
    let mut options = run_options("schemeX");
    options.participants = vec!["sub-99".to_string()];
    options.output = Some(output.clone());

    cmd_run(&config, Some(dir.path()), options, true, false)
        .await
        .unwrap();

    let written = std::fs::read_to_string(&output).unwrap();
    assert_eq!(written, "subject,session,source,region_group,region\n");
    assert!(!parcelflow_core::partial_path(&output).exists());
}

#[tokio::test]
async fn test_cmd_run_json_table() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("table.json");
    let config = config_with_scheme();
    let mut options = run_options("schemeX");
    options.participants = vec!["99".to_string()];
    options.output = Some(output.clone());
    options.format = TableFormat::Json;

    cmd_run(&config, Some(dir.path()), options, false, true)
        .await
        .unwrap();

    let written = std::fs::read_to_string(&output).unwrap();
    let records: serde_json::Value = serde_json::from_str(&written).unwrap();
    assert_eq!(records, serde_json::json!([]));
}

#[tokio::test]
async fn test_cmd_run_labeling_writes_no_table() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("table.csv");
    let config = config_with_scheme();
    let mut options = run_options("schemeX");
    options.participants = vec!["99".to_string()];
    options.stage = Stage::Labeling;
    options.output = Some(output.clone());

    cmd_run(&config, Some(dir.path()), options, false, false)
        .await
        .unwrap();

    assert!(!output.exists());
}
