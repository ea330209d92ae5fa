//! # parcelflow-core
//!
//! The pipeline engine for parcelflow.
//!
//! Derives canonical artifact paths from entities embedded in source
//! filenames, drives an external neuroimaging toolkit through three ordered
//! stages (region labeling, statistics extraction, table export) with
//! filesystem memoization, and merges per-unit results into one table.
//!
//! ## Layers
//!
//! - Addressing: `entity`, `path`, `region`, `scheme`
//! - Invocation: `command`, `executor`, `cache`
//! - Results: `stats`, `table`, `formats`
//! - Control: `layout`, `pipeline`
//!
//! ## Constraints
//!
//! - Path computation never touches the filesystem
//! - The orchestrating process environment is never mutated
//! - NO async: every tool invocation blocks its worker until exit

// =============================================================================
// MODULES
// =============================================================================

pub mod cache;
pub mod command;
pub mod entity;
pub mod executor;
pub mod formats;
pub mod layout;
pub mod path;
pub mod pipeline;
pub mod primitives;
pub mod region;
pub mod scheme;
pub mod stats;
pub mod table;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types
// =============================================================================

pub use types::{PipelineError, Stage};

// =============================================================================
// RE-EXPORTS: Addressing
// =============================================================================

pub use entity::{EntityDefinition, EntityKind, EntityMapping, EntityRegistry, STANDARD_ENTITIES};
pub use path::{PathBuilder, Reference, partial_path};
pub use region::{Hemisphere, MeasureDefinition, RegionCategory, RegionGroup, validate};
pub use scheme::{
    HemisphericDefinition, Scheme, SchemeDefinition, SchemeRegistry, SubcorticalDefinition,
};

// =============================================================================
// RE-EXPORTS: Invocation
// =============================================================================

pub use cache::{CacheProbe, ExistenceProbe};
pub use command::{CommandLine, CommandParams, Param, TemplateId, render};
pub use executor::{
    CancellationToken, ExecutionOutput, Invocation, ProcessExecutor, StageExecutor,
    commit_output, discard_output,
};

// =============================================================================
// RE-EXPORTS: Results
// =============================================================================

pub use formats::{fragment_from_bytes, fragment_to_bytes};
pub use stats::{FreeSurferStatsParser, LookupTable, StatsParser, StatsTable};
pub use table::{RowKey, Table, TableRecord, merge};

// =============================================================================
// RE-EXPORTS: Control
// =============================================================================

pub use layout::{DataGrabber, LayoutFilters, SourceFile, SubjectSources, default_filters};
pub use pipeline::{
    DatasetReport, Orchestrator, RunContext, RunRequest, StageOutcome, SubjectReport, Target,
    UnitRecord, UnitState,
};
