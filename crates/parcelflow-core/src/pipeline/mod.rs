//! # Pipeline Module
//!
//! The cascading orchestration engine.
//!
//! - `stage`: where each stage writes its artifact
//! - `unit`: unit lifecycle and per-run state
//! - `orchestrator`: the cascade over sources, subjects and datasets
//! - `report`: run requests and outcome reports

pub mod orchestrator;
pub mod report;
pub mod stage;
pub mod unit;

pub use orchestrator::Orchestrator;
pub use report::{DatasetReport, RunRequest, SubjectReport};
pub use stage::{OutputSpec, overrides};
pub use unit::{RunContext, StageOutcome, Target, UnitRecord, UnitState};
