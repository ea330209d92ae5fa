//! # parcelflow
//!
//! Command-line front end of the parcelflow pipeline: configuration
//! loading, argument parsing and table export on top of `parcelflow-core`.

pub mod cli;
pub mod config;
