//! # Formats Module
//!
//! On-disk formats owned by parcelflow.
//!
//! - `fragment`: binary cache entries for per-unit table fragments

pub mod fragment;

pub use fragment::{fragment_from_bytes, fragment_to_bytes, read_fragment, write_fragment};
