//! filterlab sample manifests
//!
//! This crate describes filter samples declaratively. A manifest lists the
//! texture a sample shows, the shaders behind each execution strategy, the
//! kernel sizes and the tunable parameters. It is parsed from YAML, validated
//! structurally, and its shaders can be checked with naga for the
//! specialization overrides the pipeline builder supplies.

mod sample_manifest;
mod shader_check;
mod strategy;

pub use sample_manifest::*;
pub use shader_check::*;
pub use strategy::{ComputeDispatch, Strategy, StrategyParseError};
