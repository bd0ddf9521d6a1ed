//! filterlab: multi-strategy GPU image filter samples
//!
//! Each sample loads a texture and applies a filter (bilateral blur, Gaussian blur
//! or TAA statistics) under one of several execution strategies. The crate is
//! organized around a per-frame orchestration engine:
//!
//! - [`resources`] owns the size-dependent images and framebuffers;
//! - [`pipelines`] owns one pipeline per strategy, kernel and pass role;
//! - [`bindings`] writes the binding sets that connect them;
//! - [`orchestrator`] records a frame as a [`device::CommandStream`];
//! - [`timing`] turns timestamp readback into per-pass statistics;
//! - [`controller`] and [`resize`] drive parameter changes and resizes.
//!
//! The GPU sits behind [`device::GpuDevice`]; [`backend`] implements it with wgpu.

pub mod assets;
pub mod backend;
pub mod bindings;
pub mod controller;
pub mod device;
mod error;
pub mod orchestrator;
pub mod params;
pub mod pipelines;
pub mod presets;
pub mod resize;
pub mod resources;
pub mod sample;
pub mod shaders;
pub mod strategy;
pub mod timing;
pub mod ui;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
pub use filterlab_manifest::SampleManifest;
pub use sample::{FilterApp, FilterSample, SampleContext, SampleOptions};
