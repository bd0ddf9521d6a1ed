//! Filter state and push-constant blocks
//!
//! [`FilterState`] is the single source of truth for what the next recorded frame
//! does. Push constants for graphics and compute pipelines are both derived from it
//! in one place so the two blocks never disagree.

use crate::device::Extent;
use crate::strategy::{KernelSize, Strategy};
use bytes::Bytes;
use filterlab_manifest::{MAX_PARAMETERS, ParameterSpec, SampleManifest, SamplerChoice};

/// Size in bytes of both push-constant blocks
pub const PUSH_CONSTANT_SIZE: u32 = std::mem::size_of::<GraphicsPushConstants>() as u32;

/// Push constants read by fragment shaders
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GraphicsPushConstants {
    /// `1 / width` and `1 / height` of the filtered image
    pub texel_offset: [f32; 2],
    /// Transformed parameter values
    pub values: [f32; MAX_PARAMETERS],
}

/// Push constants read by compute shaders
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ComputePushConstants {
    /// Width and height of the filtered image
    pub extent: [u32; 2],
    /// Transformed parameter values
    pub values: [f32; MAX_PARAMETERS],
}

/// Both push-constant blocks of one frame
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct PushConstants {
    pub graphics: GraphicsPushConstants,
    pub compute: ComputePushConstants,
}

impl PushConstants {
    pub fn graphics_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(bytemuck::bytes_of(&self.graphics))
    }

    pub fn compute_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(bytemuck::bytes_of(&self.compute))
    }
}

/// A tunable parameter and its current slider value
#[derive(Debug, Clone)]
pub struct ParameterValue {
    pub spec: ParameterSpec,
    pub value: f32,
}

impl ParameterValue {
    /// Value after the parameter's transform
    pub fn transformed(&self) -> f32 {
        self.spec.transform.apply(self.value)
    }
}

/// Everything the overlay can change
#[derive(Debug, Clone)]
pub struct FilterState {
    pub strategy: Strategy,
    pub kernel: KernelSize,
    pub sampler: SamplerChoice,
    /// Instance count of single-pass filter draws
    pub draw_count: u32,
    pub parameters: Vec<ParameterValue>,
}

impl FilterState {
    /// Initial state of a sample: first declared strategy, smallest kernel, default parameters
    pub fn from_manifest(manifest: &SampleManifest) -> Self {
        Self {
            strategy: manifest.strategies.first().map_or(Strategy::Default, |spec| spec.kind),
            kernel: KernelSize(0),
            sampler: manifest.samplers.first().copied().unwrap_or_default(),
            draw_count: 1,
            parameters: manifest
                .parameters
                .iter()
                .map(|spec| ParameterValue {
                    spec: spec.clone(),
                    value: spec.default,
                })
                .collect(),
        }
    }

    /// Current raw value of a named parameter
    pub fn parameter(&self, name: &str) -> Option<f32> {
        self.parameters.iter().find(|p| p.spec.name == name).map(|p| p.value)
    }

    /// Transformed parameter values, zero-padded to the push-constant width
    pub fn transformed_values(&self) -> [f32; MAX_PARAMETERS] {
        let mut values = [0.0; MAX_PARAMETERS];
        for (slot, parameter) in values.iter_mut().zip(&self.parameters) {
            *slot = parameter.transformed();
        }
        values
    }

    /// Derives both push-constant blocks for an image extent
    pub fn push_constants(&self, extent: Extent) -> PushConstants {
        let values = self.transformed_values();
        PushConstants {
            graphics: GraphicsPushConstants {
                texel_offset: extent.texel_offset(),
                values,
            },
            compute: ComputePushConstants {
                extent: [extent.width, extent.height],
                values,
            },
        }
    }
}
