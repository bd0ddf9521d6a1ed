//! WGSL shader checks
//!
//! Pipelines specialize shared shaders through pipeline-overridable constants
//! addressed by numeric `@id`. Supplying an id the module does not declare is a
//! pipeline creation error, so manifests are checked against their shaders ahead
//! of time with naga.

use crate::sample_manifest::ShaderStageKind;
use std::fmt;

/// Override id of the kernel radius in fragment shaders
pub const FRAGMENT_RADIUS_ID: u32 = 0;
/// Override id of the workgroup extent along the tiled axis in compute shaders
pub const COMPUTE_AXIS_ID: u32 = 0;
/// Override id of the kernel radius in compute shaders
pub const COMPUTE_RADIUS_ID: u32 = 1;
/// Override id of the local workgroup width in compute shaders
pub const COMPUTE_TILE_X_ID: u32 = 2;
/// Override id of the local workgroup height in compute shaders
pub const COMPUTE_TILE_Y_ID: u32 = 3;

/// Every override a compute shader receives
pub const COMPUTE_OVERRIDE_IDS: [u32; 4] = [COMPUTE_AXIS_ID, COMPUTE_RADIUS_ID, COMPUTE_TILE_X_ID, COMPUTE_TILE_Y_ID];

/// Verifies that a WGSL module has an entry point for `stage` and declares every override in `required`
///
/// # Arguments
/// * `source` - WGSL source code
/// * `stage` - Stage the module is compiled for
/// * `required` - Override ids the pipeline builder will supply
pub fn check_shader_overrides(source: &str, stage: ShaderStageKind, required: &[u32]) -> Result<(), ShaderCheckError> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| ShaderCheckError::Parse(e.emit_to_string(source)))?;

    let has_entry_point = module.entry_points.iter().any(|entry_point| match stage {
        ShaderStageKind::Vertex => entry_point.stage == naga::ShaderStage::Vertex,
        ShaderStageKind::Fragment => entry_point.stage == naga::ShaderStage::Fragment,
        ShaderStageKind::Compute => entry_point.stage == naga::ShaderStage::Compute,
    });
    if !has_entry_point {
        return Err(ShaderCheckError::MissingEntryPoint(stage));
    }

    let declared: Vec<u16> = module.overrides.iter().filter_map(|(_, item)| item.id).collect();
    for &id in required {
        if !declared.iter().any(|&declared_id| u32::from(declared_id) == id) {
            return Err(ShaderCheckError::MissingOverride(id));
        }
    }

    Ok(())
}

/// Errors reported by [`check_shader_overrides`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShaderCheckError {
    /// The source is not valid WGSL (rendered diagnostic)
    Parse(String),
    /// No entry point exists for the requested stage
    MissingEntryPoint(ShaderStageKind),
    /// An override id the pipeline supplies is not declared
    MissingOverride(u32),
}

impl fmt::Display for ShaderCheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(diagnostic) => write!(f, "Invalid WGSL:\n{diagnostic}"),
            Self::MissingEntryPoint(stage) => write!(f, "No {stage:?} entry point"),
            Self::MissingOverride(id) => write!(f, "Missing override declaration with @id({id})"),
        }
    }
}

impl std::error::Error for ShaderCheckError {}
