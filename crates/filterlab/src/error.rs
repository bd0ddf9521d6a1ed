//! Error types for filterlab

use crate::device::AnyHandle;
use crate::orchestrator::FrameStage;
use crate::pipelines::PassRole;
use crate::strategy::Strategy;

/// Errors reported by samples and the wgpu backend
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A device call failed
    #[error("GPU device error: {0}")]
    Device(String),

    /// The presentation surface could not provide a frame
    #[error("Surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),

    #[error("Failed to load shader '{path}': {reason}")]
    ShaderLoad { path: String, reason: String },

    #[error("Failed to load texture '{path}': {reason}")]
    AssetLoad { path: String, reason: String },

    #[error(transparent)]
    Manifest(#[from] filterlab_manifest::ManifestError),

    /// Size-dependent resources were requested for a zero-sized surface
    #[error("Cannot allocate size-dependent resources for an empty extent")]
    EmptyExtent,

    /// No pipeline was built for the requested combination
    #[error("No pipeline variant for strategy {strategy:?}, kernel {kernel:?}, role {role:?}")]
    MissingVariant {
        strategy: Option<Strategy>,
        kernel: Option<usize>,
        role: PassRole,
    },

    #[error("Strategy '{0}' is not supported by this sample")]
    UnsupportedStrategy(Strategy),

    /// Binding sets reference resources of an older resize epoch
    #[error("Bindings were written for resource epoch {bound} but epoch {current} is live")]
    StaleBindings { bound: u64, current: u64 },

    /// A strategy needs an image the resource set was not built with
    #[error("Resource set has no {0}")]
    MissingResource(&'static str),

    #[error("Handle {0:?} is not alive")]
    InvalidHandle(AnyHandle),

    #[error("Illegal frame stage transition {from:?} -> {to:?}")]
    InvalidStageTransition { from: FrameStage, to: FrameStage },

    /// Timestamp writes and readback disagree
    #[error("Frame writes {written} timestamp slots but {expected} are read back")]
    QuerySlotMismatch { written: u32, expected: u32 },

    #[error("Device does not support timestamp queries")]
    TimestampsUnavailable,

    #[error("Sample is not prepared")]
    NotPrepared,

    #[error("Kernel index {index} is out of range (sample has {count} kernel sizes)")]
    KernelOutOfRange { index: usize, count: usize },
}

/// Result type used throughout filterlab
pub type Result<T, E = Error> = std::result::Result<T, E>;
