//! GPU device abstraction
//!
//! Samples never talk to a graphics API directly. They create resources through
//! [`GpuDevice`], refer to them by opaque handles, and describe each frame as a
//! [`CommandStream`] that the device replays on submission. The wgpu backend lives
//! in [`crate::backend`]; tests use an in-memory recording device.
//!
//! Handles are plain ids. Ownership is expressed with [`Owned`], which destroys the
//! handle when dropped, so a resource group releases everything it holds at once.

use crate::Result;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

macro_rules! device_handles {
    ($($(#[$doc:meta])* $name:ident => $variant:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(u64);

            impl $name {
                /// Wraps a raw id issued by a device implementation
                pub const fn from_raw(id: u64) -> Self {
                    Self(id)
                }
            }

            impl From<$name> for AnyHandle {
                fn from(handle: $name) -> Self {
                    AnyHandle::$variant(handle)
                }
            }
        )*

        /// Type-erased device handle
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum AnyHandle {
            $($(#[$doc])* $variant($name),)*
        }
    };
}

device_handles! {
    /// 2D image together with its default view
    ImageHandle => Image,
    /// Texture sampler
    SamplerHandle => Sampler,
    /// Render pass description (format, load and final layout)
    RenderPassHandle => RenderPass,
    /// Render pass bound to one color attachment
    FramebufferHandle => Framebuffer,
    /// Binding set layout
    BindingLayoutHandle => BindingLayout,
    /// Binding set
    BindingSetHandle => BindingSet,
    /// Pipeline layout (binding layouts plus push-constant range)
    PipelineLayoutHandle => PipelineLayout,
    /// Graphics or compute pipeline
    PipelineHandle => Pipeline,
    /// Timestamp query pool
    QueryPoolHandle => QueryPool,
}

/// Width and height of a surface or image in texels
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns true if either dimension is zero (e.g. a minimized window)
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Reciprocal width and height, used as texel offsets by fragment shaders
    pub fn texel_offset(&self) -> [f32; 2] {
        [1.0 / self.width as f32, 1.0 / self.height as f32]
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Color space hint for uploaded textures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    Srgb,
    Linear,
}

/// Decoded RGBA8 pixels ready for upload
#[derive(Debug, Clone)]
pub struct TextureData {
    pub extent: Extent,
    pub color_space: ColorSpace,
    /// Tightly packed RGBA8 rows
    pub pixels: Vec<u8>,
}

/// How an image is used by the frame graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageUsage {
    /// Written as a color attachment, sampled by a later pass
    ColorTarget,
    /// Written by compute as a storage image, sampled by a later pass
    Storage,
}

/// Description of a size-dependent RGBA8 image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDesc {
    pub label: String,
    pub extent: Extent,
    pub usage: ImageUsage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Linear,
    Nearest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    ClampToEdge,
    /// Clamp to an opaque white border
    ClampToBorder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplerDesc {
    pub label: &'static str,
    pub filter: FilterMode,
    pub address: AddressMode,
}

/// Color format of a render pass attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetFormat {
    /// Offscreen RGBA8 target
    Rgba8Unorm,
    /// Whatever format the presentation surface uses
    Swapchain,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadAction {
    Clear([f64; 4]),
    Load,
}

/// Layout the attachment is left in when the pass ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FinalLayout {
    ShaderRead,
    ColorAttachment,
    Present,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderPassDesc {
    pub label: &'static str,
    pub format: TargetFormat,
    pub load: LoadAction,
    pub final_layout: FinalLayout,
}

/// Attachment a framebuffer renders into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentTarget {
    Image(ImageHandle),
    /// The presentation image of a frame slot
    Swapchain(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramebufferDesc {
    pub label: String,
    pub render_pass: RenderPassHandle,
    pub target: AttachmentTarget,
    pub extent: Extent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

/// Kind of resource a binding slot accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    /// Image read through a sampler
    SampledImage,
    /// Image written by compute
    StorageImage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingLayoutEntry {
    pub binding: u32,
    pub kind: BindingKind,
    pub stage: ShaderStage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingLayoutDesc {
    pub label: &'static str,
    pub entries: Vec<BindingLayoutEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PushConstantRange {
    pub stage: ShaderStage,
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineLayoutDesc {
    pub label: &'static str,
    pub binding_layouts: Vec<BindingLayoutHandle>,
    pub push_constants: Option<PushConstantRange>,
}

/// Value bound to a pipeline-overridable constant at pipeline creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpecializationConstant {
    pub id: u32,
    pub value: u32,
}

/// A loaded shader stage plus the specialization data attached to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderStageDescriptor {
    /// Logical path the shader was loaded from
    pub path: String,
    pub stage: ShaderStage,
    pub source: Arc<str>,
    pub constants: Vec<SpecializationConstant>,
}

impl ShaderStageDescriptor {
    /// Attaches specialization constants as `(id, value)` pairs
    pub fn with_constants(mut self, constants: &[(u32, u32)]) -> Self {
        self.constants = constants.iter().map(|&(id, value)| SpecializationConstant { id, value }).collect();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphicsPipelineDesc {
    pub label: String,
    pub layout: PipelineLayoutHandle,
    pub render_pass: RenderPassHandle,
    pub vertex: ShaderStageDescriptor,
    pub fragment: ShaderStageDescriptor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputePipelineDesc {
    pub label: String,
    pub layout: PipelineLayoutHandle,
    pub compute: ShaderStageDescriptor,
}

/// Resource written into one binding of a set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundResource {
    SampledImage { image: ImageHandle, sampler: SamplerHandle },
    StorageImage { image: ImageHandle },
}

impl BoundResource {
    /// Image referenced by this binding
    pub fn image(&self) -> ImageHandle {
        match *self {
            BoundResource::SampledImage { image, .. } | BoundResource::StorageImage { image } => image,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingWrite {
    pub binding: u32,
    pub resource: BoundResource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindPoint {
    Graphics,
    Compute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    TopOfPipe,
    BottomOfPipe,
    FragmentShader,
    ComputeShader,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    Undefined,
    General,
    ShaderReadOnly,
}

/// One recorded GPU command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    ResetQueries {
        pool: QueryPoolHandle,
        first: u32,
        count: u32,
    },
    /// Stamps the start of the pass that follows or the end of the one just closed
    WriteTimestamp {
        pool: QueryPoolHandle,
        slot: u32,
        stage: PipelineStage,
    },
    BeginRenderPass {
        render_pass: RenderPassHandle,
        framebuffer: FramebufferHandle,
        extent: Extent,
    },
    EndRenderPass,
    BindPipeline {
        bind_point: BindPoint,
        pipeline: PipelineHandle,
    },
    BindSet {
        bind_point: BindPoint,
        layout: PipelineLayoutHandle,
        set: BindingSetHandle,
    },
    PushConstants {
        layout: PipelineLayoutHandle,
        stage: ShaderStage,
        data: Bytes,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
    ImageBarrier {
        image: ImageHandle,
        old_layout: ImageLayout,
        new_layout: ImageLayout,
        src_stage: PipelineStage,
        dst_stage: PipelineStage,
    },
    /// Hand the open render pass to the UI overlay renderer
    DrawOverlay,
}

/// A fully linearized frame, recorded once and replayed on every submission of its slot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandStream {
    commands: Vec<Command>,
}

impl CommandStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Number of timestamp writes in the stream
    pub fn timestamp_writes(&self) -> u32 {
        self.commands.iter().filter(|c| matches!(c, Command::WriteTimestamp { .. })).count() as u32
    }

    /// Pipelines bound anywhere in the stream, in order
    #[cfg(test)]
    pub fn bound_pipelines(&self) -> impl Iterator<Item = PipelineHandle> + '_ {
        self.commands.iter().filter_map(|c| match c {
            Command::BindPipeline { pipeline, .. } => Some(*pipeline),
            _ => None,
        })
    }
}

/// Timestamp capabilities of the queue that executes frames
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimestampProperties {
    /// Number of meaningful low bits in each timestamp
    pub valid_bits: u32,
    /// Nanoseconds per timestamp tick
    pub period_ns: f32,
}

/// The graphics/compute device consumed by samples
///
/// Methods take `&self`; implementations synchronize internally so a device can
/// be shared as [`SharedDevice`] by every resource group that owns handles.
pub trait GpuDevice: Send + Sync + fmt::Debug {
    fn create_image(&self, desc: &ImageDesc) -> Result<ImageHandle>;

    /// Creates a sampled image initialized with `data`
    fn upload_texture(&self, label: &str, data: &TextureData) -> Result<ImageHandle>;

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<SamplerHandle>;

    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<RenderPassHandle>;

    fn create_framebuffer(&self, desc: &FramebufferDesc) -> Result<FramebufferHandle>;

    fn create_binding_layout(&self, desc: &BindingLayoutDesc) -> Result<BindingLayoutHandle>;

    fn create_binding_set(&self, layout: BindingLayoutHandle) -> Result<BindingSetHandle>;

    /// Replaces the full contents of a binding set
    fn write_binding_set(&self, set: BindingSetHandle, writes: &[BindingWrite]) -> Result<()>;

    fn create_pipeline_layout(&self, desc: &PipelineLayoutDesc) -> Result<PipelineLayoutHandle>;

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> Result<PipelineHandle>;

    fn create_compute_pipeline(&self, desc: &ComputePipelineDesc) -> Result<PipelineHandle>;

    fn create_query_pool(&self, count: u32) -> Result<QueryPoolHandle>;

    /// Releases a handle; unknown handles are ignored
    fn destroy(&self, handle: AnyHandle);

    fn timestamp_properties(&self) -> TimestampProperties;

    /// Current extent of the presentation surface
    fn surface_extent(&self) -> Extent;

    /// Reconfigures the presentation surface for a new extent
    fn resize_surface(&self, extent: Extent) -> Result<()>;

    /// Number of frames that can be in flight, i.e. how many command streams a sample keeps
    fn frame_slots(&self) -> usize;

    /// Acquires the next presentation image and returns its frame slot
    fn acquire_frame(&self) -> Result<usize>;

    /// Executes `commands` against the image acquired for `slot` and presents it
    fn submit(&self, slot: usize, commands: &CommandStream) -> Result<()>;

    /// Blocks until the last submission finished and returns the first `count` timestamps of `pool`
    fn read_timestamps(&self, pool: QueryPoolHandle, count: u32) -> Result<Vec<u64>>;

    /// Blocks until the device has no work in flight
    fn wait_idle(&self) -> Result<()>;
}

/// Device shared by every owner of device handles
pub type SharedDevice = Arc<dyn GpuDevice>;

/// A device handle that is destroyed when dropped
pub struct Owned<H: Copy + Into<AnyHandle>> {
    handle: H,
    device: SharedDevice,
}

impl<H: Copy + Into<AnyHandle>> Owned<H> {
    pub fn new(device: &SharedDevice, handle: H) -> Self {
        Self {
            handle,
            device: device.clone(),
        }
    }

    pub fn handle(&self) -> H {
        self.handle
    }
}

impl<H: Copy + Into<AnyHandle>> Drop for Owned<H> {
    fn drop(&mut self) {
        self.device.destroy(self.handle.into());
    }
}

impl<H: Copy + Into<AnyHandle> + fmt::Debug> fmt::Debug for Owned<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Owned").field(&self.handle).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extent() {
        assert!(Extent::new(0, 600).is_empty());
        assert!(Extent::new(800, 0).is_empty());
        assert!(!Extent::new(800, 600).is_empty());
        assert_eq!(Extent::new(800, 400).texel_offset(), [1.0 / 800.0, 1.0 / 400.0]);
        assert_eq!(Extent::new(1920, 1080).to_string(), "1920x1080");
    }

    #[test]
    fn test_stream_queries() {
        let pool = QueryPoolHandle::from_raw(1);
        let pipeline = PipelineHandle::from_raw(2);
        let mut stream = CommandStream::new();
        stream.push(Command::ResetQueries { pool, first: 0, count: 2 });
        stream.push(Command::WriteTimestamp {
            pool,
            slot: 0,
            stage: PipelineStage::TopOfPipe,
        });
        stream.push(Command::BindPipeline {
            bind_point: BindPoint::Graphics,
            pipeline,
        });
        stream.push(Command::WriteTimestamp {
            pool,
            slot: 1,
            stage: PipelineStage::BottomOfPipe,
        });

        assert_eq!(stream.len(), 4);
        assert_eq!(stream.timestamp_writes(), 2);
        assert_eq!(stream.bound_pipelines().collect::<Vec<_>>(), vec![pipeline]);
    }

    #[test]
    fn test_shader_constants() {
        let stage = ShaderStageDescriptor {
            path: "blur.wgsl".into(),
            stage: ShaderStage::Compute,
            source: Arc::from(""),
            constants: Vec::new(),
        }
        .with_constants(&[(0, 128), (1, 3)]);
        assert_eq!(stage.constants, vec![SpecializationConstant { id: 0, value: 128 }, SpecializationConstant { id: 1, value: 3 }]);
    }
}
