//! In-memory test doubles for the device, shader and asset interfaces

use crate::assets::AssetSource;
use crate::device::*;
use crate::presets::SamplePreset;
use crate::sample::SampleContext;
use crate::shaders::ShaderLoader;
use crate::ui::Drawer;
use crate::{Error, Result};
use filterlab_manifest::SampleManifest;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

/// Parses a built-in manifest by preset name
pub fn manifest(name: &str) -> SampleManifest {
    name.parse::<SamplePreset>().unwrap().manifest().unwrap()
}

/// Sample context backed by `device` and stub shader and asset sources
pub fn context(device: &Arc<RecordingDevice>) -> SampleContext {
    SampleContext {
        device: device.clone(),
        shaders: Box::new(StubShaders::default()),
        assets: Box::new(StubAssets),
    }
}

/// Pipeline creation parameters kept for assertions
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRecord {
    pub label: String,
    pub layout: PipelineLayoutHandle,
    pub render_pass: Option<RenderPassHandle>,
    pub shader: String,
    pub constants: Vec<SpecializationConstant>,
}

#[derive(Debug)]
struct Recorded {
    next_id: u64,
    live: HashSet<AnyHandle>,
    images: HashMap<ImageHandle, Extent>,
    binding_writes: HashMap<BindingSetHandle, Vec<BindingWrite>>,
    pipelines: HashMap<PipelineHandle, PipelineRecord>,
    submissions: Vec<(usize, CommandStream)>,
    timestamps: Vec<u64>,
    timestamp_reads: Vec<u32>,
    valid_bits: u32,
    surface: Extent,
    surface_resizes: Vec<Extent>,
    uploads: Vec<ColorSpace>,
    next_slot: usize,
    wait_idle_calls: usize,
    fail_images: bool,
}

/// A [`GpuDevice`] that records every call instead of talking to a GPU
///
/// Submissions are checked against the live handle set, so a stream that refers
/// to a destroyed resource fails the same way a real device would misbehave.
#[derive(Debug)]
pub struct RecordingDevice {
    inner: Mutex<Recorded>,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::with_surface(Extent::new(800, 600))
    }

    pub fn with_surface(surface: Extent) -> Self {
        Self {
            inner: Mutex::new(Recorded {
                next_id: 1,
                live: HashSet::new(),
                images: HashMap::new(),
                binding_writes: HashMap::new(),
                pipelines: HashMap::new(),
                submissions: Vec::new(),
                timestamps: vec![1000, 5000, 6000, 9000],
                timestamp_reads: Vec::new(),
                valid_bits: 64,
                surface,
                surface_resizes: Vec::new(),
                uploads: Vec::new(),
                next_slot: 0,
                wait_idle_calls: 0,
                fail_images: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.inner.lock().unwrap()
    }

    fn issue<H: Copy + Into<AnyHandle>>(&self, make: fn(u64) -> H) -> H {
        let mut inner = self.lock();
        let handle = make(inner.next_id);
        inner.next_id += 1;
        inner.live.insert(handle.into());
        handle
    }

    fn require(&self, handle: impl Into<AnyHandle>) -> Result<()> {
        let handle = handle.into();
        if self.lock().live.contains(&handle) { Ok(()) } else { Err(Error::InvalidHandle(handle)) }
    }

    pub fn set_timestamps(&self, timestamps: Vec<u64>) {
        self.lock().timestamps = timestamps;
    }

    pub fn set_valid_bits(&self, valid_bits: u32) {
        self.lock().valid_bits = valid_bits;
    }

    /// Makes every following image creation fail
    pub fn fail_image_creation(&self, fail: bool) {
        self.lock().fail_images = fail;
    }

    pub fn is_live(&self, handle: impl Into<AnyHandle>) -> bool {
        self.lock().live.contains(&handle.into())
    }

    pub fn live_count(&self) -> usize {
        self.lock().live.len()
    }

    /// Extents of every live image, uploaded textures included
    pub fn live_images(&self) -> Vec<(ImageHandle, Extent)> {
        let inner = self.lock();
        inner.images.iter().filter(|(image, _)| inner.live.contains(&AnyHandle::Image(**image))).map(|(&image, &extent)| (image, extent)).collect()
    }

    pub fn binding_writes(&self, set: BindingSetHandle) -> Vec<BindingWrite> {
        self.lock().binding_writes.get(&set).cloned().unwrap_or_default()
    }

    pub fn pipeline(&self, handle: PipelineHandle) -> Option<PipelineRecord> {
        self.lock().pipelines.get(&handle).cloned()
    }

    pub fn submissions(&self) -> Vec<(usize, CommandStream)> {
        self.lock().submissions.clone()
    }

    pub fn clear_submissions(&self) {
        self.lock().submissions.clear();
    }

    /// Slot counts passed to every `read_timestamps` call
    pub fn timestamp_reads(&self) -> Vec<u32> {
        self.lock().timestamp_reads.clone()
    }

    /// Color spaces of every uploaded texture, in upload order
    pub fn uploads(&self) -> Vec<ColorSpace> {
        self.lock().uploads.clone()
    }

    pub fn surface_resizes(&self) -> Vec<Extent> {
        self.lock().surface_resizes.clone()
    }

    pub fn wait_idle_calls(&self) -> usize {
        self.lock().wait_idle_calls
    }

    fn record_pipeline(&self, record: PipelineRecord) -> PipelineHandle {
        let handle = self.issue(PipelineHandle::from_raw);
        self.lock().pipelines.insert(handle, record);
        handle
    }
}

impl GpuDevice for RecordingDevice {
    fn create_image(&self, desc: &ImageDesc) -> Result<ImageHandle> {
        if self.lock().fail_images {
            return Err(Error::Device(format!("out of memory creating {}", desc.label)));
        }
        let handle = self.issue(ImageHandle::from_raw);
        self.lock().images.insert(handle, desc.extent);
        Ok(handle)
    }

    fn upload_texture(&self, _label: &str, data: &TextureData) -> Result<ImageHandle> {
        let handle = self.issue(ImageHandle::from_raw);
        let mut inner = self.lock();
        inner.images.insert(handle, data.extent);
        inner.uploads.push(data.color_space);
        Ok(handle)
    }

    fn create_sampler(&self, _desc: &SamplerDesc) -> Result<SamplerHandle> {
        Ok(self.issue(SamplerHandle::from_raw))
    }

    fn create_render_pass(&self, _desc: &RenderPassDesc) -> Result<RenderPassHandle> {
        Ok(self.issue(RenderPassHandle::from_raw))
    }

    fn create_framebuffer(&self, desc: &FramebufferDesc) -> Result<FramebufferHandle> {
        self.require(desc.render_pass)?;
        if let AttachmentTarget::Image(image) = desc.target {
            self.require(image)?;
        }
        Ok(self.issue(FramebufferHandle::from_raw))
    }

    fn create_binding_layout(&self, _desc: &BindingLayoutDesc) -> Result<BindingLayoutHandle> {
        Ok(self.issue(BindingLayoutHandle::from_raw))
    }

    fn create_binding_set(&self, layout: BindingLayoutHandle) -> Result<BindingSetHandle> {
        self.require(layout)?;
        Ok(self.issue(BindingSetHandle::from_raw))
    }

    fn write_binding_set(&self, set: BindingSetHandle, writes: &[BindingWrite]) -> Result<()> {
        self.require(set)?;
        for write in writes {
            self.require(write.resource.image())?;
            if let BoundResource::SampledImage { sampler, .. } = write.resource {
                self.require(sampler)?;
            }
        }
        self.lock().binding_writes.insert(set, writes.to_vec());
        Ok(())
    }

    fn create_pipeline_layout(&self, desc: &PipelineLayoutDesc) -> Result<PipelineLayoutHandle> {
        for &layout in &desc.binding_layouts {
            self.require(layout)?;
        }
        Ok(self.issue(PipelineLayoutHandle::from_raw))
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> Result<PipelineHandle> {
        self.require(desc.layout)?;
        self.require(desc.render_pass)?;
        Ok(self.record_pipeline(PipelineRecord {
            label: desc.label.clone(),
            layout: desc.layout,
            render_pass: Some(desc.render_pass),
            shader: desc.fragment.path.clone(),
            constants: desc.fragment.constants.clone(),
        }))
    }

    fn create_compute_pipeline(&self, desc: &ComputePipelineDesc) -> Result<PipelineHandle> {
        self.require(desc.layout)?;
        Ok(self.record_pipeline(PipelineRecord {
            label: desc.label.clone(),
            layout: desc.layout,
            render_pass: None,
            shader: desc.compute.path.clone(),
            constants: desc.compute.constants.clone(),
        }))
    }

    fn create_query_pool(&self, _count: u32) -> Result<QueryPoolHandle> {
        Ok(self.issue(QueryPoolHandle::from_raw))
    }

    fn destroy(&self, handle: AnyHandle) {
        self.lock().live.remove(&handle);
    }

    fn timestamp_properties(&self) -> TimestampProperties {
        TimestampProperties {
            valid_bits: self.lock().valid_bits,
            period_ns: 1.0,
        }
    }

    fn surface_extent(&self) -> Extent {
        self.lock().surface
    }

    fn resize_surface(&self, extent: Extent) -> Result<()> {
        let mut inner = self.lock();
        inner.surface = extent;
        inner.surface_resizes.push(extent);
        Ok(())
    }

    fn frame_slots(&self) -> usize {
        2
    }

    fn acquire_frame(&self) -> Result<usize> {
        let mut inner = self.lock();
        let slot = inner.next_slot % 2;
        inner.next_slot += 1;
        Ok(slot)
    }

    fn submit(&self, slot: usize, commands: &CommandStream) -> Result<()> {
        crate::backend::pass_timestamps(commands.commands())?;
        for command in commands.commands() {
            match *command {
                Command::ResetQueries { pool, .. } | Command::WriteTimestamp { pool, .. } => self.require(pool)?,
                Command::BeginRenderPass { render_pass, framebuffer, .. } => {
                    self.require(render_pass)?;
                    self.require(framebuffer)?;
                }
                Command::BindPipeline { pipeline, .. } => self.require(pipeline)?,
                Command::BindSet { layout, set, .. } => {
                    self.require(layout)?;
                    self.require(set)?;
                }
                Command::PushConstants { layout, .. } => self.require(layout)?,
                Command::ImageBarrier { image, .. } => self.require(image)?,
                Command::EndRenderPass | Command::Draw { .. } | Command::Dispatch { .. } | Command::DrawOverlay => {}
            }
        }
        self.lock().submissions.push((slot, commands.clone()));
        Ok(())
    }

    fn read_timestamps(&self, pool: QueryPoolHandle, count: u32) -> Result<Vec<u64>> {
        self.require(pool)?;
        let mut inner = self.lock();
        inner.timestamp_reads.push(count);
        if inner.timestamps.len() < count as usize {
            return Err(Error::Device(format!("only {} timestamps available", inner.timestamps.len())));
        }
        Ok(inner.timestamps[..count as usize].to_vec())
    }

    fn wait_idle(&self) -> Result<()> {
        self.lock().wait_idle_calls += 1;
        Ok(())
    }
}

/// Shader loader returning placeholder sources and remembering what was requested
#[derive(Debug, Default)]
pub struct StubShaders {
    loads: Mutex<Vec<String>>,
}

impl StubShaders {
    pub fn loads(&self) -> Vec<String> {
        self.loads.lock().unwrap().clone()
    }
}

impl ShaderLoader for StubShaders {
    fn load_shader(&self, path: &str, stage: ShaderStage) -> Result<ShaderStageDescriptor> {
        self.loads.lock().unwrap().push(path.to_string());
        Ok(ShaderStageDescriptor {
            path: path.to_string(),
            stage,
            source: Arc::from(format!("// {path}")),
            constants: Vec::new(),
        })
    }
}

/// Asset source producing a small opaque texture for any path
#[derive(Debug, Default)]
pub struct StubAssets;

impl AssetSource for StubAssets {
    fn load_texture(&self, _path: &str, color_space: ColorSpace) -> Result<TextureData> {
        Ok(TextureData {
            extent: Extent::new(64, 64),
            color_space,
            pixels: vec![255; 64 * 64 * 4],
        })
    }
}

/// A [`Drawer`] driven by scripted user input
///
/// Widgets answer from the configured maps keyed by caption; everything drawn is recorded.
#[derive(Debug, Default)]
pub struct ScriptedDrawer {
    pub press: HashSet<String>,
    pub combo_choices: HashMap<String, usize>,
    pub float_values: HashMap<String, f32>,
    pub int_values: HashMap<String, i32>,
    pub collapsed: HashSet<String>,
    pub headers: Vec<String>,
    pub buttons: Vec<String>,
    pub combos: HashMap<String, Vec<String>>,
    pub sliders: Vec<String>,
    pub texts: Vec<String>,
}

impl ScriptedDrawer {
    pub fn pressing(caption: &str) -> Self {
        Self {
            press: HashSet::from([caption.to_string()]),
            ..Default::default()
        }
    }

    pub fn choosing(caption: &str, index: usize) -> Self {
        Self {
            combo_choices: HashMap::from([(caption.to_string(), index)]),
            ..Default::default()
        }
    }
}

impl Drawer for ScriptedDrawer {
    fn header(&mut self, caption: &str) -> bool {
        self.headers.push(caption.to_string());
        !self.collapsed.contains(caption)
    }

    fn button(&mut self, caption: &str) -> bool {
        self.buttons.push(caption.to_string());
        self.press.contains(caption)
    }

    fn combo_box(&mut self, caption: &str, selected: &mut usize, items: &[&str]) -> bool {
        self.combos.insert(caption.to_string(), items.iter().map(|item| item.to_string()).collect());
        match self.combo_choices.get(caption) {
            Some(&choice) if choice != *selected && choice < items.len() => {
                *selected = choice;
                true
            }
            _ => false,
        }
    }

    fn slider_float(&mut self, caption: &str, value: &mut f32, min: f32, max: f32) -> bool {
        self.sliders.push(caption.to_string());
        match self.float_values.get(caption) {
            Some(&scripted) if scripted != *value => {
                *value = scripted.clamp(min, max);
                true
            }
            _ => false,
        }
    }

    fn slider_int(&mut self, caption: &str, value: &mut i32, min: i32, max: i32) -> bool {
        self.sliders.push(caption.to_string());
        match self.int_values.get(caption) {
            Some(&scripted) if scripted != *value => {
                *value = scripted.clamp(min, max);
                true
            }
            _ => false,
        }
    }

    fn text(&mut self, text: &str) {
        self.texts.push(text.to_string());
    }
}
