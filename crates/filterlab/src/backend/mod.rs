//! wgpu implementation of [`GpuDevice`]
//!
//! Handles map to wgpu objects held in a registry behind a mutex. Frames are
//! replayed from their [`CommandStream`] into a fresh command encoder on every
//! submission.
//!
//! Logical bindings are spread over wgpu bindings: a sampled image at logical
//! binding `b` occupies texture binding `2b` and sampler binding `2b + 1`, a
//! storage image occupies binding `2b`. Shaders declare their bindings this way.

mod context;
mod readback;
mod replay;

#[cfg(test)]
pub(crate) use replay::pass_timestamps;

use crate::device::{
    AddressMode, AnyHandle, AttachmentTarget, BindingKind, BindingLayoutDesc, BindingLayoutHandle, BindingSetHandle, BindingWrite, BoundResource, ColorSpace, CommandStream, ComputePipelineDesc,
    Extent, FilterMode, FramebufferDesc, FramebufferHandle, GpuDevice, GraphicsPipelineDesc, ImageDesc, ImageHandle, ImageUsage, PipelineHandle, PipelineLayoutDesc, PipelineLayoutHandle,
    QueryPoolHandle, RenderPassDesc, RenderPassHandle, SamplerDesc, SamplerHandle, ShaderStage, ShaderStageDescriptor, TargetFormat, TextureData, TimestampProperties,
};
use crate::{Error, Result};
use context::GpuContext;
use readback::QueryPool;
use std::borrow::Cow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};

/// Frames that may be in flight at once
const FRAME_SLOTS: usize = 2;

/// Format of offscreen images and of headless presentation targets
const IMAGE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

#[derive(Debug)]
struct Image {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

#[derive(Debug)]
struct BindingLayout {
    desc: BindingLayoutDesc,
    layout: wgpu::BindGroupLayout,
}

#[derive(Debug)]
struct BindingSet {
    layout: BindingLayoutHandle,
    /// Created on the first write
    group: Option<wgpu::BindGroup>,
}

#[derive(Debug)]
enum Pipeline {
    Render(wgpu::RenderPipeline),
    Compute(wgpu::ComputePipeline),
}

/// Every live wgpu object, keyed by the handle given out for it
#[derive(Debug, Default)]
struct Registry {
    last_id: u64,
    images: HashMap<ImageHandle, Image>,
    samplers: HashMap<SamplerHandle, wgpu::Sampler>,
    render_passes: HashMap<RenderPassHandle, RenderPassDesc>,
    framebuffers: HashMap<FramebufferHandle, FramebufferDesc>,
    binding_layouts: HashMap<BindingLayoutHandle, BindingLayout>,
    binding_sets: HashMap<BindingSetHandle, BindingSet>,
    pipeline_layouts: HashMap<PipelineLayoutHandle, wgpu::PipelineLayout>,
    pipelines: HashMap<PipelineHandle, Pipeline>,
    query_pools: HashMap<QueryPoolHandle, QueryPool>,
}

impl Registry {
    fn next_id(&mut self) -> u64 {
        self.last_id += 1;
        self.last_id
    }

    fn remove(&mut self, handle: AnyHandle) -> bool {
        match handle {
            AnyHandle::Image(h) => self.images.remove(&h).map(|image| image.texture.destroy()).is_some(),
            AnyHandle::Sampler(h) => self.samplers.remove(&h).is_some(),
            AnyHandle::RenderPass(h) => self.render_passes.remove(&h).is_some(),
            AnyHandle::Framebuffer(h) => self.framebuffers.remove(&h).is_some(),
            AnyHandle::BindingLayout(h) => self.binding_layouts.remove(&h).is_some(),
            AnyHandle::BindingSet(h) => self.binding_sets.remove(&h).is_some(),
            AnyHandle::PipelineLayout(h) => self.pipeline_layouts.remove(&h).is_some(),
            AnyHandle::Pipeline(h) => self.pipelines.remove(&h).is_some(),
            AnyHandle::QueryPool(h) => self.query_pools.remove(&h).is_some(),
        }
    }
}

/// Looks up a live object or reports the handle as invalid
fn lookup<H, T>(map: &HashMap<H, T>, handle: H) -> Result<&T>
where
    H: Copy + Eq + Hash + Into<AnyHandle>,
{
    map.get(&handle).ok_or(Error::InvalidHandle(handle.into()))
}

/// Target presented frames are rendered into
#[derive(Debug)]
enum Presentation {
    Window {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
        /// Surface textures acquired but not yet presented, per frame slot
        acquired: Vec<Option<wgpu::SurfaceTexture>>,
    },
    Headless {
        extent: Extent,
        targets: Vec<wgpu::Texture>,
    },
}

/// Image a submission renders its swapchain passes into
struct FrameTarget {
    view: wgpu::TextureView,
    surface_texture: Option<wgpu::SurfaceTexture>,
}

impl Presentation {
    fn headless(device: &wgpu::Device, extent: Extent) -> Self {
        Presentation::Headless {
            extent,
            targets: headless_targets(device, extent),
        }
    }

    fn format(&self) -> wgpu::TextureFormat {
        match self {
            Presentation::Window { config, .. } => config.format,
            Presentation::Headless { .. } => IMAGE_FORMAT,
        }
    }

    fn extent(&self) -> Extent {
        match self {
            Presentation::Window { config, .. } => Extent::new(config.width, config.height),
            Presentation::Headless { extent, .. } => *extent,
        }
    }

    fn resize(&mut self, device: &wgpu::Device, new_extent: Extent) {
        match self {
            Presentation::Window { surface, config, acquired } => {
                acquired.iter_mut().for_each(|texture| *texture = None);
                config.width = new_extent.width;
                config.height = new_extent.height;
                if !new_extent.is_empty() {
                    surface.configure(device, config);
                }
            }
            Presentation::Headless { extent, targets } => {
                *extent = new_extent;
                *targets = headless_targets(device, new_extent);
            }
        }
    }

    fn acquire(&mut self, device: &wgpu::Device, slot: usize) -> Result<()> {
        match self {
            Presentation::Window { surface, config, acquired } => {
                if config.width == 0 || config.height == 0 {
                    return Err(Error::EmptyExtent);
                }
                let texture = match surface.get_current_texture() {
                    Ok(texture) => texture,
                    Err(wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost) => {
                        tracing::debug!("Surface outdated, reconfiguring");
                        surface.configure(device, config);
                        surface.get_current_texture()?
                    }
                    Err(e) => return Err(e.into()),
                };
                if let Some(entry) = acquired.get_mut(slot) {
                    *entry = Some(texture);
                }
                Ok(())
            }
            Presentation::Headless { extent, .. } if extent.is_empty() => Err(Error::EmptyExtent),
            Presentation::Headless { .. } => Ok(()),
        }
    }

    fn take_frame(&mut self, slot: usize) -> Result<FrameTarget> {
        let not_acquired = || Error::Device(format!("Frame slot {slot} was not acquired"));
        match self {
            Presentation::Window { acquired, .. } => {
                let texture = acquired.get_mut(slot).and_then(Option::take).ok_or_else(not_acquired)?;
                Ok(FrameTarget {
                    view: texture.texture.create_view(&wgpu::TextureViewDescriptor::default()),
                    surface_texture: Some(texture),
                })
            }
            Presentation::Headless { targets, .. } => {
                let texture = targets.get(slot).ok_or_else(not_acquired)?;
                Ok(FrameTarget {
                    view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
                    surface_texture: None,
                })
            }
        }
    }
}

fn headless_targets(device: &wgpu::Device, extent: Extent) -> Vec<wgpu::Texture> {
    if extent.is_empty() {
        return Vec::new();
    }
    (0..FRAME_SLOTS)
        .map(|slot| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(&format!("headless frame {slot}")),
                size: texture_size(extent),
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: IMAGE_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            })
        })
        .collect()
}

fn texture_size(extent: Extent) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: extent.width,
        height: extent.height,
        depth_or_array_layers: 1,
    }
}

fn shader_stages(stage: ShaderStage) -> wgpu::ShaderStages {
    match stage {
        ShaderStage::Vertex => wgpu::ShaderStages::VERTEX,
        ShaderStage::Fragment => wgpu::ShaderStages::FRAGMENT,
        ShaderStage::Compute => wgpu::ShaderStages::COMPUTE,
    }
}

/// Specialization constants keyed by their numeric override id
fn override_constants(stage: &ShaderStageDescriptor) -> Vec<(String, f64)> {
    stage.constants.iter().map(|constant| (constant.id.to_string(), f64::from(constant.value))).collect()
}

fn borrowed_constants(constants: &[(String, f64)]) -> Vec<(&str, f64)> {
    constants.iter().map(|(key, value)| (key.as_str(), *value)).collect()
}

#[derive(Debug)]
struct BackendState {
    registry: Registry,
    presentation: Presentation,
    next_slot: usize,
}

/// [`GpuDevice`] backed by wgpu
#[derive(Debug)]
pub struct WgpuDevice {
    context: GpuContext,
    state: Mutex<BackendState>,
}

impl WgpuDevice {
    /// Opens a device presenting into a window surface
    ///
    /// # Arguments
    /// * `target` - Window to present into (e.g. an `Arc<winit::window::Window>`)
    /// * `extent` - Current inner size of the window
    pub fn windowed(target: impl Into<wgpu::SurfaceTarget<'static>>, extent: Extent) -> Result<Self> {
        let instance = GpuContext::instance();
        let surface = instance
            .create_surface(target)
            .map_err(|e| Error::Device(format!("Failed to create surface: {e}")))?;
        let context = pollster::block_on(GpuContext::request(&instance, Some(&surface)))?;

        let capabilities = surface.get_capabilities(&context.adapter);
        // Shaders write final values, so the surface must not re-encode them
        let format = capabilities
            .formats
            .iter()
            .copied()
            .find(|format| !format.is_srgb())
            .or_else(|| capabilities.formats.first().copied())
            .ok_or_else(|| Error::Device("Surface reports no formats".to_string()))?;
        let alpha_mode = capabilities.alpha_modes.first().copied().unwrap_or(wgpu::CompositeAlphaMode::Auto);
        tracing::info!("Surface format {:?}, extent {}", format, extent);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: extent.width,
            height: extent.height,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: FRAME_SLOTS as u32,
        };
        if !extent.is_empty() {
            surface.configure(&context.device, &config);
        }

        Ok(Self::with_presentation(
            context,
            Presentation::Window {
                surface,
                config,
                acquired: (0..FRAME_SLOTS).map(|_| None).collect(),
            },
        ))
    }

    /// Opens a device rendering into offscreen targets of `extent`
    pub fn headless(extent: Extent) -> Result<Self> {
        let instance = GpuContext::instance();
        let context = pollster::block_on(GpuContext::request(&instance, None))?;
        let presentation = Presentation::headless(&context.device, extent);
        Ok(Self::with_presentation(context, presentation))
    }

    fn with_presentation(context: GpuContext, presentation: Presentation) -> Self {
        Self {
            context,
            state: Mutex::new(BackendState {
                registry: Registry::default(),
                presentation,
                next_slot: 0,
            }),
        }
    }

    /// Name and backend of the adapter in use
    pub fn adapter_info(&self) -> wgpu::AdapterInfo {
        self.context.adapter.get_info()
    }

    fn state(&self) -> Result<MutexGuard<'_, BackendState>> {
        self.state.lock().map_err(|_| Error::Device("Device state poisoned".to_string()))
    }

    /// Runs `create` inside a validation error scope
    fn validated<T>(&self, create: impl FnOnce() -> T) -> std::result::Result<T, wgpu::Error> {
        self.context.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create();
        match pollster::block_on(self.context.device.pop_error_scope()) {
            Some(error) => Err(error),
            None => Ok(value),
        }
    }

    fn shader_module(&self, stage: &ShaderStageDescriptor) -> Result<wgpu::ShaderModule> {
        self.validated(|| {
            self.context.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&stage.path),
                source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(&stage.source)),
            })
        })
        .map_err(|e| Error::ShaderLoad {
            path: stage.path.clone(),
            reason: e.to_string(),
        })
    }

    fn insert_pipeline(&self, pipeline: Pipeline) -> Result<PipelineHandle> {
        let mut state = self.state()?;
        let handle = PipelineHandle::from_raw(state.registry.next_id());
        state.registry.pipelines.insert(handle, pipeline);
        Ok(handle)
    }
}

impl GpuDevice for WgpuDevice {
    fn create_image(&self, desc: &ImageDesc) -> Result<ImageHandle> {
        if desc.extent.is_empty() {
            return Err(Error::EmptyExtent);
        }
        let usage = match desc.usage {
            ImageUsage::ColorTarget => wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            ImageUsage::Storage => wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
        };
        let texture = self.context.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&desc.label),
            size: texture_size(desc.extent),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: IMAGE_FORMAT,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let mut state = self.state()?;
        let handle = ImageHandle::from_raw(state.registry.next_id());
        state.registry.images.insert(handle, Image { texture, view });
        Ok(handle)
    }

    fn upload_texture(&self, label: &str, data: &TextureData) -> Result<ImageHandle> {
        let Extent { width, height } = data.extent;
        if data.extent.is_empty() || data.pixels.len() as u64 != u64::from(width) * u64::from(height) * 4 {
            return Err(Error::Device(format!("Texture '{label}' has {} bytes for extent {}", data.pixels.len(), data.extent)));
        }
        let format = match data.color_space {
            ColorSpace::Srgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            ColorSpace::Linear => wgpu::TextureFormat::Rgba8Unorm,
        };
        let texture = self.context.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: texture_size(data.extent),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.context.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &data.pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            texture_size(data.extent),
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let mut state = self.state()?;
        let handle = ImageHandle::from_raw(state.registry.next_id());
        state.registry.images.insert(handle, Image { texture, view });
        Ok(handle)
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<SamplerHandle> {
        let (address, border_color) = match desc.address {
            AddressMode::ClampToEdge => (wgpu::AddressMode::ClampToEdge, None),
            AddressMode::ClampToBorder if self.context.supports_border_clamp() => (wgpu::AddressMode::ClampToBorder, Some(wgpu::SamplerBorderColor::OpaqueWhite)),
            AddressMode::ClampToBorder => {
                tracing::warn!("Border clamping unsupported, sampler '{}' clamps to edge", desc.label);
                (wgpu::AddressMode::ClampToEdge, None)
            }
        };
        let filter = match desc.filter {
            FilterMode::Linear => wgpu::FilterMode::Linear,
            FilterMode::Nearest => wgpu::FilterMode::Nearest,
        };
        let sampler = self.context.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(desc.label),
            address_mode_u: address,
            address_mode_v: address,
            address_mode_w: address,
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: wgpu::FilterMode::Nearest,
            border_color,
            ..Default::default()
        });

        let mut state = self.state()?;
        let handle = SamplerHandle::from_raw(state.registry.next_id());
        state.registry.samplers.insert(handle, sampler);
        Ok(handle)
    }

    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<RenderPassHandle> {
        let mut state = self.state()?;
        let handle = RenderPassHandle::from_raw(state.registry.next_id());
        state.registry.render_passes.insert(handle, desc.clone());
        Ok(handle)
    }

    fn create_framebuffer(&self, desc: &FramebufferDesc) -> Result<FramebufferHandle> {
        let mut state = self.state()?;
        lookup(&state.registry.render_passes, desc.render_pass)?;
        match desc.target {
            AttachmentTarget::Image(image) => {
                lookup(&state.registry.images, image)?;
            }
            AttachmentTarget::Swapchain(slot) if slot >= FRAME_SLOTS => {
                return Err(Error::Device(format!("Framebuffer '{}' targets frame slot {slot} of {FRAME_SLOTS}", desc.label)));
            }
            AttachmentTarget::Swapchain(_) => {}
        }
        let handle = FramebufferHandle::from_raw(state.registry.next_id());
        state.registry.framebuffers.insert(handle, desc.clone());
        Ok(handle)
    }

    fn create_binding_layout(&self, desc: &BindingLayoutDesc) -> Result<BindingLayoutHandle> {
        let mut entries = Vec::with_capacity(desc.entries.len() * 2);
        for entry in &desc.entries {
            let visibility = shader_stages(entry.stage);
            match entry.kind {
                BindingKind::SampledImage => {
                    entries.push(wgpu::BindGroupLayoutEntry {
                        binding: entry.binding * 2,
                        visibility,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    });
                    entries.push(wgpu::BindGroupLayoutEntry {
                        binding: entry.binding * 2 + 1,
                        visibility,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    });
                }
                BindingKind::StorageImage => entries.push(wgpu::BindGroupLayoutEntry {
                    binding: entry.binding * 2,
                    visibility,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: IMAGE_FORMAT,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                }),
            }
        }
        let layout = self.context.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(desc.label),
            entries: &entries,
        });

        let mut state = self.state()?;
        let handle = BindingLayoutHandle::from_raw(state.registry.next_id());
        state.registry.binding_layouts.insert(handle, BindingLayout { desc: desc.clone(), layout });
        Ok(handle)
    }

    fn create_binding_set(&self, layout: BindingLayoutHandle) -> Result<BindingSetHandle> {
        let mut state = self.state()?;
        lookup(&state.registry.binding_layouts, layout)?;
        let handle = BindingSetHandle::from_raw(state.registry.next_id());
        state.registry.binding_sets.insert(handle, BindingSet { layout, group: None });
        Ok(handle)
    }

    fn write_binding_set(&self, set: BindingSetHandle, writes: &[BindingWrite]) -> Result<()> {
        let mut state = self.state()?;
        let group = {
            let registry = &state.registry;
            let layout = lookup(&registry.binding_layouts, lookup(&registry.binding_sets, set)?.layout)?;

            let mut entries = Vec::with_capacity(writes.len() * 2);
            for write in writes {
                let expected = layout.desc.entries.iter().find(|entry| entry.binding == write.binding).map(|entry| entry.kind);
                let view = &lookup(&registry.images, write.resource.image())?.view;
                match (write.resource, expected) {
                    (BoundResource::SampledImage { sampler, .. }, Some(BindingKind::SampledImage)) => {
                        entries.push(wgpu::BindGroupEntry {
                            binding: write.binding * 2,
                            resource: wgpu::BindingResource::TextureView(view),
                        });
                        entries.push(wgpu::BindGroupEntry {
                            binding: write.binding * 2 + 1,
                            resource: wgpu::BindingResource::Sampler(lookup(&registry.samplers, sampler)?),
                        });
                    }
                    (BoundResource::StorageImage { .. }, Some(BindingKind::StorageImage)) => entries.push(wgpu::BindGroupEntry {
                        binding: write.binding * 2,
                        resource: wgpu::BindingResource::TextureView(view),
                    }),
                    (resource, _) => {
                        return Err(Error::Device(format!("Binding {} of '{}' cannot hold {resource:?}", write.binding, layout.desc.label)));
                    }
                }
            }

            self.context.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(layout.desc.label),
                layout: &layout.layout,
                entries: &entries,
            })
        };
        if let Some(binding_set) = state.registry.binding_sets.get_mut(&set) {
            binding_set.group = Some(group);
        }
        Ok(())
    }

    fn create_pipeline_layout(&self, desc: &PipelineLayoutDesc) -> Result<PipelineLayoutHandle> {
        let mut state = self.state()?;
        let layout = {
            let bind_group_layouts = desc
                .binding_layouts
                .iter()
                .map(|&handle| lookup(&state.registry.binding_layouts, handle).map(|layout| &layout.layout))
                .collect::<Result<Vec<_>>>()?;
            let push_constant_ranges: Vec<wgpu::PushConstantRange> = desc
                .push_constants
                .iter()
                .map(|range| wgpu::PushConstantRange {
                    stages: shader_stages(range.stage),
                    range: 0..range.size,
                })
                .collect();

            self.context.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(desc.label),
                bind_group_layouts: &bind_group_layouts,
                push_constant_ranges: &push_constant_ranges,
            })
        };

        let handle = PipelineLayoutHandle::from_raw(state.registry.next_id());
        state.registry.pipeline_layouts.insert(handle, layout);
        Ok(handle)
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> Result<PipelineHandle> {
        let vertex = self.shader_module(&desc.vertex)?;
        let fragment = self.shader_module(&desc.fragment)?;
        let vertex_constants = override_constants(&desc.vertex);
        let fragment_constants = override_constants(&desc.fragment);

        let pipeline = {
            let state = self.state()?;
            let layout = lookup(&state.registry.pipeline_layouts, desc.layout)?;
            let format = match lookup(&state.registry.render_passes, desc.render_pass)?.format {
                TargetFormat::Rgba8Unorm => IMAGE_FORMAT,
                TargetFormat::Swapchain => state.presentation.format(),
            };

            self.validated(|| {
                self.context.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some(&desc.label),
                    layout: Some(layout),
                    vertex: wgpu::VertexState {
                        module: &vertex,
                        entry_point: None,
                        compilation_options: wgpu::PipelineCompilationOptions {
                            constants: &borrowed_constants(&vertex_constants),
                            ..Default::default()
                        },
                        buffers: &[],
                    },
                    fragment: Some(wgpu::FragmentState {
                        module: &fragment,
                        entry_point: None,
                        compilation_options: wgpu::PipelineCompilationOptions {
                            constants: &borrowed_constants(&fragment_constants),
                            ..Default::default()
                        },
                        targets: &[Some(wgpu::ColorTargetState {
                            format,
                            blend: None,
                            write_mask: wgpu::ColorWrites::ALL,
                        })],
                    }),
                    primitive: wgpu::PrimitiveState::default(),
                    depth_stencil: None,
                    multisample: wgpu::MultisampleState::default(),
                    multiview: None,
                    cache: None,
                })
            })
            .map_err(|e| Error::Device(format!("Failed to create pipeline '{}': {e}", desc.label)))?
        };

        self.insert_pipeline(Pipeline::Render(pipeline))
    }

    fn create_compute_pipeline(&self, desc: &ComputePipelineDesc) -> Result<PipelineHandle> {
        let module = self.shader_module(&desc.compute)?;
        let constants = override_constants(&desc.compute);

        let pipeline = {
            let state = self.state()?;
            let layout = lookup(&state.registry.pipeline_layouts, desc.layout)?;
            self.validated(|| {
                self.context.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(&desc.label),
                    layout: Some(layout),
                    module: &module,
                    entry_point: None,
                    compilation_options: wgpu::PipelineCompilationOptions {
                        constants: &borrowed_constants(&constants),
                        ..Default::default()
                    },
                    cache: None,
                })
            })
            .map_err(|e| Error::Device(format!("Failed to create pipeline '{}': {e}", desc.label)))?
        };

        self.insert_pipeline(Pipeline::Compute(pipeline))
    }

    fn create_query_pool(&self, count: u32) -> Result<QueryPoolHandle> {
        if !self.context.supports_timestamps() {
            return Err(Error::TimestampsUnavailable);
        }
        let pool = QueryPool::new(&self.context.device, count);

        let mut state = self.state()?;
        let handle = QueryPoolHandle::from_raw(state.registry.next_id());
        state.registry.query_pools.insert(handle, pool);
        Ok(handle)
    }

    fn destroy(&self, handle: AnyHandle) {
        match self.state.lock() {
            Ok(mut state) => {
                if !state.registry.remove(handle) {
                    tracing::trace!("Ignoring destroy of unknown handle {:?}", handle);
                }
            }
            Err(_) => tracing::error!("Device state poisoned, leaking {:?}", handle),
        }
    }

    fn timestamp_properties(&self) -> TimestampProperties {
        if self.context.supports_timestamps() {
            TimestampProperties {
                valid_bits: 64,
                period_ns: self.context.queue.get_timestamp_period(),
            }
        } else {
            TimestampProperties { valid_bits: 0, period_ns: 1.0 }
        }
    }

    fn surface_extent(&self) -> Extent {
        self.state.lock().map(|state| state.presentation.extent()).unwrap_or_default()
    }

    fn resize_surface(&self, extent: Extent) -> Result<()> {
        let mut state = self.state()?;
        tracing::debug!("Resizing surface to {}", extent);
        state.presentation.resize(&self.context.device, extent);
        Ok(())
    }

    fn frame_slots(&self) -> usize {
        FRAME_SLOTS
    }

    fn acquire_frame(&self) -> Result<usize> {
        let mut state = self.state()?;
        let slot = state.next_slot;
        state.presentation.acquire(&self.context.device, slot)?;
        state.next_slot = (slot + 1) % FRAME_SLOTS;
        Ok(slot)
    }

    fn submit(&self, slot: usize, commands: &CommandStream) -> Result<()> {
        let mut state = self.state()?;
        let frame = state.presentation.take_frame(slot)?;
        let command_buffer = replay::encode(&self.context, &mut state.registry, &frame.view, commands)?;
        self.context.queue.submit(Some(command_buffer));
        if let Some(surface_texture) = frame.surface_texture {
            surface_texture.present();
        }
        Ok(())
    }

    fn read_timestamps(&self, pool: QueryPoolHandle, count: u32) -> Result<Vec<u64>> {
        let state = self.state()?;
        lookup(&state.registry.query_pools, pool)?.read(&self.context.device, count)
    }

    fn wait_idle(&self) -> Result<()> {
        self.context
            .device
            .poll(wgpu::PollType::Wait)
            .map(|_| ())
            .map_err(|e| Error::Device(format!("Failed to wait for device: {e}")))
    }
}
