//! Sample lifecycle
//!
//! [`FilterSample`] is the contract between a host (the viewer, the bench) and a
//! filter sample. [`FilterApp`] implements it for any [`SampleManifest`], wiring the
//! resource manager, pipeline registry, binding table, frame recorder and timing
//! collector together.

use crate::assets::AssetSource;
use crate::bindings::DescriptorBindingTable;
use crate::controller::{ParameterController, UiChanges};
use crate::device::*;
use crate::orchestrator::{FrameContext, StrategyTable, record_frame};
use crate::params::{FilterState, PushConstants};
use crate::pipelines::PipelineVariantRegistry;
use crate::resize::{ResizeCoordinator, ResizeDecision};
use crate::resources::{RenderPasses, ResourceRequirements, ResourceSet, ResourceSetManager};
use crate::shaders::ShaderLoader;
use crate::strategy::{KernelSize, Strategy};
use crate::timing::TimingCollector;
use crate::ui::Drawer;
use crate::{Error, Result};
use filterlab_manifest::{SampleManifest, SamplerChoice};
use std::fmt;

/// Everything a sample needs from its host
pub struct SampleContext {
    pub device: SharedDevice,
    pub shaders: Box<dyn ShaderLoader>,
    pub assets: Box<dyn AssetSource>,
}

impl fmt::Debug for SampleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleContext").field("device", &self.device).finish_non_exhaustive()
    }
}

/// Runtime options applied by [`FilterSample::prepare`]
#[derive(Debug, Clone, Default)]
pub struct SampleOptions {
    /// Initial strategy; defaults to the first one the manifest declares
    pub strategy: Option<Strategy>,
    /// Initial kernel index
    pub kernel: Option<usize>,
    /// Texture path overriding the manifest's
    pub texture: Option<String>,
}

/// A filter sample driven by a host application
pub trait FilterSample {
    fn name(&self) -> &str;

    fn manifest(&self) -> &SampleManifest;

    /// Loads assets, builds every GPU object and records the first frames
    ///
    /// Returns `false` when the surface is empty; the sample then waits for a
    /// positive [`FilterSample::resize`].
    fn prepare(&mut self, options: &SampleOptions) -> Result<bool>;

    fn is_prepared(&self) -> bool;

    /// Submits the next frame and collects the previous frame's timings
    fn render(&mut self, delta_time: f32) -> Result<()>;

    /// Reacts to a surface resize and returns whether resources were rebuilt
    fn resize(&mut self, width: u32, height: u32) -> Result<bool>;

    /// Draws the overlay and applies the user's edits
    fn on_update_ui_overlay(&mut self, drawer: &mut dyn Drawer) -> Result<()>;

    /// Records one command stream per frame slot
    fn build_command_buffers(&mut self) -> Result<()>;

    /// Rebuilds the size-dependent resources at the surface extent and rebinds them
    fn setup_framebuffer(&mut self) -> Result<()>;

    /// Recreates the render passes and everything derived from them
    fn setup_render_pass(&mut self) -> Result<()>;

    fn select_strategy(&mut self, strategy: Strategy) -> Result<()>;

    fn select_kernel(&mut self, index: usize) -> Result<()>;

    fn state(&self) -> &FilterState;

    /// Timing statistics, once prepared
    fn timing(&self) -> Option<&TimingCollector>;
}

/// GPU objects that live from `prepare` until the sample is dropped
#[derive(Debug)]
struct PreparedGpu {
    registry: PipelineVariantRegistry,
    bindings: DescriptorBindingTable,
    passes: RenderPasses,
    source: Owned<ImageHandle>,
    source_sampler: Owned<SamplerHandle>,
    nearest_sampler: Owned<SamplerHandle>,
}

impl PreparedGpu {
    fn filter_sampler(&self, choice: SamplerChoice) -> SamplerHandle {
        match choice {
            SamplerChoice::Linear => self.source_sampler.handle(),
            SamplerChoice::Nearest => self.nearest_sampler.handle(),
        }
    }
}

/// A [`FilterSample`] for any manifest
#[derive(Debug)]
pub struct FilterApp {
    manifest: SampleManifest,
    ctx: SampleContext,
    table: StrategyTable,
    state: FilterState,
    push_constants: PushConstants,
    coordinator: ResizeCoordinator,
    resource_manager: ResourceSetManager,
    streams: Vec<CommandStream>,
    resources: Option<ResourceSet>,
    gpu: Option<PreparedGpu>,
    timing: Option<TimingCollector>,
    workgroup_axis: u32,
}

impl FilterApp {
    pub fn new(manifest: SampleManifest, ctx: SampleContext) -> Self {
        let requirements = ResourceRequirements::for_manifest(&manifest);
        let workgroup_axis = manifest.strategy(Strategy::Compute).and_then(|spec| spec.workgroup_axis_size).unwrap_or(1);
        Self {
            table: StrategyTable::for_manifest(&manifest),
            state: FilterState::from_manifest(&manifest),
            push_constants: PushConstants::default(),
            coordinator: ResizeCoordinator::new(),
            resource_manager: ResourceSetManager::new(&ctx.device, requirements),
            streams: Vec::new(),
            resources: None,
            gpu: None,
            timing: None,
            workgroup_axis,
            manifest,
            ctx,
        }
    }

    fn rebind(&mut self) -> Result<()> {
        let (Some(gpu), Some(resources)) = (self.gpu.as_mut(), self.resources.as_ref()) else {
            return Err(Error::NotPrepared);
        };
        let filter_sampler = gpu.filter_sampler(self.state.sampler);
        gpu.bindings.rebind(resources, gpu.source.handle(), gpu.source_sampler.handle(), filter_sampler)
    }

    /// Applies the consequences of a selection or parameter change
    fn apply_changes(&mut self, changes: UiChanges) -> Result<()> {
        if changes.selection {
            if let Some(timing) = self.timing.as_mut() {
                timing.reset();
            }
        }
        // A suspended sample picks the new state up when it is rebuilt
        if !self.coordinator.is_prepared() || !changes.any() {
            return Ok(());
        }

        if changes.sampler {
            self.rebind()?;
        }
        if let Some(resources) = self.resources.as_ref() {
            self.push_constants = self.state.push_constants(resources.extent());
        }
        self.build_command_buffers()
    }
}

#[cfg(test)]
impl FilterApp {
    pub fn push_constants(&self) -> &PushConstants {
        &self.push_constants
    }

    /// Resource set of the current epoch
    pub fn resources(&self) -> Option<&ResourceSet> {
        self.resources.as_ref()
    }

    pub fn binding_table(&self) -> Option<&DescriptorBindingTable> {
        self.gpu.as_ref().map(|gpu| &gpu.bindings)
    }

    /// The uploaded source texture
    pub fn source_image(&self) -> Option<ImageHandle> {
        self.gpu.as_ref().map(|gpu| gpu.source.handle())
    }

    /// Recorded streams, one per frame slot
    pub fn streams(&self) -> &[CommandStream] {
        &self.streams
    }
}

impl FilterSample for FilterApp {
    fn name(&self) -> &str {
        &self.manifest.name
    }

    fn manifest(&self) -> &SampleManifest {
        &self.manifest
    }

    fn prepare(&mut self, options: &SampleOptions) -> Result<bool> {
        if let Some(strategy) = options.strategy {
            self.table.entry(strategy)?;
            self.state.strategy = strategy;
        }
        if let Some(index) = options.kernel {
            if index >= self.manifest.kernel_count() {
                return Err(Error::KernelOutOfRange {
                    index,
                    count: self.manifest.kernel_count(),
                });
            }
            self.state.kernel = KernelSize(index);
        }

        let device = self.ctx.device.clone();
        let texture_path = options.texture.as_deref().unwrap_or(&self.manifest.texture);
        // Stored values pass through unchanged to a non-sRGB surface
        let texture = self.ctx.assets.load_texture(texture_path, ColorSpace::Linear)?;
        let source = Owned::new(&device, device.upload_texture(texture_path, &texture)?);

        let source_sampler = device.create_sampler(&SamplerDesc {
            label: "linear sampler",
            filter: FilterMode::Linear,
            address: AddressMode::ClampToEdge,
        })?;
        let source_sampler = Owned::new(&device, source_sampler);
        let nearest_sampler = device.create_sampler(&SamplerDesc {
            label: "nearest sampler",
            filter: FilterMode::Nearest,
            address: AddressMode::ClampToBorder,
        })?;
        let nearest_sampler = Owned::new(&device, nearest_sampler);

        self.timing = Some(TimingCollector::new(&device)?);

        let passes = RenderPasses::create(&device)?;
        let bindings = DescriptorBindingTable::create(&device, self.resource_manager.requirements())?;
        let registry = PipelineVariantRegistry::build_all(&device, self.ctx.shaders.as_ref(), &self.manifest, bindings.layouts(), &passes)?;
        self.gpu = Some(PreparedGpu {
            registry,
            bindings,
            passes,
            source,
            source_sampler,
            nearest_sampler,
        });

        let extent = device.surface_extent();
        if extent.is_empty() {
            self.coordinator.suspend();
            tracing::info!("Surface of {} is empty, waiting for a resize", self.manifest.name);
            return Ok(false);
        }

        self.setup_framebuffer()?;
        self.build_command_buffers()?;
        self.coordinator.mark_ready(extent);
        tracing::info!("Prepared {} at {extent} with {} {}", self.manifest.name, self.state.strategy, self.state.kernel.label());
        Ok(true)
    }

    fn is_prepared(&self) -> bool {
        self.coordinator.is_prepared()
    }

    fn render(&mut self, delta_time: f32) -> Result<()> {
        if !self.coordinator.is_prepared() {
            return Ok(());
        }

        let device = &self.ctx.device;
        let slot = device.acquire_frame()?;
        let stream = self.streams.get(slot).ok_or(Error::NotPrepared)?;
        device.submit(slot, stream)?;

        let timing = self.timing.as_mut().ok_or(Error::NotPrepared)?;
        timing.mark_submitted();
        let entry = self.table.entry(self.state.strategy)?;
        if let Some(sample) = timing.collect(entry)? {
            tracing::trace!("Slot {slot} frame: {:.4} ms GPU, {delta_time:.4} s host", sample.total_ms);
        }
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<bool> {
        match self.coordinator.decide(width, height) {
            ResizeDecision::Skip => Ok(false),
            ResizeDecision::Suspend => {
                self.ctx.device.wait_idle()?;
                self.streams.clear();
                self.resources = None;
                self.coordinator.suspend();
                tracing::info!("Suspended {} for an empty surface", self.manifest.name);
                Ok(false)
            }
            ResizeDecision::Rebuild(extent) => {
                self.coordinator.begin_rebuild();
                self.ctx.device.wait_idle()?;
                self.ctx.device.resize_surface(extent)?;
                self.streams.clear();
                self.setup_framebuffer()?;
                self.build_command_buffers()?;
                if let Some(timing) = self.timing.as_mut() {
                    timing.reset();
                }
                self.coordinator.mark_ready(extent);
                tracing::info!("Resized {} to {extent}", self.manifest.name);
                Ok(true)
            }
        }
    }

    fn on_update_ui_overlay(&mut self, drawer: &mut dyn Drawer) -> Result<()> {
        let changes = ParameterController::record_ui(drawer, &mut self.state, &self.manifest, self.timing.as_ref());
        self.apply_changes(changes)
    }

    fn build_command_buffers(&mut self) -> Result<()> {
        self.streams.clear();
        let (Some(gpu), Some(resources), Some(timing)) = (self.gpu.as_ref(), self.resources.as_ref(), self.timing.as_ref()) else {
            return Err(Error::NotPrepared);
        };
        let entry = self.table.entry(self.state.strategy)?;

        let streams = (0..self.ctx.device.frame_slots())
            .map(|slot| {
                record_frame(
                    FrameContext {
                        registry: &gpu.registry,
                        bindings: &gpu.bindings,
                        resources,
                        passes: &gpu.passes,
                        state: &self.state,
                        push_constants: &self.push_constants,
                        query_pool: timing.query_pool(),
                        workgroup_axis: self.workgroup_axis,
                        slot,
                    },
                    entry,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!("Recorded {} command streams for {} {}", streams.len(), self.state.strategy, self.state.kernel.label());
        self.streams = streams;
        Ok(())
    }

    fn setup_framebuffer(&mut self) -> Result<()> {
        let gpu = self.gpu.as_ref().ok_or(Error::NotPrepared)?;
        let extent = self.ctx.device.surface_extent();

        // The old set is released before the new one is allocated
        self.resources = None;
        let resources = self.resource_manager.build(extent, &gpu.passes)?;
        self.push_constants = self.state.push_constants(extent);
        self.resources = Some(resources);
        self.rebind()
    }

    fn setup_render_pass(&mut self) -> Result<()> {
        let device = self.ctx.device.clone();
        let was_prepared = self.coordinator.is_prepared();
        let gpu = self.gpu.as_mut().ok_or(Error::NotPrepared)?;

        let passes = RenderPasses::create(&device)?;
        gpu.registry.rebuild_graphics(&passes)?;
        self.coordinator.begin_rebuild();
        // Framebuffers belong to the old passes
        self.streams.clear();
        self.resources = None;
        gpu.passes = passes;

        if was_prepared {
            self.setup_framebuffer()?;
            self.build_command_buffers()?;
            self.coordinator.mark_ready(device.surface_extent());
        }
        tracing::debug!("Recreated render passes for {}", self.manifest.name);
        Ok(())
    }

    fn select_strategy(&mut self, strategy: Strategy) -> Result<()> {
        self.table.entry(strategy)?;
        self.state.strategy = strategy;
        tracing::info!("Selected strategy {strategy} for {}", self.manifest.name);
        self.apply_changes(UiChanges {
            selection: true,
            ..Default::default()
        })
    }

    fn select_kernel(&mut self, index: usize) -> Result<()> {
        let count = self.manifest.kernel_count();
        if index >= count {
            return Err(Error::KernelOutOfRange { index, count });
        }
        self.state.kernel = KernelSize(index);
        tracing::info!("Selected kernel {} for {}", self.state.kernel.label(), self.manifest.name);
        self.apply_changes(UiChanges {
            selection: true,
            ..Default::default()
        })
    }

    fn state(&self) -> &FilterState {
        &self.state
    }

    fn timing(&self) -> Option<&TimingCollector> {
        self.timing.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::BindingSlot;
    use crate::testing::{self, RecordingDevice, ScriptedDrawer};
    use std::sync::Arc;

    fn prepared(name: &str, options: SampleOptions) -> (Arc<RecordingDevice>, FilterApp) {
        let device = Arc::new(RecordingDevice::new());
        let mut app = FilterApp::new(testing::manifest(name), testing::context(&device));
        assert!(app.prepare(&options).unwrap());
        (device, app)
    }

    /// Labels of every non-shared pipeline bound by the recorded submissions
    fn bound_variant_labels(device: &RecordingDevice) -> Vec<String> {
        device
            .submissions()
            .iter()
            .flat_map(|(_, stream)| stream.bound_pipelines().collect::<Vec<_>>())
            .filter_map(|pipeline| device.pipeline(pipeline))
            .map(|record| record.label)
            .filter(|label| label != "Composite" && label != "Resolve")
            .collect()
    }

    #[test]
    fn test_prepare_and_render() {
        let (device, mut app) = prepared("gaussian_filter", SampleOptions::default());
        assert!(app.is_prepared());
        assert_eq!(app.streams().len(), 2);

        app.render(0.016).unwrap();
        let timing = app.timing().unwrap();
        assert_eq!(timing.frames(), 1);
        assert_eq!(timing.last().unwrap().regions.len(), 1);
        assert_eq!(device.timestamp_reads(), vec![2]);
        assert_eq!(device.submissions().len(), 1);
    }

    #[test]
    fn test_kernel_switch_resets_statistics() {
        let (device, mut app) = prepared("gaussian_filter", SampleOptions::default());
        for _ in 0..3 {
            app.render(0.016).unwrap();
        }
        assert_eq!(app.timing().unwrap().frames(), 3);

        app.select_kernel(2).unwrap();
        assert_eq!(app.timing().unwrap().frames(), 0);

        device.clear_submissions();
        app.render(0.016).unwrap();
        app.render(0.016).unwrap();
        let labels = bound_variant_labels(&device);
        assert!(!labels.is_empty());
        assert!(labels.iter().all(|label| label.contains("7x7")), "{labels:?}");
    }

    #[test]
    fn test_overlay_kernel_button() {
        let (device, mut app) = prepared("bilateral_filter", SampleOptions::default());
        app.render(0.016).unwrap();

        app.on_update_ui_overlay(&mut ScriptedDrawer::pressing("5x5")).unwrap();
        assert_eq!(app.state().kernel, KernelSize(1));
        assert_eq!(app.timing().unwrap().frames(), 0);

        device.clear_submissions();
        app.render(0.016).unwrap();
        assert!(bound_variant_labels(&device).iter().all(|label| label.contains("5x5")));
    }

    #[test]
    fn test_strategy_switch_changes_slot_count() {
        let (device, mut app) = prepared("gaussian_filter", SampleOptions::default());
        app.select_strategy(Strategy::Linear).unwrap();
        app.render(0.016).unwrap();
        app.select_strategy(Strategy::Compute).unwrap();
        app.render(0.016).unwrap();

        assert_eq!(device.timestamp_reads(), vec![4, 4]);
        assert_eq!(app.timing().unwrap().last().unwrap().regions.len(), 2);
    }

    #[test]
    fn test_parameter_change_keeps_statistics() {
        let (_device, mut app) = prepared("gaussian_filter", SampleOptions::default());
        app.render(0.016).unwrap();
        app.render(0.016).unwrap();

        let mut drawer = ScriptedDrawer::default();
        drawer.float_values.insert("sigma".into(), 2.0);
        app.on_update_ui_overlay(&mut drawer).unwrap();

        assert_eq!(app.timing().unwrap().frames(), 2);
        assert_eq!(app.push_constants().graphics.values[0], -0.5 / 4.0);
        assert_eq!(app.push_constants().compute.values[0], -0.5 / 4.0);
    }

    #[test]
    fn test_sampler_change_rebinds() {
        let (device, mut app) = prepared("bilateral_filter", SampleOptions::default());
        let sampler_of = |app: &FilterApp, slot| match device.binding_writes(app.binding_table().unwrap().set(slot).unwrap())[0].resource {
            BoundResource::SampledImage { sampler, .. } => sampler,
            BoundResource::StorageImage { .. } => panic!("expected a sampled image"),
        };
        // Starts on nearest; the composite always reads linearly
        assert_ne!(sampler_of(&app, BindingSlot::Composite), sampler_of(&app, BindingSlot::FilterInput));
        app.render(0.016).unwrap();
        app.render(0.016).unwrap();
        assert_eq!(app.timing().unwrap().frames(), 2);

        let before = app.streams().to_vec();
        app.on_update_ui_overlay(&mut ScriptedDrawer::choosing("sampler", 1)).unwrap();
        assert_eq!(app.state().sampler, SamplerChoice::Linear);
        assert_eq!(app.timing().unwrap().frames(), 0);
        assert_eq!(sampler_of(&app, BindingSlot::Composite), sampler_of(&app, BindingSlot::FilterInput));
        assert_eq!(sampler_of(&app, BindingSlot::FilterInput), sampler_of(&app, BindingSlot::ResolveInput));
        assert_eq!(app.streams().len(), before.len());

        device.clear_submissions();
        app.render(0.016).unwrap();
        assert_eq!(device.submissions().len(), 1);
        assert_eq!(app.timing().unwrap().frames(), 1);
    }

    #[test]
    fn test_texture_uploaded_linear() {
        let (device, _app) = prepared("taa_stats", SampleOptions::default());
        assert_eq!(device.uploads(), vec![ColorSpace::Linear]);
    }

    #[test]
    fn test_resize_to_zero_suspends() {
        let (device, mut app) = prepared("gaussian_filter", SampleOptions::default());
        app.render(0.016).unwrap();

        assert!(!app.resize(0, 0).unwrap());
        assert!(!app.is_prepared());
        assert!(app.resources().is_none());
        // Only the source texture survives
        assert_eq!(device.live_images().len(), 1);

        device.clear_submissions();
        app.render(0.016).unwrap();
        assert!(!app.resize(0, 0).unwrap());
        assert!(device.submissions().is_empty());
    }

    /// A suspended sample comes back with fresh resources and zeroed statistics
    #[test]
    fn test_recovers_after_suspend() {
        let options = SampleOptions {
            strategy: Some(Strategy::Compute),
            ..Default::default()
        };
        let (device, mut app) = prepared("gaussian_filter", options);
        app.render(0.016).unwrap();
        app.render(0.016).unwrap();
        let old_epoch = app.resources().unwrap().epoch();

        assert!(!app.resize(0, 0).unwrap());
        assert!(app.resize(640, 360).unwrap());
        assert!(app.is_prepared());
        assert_eq!(device.surface_resizes(), vec![Extent::new(640, 360)]);
        assert_eq!(app.timing().unwrap().frames(), 0);

        let resources = app.resources().unwrap();
        assert!(resources.epoch() > old_epoch);
        assert_eq!(resources.extent(), Extent::new(640, 360));
        assert_eq!(app.binding_table().unwrap().bound_epoch(), Some(resources.epoch()));
        let source = app.source_image().unwrap();
        for (image, extent) in device.live_images() {
            if image != source {
                assert_eq!(extent, Extent::new(640, 360));
            }
        }

        device.clear_submissions();
        app.render(0.016).unwrap();
        assert_eq!(device.submissions().len(), 1);
        assert_eq!(app.timing().unwrap().frames(), 1);
    }

    #[test]
    fn test_same_extent_keeps_statistics() {
        let (device, mut app) = prepared("taa_stats", SampleOptions::default());
        app.render(0.016).unwrap();
        app.render(0.016).unwrap();

        assert!(!app.resize(800, 600).unwrap());
        assert_eq!(app.timing().unwrap().frames(), 2);
        assert!(device.surface_resizes().is_empty());
    }

    /// After a resize every image has the new extent and every binding is live
    #[test]
    fn test_resize_rebuilds_every_image() {
        let options = SampleOptions {
            strategy: Some(Strategy::Compute),
            ..Default::default()
        };
        let (device, mut app) = prepared("gaussian_filter", options);
        app.render(0.016).unwrap();

        assert!(app.resize(1024, 768).unwrap());
        assert_eq!(device.surface_resizes(), vec![Extent::new(1024, 768)]);
        assert!(device.wait_idle_calls() >= 1);
        assert_eq!(app.timing().unwrap().frames(), 0);

        let resources = app.resources().unwrap();
        let images = resources.images();
        let source = app.source_image().unwrap();
        for (image, extent) in device.live_images() {
            if image != source {
                assert_eq!(extent, Extent::new(1024, 768));
                assert!(images.contains(&image));
            }
        }

        let table = app.binding_table().unwrap();
        assert_eq!(table.bound_epoch(), Some(resources.epoch()));
        for slot in BindingSlot::ALL {
            let Some(set) = table.set(slot) else { continue };
            for write in device.binding_writes(set) {
                let image = write.resource.image();
                assert!(device.is_live(image));
                assert!(image == source || images.contains(&image));
            }
        }

        app.render(0.016).unwrap();
        assert_eq!(device.timestamp_reads().last(), Some(&4));
    }

    #[test]
    fn test_failed_rebuild_stays_unprepared() {
        let (device, mut app) = prepared("bilateral_filter", SampleOptions::default());
        device.fail_image_creation(true);
        assert!(matches!(app.resize(640, 480), Err(Error::Device(_))));
        assert!(!app.is_prepared());

        device.clear_submissions();
        app.render(0.016).unwrap();
        assert!(device.submissions().is_empty());

        device.fail_image_creation(false);
        assert!(app.resize(640, 480).unwrap());
        assert!(app.is_prepared());
    }

    #[test]
    fn test_prepare_on_empty_surface() {
        let device = Arc::new(RecordingDevice::with_surface(Extent::new(0, 0)));
        let mut app = FilterApp::new(testing::manifest("taa_stats"), testing::context(&device));
        assert!(!app.prepare(&SampleOptions::default()).unwrap());
        assert!(!app.is_prepared());

        app.render(0.016).unwrap();
        assert!(device.submissions().is_empty());

        assert!(app.resize(640, 480).unwrap());
        app.render(0.016).unwrap();
        assert_eq!(device.submissions().len(), 1);
    }

    #[test]
    fn test_setup_render_pass_rebuilds_pipelines() {
        let (device, mut app) = prepared("gaussian_filter", SampleOptions::default());
        app.setup_render_pass().unwrap();
        assert!(app.is_prepared());

        device.clear_submissions();
        app.render(0.016).unwrap();
        // Submission validates every handle against the live set
        assert_eq!(device.submissions().len(), 1);
    }

    #[test]
    fn test_invalid_selection() {
        let (_device, mut app) = prepared("taa_stats", SampleOptions::default());
        assert!(matches!(app.select_strategy(Strategy::Linear), Err(Error::UnsupportedStrategy(Strategy::Linear))));
        assert!(matches!(app.select_kernel(3), Err(Error::KernelOutOfRange { index: 3, count: 3 })));
        assert_eq!(app.state().strategy, Strategy::Default);

        let device = Arc::new(RecordingDevice::new());
        let mut app = FilterApp::new(testing::manifest("taa_stats"), testing::context(&device));
        let options = SampleOptions {
            strategy: Some(Strategy::Linear),
            ..Default::default()
        };
        assert!(app.prepare(&options).is_err());
        assert!(!app.is_prepared());
    }
}
