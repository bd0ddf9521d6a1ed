//! Size-dependent GPU resources
//!
//! Render passes live as long as the sample. Images and framebuffers depend on the
//! surface extent and are grouped into a [`ResourceSet`] that is rebuilt from
//! scratch on every resize. Each set carries an epoch number so that binding sets
//! written against an older set can be detected.

use crate::device::*;
use crate::strategy::{ComputeDispatch, Strategy};
use crate::{Error, Result};
use filterlab_manifest::SampleManifest;

const CLEAR_COLOR: [f64; 4] = [0.025, 0.025, 0.025, 1.0];

/// The four render passes every sample uses
#[derive(Debug)]
pub struct RenderPasses {
    main: Owned<RenderPassHandle>,
    intermediate: Owned<RenderPassHandle>,
    filter: Owned<RenderPassHandle>,
    ui: Owned<RenderPassHandle>,
}

impl RenderPasses {
    /// Creates the main, intermediate, filter and UI passes
    pub fn create(device: &SharedDevice) -> Result<Self> {
        let create = |label, format, load, final_layout| -> Result<Owned<RenderPassHandle>> {
            let handle = device.create_render_pass(&RenderPassDesc {
                label,
                format,
                load,
                final_layout,
            })?;
            Ok(Owned::new(device, handle))
        };

        Ok(Self {
            main: create("main pass", TargetFormat::Rgba8Unorm, LoadAction::Clear(CLEAR_COLOR), FinalLayout::ShaderRead)?,
            intermediate: create("intermediate pass", TargetFormat::Rgba8Unorm, LoadAction::Clear(CLEAR_COLOR), FinalLayout::ShaderRead)?,
            filter: create("filter pass", TargetFormat::Swapchain, LoadAction::Clear(CLEAR_COLOR), FinalLayout::ColorAttachment)?,
            ui: create("ui pass", TargetFormat::Swapchain, LoadAction::Load, FinalLayout::Present)?,
        })
    }

    /// Renders the source texture into the main target
    pub fn main(&self) -> RenderPassHandle {
        self.main.handle()
    }

    /// Renders the first linear pass into the intermediate target
    pub fn intermediate(&self) -> RenderPassHandle {
        self.intermediate.handle()
    }

    /// Renders the filter result into the presentation image
    pub fn filter(&self) -> RenderPassHandle {
        self.filter.handle()
    }

    /// Draws the overlay on top of the filter result and presents
    pub fn ui(&self) -> RenderPassHandle {
        self.ui.handle()
    }
}

/// Which optional images a sample needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceRequirements {
    /// Intermediate color target for the linear strategy
    pub linear: bool,
    /// Storage images for the compute strategy
    pub compute: Option<ComputeDispatch>,
}

impl ResourceRequirements {
    pub fn for_manifest(manifest: &SampleManifest) -> Self {
        Self {
            linear: manifest.supports(Strategy::Linear),
            compute: manifest.compute_dispatch(),
        }
    }

    /// Whether compute writes into a storage intermediate before the output
    pub fn separable_compute(&self) -> bool {
        self.compute == Some(ComputeDispatch::Separable)
    }
}

/// Images and framebuffers of one resize epoch
///
/// Framebuffers are declared before the images they render into so they are dropped first.
#[derive(Debug)]
pub struct ResourceSet {
    main_framebuffer: Owned<FramebufferHandle>,
    intermediate_framebuffer: Option<Owned<FramebufferHandle>>,
    filter_framebuffers: Vec<Owned<FramebufferHandle>>,
    ui_framebuffers: Vec<Owned<FramebufferHandle>>,
    main: Owned<ImageHandle>,
    intermediate: Option<Owned<ImageHandle>>,
    storage_intermediate: Option<Owned<ImageHandle>>,
    storage_output: Option<Owned<ImageHandle>>,
    extent: Extent,
    epoch: u64,
}

impl ResourceSet {
    pub fn extent(&self) -> Extent {
        self.extent
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn main_image(&self) -> ImageHandle {
        self.main.handle()
    }

    pub fn intermediate_image(&self) -> Option<ImageHandle> {
        self.intermediate.as_ref().map(Owned::handle)
    }

    pub fn storage_intermediate(&self) -> Option<ImageHandle> {
        self.storage_intermediate.as_ref().map(Owned::handle)
    }

    pub fn storage_output(&self) -> Option<ImageHandle> {
        self.storage_output.as_ref().map(Owned::handle)
    }

    pub fn main_framebuffer(&self) -> FramebufferHandle {
        self.main_framebuffer.handle()
    }

    pub fn intermediate_framebuffer(&self) -> Option<FramebufferHandle> {
        self.intermediate_framebuffer.as_ref().map(Owned::handle)
    }

    pub fn filter_framebuffer(&self, slot: usize) -> Option<FramebufferHandle> {
        self.filter_framebuffers.get(slot).map(Owned::handle)
    }

    pub fn ui_framebuffer(&self, slot: usize) -> Option<FramebufferHandle> {
        self.ui_framebuffers.get(slot).map(Owned::handle)
    }

    /// Every image in the set
    #[cfg(test)]
    pub fn images(&self) -> Vec<ImageHandle> {
        std::iter::once(self.main_image())
            .chain(self.intermediate_image())
            .chain(self.storage_intermediate())
            .chain(self.storage_output())
            .collect()
    }
}

/// Builds resource sets for a fixed set of requirements
#[derive(Debug)]
pub struct ResourceSetManager {
    device: SharedDevice,
    requirements: ResourceRequirements,
    next_epoch: u64,
}

impl ResourceSetManager {
    pub fn new(device: &SharedDevice, requirements: ResourceRequirements) -> Self {
        Self {
            device: device.clone(),
            requirements,
            next_epoch: 1,
        }
    }

    pub fn requirements(&self) -> ResourceRequirements {
        self.requirements
    }

    /// Allocates every image and framebuffer at `extent`
    ///
    /// On failure everything allocated so far is released before the error returns.
    ///
    /// # Arguments
    /// * `extent` - Surface extent; must not be empty
    /// * `passes` - Render passes the framebuffers are created for
    pub fn build(&mut self, extent: Extent, passes: &RenderPasses) -> Result<ResourceSet> {
        if extent.is_empty() {
            return Err(Error::EmptyExtent);
        }

        let device = &self.device;
        let image = |label: &str, usage| -> Result<Owned<ImageHandle>> {
            let handle = device.create_image(&ImageDesc {
                label: label.to_string(),
                extent,
                usage,
            })?;
            Ok(Owned::new(device, handle))
        };
        let framebuffer = |label: String, render_pass, target| -> Result<Owned<FramebufferHandle>> {
            let handle = device.create_framebuffer(&FramebufferDesc {
                label,
                render_pass,
                target,
                extent,
            })?;
            Ok(Owned::new(device, handle))
        };

        let main = image("main target", ImageUsage::ColorTarget)?;
        let intermediate = self.requirements.linear.then(|| image("intermediate target", ImageUsage::ColorTarget)).transpose()?;
        let storage_intermediate = self.requirements.separable_compute().then(|| image("storage intermediate", ImageUsage::Storage)).transpose()?;
        let storage_output = self.requirements.compute.is_some().then(|| image("storage output", ImageUsage::Storage)).transpose()?;

        let main_framebuffer = framebuffer("main framebuffer".to_string(), passes.main(), AttachmentTarget::Image(main.handle()))?;
        let intermediate_framebuffer = intermediate
            .as_ref()
            .map(|image| framebuffer("intermediate framebuffer".to_string(), passes.intermediate(), AttachmentTarget::Image(image.handle())))
            .transpose()?;

        let slots = device.frame_slots();
        let filter_framebuffers = (0..slots)
            .map(|slot| framebuffer(format!("filter framebuffer {slot}"), passes.filter(), AttachmentTarget::Swapchain(slot)))
            .collect::<Result<Vec<_>>>()?;
        let ui_framebuffers = (0..slots)
            .map(|slot| framebuffer(format!("ui framebuffer {slot}"), passes.ui(), AttachmentTarget::Swapchain(slot)))
            .collect::<Result<Vec<_>>>()?;

        let epoch = self.next_epoch;
        self.next_epoch += 1;
        tracing::debug!("Built resource set {epoch} at {extent}");

        Ok(ResourceSet {
            main_framebuffer,
            intermediate_framebuffer,
            filter_framebuffers,
            ui_framebuffers,
            main,
            intermediate,
            storage_intermediate,
            storage_output,
            extent,
            epoch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingDevice, manifest};
    use std::sync::Arc;

    fn setup(name: &str) -> (Arc<RecordingDevice>, SharedDevice, ResourceSetManager, RenderPasses) {
        let device = Arc::new(RecordingDevice::new());
        let shared: SharedDevice = device.clone();
        let manager = ResourceSetManager::new(&shared, ResourceRequirements::for_manifest(&manifest(name)));
        let passes = RenderPasses::create(&shared).unwrap();
        (device, shared, manager, passes)
    }

    #[test]
    fn test_gaussian_allocates_everything() {
        let (device, _shared, mut manager, passes) = setup("gaussian_filter");
        let set = manager.build(Extent::new(800, 600), &passes).unwrap();

        assert!(set.intermediate_image().is_some());
        assert!(set.storage_intermediate().is_some());
        assert!(set.storage_output().is_some());
        assert_eq!(set.images().len(), 4);
        for (_, extent) in device.live_images() {
            assert_eq!(extent, Extent::new(800, 600));
        }
        assert!(set.filter_framebuffer(1).is_some());
        assert!(set.filter_framebuffer(2).is_none());
    }

    #[test]
    fn test_tiled_compute_has_no_storage_intermediate() {
        let (_device, _shared, mut manager, passes) = setup("bilateral_filter");
        let set = manager.build(Extent::new(320, 200), &passes).unwrap();
        assert!(set.intermediate_image().is_none());
        assert!(set.storage_intermediate().is_none());
        assert!(set.storage_output().is_some());
        assert!(set.intermediate_framebuffer().is_none());
    }

    #[test]
    fn test_empty_extent_rejected() {
        let (_device, _shared, mut manager, passes) = setup("taa_stats");
        assert!(matches!(manager.build(Extent::new(0, 600), &passes), Err(Error::EmptyExtent)));
    }

    #[test]
    fn test_drop_releases_handles() {
        let (device, _shared, mut manager, passes) = setup("gaussian_filter");
        let before = device.live_count();
        let set = manager.build(Extent::new(64, 64), &passes).unwrap();
        assert!(device.live_count() > before);
        let images = set.images();
        drop(set);
        assert_eq!(device.live_count(), before);
        assert!(images.iter().all(|&image| !device.is_live(image)));
    }

    /// A failed allocation leaves nothing behind
    #[test]
    fn test_failed_build_is_not_half_built() {
        let (device, _shared, mut manager, passes) = setup("gaussian_filter");
        let before = device.live_count();
        device.fail_image_creation(true);
        assert!(matches!(manager.build(Extent::new(64, 64), &passes), Err(Error::Device(_))));
        assert_eq!(device.live_count(), before);
    }

    #[test]
    fn test_epochs_increase() {
        let (_device, _shared, mut manager, passes) = setup("taa_stats");
        let first = manager.build(Extent::new(64, 64), &passes).unwrap().epoch();
        let second = manager.build(Extent::new(64, 64), &passes).unwrap().epoch();
        assert!(second > first);
    }
}
