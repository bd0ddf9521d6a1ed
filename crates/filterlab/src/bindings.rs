//! Binding layouts and binding sets
//!
//! Every pass reads exactly one binding set. Sets are rewritten in full whenever
//! the resource set or the selected sampler changes; nothing is patched in place.

use crate::device::*;
use crate::pipelines::PassRole;
use crate::resources::{ResourceRequirements, ResourceSet};
use crate::{Error, Result};
use std::collections::HashMap;

/// Logical binding set a pass reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BindingSlot {
    /// Source texture for the main composite
    Composite,
    /// Main target for single-pass filters and the first linear pass
    FilterInput,
    /// Intermediate target for the second linear pass
    LinearSecondInput,
    /// Compute output for the resolve pass
    ResolveInput,
    /// Main target in, first storage image out
    ComputeFirst,
    /// Storage intermediate in, storage output out
    ComputeSecond,
}

impl BindingSlot {
    pub const ALL: [BindingSlot; 6] = [
        BindingSlot::Composite,
        BindingSlot::FilterInput,
        BindingSlot::LinearSecondInput,
        BindingSlot::ResolveInput,
        BindingSlot::ComputeFirst,
        BindingSlot::ComputeSecond,
    ];

    /// Binding set read by a pass role
    pub fn for_role(role: PassRole) -> Self {
        match role {
            PassRole::Composite => BindingSlot::Composite,
            PassRole::Filter | PassRole::LinearFirst => BindingSlot::FilterInput,
            PassRole::LinearSecond => BindingSlot::LinearSecondInput,
            PassRole::ComputeFirst => BindingSlot::ComputeFirst,
            PassRole::ComputeSecond => BindingSlot::ComputeSecond,
            PassRole::Resolve => BindingSlot::ResolveInput,
        }
    }

    fn is_compute(self) -> bool {
        matches!(self, BindingSlot::ComputeFirst | BindingSlot::ComputeSecond)
    }

    fn is_needed(self, requirements: &ResourceRequirements) -> bool {
        match self {
            BindingSlot::Composite | BindingSlot::FilterInput => true,
            BindingSlot::LinearSecondInput => requirements.linear,
            BindingSlot::ResolveInput | BindingSlot::ComputeFirst => requirements.compute.is_some(),
            BindingSlot::ComputeSecond => requirements.separable_compute(),
        }
    }
}

/// The two binding layouts shared by every pipeline
#[derive(Debug)]
pub struct BindingLayouts {
    sampled: Owned<BindingLayoutHandle>,
    compute: Owned<BindingLayoutHandle>,
}

impl BindingLayouts {
    pub fn create(device: &SharedDevice) -> Result<Self> {
        let sampled = device.create_binding_layout(&BindingLayoutDesc {
            label: "sampled texture layout",
            entries: vec![BindingLayoutEntry {
                binding: 0,
                kind: BindingKind::SampledImage,
                stage: ShaderStage::Fragment,
            }],
        })?;
        let sampled = Owned::new(device, sampled);

        let compute = device.create_binding_layout(&BindingLayoutDesc {
            label: "compute layout",
            entries: vec![
                BindingLayoutEntry {
                    binding: 0,
                    kind: BindingKind::SampledImage,
                    stage: ShaderStage::Compute,
                },
                BindingLayoutEntry {
                    binding: 1,
                    kind: BindingKind::StorageImage,
                    stage: ShaderStage::Compute,
                },
            ],
        })?;

        Ok(Self {
            sampled,
            compute: Owned::new(device, compute),
        })
    }

    /// Layout with one sampled texture, used by every graphics pass
    pub fn sampled(&self) -> BindingLayoutHandle {
        self.sampled.handle()
    }

    /// Layout with a sampled input and a storage output
    pub fn compute(&self) -> BindingLayoutHandle {
        self.compute.handle()
    }
}

/// Owns the binding sets and knows which resource epoch they were written for
#[derive(Debug)]
pub struct DescriptorBindingTable {
    device: SharedDevice,
    sets: HashMap<BindingSlot, Owned<BindingSetHandle>>,
    layouts: BindingLayouts,
    bound_epoch: Option<u64>,
}

impl DescriptorBindingTable {
    /// Creates the layouts and one binding set per slot the sample needs
    pub fn create(device: &SharedDevice, requirements: ResourceRequirements) -> Result<Self> {
        let layouts = BindingLayouts::create(device)?;

        let mut sets = HashMap::new();
        for slot in BindingSlot::ALL.into_iter().filter(|slot| slot.is_needed(&requirements)) {
            let layout = if slot.is_compute() { layouts.compute() } else { layouts.sampled() };
            sets.insert(slot, Owned::new(device, device.create_binding_set(layout)?));
        }

        Ok(Self {
            device: device.clone(),
            sets,
            layouts,
            bound_epoch: None,
        })
    }

    pub fn layouts(&self) -> &BindingLayouts {
        &self.layouts
    }

    /// Returns the binding set of a slot
    pub fn set(&self, slot: BindingSlot) -> Option<BindingSetHandle> {
        self.sets.get(&slot).map(Owned::handle)
    }

    /// Resource epoch the sets were last written against
    #[cfg(test)]
    pub fn bound_epoch(&self) -> Option<u64> {
        self.bound_epoch
    }

    /// Rewrites every binding set
    ///
    /// # Arguments
    /// * `resources` - Current resource set
    /// * `source` - Uploaded source texture
    /// * `source_sampler` - Sampler used to read the source texture
    /// * `filter_sampler` - Sampler selected in the overlay, used by every filter input
    pub fn rebind(&mut self, resources: &ResourceSet, source: ImageHandle, source_sampler: SamplerHandle, filter_sampler: SamplerHandle) -> Result<()> {
        let sampled = |image, sampler| BoundResource::SampledImage { image, sampler };
        let filtered = |image| sampled(image, filter_sampler);
        let storage = |image| BoundResource::StorageImage { image };

        for (&slot, set) in &self.sets {
            let writes = match slot {
                BindingSlot::Composite => vec![write(0, sampled(source, source_sampler))],
                BindingSlot::FilterInput => vec![write(0, filtered(resources.main_image()))],
                BindingSlot::LinearSecondInput => vec![write(0, filtered(required(resources.intermediate_image(), "intermediate target")?))],
                BindingSlot::ResolveInput => vec![write(0, filtered(required(resources.storage_output(), "storage output")?))],
                BindingSlot::ComputeFirst => {
                    let output = match resources.storage_intermediate() {
                        Some(intermediate) => intermediate,
                        None => required(resources.storage_output(), "storage output")?,
                    };
                    vec![write(0, filtered(resources.main_image())), write(1, storage(output))]
                }
                BindingSlot::ComputeSecond => vec![
                    write(0, filtered(required(resources.storage_intermediate(), "storage intermediate")?)),
                    write(1, storage(required(resources.storage_output(), "storage output")?)),
                ],
            };
            self.device.write_binding_set(set.handle(), &writes)?;
        }

        self.bound_epoch = Some(resources.epoch());
        tracing::debug!("Rebound {} binding sets for resource epoch {}", self.sets.len(), resources.epoch());
        Ok(())
    }

    /// Fails if the sets were not written against resource epoch `epoch`
    pub fn ensure_current(&self, epoch: u64) -> Result<()> {
        match self.bound_epoch {
            Some(bound) if bound == epoch => Ok(()),
            bound => Err(Error::StaleBindings {
                bound: bound.unwrap_or(0),
                current: epoch,
            }),
        }
    }
}

fn write(binding: u32, resource: BoundResource) -> BindingWrite {
    BindingWrite { binding, resource }
}

fn required(image: Option<ImageHandle>, what: &'static str) -> Result<ImageHandle> {
    image.ok_or(Error::MissingResource(what))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{RenderPasses, ResourceSetManager};
    use crate::testing::{RecordingDevice, manifest};
    use std::sync::Arc;

    struct Fixture {
        device: Arc<RecordingDevice>,
        table: DescriptorBindingTable,
        manager: ResourceSetManager,
        passes: RenderPasses,
        source: ImageHandle,
        linear: SamplerHandle,
        nearest: SamplerHandle,
    }

    fn fixture(name: &str) -> Fixture {
        let device = Arc::new(RecordingDevice::new());
        let shared: SharedDevice = device.clone();
        let requirements = ResourceRequirements::for_manifest(&manifest(name));
        let sampler = |filter| {
            shared
                .create_sampler(&SamplerDesc {
                    label: "test sampler",
                    filter,
                    address: AddressMode::ClampToEdge,
                })
                .unwrap()
        };
        Fixture {
            table: DescriptorBindingTable::create(&shared, requirements).unwrap(),
            manager: ResourceSetManager::new(&shared, requirements),
            passes: RenderPasses::create(&shared).unwrap(),
            source: shared.create_image(&ImageDesc {
                label: "source".into(),
                extent: Extent::new(64, 64),
                usage: ImageUsage::ColorTarget,
            })
            .unwrap(),
            linear: sampler(FilterMode::Linear),
            nearest: sampler(FilterMode::Nearest),
            device,
        }
    }

    #[test]
    fn test_rebind_writes_every_slot() {
        let mut f = fixture("gaussian_filter");
        let resources = f.manager.build(Extent::new(800, 600), &f.passes).unwrap();
        f.table.rebind(&resources, f.source, f.linear, f.nearest).unwrap();

        let composite = f.device.binding_writes(f.table.set(BindingSlot::Composite).unwrap());
        assert_eq!(composite, vec![write(0, BoundResource::SampledImage { image: f.source, sampler: f.linear })]);

        let filter = f.device.binding_writes(f.table.set(BindingSlot::FilterInput).unwrap());
        assert_eq!(filter[0].resource, BoundResource::SampledImage { image: resources.main_image(), sampler: f.nearest });

        let first = f.device.binding_writes(f.table.set(BindingSlot::ComputeFirst).unwrap());
        assert_eq!(first[1].resource.image(), resources.storage_intermediate().unwrap());

        let second = f.device.binding_writes(f.table.set(BindingSlot::ComputeSecond).unwrap());
        assert_eq!(second[0].resource.image(), resources.storage_intermediate().unwrap());
        assert_eq!(second[1].resource, BoundResource::StorageImage { image: resources.storage_output().unwrap() });
    }

    /// No slot reads the image it writes
    #[test]
    fn test_no_aliasing() {
        for name in ["gaussian_filter", "bilateral_filter"] {
            let mut f = fixture(name);
            let resources = f.manager.build(Extent::new(128, 128), &f.passes).unwrap();
            f.table.rebind(&resources, f.source, f.linear, f.linear).unwrap();

            for slot in [BindingSlot::ComputeFirst, BindingSlot::ComputeSecond] {
                let Some(set) = f.table.set(slot) else { continue };
                let writes = f.device.binding_writes(set);
                assert_ne!(writes[0].resource.image(), writes[1].resource.image(), "{name} {slot:?}");
            }
        }
    }

    #[test]
    fn test_tiled_compute_writes_output_directly() {
        let mut f = fixture("bilateral_filter");
        assert!(f.table.set(BindingSlot::ComputeSecond).is_none());
        assert!(f.table.set(BindingSlot::LinearSecondInput).is_none());

        let resources = f.manager.build(Extent::new(128, 128), &f.passes).unwrap();
        f.table.rebind(&resources, f.source, f.linear, f.linear).unwrap();
        let first = f.device.binding_writes(f.table.set(BindingSlot::ComputeFirst).unwrap());
        assert_eq!(first[1].resource.image(), resources.storage_output().unwrap());
    }

    #[test]
    fn test_stale_epoch_detected() {
        let mut f = fixture("taa_stats");
        assert!(matches!(f.table.ensure_current(1), Err(Error::StaleBindings { bound: 0, current: 1 })));

        let first = f.manager.build(Extent::new(64, 64), &f.passes).unwrap();
        f.table.rebind(&first, f.source, f.linear, f.linear).unwrap();
        assert!(f.table.ensure_current(first.epoch()).is_ok());

        let second = f.manager.build(Extent::new(32, 32), &f.passes).unwrap();
        assert!(matches!(f.table.ensure_current(second.epoch()), Err(Error::StaleBindings { .. })));
    }
}
