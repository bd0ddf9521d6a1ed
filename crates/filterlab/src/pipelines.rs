//! Pipeline variants
//!
//! A sample owns one pipeline per (strategy, kernel size, pass role). All variants
//! of a strategy share one shader module and differ only in the specialization
//! constants they were compiled with, except where a manifest names a dedicated
//! shader per kernel size.

use crate::bindings::BindingLayouts;
use crate::device::*;
use crate::params::PUSH_CONSTANT_SIZE;
use crate::resources::RenderPasses;
use crate::shaders::ShaderLoader;
use crate::strategy::{ComputeDispatch, KernelSize, Strategy};
use crate::{Error, Result};
use filterlab_manifest::{COMPUTE_AXIS_ID, COMPUTE_RADIUS_ID, COMPUTE_TILE_X_ID, COMPUTE_TILE_Y_ID, FRAGMENT_RADIUS_ID, SampleManifest, StrategySpec};
use std::collections::HashMap;

/// What a pipeline does within a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PassRole {
    /// Copies the source texture into the main target
    Composite,
    /// Single-pass fragment filter
    Filter,
    /// Horizontal linear pass into the intermediate target
    LinearFirst,
    /// Vertical linear pass onto the presentation image
    LinearSecond,
    /// First (or only) compute dispatch
    ComputeFirst,
    /// Second separable compute dispatch
    ComputeSecond,
    /// Presents the compute output
    Resolve,
}

impl PassRole {
    /// Composite and resolve are shared by every strategy and kernel
    pub fn is_shared(self) -> bool {
        matches!(self, PassRole::Composite | PassRole::Resolve)
    }

    pub fn bind_point(self) -> BindPoint {
        match self {
            PassRole::ComputeFirst | PassRole::ComputeSecond => BindPoint::Compute,
            _ => BindPoint::Graphics,
        }
    }

    /// Render pass a graphics role draws in
    fn render_pass(self, passes: &RenderPasses) -> Option<RenderPassHandle> {
        match self {
            PassRole::Composite => Some(passes.main()),
            PassRole::LinearFirst => Some(passes.intermediate()),
            PassRole::Filter | PassRole::LinearSecond | PassRole::Resolve => Some(passes.filter()),
            PassRole::ComputeFirst | PassRole::ComputeSecond => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct VariantKey {
    strategy: Option<Strategy>,
    kernel: Option<KernelSize>,
    role: PassRole,
}

impl VariantKey {
    fn new(strategy: Strategy, kernel: KernelSize, role: PassRole) -> Self {
        if role.is_shared() {
            Self::shared(role)
        } else {
            Self {
                strategy: Some(strategy),
                kernel: Some(kernel),
                role,
            }
        }
    }

    fn shared(role: PassRole) -> Self {
        Self {
            strategy: None,
            kernel: None,
            role,
        }
    }

    fn label(&self) -> String {
        match (self.strategy, self.kernel) {
            (Some(strategy), Some(kernel)) => format!("{strategy} {} {:?}", kernel.label(), self.role),
            _ => format!("{:?}", self.role),
        }
    }
}

/// One compiled pipeline and the layout it was created with
#[derive(Debug)]
pub struct PipelineVariant {
    pipeline: Owned<PipelineHandle>,
    layout: PipelineLayoutHandle,
    role: PassRole,
}

impl PipelineVariant {
    pub fn pipeline(&self) -> PipelineHandle {
        self.pipeline.handle()
    }

    pub fn layout(&self) -> PipelineLayoutHandle {
        self.layout
    }

    pub fn bind_point(&self) -> BindPoint {
        self.role.bind_point()
    }
}

/// Shader stages of a graphics variant, kept so it can be rebuilt for new render passes
#[derive(Debug, Clone)]
struct GraphicsRecipe {
    key: VariantKey,
    fragment: ShaderStageDescriptor,
}

/// Every pipeline a sample can bind
#[derive(Debug)]
pub struct PipelineVariantRegistry {
    device: SharedDevice,
    variants: HashMap<VariantKey, PipelineVariant>,
    recipes: Vec<GraphicsRecipe>,
    vertex: ShaderStageDescriptor,
    graphics_layout: Owned<PipelineLayoutHandle>,
    compute_layout: Owned<PipelineLayoutHandle>,
}

impl PipelineVariantRegistry {
    /// Builds the shared pipelines and every variant the manifest declares
    ///
    /// # Arguments
    /// * `device` - Device to create pipelines on
    /// * `shaders` - Loader resolving the manifest's shader paths
    /// * `manifest` - Sample description
    /// * `layouts` - Binding layouts of the sample's binding table
    /// * `passes` - Render passes graphics pipelines are created for
    pub fn build_all(device: &SharedDevice, shaders: &dyn ShaderLoader, manifest: &SampleManifest, layouts: &BindingLayouts, passes: &RenderPasses) -> Result<Self> {
        let graphics_layout = device.create_pipeline_layout(&PipelineLayoutDesc {
            label: "graphics pipeline layout",
            binding_layouts: vec![layouts.sampled()],
            push_constants: Some(PushConstantRange {
                stage: ShaderStage::Fragment,
                size: PUSH_CONSTANT_SIZE,
            }),
        })?;
        let graphics_layout = Owned::new(device, graphics_layout);
        let compute_layout = device.create_pipeline_layout(&PipelineLayoutDesc {
            label: "compute pipeline layout",
            binding_layouts: vec![layouts.compute()],
            push_constants: Some(PushConstantRange {
                stage: ShaderStage::Compute,
                size: PUSH_CONSTANT_SIZE,
            }),
        })?;
        let compute_layout = Owned::new(device, compute_layout);

        let vertex = shaders.load_shader(&manifest.vertex_shader, ShaderStage::Vertex)?;

        let mut recipes = vec![GraphicsRecipe {
            key: VariantKey::shared(PassRole::Composite),
            fragment: shaders.load_shader(&manifest.composite_shader, ShaderStage::Fragment)?,
        }];
        let mut compute_recipes = Vec::new();

        for spec in &manifest.strategies {
            if spec.kind == Strategy::Compute {
                recipes.push(GraphicsRecipe {
                    key: VariantKey::shared(PassRole::Resolve),
                    fragment: shaders.load_shader(&manifest.resolve_shader, ShaderStage::Fragment)?,
                });
            }

            for kernel in (0..manifest.kernel_count()).map(KernelSize) {
                match spec.kind {
                    Strategy::Default | Strategy::Optimized => {
                        recipes.push(fragment_recipe(shaders, spec, kernel, PassRole::Filter, spec.shader_for_kernel(kernel.index()))?);
                    }
                    Strategy::Linear => {
                        recipes.push(fragment_recipe(shaders, spec, kernel, PassRole::LinearFirst, spec.shader_for_kernel(kernel.index()))?);
                        recipes.push(fragment_recipe(shaders, spec, kernel, PassRole::LinearSecond, spec.second_shader.as_deref())?);
                    }
                    Strategy::Compute => compute_recipes.extend(compute_recipes_for(shaders, spec, kernel)?),
                }
            }
        }

        let mut registry = Self {
            device: device.clone(),
            variants: HashMap::new(),
            recipes,
            vertex,
            graphics_layout,
            compute_layout,
        };

        registry.variants = registry.build_graphics(passes)?;
        for (key, stage) in compute_recipes {
            let pipeline = device.create_compute_pipeline(&ComputePipelineDesc {
                label: key.label(),
                layout: registry.compute_layout.handle(),
                compute: stage,
            })?;
            registry.variants.insert(
                key,
                PipelineVariant {
                    pipeline: Owned::new(device, pipeline),
                    layout: registry.compute_layout.handle(),
                    role: key.role,
                },
            );
        }

        tracing::info!("Built {} pipeline variants for {}", registry.variants.len(), manifest.name);
        Ok(registry)
    }

    fn build_graphics(&self, passes: &RenderPasses) -> Result<HashMap<VariantKey, PipelineVariant>> {
        let mut built = HashMap::with_capacity(self.recipes.len());
        for recipe in &self.recipes {
            let render_pass = recipe.key.role.render_pass(passes).ok_or(Error::MissingVariant {
                strategy: recipe.key.strategy,
                kernel: recipe.key.kernel.map(KernelSize::index),
                role: recipe.key.role,
            })?;
            let pipeline = self.device.create_graphics_pipeline(&GraphicsPipelineDesc {
                label: recipe.key.label(),
                layout: self.graphics_layout.handle(),
                render_pass,
                vertex: self.vertex.clone(),
                fragment: recipe.fragment.clone(),
            })?;
            built.insert(
                recipe.key,
                PipelineVariant {
                    pipeline: Owned::new(&self.device, pipeline),
                    layout: self.graphics_layout.handle(),
                    role: recipe.key.role,
                },
            );
        }
        Ok(built)
    }

    /// Recreates every graphics variant for new render passes
    ///
    /// The replacement set is built completely before any old pipeline is released,
    /// so a failure leaves the registry untouched.
    pub fn rebuild_graphics(&mut self, passes: &RenderPasses) -> Result<()> {
        let rebuilt = self.build_graphics(passes)?;
        tracing::debug!("Rebuilt {} graphics pipelines", rebuilt.len());
        // Old handles drop as they are replaced
        self.variants.extend(rebuilt);
        Ok(())
    }

    /// Looks up the variant for a role; shared roles ignore strategy and kernel
    pub fn variant(&self, strategy: Strategy, kernel: KernelSize, role: PassRole) -> Result<&PipelineVariant> {
        self.variants.get(&VariantKey::new(strategy, kernel, role)).ok_or(Error::MissingVariant {
            strategy: Some(strategy),
            kernel: Some(kernel.index()),
            role,
        })
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// Every pipeline handle in the registry
    pub fn pipelines(&self) -> Vec<PipelineHandle> {
        self.variants.values().map(PipelineVariant::pipeline).collect()
    }
}

fn fragment_recipe(shaders: &dyn ShaderLoader, spec: &StrategySpec, kernel: KernelSize, role: PassRole, path: Option<&str>) -> Result<GraphicsRecipe> {
    let key = VariantKey::new(spec.kind, kernel, role);
    let path = path.ok_or(Error::MissingVariant {
        strategy: Some(spec.kind),
        kernel: Some(kernel.index()),
        role,
    })?;

    let mut fragment = shaders.load_shader(path, ShaderStage::Fragment)?;
    if spec.specializes_radius() {
        fragment = fragment.with_constants(&[(FRAGMENT_RADIUS_ID, kernel.radius())]);
    }
    Ok(GraphicsRecipe { key, fragment })
}

fn compute_recipes_for(shaders: &dyn ShaderLoader, spec: &StrategySpec, kernel: KernelSize) -> Result<Vec<(VariantKey, ShaderStageDescriptor)>> {
    let missing = |role| Error::MissingVariant {
        strategy: Some(spec.kind),
        kernel: Some(kernel.index()),
        role,
    };
    let path = spec.shader.as_deref().ok_or(missing(PassRole::ComputeFirst))?;
    let axis = spec.workgroup_axis_size.ok_or(missing(PassRole::ComputeFirst))?;
    let stage = shaders.load_shader(path, ShaderStage::Compute)?;

    let specialize = |tile_x: u32, tile_y: u32| {
        stage.clone().with_constants(&[
            (COMPUTE_AXIS_ID, axis),
            (COMPUTE_RADIUS_ID, kernel.radius()),
            (COMPUTE_TILE_X_ID, tile_x),
            (COMPUTE_TILE_Y_ID, tile_y),
        ])
    };

    Ok(match spec.dispatch.ok_or(missing(PassRole::ComputeFirst))? {
        ComputeDispatch::Separable => vec![
            (VariantKey::new(spec.kind, kernel, PassRole::ComputeFirst), specialize(axis, 1)),
            (VariantKey::new(spec.kind, kernel, PassRole::ComputeSecond), specialize(1, axis)),
        ],
        ComputeDispatch::Tiled => vec![(VariantKey::new(spec.kind, kernel, PassRole::ComputeFirst), specialize(axis, axis))],
    })
}
