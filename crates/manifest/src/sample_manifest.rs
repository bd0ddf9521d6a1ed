//! Sample Manifest Parser
//!
//! This module parses and validates the YAML manifests that describe one filter
//! sample: which texture it shows, which shaders implement each strategy, which
//! kernel sizes exist and which parameters the overlay exposes.

use crate::shader_check::{COMPUTE_OVERRIDE_IDS, FRAGMENT_RADIUS_ID};
use crate::strategy::{ComputeDispatch, Strategy};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Maximum number of tunable parameters a sample can push to its shaders
pub const MAX_PARAMETERS: usize = 2;

/// Texture sampler choice offered by the overlay
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplerChoice {
    /// Bilinear filtering, clamp to edge
    #[default]
    Linear,
    /// Nearest filtering, clamp to an opaque white border
    Nearest,
}

impl SamplerChoice {
    /// Returns the lowercase name shown in the sampler combo box
    pub fn name(&self) -> &'static str {
        match self {
            SamplerChoice::Linear => "linear",
            SamplerChoice::Nearest => "nearest",
        }
    }
}

/// Transformation applied to a parameter before it is pushed to the GPU
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterTransform {
    /// Pushed as-is
    #[default]
    Identity,
    /// Pushed as `-0.5 / (x * x)`, the exponent factor of a Gaussian with deviation `x`
    GaussianDivisor,
}

impl ParameterTransform {
    /// Applies the transform to a raw slider value
    pub fn apply(&self, value: f32) -> f32 {
        match self {
            ParameterTransform::Identity => value,
            ParameterTransform::GaussianDivisor => -0.5 / (value * value),
        }
    }
}

/// A live-tunable float parameter
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ParameterSpec {
    /// Slider caption
    pub name: String,
    /// Initial value
    pub default: f32,
    /// Lower slider bound
    pub min: f32,
    /// Upper slider bound
    pub max: f32,
    /// Transform applied before pushing
    #[serde(default)]
    pub transform: ParameterTransform,
}

/// Shader selection for one strategy
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategySpec {
    /// Which strategy this entry implements
    pub kind: Strategy,
    /// Shared shader, specialized per kernel through its radius constant
    #[serde(default)]
    pub shader: Option<String>,
    /// One dedicated shader per kernel size, used instead of `shader`
    #[serde(default)]
    pub kernel_shaders: Vec<String>,
    /// Vertical pass shader for the linear strategy
    #[serde(default)]
    pub second_shader: Option<String>,
    /// Dispatch layout for the compute strategy
    #[serde(default)]
    pub dispatch: Option<ComputeDispatch>,
    /// Workgroup extent along the tiled axis for the compute strategy
    #[serde(default)]
    pub workgroup_axis_size: Option<u32>,
}

impl StrategySpec {
    /// Returns the shader implementing this strategy for a kernel index
    pub fn shader_for_kernel(&self, kernel_index: usize) -> Option<&str> {
        if self.kernel_shaders.is_empty() {
            self.shader.as_deref()
        } else {
            self.kernel_shaders.get(kernel_index).map(String::as_str)
        }
    }

    /// Whether the kernel radius is supplied as a specialization constant
    pub fn specializes_radius(&self) -> bool {
        self.kernel_shaders.is_empty()
    }

    /// Number of timed regions a frame of this strategy contains
    pub fn timed_regions(&self) -> u32 {
        match self.kind {
            Strategy::Linear => 2,
            Strategy::Compute => self.dispatch.map_or(1, |dispatch| dispatch.pass_count()),
            Strategy::Default | Strategy::Optimized => 1,
        }
    }
}

/// Pipeline stage a manifest shader is compiled for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStageKind {
    /// Vertex stage
    Vertex,
    /// Fragment stage
    Fragment,
    /// Compute stage
    Compute,
}

/// A shader referenced by a manifest along with the overrides it must declare
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderRequirement {
    /// Logical shader path
    pub path: String,
    /// Stage the shader is compiled for
    pub stage: ShaderStageKind,
    /// Override ids the pipeline builder supplies
    pub overrides: Vec<u32>,
}

fn default_max_draw_count() -> u32 {
    1
}

/// A complete filter sample description
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SampleManifest {
    /// Unique sample identifier
    pub id: String,
    /// Human-readable sample name
    pub name: String,
    /// Optional description
    #[serde(default)]
    pub description: Option<String>,
    /// Texture shown by the sample
    pub texture: String,
    /// Full-screen triangle vertex shader shared by all graphics passes
    pub vertex_shader: String,
    /// Fragment shader copying the source texture into the main target
    pub composite_shader: String,
    /// Fragment shader presenting the compute output
    pub resolve_shader: String,
    /// Kernel edge lengths; entry `i` must be `2 * (i + 1) + 1`
    pub kernel_sizes: Vec<u32>,
    /// Supported strategies, in overlay order
    pub strategies: Vec<StrategySpec>,
    /// Tunable parameters, in push-constant order
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
    /// Sampler choices, the first being the initial one; empty means the sample always samples linearly
    #[serde(default)]
    pub samplers: Vec<SamplerChoice>,
    /// Upper bound of the draw-count slider; 1 hides the slider
    #[serde(default = "default_max_draw_count")]
    pub max_draw_count: u32,
}

impl SampleManifest {
    /// Parses and validates a manifest from YAML content
    ///
    /// # Arguments
    /// * `yaml_content` - YAML string containing the manifest
    pub fn from_yaml(yaml_content: &str) -> Result<Self, ManifestError> {
        let manifest: Self = serde_norway::from_str(yaml_content).map_err(ManifestError::Parse)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Parses and validates a manifest from a YAML file
    ///
    /// # Arguments
    /// * `path` - Path to the YAML manifest file
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path).map_err(ManifestError::Io)?;
        Self::from_yaml(&content)
    }

    /// Checks the manifest for structural errors
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.id.is_empty() {
            return Err(ManifestError::EmptyId);
        }
        if self.name.is_empty() {
            return Err(ManifestError::EmptyName);
        }
        if self.kernel_sizes.is_empty() {
            return Err(ManifestError::NoKernelSizes);
        }
        for (index, &size) in self.kernel_sizes.iter().enumerate() {
            if size as usize != 2 * (index + 1) + 1 {
                return Err(ManifestError::InvalidKernelSize { index, size });
            }
        }

        if self.strategies.is_empty() {
            return Err(ManifestError::NoStrategies);
        }
        let mut seen = HashSet::new();
        for spec in &self.strategies {
            if !seen.insert(spec.kind) {
                return Err(ManifestError::DuplicateStrategy(spec.kind));
            }
            self.validate_strategy(spec)?;
        }

        if self.parameters.len() > MAX_PARAMETERS {
            return Err(ManifestError::TooManyParameters(self.parameters.len()));
        }
        let mut names = HashSet::new();
        for parameter in &self.parameters {
            if !names.insert(parameter.name.as_str()) {
                return Err(ManifestError::DuplicateParameter(parameter.name.clone()));
            }
            if !(parameter.min < parameter.max) {
                return Err(ManifestError::InvalidParameterRange(parameter.name.clone()));
            }
            if parameter.default < parameter.min || parameter.default > parameter.max {
                return Err(ManifestError::DefaultOutOfRange(parameter.name.clone()));
            }
            if parameter.transform == ParameterTransform::GaussianDivisor && parameter.min <= 0.0 {
                return Err(ManifestError::InvalidParameterRange(parameter.name.clone()));
            }
        }

        let mut samplers = HashSet::new();
        for sampler in &self.samplers {
            if !samplers.insert(*sampler) {
                return Err(ManifestError::DuplicateSampler(*sampler));
            }
        }

        if self.max_draw_count == 0 {
            return Err(ManifestError::InvalidDrawCount);
        }

        Ok(())
    }

    fn validate_strategy(&self, spec: &StrategySpec) -> Result<(), ManifestError> {
        if spec.kernel_shaders.is_empty() {
            if spec.shader.is_none() {
                return Err(ManifestError::MissingShader(spec.kind));
            }
        } else if spec.kernel_shaders.len() != self.kernel_sizes.len() {
            return Err(ManifestError::KernelShaderCount {
                strategy: spec.kind,
                expected: self.kernel_sizes.len(),
                found: spec.kernel_shaders.len(),
            });
        }

        match spec.kind {
            Strategy::Linear if spec.second_shader.is_none() => return Err(ManifestError::MissingSecondShader),
            Strategy::Linear => {}
            _ if spec.second_shader.is_some() => return Err(ManifestError::UnexpectedSecondShader(spec.kind)),
            _ => {}
        }

        match spec.kind {
            Strategy::Compute => {
                if spec.dispatch.is_none() {
                    return Err(ManifestError::MissingDispatch);
                }
                if !spec.kernel_shaders.is_empty() {
                    return Err(ManifestError::ComputeKernelShaders);
                }
                match spec.workgroup_axis_size {
                    Some(0) | None => return Err(ManifestError::InvalidWorkgroupAxis),
                    Some(_) => {}
                }
            }
            _ if spec.dispatch.is_some() || spec.workgroup_axis_size.is_some() => {
                return Err(ManifestError::UnexpectedDispatch(spec.kind));
            }
            _ => {}
        }

        Ok(())
    }

    /// Returns the entry for a strategy, if the sample supports it
    pub fn strategy(&self, strategy: Strategy) -> Option<&StrategySpec> {
        self.strategies.iter().find(|spec| spec.kind == strategy)
    }

    /// Returns whether the sample supports a strategy
    pub fn supports(&self, strategy: Strategy) -> bool {
        self.strategy(strategy).is_some()
    }

    /// Number of selectable kernel sizes
    pub fn kernel_count(&self) -> usize {
        self.kernel_sizes.len()
    }

    /// Returns the overlay label of a kernel, e.g. `5x5`
    pub fn kernel_label(&self, kernel_index: usize) -> Option<String> {
        self.kernel_sizes.get(kernel_index).map(|size| format!("{size}x{size}"))
    }

    /// Names of the supported strategies in overlay order
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|spec| spec.kind.name()).collect()
    }

    /// Dispatch layout of the compute strategy, if supported
    pub fn compute_dispatch(&self) -> Option<ComputeDispatch> {
        self.strategy(Strategy::Compute).and_then(|spec| spec.dispatch)
    }

    /// Lists every shader the manifest references with the overrides it must declare
    ///
    /// Shaders referenced more than once appear once.
    pub fn shader_requirements(&self) -> Vec<ShaderRequirement> {
        let mut requirements: Vec<ShaderRequirement> = Vec::new();
        let mut push = |path: &str, stage: ShaderStageKind, overrides: &[u32]| {
            if !requirements.iter().any(|r| r.path == path && r.stage == stage) {
                requirements.push(ShaderRequirement {
                    path: path.to_string(),
                    stage,
                    overrides: overrides.to_vec(),
                });
            }
        };

        push(&self.vertex_shader, ShaderStageKind::Vertex, &[]);
        push(&self.composite_shader, ShaderStageKind::Fragment, &[]);
        push(&self.resolve_shader, ShaderStageKind::Fragment, &[]);

        for spec in &self.strategies {
            if spec.kind == Strategy::Compute {
                if let Some(shader) = spec.shader.as_deref() {
                    push(shader, ShaderStageKind::Compute, &COMPUTE_OVERRIDE_IDS);
                }
                continue;
            }

            let overrides: &[u32] = if spec.specializes_radius() { &[FRAGMENT_RADIUS_ID] } else { &[] };
            if let Some(shader) = spec.shader.as_deref() {
                push(shader, ShaderStageKind::Fragment, overrides);
            }
            for shader in &spec.kernel_shaders {
                push(shader, ShaderStageKind::Fragment, overrides);
            }
            if let Some(shader) = spec.second_shader.as_deref() {
                push(shader, ShaderStageKind::Fragment, overrides);
            }
        }

        requirements
    }
}

/// Errors produced while loading or validating a manifest
#[derive(Debug)]
pub enum ManifestError {
    /// The manifest file could not be read
    Io(std::io::Error),
    /// The YAML is malformed or does not match the schema
    Parse(serde_norway::Error),
    /// Sample ID field is empty
    EmptyId,
    /// Sample name field is empty
    EmptyName,
    /// No kernel sizes are declared
    NoKernelSizes,
    /// A kernel size does not follow 3, 5, 7, ...
    InvalidKernelSize { index: usize, size: u32 },
    /// No strategies are declared
    NoStrategies,
    /// A strategy is declared twice
    DuplicateStrategy(Strategy),
    /// A strategy names neither a shared shader nor per-kernel shaders
    MissingShader(Strategy),
    /// Per-kernel shader list does not match the kernel list
    KernelShaderCount { strategy: Strategy, expected: usize, found: usize },
    /// The linear strategy has no vertical pass shader
    MissingSecondShader,
    /// A non-linear strategy declares a second shader
    UnexpectedSecondShader(Strategy),
    /// The compute strategy has no dispatch layout
    MissingDispatch,
    /// The compute strategy declares per-kernel shaders
    ComputeKernelShaders,
    /// The compute workgroup axis size is missing or zero
    InvalidWorkgroupAxis,
    /// A non-compute strategy declares dispatch settings
    UnexpectedDispatch(Strategy),
    /// More parameters than fit into the push-constant block
    TooManyParameters(usize),
    /// Two parameters share a name
    DuplicateParameter(String),
    /// A parameter range is empty or unusable with its transform
    InvalidParameterRange(String),
    /// A parameter default lies outside its range
    DefaultOutOfRange(String),
    /// A sampler choice is listed twice
    DuplicateSampler(SamplerChoice),
    /// The draw-count bound is zero
    InvalidDrawCount,
}

impl fmt::Display for ManifestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "Failed to read manifest: {e}"),
            Self::Parse(e) => write!(f, "Failed to parse manifest: {e}"),
            Self::EmptyId => write!(f, "Sample ID cannot be empty"),
            Self::EmptyName => write!(f, "Sample name cannot be empty"),
            Self::NoKernelSizes => write!(f, "Sample must declare at least one kernel size"),
            Self::InvalidKernelSize { index, size } => {
                write!(f, "Kernel size {size} at index {index} must be {}", 2 * (index + 1) + 1)
            }
            Self::NoStrategies => write!(f, "Sample must declare at least one strategy"),
            Self::DuplicateStrategy(strategy) => write!(f, "Strategy '{strategy}' is declared twice"),
            Self::MissingShader(strategy) => write!(f, "Strategy '{strategy}' has no shader"),
            Self::KernelShaderCount { strategy, expected, found } => {
                write!(f, "Strategy '{strategy}' lists {found} kernel shaders but the sample has {expected} kernel sizes")
            }
            Self::MissingSecondShader => write!(f, "Strategy 'linear' requires a second_shader"),
            Self::UnexpectedSecondShader(strategy) => write!(f, "Strategy '{strategy}' cannot declare a second_shader"),
            Self::MissingDispatch => write!(f, "Strategy 'compute' requires a dispatch layout"),
            Self::ComputeKernelShaders => write!(f, "Strategy 'compute' cannot use per-kernel shaders"),
            Self::InvalidWorkgroupAxis => write!(f, "Strategy 'compute' requires a positive workgroup_axis_size"),
            Self::UnexpectedDispatch(strategy) => write!(f, "Strategy '{strategy}' cannot declare dispatch settings"),
            Self::TooManyParameters(count) => write!(f, "Sample declares {count} parameters but at most {MAX_PARAMETERS} are supported"),
            Self::DuplicateParameter(name) => write!(f, "Parameter '{name}' is declared twice"),
            Self::InvalidParameterRange(name) => write!(f, "Parameter '{name}' has an invalid range"),
            Self::DefaultOutOfRange(name) => write!(f, "Default value of parameter '{name}' lies outside its range"),
            Self::DuplicateSampler(sampler) => write!(f, "Sampler '{}' is listed twice", sampler.name()),
            Self::InvalidDrawCount => write!(f, "max_draw_count must be at least 1"),
        }
    }
}

impl std::error::Error for ManifestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Parse(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GAUSSIAN: &str = r#"
id: gaussian_filter
name: Gaussian filter
texture: textures/color_bars.png
vertex_shader: quad3_vert.wgsl
composite_shader: simple.wgsl
resolve_shader: simple.wgsl
kernel_sizes: [3, 5, 7]
strategies:
  - kind: default
    shader: gaussian_filter/gaussian_blur.wgsl
  - kind: optimized
    shader: gaussian_filter/gaussian_blur_optimized.wgsl
  - kind: linear
    shader: gaussian_filter/gaussian_blur_linear_horiz.wgsl
    second_shader: gaussian_filter/gaussian_blur_linear_vert.wgsl
  - kind: compute
    shader: gaussian_filter/gaussian_blur_comp.wgsl
    dispatch: separable
    workgroup_axis_size: 128
parameters:
  - name: sigma
    default: 3.0
    min: 0.01
    max: 5.0
    transform: gaussian_divisor
"#;

    fn gaussian() -> SampleManifest {
        SampleManifest::from_yaml(GAUSSIAN).unwrap()
    }

    #[test]
    fn test_manifest_parsing() {
        let manifest = gaussian();
        assert_eq!(manifest.id, "gaussian_filter");
        assert_eq!(manifest.kernel_count(), 3);
        assert_eq!(manifest.strategy_names(), vec!["default", "optimized", "linear", "compute"]);
        assert_eq!(manifest.compute_dispatch(), Some(ComputeDispatch::Separable));
        assert_eq!(manifest.max_draw_count, 1);
        assert!(manifest.samplers.is_empty());
        assert_eq!(manifest.kernel_label(2).as_deref(), Some("7x7"));
        assert_eq!(manifest.kernel_label(3), None);
    }

    #[test]
    fn test_timed_regions_per_strategy() {
        let manifest = gaussian();
        assert_eq!(manifest.strategy(Strategy::Default).unwrap().timed_regions(), 1);
        assert_eq!(manifest.strategy(Strategy::Optimized).unwrap().timed_regions(), 1);
        assert_eq!(manifest.strategy(Strategy::Linear).unwrap().timed_regions(), 2);
        assert_eq!(manifest.strategy(Strategy::Compute).unwrap().timed_regions(), 2);
    }

    /// Per-kernel shaders replace the shared shader and drop the radius constant
    #[test]
    fn test_kernel_shaders() {
        let yaml = GAUSSIAN.replace(
            "    shader: gaussian_filter/gaussian_blur_optimized.wgsl\n",
            "    kernel_shaders: [opt_3x3.wgsl, opt_5x5.wgsl, opt_7x7.wgsl]\n",
        );
        let manifest = SampleManifest::from_yaml(&yaml).unwrap();
        let optimized = manifest.strategy(Strategy::Optimized).unwrap();
        assert!(!optimized.specializes_radius());
        assert_eq!(optimized.shader_for_kernel(1), Some("opt_5x5.wgsl"));
        assert_eq!(optimized.shader_for_kernel(3), None);

        let requirement = manifest.shader_requirements().into_iter().find(|r| r.path == "opt_7x7.wgsl").unwrap();
        assert!(requirement.overrides.is_empty());
    }

    #[test]
    fn test_shader_requirements() {
        let requirements = gaussian().shader_requirements();
        // simple.wgsl is shared by composite and resolve
        assert_eq!(requirements.iter().filter(|r| r.path == "simple.wgsl").count(), 1);

        let compute = requirements.iter().find(|r| r.stage == ShaderStageKind::Compute).unwrap();
        assert_eq!(compute.overrides, COMPUTE_OVERRIDE_IDS.to_vec());

        let vertical = requirements.iter().find(|r| r.path.ends_with("linear_vert.wgsl")).unwrap();
        assert_eq!(vertical.overrides, vec![FRAGMENT_RADIUS_ID]);
    }

    #[test]
    fn test_parameter_transform() {
        assert_eq!(ParameterTransform::Identity.apply(2.5), 2.5);
        assert!((ParameterTransform::GaussianDivisor.apply(3.0) - (-0.5 / 9.0)).abs() < 1e-7);
    }

    #[test]
    fn test_validation_errors() {
        let bad_kernel = GAUSSIAN.replace("[3, 5, 7]", "[3, 4, 7]");
        assert!(matches!(
            SampleManifest::from_yaml(&bad_kernel),
            Err(ManifestError::InvalidKernelSize { index: 1, size: 4 })
        ));

        let no_second = GAUSSIAN.replace("    second_shader: gaussian_filter/gaussian_blur_linear_vert.wgsl\n", "");
        assert!(matches!(SampleManifest::from_yaml(&no_second), Err(ManifestError::MissingSecondShader)));

        let no_dispatch = GAUSSIAN.replace("    dispatch: separable\n", "");
        assert!(matches!(SampleManifest::from_yaml(&no_dispatch), Err(ManifestError::MissingDispatch)));

        let zero_axis = GAUSSIAN.replace("workgroup_axis_size: 128", "workgroup_axis_size: 0");
        assert!(matches!(SampleManifest::from_yaml(&zero_axis), Err(ManifestError::InvalidWorkgroupAxis)));

        let bad_default = GAUSSIAN.replace("default: 3.0", "default: 9.0");
        assert!(matches!(SampleManifest::from_yaml(&bad_default), Err(ManifestError::DefaultOutOfRange(_))));

        let duplicate = GAUSSIAN.replace("  - kind: optimized\n", "  - kind: default\n");
        assert!(matches!(
            SampleManifest::from_yaml(&duplicate),
            Err(ManifestError::DuplicateStrategy(Strategy::Default))
        ));

        assert!(matches!(SampleManifest::from_yaml("id: [unclosed"), Err(ManifestError::Parse(_))));
    }

    #[test]
    fn test_optional_sections() {
        let yaml = format!("{GAUSSIAN}samplers: [linear, nearest]\nmax_draw_count: 256\n");
        let manifest = SampleManifest::from_yaml(&yaml).unwrap();
        assert_eq!(manifest.samplers, vec![SamplerChoice::Linear, SamplerChoice::Nearest]);
        assert_eq!(manifest.max_draw_count, 256);

        let zero = format!("{GAUSSIAN}max_draw_count: 0\n");
        assert!(matches!(SampleManifest::from_yaml(&zero), Err(ManifestError::InvalidDrawCount)));
    }
}
