//! Built-in filter samples
//!
//! Each preset is a manifest embedded at compile time. The build script validates
//! these manifests, so parsing them at runtime only fails if the binary was built
//! from a different tree.

use crate::sample::{FilterApp, FilterSample, SampleContext};
use crate::Result;
use filterlab_manifest::SampleManifest;
use std::fmt;
use std::str::FromStr;

/// WGSL shaders shipped with the crate
pub const SHADER_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/shaders");

/// Textures referenced by the built-in manifests
pub const ASSET_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/assets");

/// The sample programs shipped with filterlab
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplePreset {
    /// Edge-preserving blur with a sampler choice and a draw-count multiplier
    BilateralFilter,
    /// Gaussian blur with all four strategies
    GaussianFilter,
    /// Neighbourhood statistics for TAA clamping
    TaaStats,
}

impl SamplePreset {
    pub const ALL: [SamplePreset; 3] = [SamplePreset::BilateralFilter, SamplePreset::GaussianFilter, SamplePreset::TaaStats];

    /// Returns the identifier used on the command line and in manifest ids
    pub fn name(&self) -> &'static str {
        match self {
            SamplePreset::BilateralFilter => "bilateral_filter",
            SamplePreset::GaussianFilter => "gaussian_filter",
            SamplePreset::TaaStats => "taa_stats",
        }
    }

    /// Returns the embedded YAML manifest
    pub fn manifest_source(&self) -> &'static str {
        match self {
            SamplePreset::BilateralFilter => include_str!("../manifests/bilateral_filter.yaml"),
            SamplePreset::GaussianFilter => include_str!("../manifests/gaussian_filter.yaml"),
            SamplePreset::TaaStats => include_str!("../manifests/taa_stats.yaml"),
        }
    }

    /// Parses the embedded manifest
    pub fn manifest(&self) -> Result<SampleManifest> {
        Ok(SampleManifest::from_yaml(self.manifest_source())?)
    }
}

impl fmt::Display for SamplePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SamplePreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "bilateral_filter" | "bilateral" => Ok(SamplePreset::BilateralFilter),
            "gaussian_filter" | "gaussian" => Ok(SamplePreset::GaussianFilter),
            "taa_stats" | "taa" => Ok(SamplePreset::TaaStats),
            _ => Err(format!("Unknown sample '{s}' (expected bilateral_filter, gaussian_filter or taa_stats)")),
        }
    }
}

/// Creates an unprepared sample for a built-in preset
///
/// # Arguments
/// * `preset` - Which sample to create
/// * `context` - Device, shader loader and asset source the sample runs against
///
/// # Returns
/// The sample, ready for [`FilterSample::prepare`]
pub fn create_sample(preset: SamplePreset, context: SampleContext) -> Result<Box<dyn FilterSample>> {
    Ok(Box::new(FilterApp::new(preset.manifest()?, context)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{ComputeDispatch, Strategy};

    #[test]
    fn test_all_manifests_parse() {
        for preset in SamplePreset::ALL {
            let manifest = preset.manifest().unwrap();
            assert_eq!(manifest.id, preset.name());
            assert_eq!(manifest.kernel_count(), 3);
        }
    }

    #[test]
    fn test_preset_parsing() {
        assert_eq!("gaussian".parse::<SamplePreset>().unwrap(), SamplePreset::GaussianFilter);
        assert_eq!("Bilateral-Filter".parse::<SamplePreset>().unwrap(), SamplePreset::BilateralFilter);
        assert_eq!("taa_stats".parse::<SamplePreset>().unwrap(), SamplePreset::TaaStats);
        assert!("sobel".parse::<SamplePreset>().is_err());
    }

    #[test]
    fn test_strategy_sets() {
        let gaussian = SamplePreset::GaussianFilter.manifest().unwrap();
        assert_eq!(gaussian.strategy_names(), vec!["default", "optimized", "linear", "compute"]);
        assert_eq!(gaussian.compute_dispatch(), Some(ComputeDispatch::Separable));

        let bilateral = SamplePreset::BilateralFilter.manifest().unwrap();
        assert!(!bilateral.supports(Strategy::Linear));
        assert_eq!(bilateral.compute_dispatch(), Some(ComputeDispatch::Tiled));
        assert_eq!(bilateral.max_draw_count, 256);
        assert!(!bilateral.strategy(Strategy::Optimized).unwrap().specializes_radius());

        let taa = SamplePreset::TaaStats.manifest().unwrap();
        assert_eq!(taa.strategy_names(), vec!["default", "optimized", "compute"]);
        assert!(taa.samplers.is_empty());
    }

    /// Every shipped shader parses and declares the overrides its pipelines receive
    #[test]
    fn test_shipped_shaders_declare_overrides() {
        for preset in SamplePreset::ALL {
            for requirement in preset.manifest().unwrap().shader_requirements() {
                let path = std::path::Path::new(SHADER_DIR).join(&requirement.path);
                let source = std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("{}: {e}", path.display()));
                if let Err(e) = filterlab_manifest::check_shader_overrides(&source, requirement.stage, &requirement.overrides) {
                    panic!("{preset}: {}: {e}", requirement.path);
                }
            }
        }
    }

    #[test]
    fn test_shipped_textures_exist() {
        for preset in SamplePreset::ALL {
            let manifest = preset.manifest().unwrap();
            assert!(std::path::Path::new(ASSET_DIR).join(&manifest.texture).is_file(), "{}", manifest.texture);
        }
    }
}
