//! Headless benchmark

use clap::Args;
use filterlab::backend::WgpuDevice;
use filterlab::device::{Extent, SharedDevice};
use filterlab::presets::{ASSET_DIR, SHADER_DIR, SamplePreset, create_sample};
use filterlab::strategy::Strategy;
use filterlab::{FilterSample, SampleContext, SampleOptions, assets::ImageAssetSource, shaders::FsShaderLoader};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args)]
pub struct RunArgs {
    /// Sample to benchmark (bilateral_filter, gaussian_filter or taa_stats)
    #[arg(default_value = "gaussian_filter")]
    preset: SamplePreset,

    /// Only benchmark this strategy
    #[arg(long, short)]
    strategy: Option<Strategy>,

    /// Only benchmark this kernel index (0 is 3x3)
    #[arg(long, short)]
    kernel: Option<usize>,

    /// Frames averaged per combination
    #[arg(long, short, default_value_t = 100)]
    frames: u32,

    /// Frames rendered and discarded before measuring
    #[arg(long, default_value_t = 10)]
    warmup: u32,

    /// Offscreen target width
    #[arg(long, default_value_t = 1920)]
    width: u32,

    /// Offscreen target height
    #[arg(long, default_value_t = 1080)]
    height: u32,

    /// Texture path relative to the asset directory, replacing the sample's
    #[arg(long)]
    texture: Option<String>,

    /// Directory the WGSL shaders are loaded from
    #[arg(long, default_value = SHADER_DIR)]
    shader_dir: PathBuf,

    /// Directory textures are loaded from
    #[arg(long, default_value = ASSET_DIR)]
    asset_dir: PathBuf,

    /// Print results as JSON
    #[arg(long)]
    json: bool,
}

/// Mean GPU time of one timed region
#[derive(Debug, Serialize)]
struct RegionResult {
    label: &'static str,
    mean_ms: f64,
}

/// Measurements of one strategy and kernel size
#[derive(Debug, Serialize)]
struct BenchResult {
    strategy: Strategy,
    kernel: String,
    frames: u64,
    regions: Vec<RegionResult>,
    total_ms: f64,
}

#[derive(Debug, Serialize)]
struct BenchReport {
    sample: String,
    adapter: String,
    width: u32,
    height: u32,
    results: Vec<BenchResult>,
}

pub fn run(args: &RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let extent = Extent::new(args.width, args.height);
    let device = Arc::new(WgpuDevice::headless(extent)?);
    let adapter = device.adapter_info();
    let device: SharedDevice = device;

    let mut sample = create_sample(
        args.preset,
        SampleContext {
            device,
            shaders: Box::new(FsShaderLoader::new(&args.shader_dir)),
            assets: Box::new(ImageAssetSource::new(&args.asset_dir)),
        },
    )?;
    let options = SampleOptions {
        texture: args.texture.clone(),
        ..Default::default()
    };
    if !sample.prepare(&options)? {
        return Err(format!("Cannot benchmark an empty {extent} target").into());
    }

    let strategies: Vec<Strategy> = sample
        .manifest()
        .strategies
        .iter()
        .map(|spec| spec.kind)
        .filter(|&kind| args.strategy.is_none_or(|wanted| wanted == kind))
        .collect();
    if strategies.is_empty() {
        return Err(format!("{} does not support the requested strategy", args.preset).into());
    }
    let kernels: Vec<usize> = (0..sample.manifest().kernel_count()).filter(|&index| args.kernel.is_none_or(|wanted| wanted == index)).collect();
    if kernels.is_empty() {
        return Err(format!("{} has no kernel with the requested index", args.preset).into());
    }

    let mut results = Vec::new();
    for &strategy in &strategies {
        sample.select_strategy(strategy)?;
        for &kernel in &kernels {
            results.push(measure(sample.as_mut(), strategy, kernel, args)?);
        }
    }

    let report = BenchReport {
        sample: sample.name().to_string(),
        adapter: format!("{} ({:?})", adapter.name, adapter.backend),
        width: args.width,
        height: args.height,
        results,
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_table(&report);
    }
    Ok(())
}

fn measure(sample: &mut dyn FilterSample, strategy: Strategy, kernel: usize, args: &RunArgs) -> Result<BenchResult, Box<dyn std::error::Error>> {
    sample.select_kernel(kernel)?;
    for _ in 0..args.warmup {
        sample.render(0.0)?;
    }
    // Selecting again discards the warmup statistics
    sample.select_kernel(kernel)?;
    for _ in 0..args.frames {
        sample.render(0.0)?;
    }

    let kernel_label = sample.manifest().kernel_label(kernel).unwrap_or_default();
    let timing = sample.timing().ok_or("Sample has no timing statistics")?;
    let regions = timing
        .last()
        .map(|last| {
            last.regions
                .iter()
                .zip(timing.region_means())
                .map(|(region, mean)| RegionResult {
                    label: region.label,
                    mean_ms: mean.mean(),
                })
                .collect()
        })
        .unwrap_or_default();
    tracing::debug!("{strategy} {kernel_label}: {:.4} ms over {} frames", timing.total_mean().mean(), timing.frames());

    Ok(BenchResult {
        strategy,
        kernel: kernel_label,
        frames: timing.frames(),
        regions,
        total_ms: timing.total_mean().mean(),
    })
}

fn print_table(report: &BenchReport) {
    println!("{} at {}x{} on {}", report.sample, report.width, report.height, report.adapter);
    println!();
    println!("{:<10} {:<7} {:>8} {:>12}  passes", "strategy", "kernel", "frames", "total (ms)");
    for result in &report.results {
        let passes: Vec<String> = if result.regions.len() > 1 {
            result.regions.iter().map(|region| format!("{}: {:.4}", region.label, region.mean_ms)).collect()
        } else {
            Vec::new()
        };
        println!(
            "{:<10} {:<7} {:>8} {:>12.4}  {}",
            result.strategy.name(),
            result.kernel,
            result.frames,
            result.total_ms,
            passes.join(", ")
        );
    }
}
