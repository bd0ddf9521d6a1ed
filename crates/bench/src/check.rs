//! Manifest and shader validation

use clap::Args;
use filterlab::presets::{SHADER_DIR, SamplePreset};
use filterlab_manifest::{SampleManifest, check_shader_overrides};
use std::path::{Path, PathBuf};

#[derive(Args)]
pub struct CheckArgs {
    /// Additional manifest files to check besides the built-in samples
    #[arg(long = "manifest", short)]
    manifests: Vec<PathBuf>,

    /// Directory the shaders are resolved against
    #[arg(long, default_value = SHADER_DIR)]
    shader_dir: PathBuf,
}

pub fn check(args: &CheckArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut manifests = Vec::new();
    for preset in SamplePreset::ALL {
        manifests.push((preset.name().to_string(), SampleManifest::from_yaml(preset.manifest_source())));
    }
    for path in &args.manifests {
        manifests.push((path.display().to_string(), SampleManifest::from_file(path)));
    }

    let mut failures = 0;
    for (origin, manifest) in manifests {
        let manifest = match manifest {
            Ok(manifest) => manifest,
            Err(e) => {
                println!("FAIL {origin}: {e}");
                failures += 1;
                continue;
            }
        };

        let problems = shader_problems(&manifest, &args.shader_dir);
        if problems.is_empty() {
            println!("ok   {origin} ({} strategies, {} kernel sizes)", manifest.strategies.len(), manifest.kernel_count());
        } else {
            println!("FAIL {origin}");
            for problem in &problems {
                println!("     {problem}");
            }
            failures += 1;
        }
    }

    if failures > 0 {
        return Err(format!("{failures} manifest(s) failed").into());
    }
    Ok(())
}

/// Checks every shader a manifest references for the overrides its pipelines receive
fn shader_problems(manifest: &SampleManifest, shader_dir: &Path) -> Vec<String> {
    let mut problems = Vec::new();
    for requirement in manifest.shader_requirements() {
        let path = shader_dir.join(&requirement.path);
        tracing::debug!("Checking {} as {:?}", path.display(), requirement.stage);
        match std::fs::read_to_string(&path) {
            Ok(source) => {
                if let Err(e) = check_shader_overrides(&source, requirement.stage, &requirement.overrides) {
                    problems.push(format!("{}: {e}", requirement.path));
                }
            }
            Err(e) => problems.push(format!("{}: {e}", requirement.path)),
        }
    }
    problems
}
