//! Build script for the filterlab crate
//!
//! Validates the embedded sample manifests so that a malformed preset fails the
//! build instead of the first `prepare` call, and defines the `native` cfg alias
//! used to gate the windowed viewer example.

use filterlab_manifest::SampleManifest;

/// Manifests embedded by `presets.rs`
const PRESET_MANIFESTS: &[&str] = &["bilateral_filter", "gaussian_filter", "taa_stats"];

fn main() {
    cfg_aliases::cfg_aliases! {
        native: { not(target_arch = "wasm32") },
    }

    for name in PRESET_MANIFESTS {
        let path = format!("manifests/{name}.yaml");
        println!("cargo:rerun-if-changed={path}");

        if let Err(e) = SampleManifest::from_file(&path) {
            panic!("Invalid sample manifest {path}: {e}");
        }
    }
}
